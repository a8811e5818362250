//! In-memory voucher store.
//!
//! [`MemoryLedger`] implements [`LedgerStore`] over a map of committed
//! vouchers. Every write is checked with `rustacct-validate` first and a
//! voucher that fails is rejected whole. Writers to the same id are
//! serialized; writers to different ids proceed concurrently. Scans copy out
//! a snapshot, so no lock is held while a caller consumes the stream.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use parking_lot::{Mutex, RwLock};
use rustacct_core::{DateFilter, LedgerStore, StoreError, Voucher, VoucherStream};
use rustacct_validate::check_voucher;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// A validating, thread-safe, in-memory [`LedgerStore`].
#[derive(Debug, Default)]
pub struct MemoryLedger {
    /// Committed vouchers by id.
    vouchers: RwLock<BTreeMap<String, Arc<Voucher>>>,
    /// Write locks of ids with a writer in flight.
    id_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemoryLedger {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `vouchers`, each validated as if upserted.
    pub fn from_vouchers(vouchers: impl IntoIterator<Item = Voucher>) -> Result<Self, StoreError> {
        let ledger = Self::new();
        for voucher in vouchers {
            ledger.upsert(voucher)?;
        }
        Ok(ledger)
    }

    /// Look up a committed voucher.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Voucher> {
        self.vouchers.read().get(id).map(|v| Voucher::clone(v))
    }

    /// Number of committed vouchers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vouchers.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vouchers.read().is_empty()
    }

    /// Run `f` holding the write lock of `id`.
    fn with_id_lock<T>(&self, id: &str, f: impl FnOnce() -> T) -> T {
        let id_lock = Arc::clone(self.id_locks.lock().entry(id.to_string()).or_default());
        let out = {
            let _guard = id_lock.lock();
            f()
        };
        let mut locks = self.id_locks.lock();
        // Only the map and `id_lock` are left: no writer is waiting on it.
        if Arc::strong_count(&id_lock) == 2 {
            locks.remove(id);
        }
        out
    }
}

impl LedgerStore for MemoryLedger {
    /// Vouchers in `hint`, undated first, then by date and id.
    fn scan(&self, hint: &DateFilter) -> Result<VoucherStream<'_>, StoreError> {
        let mut snapshot: Vec<Arc<Voucher>> = self
            .vouchers
            .read()
            .values()
            .filter(|v| hint.contains(v.date))
            .cloned()
            .collect();
        snapshot.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        tracing::debug!(?hint, vouchers = snapshot.len(), "scan snapshot taken");
        Ok(Box::new(
            snapshot.into_iter().map(|v| Ok(Voucher::clone(&v))),
        ))
    }

    fn upsert(&self, mut voucher: Voucher) -> Result<String, StoreError> {
        if let Err(violation) = check_voucher(&voucher) {
            tracing::warn!(
                id = voucher.id.as_deref().unwrap_or("<new>"),
                errors = violation.errors.len(),
                "voucher rejected"
            );
            return Err(StoreError::Rejected(violation.messages()));
        }

        let id = voucher
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        voucher.id = Some(id.clone());
        let replaced = self.with_id_lock(&id, || {
            self.vouchers
                .write()
                .insert(id.clone(), Arc::new(voucher))
                .is_some()
        });
        tracing::debug!(%id, replaced, "voucher committed");
        Ok(id)
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let existed = self.with_id_lock(id, || self.vouchers.write().remove(id).is_some());
        tracing::debug!(%id, existed, "voucher deleted");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use rustacct_core::{NaiveDate, VoucherDetail};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn lunch(on: Option<NaiveDate>) -> Voucher {
        Voucher::new(on)
            .with_detail(VoucherDetail::new(1001, dec!(-100)))
            .with_detail(VoucherDetail::new(6602, dec!(100)).with_content("lunch"))
    }

    #[test]
    fn test_upsert_assigns_id() {
        let ledger = MemoryLedger::new();
        let id = ledger.upsert(lunch(Some(date(2024, 1, 1)))).unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(ledger.get(&id).unwrap().id.as_deref(), Some(id.as_str()));
    }

    #[test]
    fn test_upsert_replaces_whole_voucher() {
        let ledger = MemoryLedger::new();
        let id = ledger.upsert(lunch(Some(date(2024, 1, 1)))).unwrap();
        let replacement = Voucher::new(Some(date(2024, 1, 2)))
            .with_id(id.clone())
            .with_detail(VoucherDetail::new(1001, dec!(-5)))
            .with_detail(VoucherDetail::new(6602, dec!(5)));
        assert_eq!(ledger.upsert(replacement).unwrap(), id);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(&id).unwrap().details[0].fund, Some(dec!(-5)));
    }

    #[test]
    fn test_unbalanced_rejected() {
        let ledger = MemoryLedger::new();
        let bad = Voucher::new(Some(date(2024, 1, 1)))
            .with_detail(VoucherDetail::new(1001, dec!(-100)))
            .with_detail(VoucherDetail::new(6602, dec!(99)));
        let err = ledger.upsert(bad).unwrap_err();
        let StoreError::Rejected(messages) = err else {
            panic!("expected rejection");
        };
        assert!(messages[0].starts_with("[E3001]"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_rejected_replacement_keeps_original() {
        let ledger = MemoryLedger::new();
        let id = ledger.upsert(lunch(None)).unwrap();
        let bad = Voucher::new(None)
            .with_id(id.clone())
            .with_detail(VoucherDetail::placeholder(6602));
        assert!(ledger.upsert(bad).is_err());
        assert_eq!(ledger.get(&id).unwrap().details.len(), 2);
    }

    #[test]
    fn test_delete() {
        let ledger = MemoryLedger::new();
        let id = ledger.upsert(lunch(None)).unwrap();
        assert!(ledger.delete(&id).unwrap());
        assert!(!ledger.delete(&id).unwrap());
        assert!(ledger.get(&id).is_none());
    }

    #[test]
    fn test_id_locks_released() {
        let ledger = MemoryLedger::new();
        for i in 0..1000 {
            assert!(!ledger.delete(&format!("ghost-{i}")).unwrap());
        }
        let id = ledger.upsert(lunch(None)).unwrap();
        assert!(ledger.delete(&id).unwrap());
        assert!(ledger.id_locks.lock().is_empty());
    }

    #[test]
    fn test_id_locks_released_after_contended_writes() {
        let ledger = MemoryLedger::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                let ledger = &ledger;
                s.spawn(move || {
                    for _ in 0..50 {
                        ledger.upsert(lunch(None).with_id("shared")).unwrap();
                    }
                });
            }
        });
        assert_eq!(ledger.len(), 1);
        assert!(ledger.id_locks.lock().is_empty());
    }

    #[test]
    fn test_scan_filters_and_orders() {
        let ledger = MemoryLedger::new();
        ledger.upsert(lunch(Some(date(2024, 2, 1))).with_id("feb")).unwrap();
        ledger.upsert(lunch(Some(date(2024, 1, 1))).with_id("jan")).unwrap();
        ledger.upsert(lunch(None).with_id("always")).unwrap();

        let all: Vec<String> = ledger
            .scan(&DateFilter::unconstrained())
            .unwrap()
            .map(|v| v.unwrap().id.unwrap())
            .collect();
        assert_eq!(all, vec!["always", "jan", "feb"]);

        let jan: Vec<String> = ledger
            .scan(&DateFilter::between(date(2024, 1, 1), date(2024, 1, 31)))
            .unwrap()
            .map(|v| v.unwrap().id.unwrap())
            .collect();
        assert_eq!(jan, vec!["jan"]);
    }

    #[test]
    fn test_scan_is_a_snapshot() {
        let ledger = MemoryLedger::new();
        ledger.upsert(lunch(None).with_id("a")).unwrap();
        let stream = ledger.scan(&DateFilter::unconstrained()).unwrap();
        // Writing while a stream is open must not block or change the stream.
        ledger.upsert(lunch(None).with_id("b")).unwrap();
        assert_eq!(stream.count(), 1);
    }
}
