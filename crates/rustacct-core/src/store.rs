//! The ledger storage collaborator.
//!
//! The query engine never assumes more of a store than a forward-only scan
//! with an optional date hint. A store may ignore the hint entirely; callers
//! re-check every voucher against their own filters.

use thiserror::Error;

use crate::{DateFilter, Voucher};

/// Error returned by a [`LedgerStore`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or failed mid-operation.
    ///
    /// Retryable; the core never retries on its own.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The voucher was refused before anything was written.
    #[error("voucher rejected: {}", .0.join("; "))]
    Rejected(Vec<String>),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// A forward-only stream of vouchers.
///
/// Dropping the stream early releases whatever the store holds for it.
pub type VoucherStream<'a> = Box<dyn Iterator<Item = Result<Voucher, StoreError>> + Send + 'a>;

/// Storage for committed vouchers.
pub trait LedgerStore: Send + Sync {
    /// Stream every voucher that may fall in `hint`.
    ///
    /// The hint is an optimization only: a store may return vouchers outside
    /// of it, but must not omit any voucher inside it.
    fn scan(&self, hint: &DateFilter) -> Result<VoucherStream<'_>, StoreError>;

    /// Insert or replace a voucher, returning its id.
    fn upsert(&self, voucher: Voucher) -> Result<String, StoreError>;

    /// Delete a voucher by id, returning whether it existed.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;
}
