//! Multi-currency consolidation.
//!
//! Converts every leaf of a subtotal grouped by currency into a single
//! reporting currency and rolls the converted values up the tree, next to
//! the original aggregates. A bucket whose rate cannot be found stays
//! unconverted, as does every ancestor above it.

use rust_decimal::Decimal;
use rustacct_core::{ExchangeRates, NaiveDate, RateError};
use serde::{Serialize, Serializer};

use crate::error::QueryError;
use crate::series::Granularity;
use crate::subtotal::{Aggregation, BucketKey, GroupBy, SubtotalNode, SubtotalResult};

/// A bucket that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unconverted {
    /// Keys from below the root down to the bucket
    pub path: Vec<BucketKey>,
    /// Currency of the bucket
    pub currency: String,
    /// Date the rate was requested for
    pub date: NaiveDate,
    /// Why no rate was available
    #[serde(serialize_with = "serialize_error")]
    pub error: RateError,
}

fn serialize_error<S: Serializer>(error: &RateError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// A subtotal with converted values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Consolidated {
    /// The subtotal, with `converted` filled where possible
    pub result: SubtotalResult,
    /// Currency converted into
    pub reporting_currency: String,
    /// Total in the reporting currency, if every bucket converted
    pub grand_total: Option<Decimal>,
    /// Buckets that could not be converted
    pub unconverted: Vec<Unconverted>,
}

impl Consolidated {
    /// Whether every bucket converted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unconverted.is_empty()
    }
}

struct Walk<'a> {
    levels: &'a [GroupBy],
    reporting: &'a str,
    rates: &'a dyn ExchangeRates,
    as_of: NaiveDate,
    path: Vec<BucketKey>,
    unconverted: Vec<Unconverted>,
}

impl Walk<'_> {
    /// Fill `converted` below and at `node`; returns it.
    fn convert(
        &mut self,
        node: &mut SubtotalNode,
        depth: usize,
        currency: Option<&str>,
        date: Option<NaiveDate>,
    ) -> Option<Decimal> {
        if node.is_leaf() {
            node.converted = self.convert_leaf(node.aggregate, currency, date);
            return node.converted;
        }

        let level = self.levels.get(depth).copied();
        let mut total = Some(Decimal::ZERO);
        for child in &mut node.children {
            let (child_currency, child_date) = match (&child.key, level) {
                (BucketKey::Currency(c), _) => (Some(c.clone()), date),
                (BucketKey::Date(d), Some(level)) => {
                    let end = level
                        .granularity()
                        .zip(*d)
                        .map(|(g, d): (Granularity, NaiveDate)| g.end_of(d));
                    (currency.map(str::to_string), end)
                }
                _ => (currency.map(str::to_string), date),
            };
            self.path.push(child.key.clone());
            let converted = self.convert(child, depth + 1, child_currency.as_deref(), child_date);
            self.path.pop();
            total = total.zip(converted).map(|(a, b)| a + b);
        }
        node.converted = total;
        total
    }

    fn convert_leaf(
        &mut self,
        aggregate: Decimal,
        currency: Option<&str>,
        date: Option<NaiveDate>,
    ) -> Option<Decimal> {
        // Only an empty root reaches here without a currency.
        let Some(currency) = currency else {
            return aggregate.is_zero().then_some(Decimal::ZERO);
        };
        if currency == self.reporting {
            return Some(aggregate);
        }
        let date = date.unwrap_or(self.as_of);
        match self.rates.rate(date, currency, self.reporting) {
            Ok(rate) => Some(aggregate * rate),
            Err(error) => {
                tracing::warn!(
                    currency,
                    %date,
                    reporting = self.reporting,
                    %error,
                    "bucket left unconverted"
                );
                self.unconverted.push(Unconverted {
                    path: self.path.clone(),
                    currency: currency.to_string(),
                    date,
                    error,
                });
                None
            }
        }
    }
}

/// Convert `result` into `reporting` currency.
///
/// Each leaf is converted at the end of its date bucket when the grouping
/// has a date level, and at `as_of` otherwise. Undated buckets use `as_of`.
pub fn consolidate(
    mut result: SubtotalResult,
    reporting: &str,
    rates: &dyn ExchangeRates,
    as_of: NaiveDate,
) -> Result<Consolidated, QueryError> {
    if !result.levels.contains(&GroupBy::Currency) {
        return Err(QueryError::InvalidSubtotal(
            "consolidation needs a currency grouping level".to_string(),
        ));
    }
    if result.aggregation == Aggregation::Count {
        return Err(QueryError::InvalidSubtotal(
            "counts cannot be converted between currencies".to_string(),
        ));
    }

    let levels = result.levels.clone();
    let mut walk = Walk {
        levels: &levels,
        reporting,
        rates,
        as_of,
        path: Vec::new(),
        unconverted: Vec::new(),
    };
    let grand_total = walk.convert(&mut result.root, 0, None, None);
    let unconverted = walk.unconverted;
    tracing::debug!(
        reporting,
        unconverted = unconverted.len(),
        "consolidation complete"
    );

    Ok(Consolidated {
        result,
        reporting_currency: reporting.to_string(),
        grand_total,
        unconverted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::named::ResolvedQuery;
    use crate::subtotal::{group, SubtotalSpec};
    use crate::tree::FilterTree;
    use crate::filter::{DetailFilter, Direction};
    use rust_decimal_macros::dec;
    use rustacct_core::{PriceEntry, PriceTable, StoreError, Voucher, VoucherDetail};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn ledger() -> Vec<Voucher> {
        vec![
            Voucher::new(Some(date(2024, 1, 10)))
                .with_detail(VoucherDetail::new(1001, dec!(-100)))
                .with_detail(VoucherDetail::new(6602, dec!(100))),
            Voucher::new(Some(date(2024, 1, 12)))
                .with_detail(VoucherDetail::new(1002, dec!(-10)).with_currency("USD"))
                .with_detail(VoucherDetail::new(6602, dec!(10)).with_currency("USD")),
            Voucher::new(Some(date(2024, 2, 12)))
                .with_detail(VoucherDetail::new(1002, dec!(-20)).with_currency("USD"))
                .with_detail(VoucherDetail::new(6602, dec!(20)).with_currency("USD")),
        ]
    }

    fn expenses(spec: &SubtotalSpec, vouchers: Vec<Voucher>) -> SubtotalResult {
        let query = ResolvedQuery::from_tree(FilterTree::detail(
            DetailFilter::title(6602).with_direction(Direction::Positive),
        ));
        group(vouchers.into_iter().map(Ok::<_, StoreError>), &query, spec).unwrap()
    }

    fn rates() -> PriceTable {
        PriceTable::from_entries(vec![
            PriceEntry {
                date: date(2024, 1, 1),
                currency: "USD".to_string(),
                price: dec!(7),
                quote: "CNY".to_string(),
            },
            PriceEntry {
                date: date(2024, 2, 1),
                currency: "USD".to_string(),
                price: dec!(7.5),
                quote: "CNY".to_string(),
            },
        ])
    }

    #[test]
    fn test_consolidate_at_as_of() {
        let result = expenses(&SubtotalSpec::new(vec![GroupBy::Currency]), ledger());
        let out = consolidate(result, "CNY", &rates(), date(2024, 3, 1)).unwrap();
        assert!(out.is_complete());
        // 100 CNY + 30 USD at 7.5
        assert_eq!(out.grand_total, Some(dec!(325)));
        let usd = out
            .result
            .root
            .child(&BucketKey::Currency("USD".into()))
            .unwrap();
        assert_eq!(usd.aggregate, dec!(30));
        assert_eq!(usd.converted, Some(dec!(225.0)));
    }

    #[test]
    fn test_consolidate_per_month() {
        let spec = SubtotalSpec::new(vec![GroupBy::Month, GroupBy::Currency]);
        let out = consolidate(expenses(&spec, ledger()), "CNY", &rates(), date(2024, 3, 1)).unwrap();
        // January USD at 7, February USD at 7.5
        assert_eq!(out.grand_total, Some(dec!(100) + dec!(70) + dec!(150)));
    }

    #[test]
    fn test_missing_rate() {
        let mut vouchers = ledger();
        vouchers.push(
            Voucher::new(Some(date(2024, 1, 15)))
                .with_detail(VoucherDetail::new(1002, dec!(-5)).with_currency("EUR"))
                .with_detail(VoucherDetail::new(6602, dec!(5)).with_currency("EUR")),
        );
        let result = expenses(&SubtotalSpec::new(vec![GroupBy::Currency]), vouchers);
        let out = consolidate(result, "CNY", &rates(), date(2024, 3, 1)).unwrap();
        assert_eq!(out.grand_total, None);
        assert_eq!(out.unconverted.len(), 1);
        assert_eq!(out.unconverted[0].currency, "EUR");
        assert_eq!(out.unconverted[0].path, vec![BucketKey::Currency("EUR".into())]);
        assert_eq!(out.result.root.converted, None);
        // Siblings still convert.
        let cny = out.result.root.child(&BucketKey::Currency("CNY".into())).unwrap();
        assert_eq!(cny.converted, Some(dec!(100)));
    }

    #[test]
    fn test_requires_currency_level() {
        let result = expenses(&SubtotalSpec::new(vec![GroupBy::Title]), ledger());
        assert!(matches!(
            consolidate(result, "CNY", &rates(), date(2024, 3, 1)),
            Err(QueryError::InvalidSubtotal(_))
        ));

        let spec = SubtotalSpec::new(vec![GroupBy::Currency]).with_aggregation(Aggregation::Count);
        assert!(consolidate(expenses(&spec, ledger()), "CNY", &rates(), date(2024, 3, 1)).is_err());
    }

    #[test]
    fn test_empty_result_converts_to_zero() {
        let result = expenses(&SubtotalSpec::new(vec![GroupBy::Currency]), vec![]);
        let out = consolidate(result, "CNY", &rates(), date(2024, 3, 1)).unwrap();
        assert_eq!(out.grand_total, Some(Decimal::ZERO));
    }
}
