//! Voucher types representing ledger records.
//!
//! A [`Voucher`] is one double-entry record. It owns an ordered list of
//! [`VoucherDetail`] lines; for every currency present the signed amounts of
//! its details must sum to exactly zero once the voucher is committed.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency assigned to details built without an explicit currency.
pub const BASE_CURRENCY: &str = "CNY";

/// The type tag of a voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherKind {
    /// A regular bookkeeping voucher.
    #[default]
    Ordinary,
    /// Monthly carry of income/expense into equity.
    Carry,
    /// Annual carry of income/expense into equity.
    AnnualCarry,
    /// Asset depreciation.
    Depreciation,
    /// Asset devaluation.
    Devalue,
    /// Amortization of prepaid items.
    Amortization,
    /// Recorded, but not yet confirmed.
    Uncertain,
}

impl fmt::Display for VoucherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ordinary => "ordinary",
            Self::Carry => "carry",
            Self::AnnualCarry => "annual_carry",
            Self::Depreciation => "depreciation",
            Self::Devalue => "devalue",
            Self::Amortization => "amortization",
            Self::Uncertain => "uncertain",
        };
        f.write_str(s)
    }
}

/// One line of a voucher.
///
/// `fund` is `None` only in templates, where the amount is filled in later.
/// Committed vouchers never carry a null amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherDetail {
    /// Owner of this line, for shared ledgers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Currency code
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Four-digit account code
    pub title: u32,
    /// Two-digit sub-account code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_title: Option<u8>,
    /// Free-text content (counterparty, item, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Signed amount
    #[serde(default)]
    pub fund: Option<Decimal>,
    /// Reconciliation marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

fn default_currency() -> String {
    BASE_CURRENCY.to_string()
}

impl VoucherDetail {
    /// Create a new detail in the base currency.
    #[must_use]
    pub fn new(title: u32, fund: Decimal) -> Self {
        Self {
            user: None,
            currency: default_currency(),
            title,
            sub_title: None,
            content: None,
            fund: Some(fund),
            remark: None,
        }
    }

    /// Create a placeholder detail whose amount is still unknown.
    #[must_use]
    pub fn placeholder(title: u32) -> Self {
        Self {
            fund: None,
            ..Self::new(title, Decimal::ZERO)
        }
    }

    /// Set the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Set the sub-account code.
    #[must_use]
    pub const fn with_sub_title(mut self, sub_title: u8) -> Self {
        self.sub_title = Some(sub_title);
        self
    }

    /// Set the content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the remark.
    #[must_use]
    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    /// Set the owner.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Fund if present, zero otherwise.
    #[must_use]
    pub fn fund_or_zero(&self) -> Decimal {
        self.fund.unwrap_or(Decimal::ZERO)
    }
}

impl fmt::Display for VoucherDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  T{:04}", self.title)?;
        if let Some(sub) = self.sub_title {
            write!(f, "{sub:02}")?;
        }
        if let Some(content) = &self.content {
            write!(f, " '{content}'")?;
        }
        if let Some(remark) = &self.remark {
            write!(f, " \"{remark}\"")?;
        }
        if let Some(user) = &self.user {
            write!(f, " U{user}")?;
        }
        match self.fund {
            Some(fund) => write!(f, "  {fund} {}", self.currency),
            None => write!(f, "  ? {}", self.currency),
        }
    }
}

/// A double-entry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    /// Identifier, assigned by the store at first commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Date; `None` means "always"
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Type tag
    #[serde(default)]
    pub kind: VoucherKind,
    /// Voucher-level remark
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    /// Details, in entry order
    #[serde(default)]
    pub details: Vec<VoucherDetail>,
}

impl Voucher {
    /// Create a new, empty voucher.
    #[must_use]
    pub const fn new(date: Option<NaiveDate>) -> Self {
        Self {
            id: None,
            date,
            kind: VoucherKind::Ordinary,
            remark: None,
            details: Vec::new(),
        }
    }

    /// Set the identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: VoucherKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the remark.
    #[must_use]
    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    /// Add a detail.
    #[must_use]
    pub fn with_detail(mut self, detail: VoucherDetail) -> Self {
        self.details.push(detail);
        self
    }

    /// Distinct currencies in first-seen order.
    pub fn currencies(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for detail in &self.details {
            if !seen.contains(&detail.currency.as_str()) {
                seen.push(&detail.currency);
            }
        }
        seen
    }

    /// Sum of all non-null amounts in `currency`, or `None` if the currency is absent.
    pub fn balance_of(&self, currency: &str) -> Option<Decimal> {
        let mut found = false;
        let mut total = Decimal::ZERO;
        for detail in self.details.iter().filter(|d| d.currency == currency) {
            found = true;
            total += detail.fund_or_zero();
        }
        found.then_some(total)
    }
}

impl fmt::Display for Voucher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.date {
            Some(date) => write!(f, "{date}")?,
            None => f.write_str("[null]")?,
        }
        if let Some(id) = &self.id {
            write!(f, " ^{id}^")?;
        }
        if self.kind != VoucherKind::Ordinary {
            write!(f, " {}", self.kind)?;
        }
        if let Some(remark) = &self.remark {
            write!(f, " %{remark}%")?;
        }
        for detail in &self.details {
            write!(f, "\n{detail}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, month, day)
    }

    #[test]
    fn test_detail_defaults_to_base_currency() {
        let detail = VoucherDetail::new(1001, dec!(5));
        assert_eq!(detail.currency, BASE_CURRENCY);
        assert_eq!(detail.fund, Some(dec!(5)));
        assert!(VoucherDetail::placeholder(1001).fund.is_none());
    }

    #[test]
    fn test_balance_of() {
        let voucher = Voucher::new(date(2024, 1, 1))
            .with_detail(VoucherDetail::new(1001, dec!(-100)))
            .with_detail(VoucherDetail::new(6602, dec!(100)))
            .with_detail(VoucherDetail::new(1002, dec!(7)).with_currency("USD"));

        assert_eq!(voucher.currencies(), vec!["CNY", "USD"]);
        assert_eq!(voucher.balance_of("CNY"), Some(dec!(0)));
        assert_eq!(voucher.balance_of("USD"), Some(dec!(7)));
        assert_eq!(voucher.balance_of("EUR"), None);
    }

    #[test]
    fn test_display() {
        let voucher = Voucher::new(date(2024, 1, 1))
            .with_id("abc")
            .with_detail(
                VoucherDetail::new(6602, dec!(100))
                    .with_sub_title(3)
                    .with_content("lunch"),
            );
        assert_eq!(
            voucher.to_string(),
            "2024-01-01 ^abc^\n  T660203 'lunch'  100 CNY"
        );
    }

    #[test]
    fn test_deserialize_defaults() {
        let json = r#"{"date":"2024-01-01","details":[{"title":1001,"fund":"-5"}]}"#;
        let voucher: Voucher = serde_json::from_str(json).unwrap();
        assert_eq!(voucher.kind, VoucherKind::Ordinary);
        assert_eq!(voucher.id, None);
        assert_eq!(voucher.details[0].currency, "CNY");
        assert_eq!(voucher.details[0].fund, Some(dec!(-5)));
    }
}
