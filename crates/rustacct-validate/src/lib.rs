//! Voucher invariant checks.
//!
//! Every voucher is checked before it is written. A voucher that fails any
//! check is rejected as a whole.
//!
//! # Error Codes
//!
//! | Code | Description |
//! |------|-------------|
//! | E1001 | Account code is not 4 digits |
//! | E1002 | Sub-account code is not 2 digits |
//! | E1003 | Empty currency code |
//! | E3001 | Voucher does not balance in some currency |
//! | E3002 | Detail without an amount |
//! | E3003 | Voucher has no details |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::NaiveDate;
use rayon::prelude::*;
use rust_decimal::Decimal;
use rustacct_core::Voucher;
use thiserror::Error;

/// Validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // === Detail Errors (E1xxx) ===
    /// E1001: Account code outside 1000..=9999.
    InvalidTitle,
    /// E1002: Sub-account code above 99.
    InvalidSubTitle,
    /// E1003: Currency code is empty.
    EmptyCurrency,

    // === Voucher Errors (E3xxx) ===
    /// E3001: Amounts in one currency do not sum to zero.
    VoucherUnbalanced,
    /// E3002: A detail has no amount.
    MissingAmount,
    /// E3003: Voucher has no details.
    NoDetails,
}

impl ErrorCode {
    /// Get the error code string (e.g., "E3001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidTitle => "E1001",
            Self::InvalidSubTitle => "E1002",
            Self::EmptyCurrency => "E1003",
            Self::VoucherUnbalanced => "E3001",
            Self::MissingAmount => "E3002",
            Self::NoDetails => "E3003",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A validation error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("[{code}] {message}")]
pub struct ValidationError {
    /// Error code.
    pub code: ErrorCode,
    /// Error message.
    pub message: String,
    /// Id of the offending voucher, if it has one yet.
    pub voucher_id: Option<String>,
    /// Date of the offending voucher.
    pub date: Option<NaiveDate>,
    /// Additional context.
    pub context: Option<String>,
}

impl ValidationError {
    /// Create a new validation error for `voucher`.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>, voucher: &Voucher) -> Self {
        Self {
            code,
            message: message.into(),
            voucher_id: voucher.id.clone(),
            date: voucher.date,
            context: None,
        }
    }

    /// Add context to this error.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// A voucher that broke at least one invariant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("voucher violates {} invariant(s): {}", .errors.len(), summary(.errors))]
pub struct InvariantViolation {
    /// Every error found, in detail order.
    pub errors: Vec<ValidationError>,
}

fn summary(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl InvariantViolation {
    /// Whether any error carries `code`.
    #[must_use]
    pub fn has(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    /// One line per error, as `[code] message`.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Check one voucher, returning every error found.
#[must_use]
pub fn validate_voucher(voucher: &Voucher) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if voucher.details.is_empty() {
        errors.push(ValidationError::new(
            ErrorCode::NoDetails,
            "Voucher has no details",
            voucher,
        ));
        return errors;
    }

    for (index, detail) in voucher.details.iter().enumerate() {
        let at = format!("detail #{index}");
        if !(1000..=9999).contains(&detail.title) {
            errors.push(
                ValidationError::new(
                    ErrorCode::InvalidTitle,
                    format!("Account code {} is not 4 digits", detail.title),
                    voucher,
                )
                .with_context(at.clone()),
            );
        }
        if let Some(sub) = detail.sub_title {
            if sub > 99 {
                errors.push(
                    ValidationError::new(
                        ErrorCode::InvalidSubTitle,
                        format!("Sub-account code {sub} is not 2 digits"),
                        voucher,
                    )
                    .with_context(at.clone()),
                );
            }
        }
        if detail.currency.trim().is_empty() {
            errors.push(
                ValidationError::new(ErrorCode::EmptyCurrency, "Currency code is empty", voucher)
                    .with_context(at.clone()),
            );
        }
        if detail.fund.is_none() {
            errors.push(
                ValidationError::new(
                    ErrorCode::MissingAmount,
                    format!("Detail T{:04} has no amount", detail.title),
                    voucher,
                )
                .with_context(at),
            );
        }
    }

    for currency in voucher.currencies() {
        let residual = voucher.balance_of(currency).unwrap_or(Decimal::ZERO);
        if !residual.is_zero() {
            errors.push(
                ValidationError::new(
                    ErrorCode::VoucherUnbalanced,
                    format!("Voucher does not balance in {currency}: residual {residual}"),
                    voucher,
                )
                .with_context(currency.to_string()),
            );
        }
    }

    errors
}

/// Check one voucher, failing with every error found.
pub fn check_voucher(voucher: &Voucher) -> Result<(), InvariantViolation> {
    let errors = validate_voucher(voucher);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(InvariantViolation { errors })
    }
}

/// Check many vouchers in parallel, returning errors in input order.
#[must_use]
pub fn validate(vouchers: &[Voucher]) -> Vec<ValidationError> {
    vouchers.par_iter().flat_map_iter(validate_voucher).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use rustacct_core::VoucherDetail;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn codes(voucher: &Voucher) -> Vec<ErrorCode> {
        validate_voucher(voucher).iter().map(|e| e.code).collect()
    }

    #[test]
    fn test_balanced_voucher_passes() {
        let voucher = Voucher::new(Some(date(2024, 1, 1)))
            .with_detail(VoucherDetail::new(1001, dec!(-100)))
            .with_detail(VoucherDetail::new(6602, dec!(100)).with_sub_title(3));
        assert!(check_voucher(&voucher).is_ok());
    }

    #[test]
    fn test_unbalanced_voucher() {
        let voucher = Voucher::new(Some(date(2024, 1, 1)))
            .with_id("x")
            .with_detail(VoucherDetail::new(1001, dec!(-100)))
            .with_detail(VoucherDetail::new(6602, dec!(99)));
        let err = check_voucher(&voucher).unwrap_err();
        assert!(err.has(ErrorCode::VoucherUnbalanced));
        assert_eq!(err.errors[0].voucher_id.as_deref(), Some("x"));
        assert!(err.to_string().contains("residual -1"));
    }

    #[test]
    fn test_each_currency_balances_separately() {
        let voucher = Voucher::new(None)
            .with_detail(VoucherDetail::new(1001, dec!(-100)))
            .with_detail(VoucherDetail::new(1002, dec!(100)).with_currency("USD"));
        assert_eq!(
            codes(&voucher),
            vec![ErrorCode::VoucherUnbalanced, ErrorCode::VoucherUnbalanced]
        );
    }

    #[test]
    fn test_null_amount_rejected() {
        let voucher = Voucher::new(None)
            .with_detail(VoucherDetail::new(1001, dec!(-100)))
            .with_detail(VoucherDetail::new(6602, dec!(100)))
            .with_detail(VoucherDetail::placeholder(6603));
        assert_eq!(codes(&voucher), vec![ErrorCode::MissingAmount]);
    }

    #[test]
    fn test_code_shapes() {
        let mut bad_sub = VoucherDetail::new(6602, dec!(1));
        bad_sub.sub_title = Some(100);
        let voucher = Voucher::new(None)
            .with_detail(VoucherDetail::new(999, dec!(-1)).with_currency(" "))
            .with_detail(bad_sub);
        assert_eq!(
            codes(&voucher),
            vec![
                ErrorCode::InvalidTitle,
                ErrorCode::EmptyCurrency,
                ErrorCode::InvalidSubTitle,
                ErrorCode::VoucherUnbalanced,
                ErrorCode::VoucherUnbalanced,
            ]
        );
    }

    #[test]
    fn test_no_details() {
        assert_eq!(codes(&Voucher::new(None)), vec![ErrorCode::NoDetails]);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ErrorCode::VoucherUnbalanced.to_string(), "E3001");
        let err = ValidationError::new(ErrorCode::NoDetails, "empty", &Voucher::new(None));
        assert_eq!(err.to_string(), "[E3003] empty");
    }
}
