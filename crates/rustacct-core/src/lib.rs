//! Core types for rustacct
//!
//! This crate provides the fundamental types shared by the rest of the workspace:
//!
//! - [`Voucher`] - A double-entry record made of balanced details
//! - [`VoucherDetail`] - One line of a voucher (account code, content, amount, ...)
//! - [`VoucherKind`] - The type tag of a voucher
//! - [`DateFilter`] - An inclusive date range that may also admit undated vouchers
//! - [`LedgerStore`] - The storage collaborator the query engine scans
//! - [`ExchangeRates`] / [`PriceTable`] - Historical exchange-rate lookup
//!
//! # Example
//!
//! ```
//! use rustacct_core::{Voucher, VoucherDetail, NaiveDate};
//! use rust_decimal_macros::dec;
//!
//! let voucher = Voucher::new(NaiveDate::from_ymd_opt(2024, 1, 1))
//!     .with_detail(VoucherDetail::new(1001, dec!(-100)))
//!     .with_detail(
//!         VoucherDetail::new(6602, dec!(100))
//!             .with_sub_title(3)
//!             .with_content("lunch"),
//!     );
//!
//! assert_eq!(voucher.details.len(), 2);
//! assert_eq!(voucher.balance_of("CNY"), Some(dec!(0)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod date_filter;
pub mod rates;
pub mod store;
pub mod voucher;

pub use date_filter::DateFilter;
pub use rates::{ExchangeRates, PriceEntry, PriceTable, RateError};
pub use store::{LedgerStore, StoreError, VoucherStream};
pub use voucher::{Voucher, VoucherDetail, VoucherKind, BASE_CURRENCY};

// Re-export commonly used external types
pub use chrono::NaiveDate;
pub use rust_decimal::Decimal;
