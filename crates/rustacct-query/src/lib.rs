//! Query engine for rustacct ledgers.
//!
//! This crate turns query expressions into filter trees, resolves named query
//! templates, and groups matched voucher details into subtotal trees.
//!
//! # Overview
//!
//! - [`compile`] turns a [`QueryExpr`] (usually deserialized from JSON) into a
//!   [`FilterTree`]
//! - [`TemplateTable::resolve`] flattens a named template into weighted leaves
//! - [`group`] / [`run`] aggregate a voucher stream into a [`SubtotalResult`]
//! - [`consolidate()`] converts a currency-grouped result into one currency
//! - [`format_text`] / [`to_json`] render the result
//!
//! # Aggregation modes
//!
//! - `Sum` - Sum of matched amounts, scaled by coefficient
//! - `Count` - Number of matched details, scaled by coefficient
//! - `NonZero` - `Sum`, dropping buckets that net to zero
//! - `EveryDay` - Running balance with one point per day of the report range
//!
//! # Example
//!
//! ```
//! use rustacct_core::{NaiveDate, StoreError, Voucher, VoucherDetail};
//! use rustacct_query::{group, GroupBy, QueryExpr, ResolvedQuery, SubtotalSpec, BucketKey, compile};
//! use rust_decimal_macros::dec;
//!
//! let ledger = vec![Voucher::new(NaiveDate::from_ymd_opt(2024, 1, 1))
//!     .with_detail(VoucherDetail::new(1001, dec!(-100)))
//!     .with_detail(VoucherDetail::new(6602, dec!(100)).with_content("lunch"))];
//!
//! let query = ResolvedQuery::from_tree(compile(&QueryExpr::title(6602)).unwrap());
//! let spec = SubtotalSpec::new(vec![GroupBy::Content]);
//! let result = group(ledger.into_iter().map(Ok::<_, StoreError>), &query, &spec).unwrap();
//!
//! let lunch = result.root.child(&BucketKey::Content(Some("lunch".into()))).unwrap();
//! assert_eq!(lunch.aggregate, dec!(100));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ast;
pub mod consolidate;
pub mod error;
pub mod filter;
pub mod format;
pub mod named;
pub mod series;
pub mod subtotal;
pub mod tree;

pub use ast::{compile, AtomExpr, QueryExpr, TextExpr};
pub use consolidate::{consolidate, Consolidated, Unconverted};
pub use error::{ErrorKind, QueryError};
pub use filter::{DetailFilter, Direction, Pattern, SubTitleFilter, TextFilter, VoucherFilter};
pub use format::{format_consolidated, format_text, to_json, to_json_string};
pub use named::{
    NamedTemplate, ResolvedLeaf, ResolvedQuery, TemplateItem, TemplateItemSpec, TemplateRegistry,
    TemplateSpec, TemplateTable,
};
pub use series::{DailyDeltas, DayPoint, DaySeries, Granularity};
pub use subtotal::{
    group, run, Aggregation, BucketKey, BucketOrder, EntryRef, GroupBy, SubtotalNode,
    SubtotalResult, SubtotalSpec,
};
pub use tree::{evaluate, transaction_admissible, Atom, FilterTree};
