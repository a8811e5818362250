//! Command-line tools for rustacct ledgers.
//!
//! - `rustacct-check`: Check every voucher of a ledger file
//! - `rustacct-report`: Run a subtotal report over a ledger file
//!
//! # Example Usage
//!
//! ```bash
//! rustacct-check ledger.json
//! rustacct-report -c options.json -l ledger.json -t meals --by month,content
//! rustacct-report -c options.json -l ledger.json -t assets --by currency --consolidate
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cmd;
