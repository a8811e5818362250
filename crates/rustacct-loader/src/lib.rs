//! Options and ledger loading.
//!
//! A rustacct setup is two JSON files: an options file holding the base and
//! reporting currencies, the named query templates and the price history,
//! and a ledger file holding an array of vouchers.
//!
//! # Example
//!
//! ```ignore
//! use rustacct_loader::load;
//! use std::path::Path;
//!
//! let loaded = load(Path::new("options.json"), Path::new("ledger.json"))?;
//! let query = loaded.templates.resolve("meals", Decimal::ONE, None)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod options;

pub use options::Options;

use rustacct_core::{PriceTable, Voucher};
use rustacct_query::{QueryError, TemplateTable};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during loading.
#[derive(Debug, Error)]
pub enum LoadError {
    /// IO error reading a file.
    #[error("failed to read file {path}: {source}")]
    Io {
        /// The path that failed to read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for what it should hold.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// The file that failed to parse.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The configured templates do not form a valid table.
    #[error("invalid templates in {path}: {source}")]
    Templates {
        /// The options file.
        path: PathBuf,
        /// The underlying query error.
        #[source]
        source: QueryError,
    },
}

/// Everything needed to run reports.
#[derive(Debug)]
pub struct LoadResult {
    /// Parsed options.
    pub options: Options,
    /// Compiled templates.
    pub templates: TemplateTable,
    /// Price history.
    pub rates: PriceTable,
    /// Ledger contents, in file order.
    pub vouchers: Vec<Voucher>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Load an options file.
pub fn load_options(path: &Path) -> Result<Options, LoadError> {
    let options: Options = read_json(path)?;
    tracing::debug!(
        path = %path.display(),
        templates = options.templates.len(),
        prices = options.prices.len(),
        "loaded options"
    );
    Ok(options)
}

/// Load a ledger file: a JSON array of vouchers.
pub fn load_ledger(path: &Path) -> Result<Vec<Voucher>, LoadError> {
    let vouchers: Vec<Voucher> = read_json(path)?;
    tracing::debug!(path = %path.display(), vouchers = vouchers.len(), "loaded ledger");
    Ok(vouchers)
}

/// Load options and ledger, compiling templates and indexing prices.
pub fn load(options_path: &Path, ledger_path: &Path) -> Result<LoadResult, LoadError> {
    let options = load_options(options_path)?;
    let templates = options
        .template_table()
        .map_err(|source| LoadError::Templates {
            path: options_path.to_path_buf(),
            source,
        })?;
    let rates = options.price_table();
    let vouchers = load_ledger(ledger_path)?;
    Ok(LoadResult {
        options,
        templates,
        rates,
        vouchers,
    })
}
