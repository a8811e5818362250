//! Ledger options.

use rustacct_core::{PriceEntry, PriceTable, BASE_CURRENCY};
use rustacct_query::{QueryError, TemplateSpec, TemplateTable};
use serde::{Deserialize, Serialize};

fn default_base_currency() -> String {
    BASE_CURRENCY.to_string()
}

/// Options file contents.
///
/// Every field has a default, so an empty object is a valid options file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Currency amounts default to.
    pub base_currency: String,

    /// Currency reports are consolidated into; the base currency if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporting_currency: Option<String>,

    /// Named query templates.
    pub templates: Vec<TemplateSpec>,

    /// Historical exchange rates.
    pub prices: Vec<PriceEntry>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            base_currency: default_base_currency(),
            reporting_currency: None,
            templates: Vec::new(),
            prices: Vec::new(),
        }
    }
}

impl Options {
    /// Create default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The currency reports are consolidated into.
    #[must_use]
    pub fn reporting_currency(&self) -> &str {
        self.reporting_currency
            .as_deref()
            .unwrap_or(&self.base_currency)
    }

    /// Compile the configured templates.
    pub fn template_table(&self) -> Result<TemplateTable, QueryError> {
        TemplateTable::from_specs(&self.templates)
    }

    /// Index the configured prices.
    #[must_use]
    pub fn price_table(&self) -> PriceTable {
        PriceTable::from_entries(self.prices.iter().cloned())
    }
}
