//! Historical exchange rates.
//!
//! [`ExchangeRates`] is the collaborator consolidation asks for rates.
//! [`PriceTable`] is an in-memory implementation that keeps, per currency,
//! a date-sorted list of quotes and answers with the latest quote on or
//! before the requested date.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Error returned when a rate cannot be produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateError {
    /// No quote on or before `date` links the two currencies.
    #[error("no rate from {from} to {to} on or before {date}")]
    MissingRate {
        /// Source currency
        from: String,
        /// Target currency
        to: String,
        /// Requested date
        date: NaiveDate,
    },
    /// The rate source failed.
    #[error("rate source unavailable: {0}")]
    Unavailable(String),
}

/// Source of historical exchange rates.
pub trait ExchangeRates: Send + Sync {
    /// Price of one unit of `from` expressed in `to`, as of `date`.
    ///
    /// Must fail rather than guess when no rate is known.
    fn rate(&self, date: NaiveDate, from: &str, to: &str) -> Result<Decimal, RateError>;
}

/// A single quote: one `currency` is worth `price` units of `quote` on `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEntry {
    /// Date of the quote
    pub date: NaiveDate,
    /// Quoted currency
    pub currency: String,
    /// Price of one unit
    pub price: Decimal,
    /// Currency the price is expressed in
    pub quote: String,
}

/// Quote table keyed by quoted currency.
#[derive(Debug, Default, Clone)]
pub struct PriceTable {
    /// Each quoted currency maps to its quotes sorted by date.
    prices: HashMap<String, Vec<PriceEntry>>,
}

impl PriceTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    /// Build a table from a list of quotes.
    pub fn from_entries(entries: impl IntoIterator<Item = PriceEntry>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.prices.entry(entry.currency.clone()).or_default().push(entry);
        }
        for entries in table.prices.values_mut() {
            entries.sort_by_key(|e| e.date);
        }
        table
    }

    /// Add a quote, keeping the per-currency list sorted.
    pub fn add(&mut self, entry: PriceEntry) {
        let list = self.prices.entry(entry.currency.clone()).or_default();
        let pos = list.partition_point(|e| e.date <= entry.date);
        list.insert(pos, entry);
    }

    /// Price of `base` in `quote` on or before `date`.
    ///
    /// Tries direct lookup, inverse lookup, then one intermediate currency.
    pub fn get_price(&self, base: &str, quote: &str, date: NaiveDate) -> Option<Decimal> {
        if base == quote {
            return Some(Decimal::ONE);
        }

        if let Some(price) = self.get_direct_price(base, quote, date) {
            return Some(price);
        }

        if let Some(price) = self.get_direct_price(quote, base, date) {
            if !price.is_zero() {
                return Some(Decimal::ONE / price);
            }
        }

        self.get_chained_price(base, quote, date)
    }

    fn get_direct_price(&self, base: &str, quote: &str, date: NaiveDate) -> Option<Decimal> {
        self.prices.get(base).and_then(|entries| {
            entries
                .iter()
                .rev()
                .find(|e| e.date <= date && e.quote == quote)
                .map(|e| e.price)
        })
    }

    /// A->C through some B, where A->B and B->C (or C->B) are known.
    fn get_chained_price(&self, base: &str, quote: &str, date: NaiveDate) -> Option<Decimal> {
        let intermediates: Vec<&str> = self.prices.get(base).map_or_else(Vec::new, |entries| {
            entries
                .iter()
                .filter(|e| e.date <= date)
                .map(|e| e.quote.as_str())
                .collect()
        });

        for intermediate in intermediates {
            if intermediate == quote {
                continue;
            }
            let Some(first) = self.get_direct_price(base, intermediate, date) else {
                continue;
            };
            if let Some(second) = self.get_direct_price(intermediate, quote, date) {
                return Some(first * second);
            }
            if let Some(second) = self.get_direct_price(quote, intermediate, date) {
                if !second.is_zero() {
                    return Some(first / second);
                }
            }
        }

        // Currencies quoted in `base` give the inverse first leg.
        for (currency, entries) in &self.prices {
            let Some(entry) = entries
                .iter()
                .rev()
                .find(|e| e.date <= date && e.quote == base && !e.price.is_zero())
            else {
                continue;
            };
            let first = Decimal::ONE / entry.price;
            if let Some(second) = self.get_direct_price(currency, quote, date) {
                return Some(first * second);
            }
            if let Some(second) = self.get_direct_price(quote, currency, date) {
                if !second.is_zero() {
                    return Some(first / second);
                }
            }
        }

        None
    }

    /// Number of quotes.
    pub fn len(&self) -> usize {
        self.prices.values().map(Vec::len).sum()
    }

    /// Whether the table holds no quotes.
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl ExchangeRates for PriceTable {
    fn rate(&self, date: NaiveDate, from: &str, to: &str) -> Result<Decimal, RateError> {
        self.get_price(from, to, date)
            .ok_or_else(|| RateError::MissingRate {
                from: from.to_string(),
                to: to.to_string(),
                date,
            })
    }
}
