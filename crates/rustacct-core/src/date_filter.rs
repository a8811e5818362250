//! Inclusive date ranges used by filters and store scans.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An inclusive date range.
///
/// Missing bounds are open. Undated vouchers ("always") only match when the
/// range says so explicitly, via `nullable` (dated and undated) or
/// `null_only` (undated only).
///
/// # Examples
///
/// ```
/// use rustacct_core::{DateFilter, NaiveDate};
///
/// let jan = DateFilter::between(
///     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
///     NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
/// );
/// assert!(jan.contains(NaiveDate::from_ymd_opt(2024, 1, 15)));
/// assert!(!jan.contains(NaiveDate::from_ymd_opt(2024, 2, 1)));
/// assert!(!jan.contains(None));
/// assert!(DateFilter::null_only().contains(None));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DateFilter {
    /// First admitted date
    #[serde(default)]
    pub start: Option<NaiveDate>,
    /// Last admitted date
    #[serde(default)]
    pub end: Option<NaiveDate>,
    /// Also admit undated vouchers
    #[serde(default)]
    pub nullable: bool,
    /// Admit undated vouchers only
    #[serde(default)]
    pub null_only: bool,
}

impl DateFilter {
    /// A range without bounds that admits every voucher, dated or not.
    #[must_use]
    pub const fn unconstrained() -> Self {
        Self {
            start: None,
            end: None,
            nullable: true,
            null_only: false,
        }
    }

    /// A range admitting only undated vouchers.
    #[must_use]
    pub const fn null_only() -> Self {
        Self {
            start: None,
            end: None,
            nullable: true,
            null_only: true,
        }
    }

    /// `[start, end]`, both inclusive.
    #[must_use]
    pub const fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            nullable: false,
            null_only: false,
        }
    }

    /// Every date on or after `start`.
    #[must_use]
    pub const fn since(start: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: None,
            nullable: false,
            null_only: false,
        }
    }

    /// Every date on or before `end`.
    #[must_use]
    pub const fn until(end: NaiveDate) -> Self {
        Self {
            start: None,
            end: Some(end),
            nullable: false,
            null_only: false,
        }
    }

    /// Also admit undated vouchers.
    #[must_use]
    pub const fn with_nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Whether this range admits every voucher.
    #[must_use]
    pub const fn is_unconstrained(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.nullable && !self.null_only
    }

    /// Whether a voucher dated `date` falls in this range.
    #[must_use]
    pub fn contains(&self, date: Option<NaiveDate>) -> bool {
        match date {
            None => self.nullable || self.null_only,
            Some(_) if self.null_only => false,
            Some(d) => {
                self.start.map_or(true, |s| d >= s) && self.end.map_or(true, |e| d <= e)
            }
        }
    }

    /// Smallest range admitting everything either side admits.
    #[must_use]
    pub fn hull(&self, other: &Self) -> Self {
        // An undated-only side contributes no dated bounds.
        if self.null_only {
            return Self {
                nullable: true,
                ..*other
            };
        }
        if other.null_only {
            return Self {
                nullable: true,
                ..*self
            };
        }
        Self {
            start: self.start.zip(other.start).map(|(a, b)| a.min(b)),
            end: self.end.zip(other.end).map(|(a, b)| a.max(b)),
            nullable: self.nullable || other.nullable,
            null_only: false,
        }
    }

    /// Largest range admitted by both sides.
    ///
    /// The result may be empty (start after end); [`Self::is_empty`] tells.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let start = match (self.start, other.start) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let nullable = self.contains(None) && other.contains(None);
        let null_only = self.null_only || other.null_only;
        if null_only && !nullable {
            return Self::empty();
        }
        Self {
            start,
            end,
            nullable,
            null_only,
        }
    }

    /// A range admitting nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            start: Some(NaiveDate::MAX),
            end: Some(NaiveDate::MIN),
            nullable: false,
            null_only: false,
        }
    }

    /// Whether no voucher can fall in this range.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        if self.null_only {
            return false;
        }
        let dated_empty = matches!((self.start, self.end), (Some(s), Some(e)) if s > e);
        dated_empty && !self.nullable
    }
}
