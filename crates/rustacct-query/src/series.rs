//! Calendar periods and the every-day running balance.

use chrono::{Datelike, Days, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Calendar granularity of a date grouping level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One calendar day
    Day,
    /// ISO week, Monday to Sunday
    Week,
    /// Calendar month
    Month,
    /// Calendar year
    Year,
}

impl Granularity {
    /// First day of the period containing `date`. Used as the bucket key.
    #[must_use]
    pub fn start_of(self, date: NaiveDate) -> NaiveDate {
        let back = match self {
            Self::Day => 0,
            Self::Week => date.weekday().num_days_from_monday(),
            Self::Month => date.day0(),
            Self::Year => date.ordinal0(),
        };
        date.checked_sub_days(Days::new(u64::from(back)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Last day of the period containing `date`.
    #[must_use]
    pub fn end_of(self, date: NaiveDate) -> NaiveDate {
        let start = self.start_of(date);
        let next = match self {
            Self::Day => start.checked_add_days(Days::new(1)),
            Self::Week => start.checked_add_days(Days::new(7)),
            Self::Month => start.checked_add_months(Months::new(1)),
            Self::Year => start.checked_add_months(Months::new(12)),
        };
        next.and_then(|d| d.pred_opt()).unwrap_or(NaiveDate::MAX)
    }
}

/// One day of a running balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayPoint {
    /// Day
    pub date: NaiveDate,
    /// Total up to and including `date`
    pub cumulative: Decimal,
}

/// A gap-filled running balance over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySeries {
    /// Everything dated before the range, plus undated amounts
    pub carry_in: Decimal,
    /// One point per day of the range
    pub points: Vec<DayPoint>,
}

/// Per-day amounts collected for a running balance over `[start, end]`.
///
/// Amounts dated before `start` and undated amounts are folded into the
/// carry-in; amounts dated after `end` are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyDeltas {
    start: NaiveDate,
    end: NaiveDate,
    carry_in: Decimal,
    deltas: BTreeMap<NaiveDate, Decimal>,
}

impl DailyDeltas {
    /// An empty collection over `[start, end]`.
    #[must_use]
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            carry_in: Decimal::ZERO,
            deltas: BTreeMap::new(),
        }
    }

    /// Record `amount` for a voucher dated `date`.
    pub fn add(&mut self, date: Option<NaiveDate>, amount: Decimal) {
        match date {
            Some(d) if d > self.end => {}
            Some(d) if d >= self.start => *self.deltas.entry(d).or_default() += amount,
            _ => self.carry_in += amount,
        }
    }

    /// Amount carried into the first day.
    #[must_use]
    pub const fn carry_in(&self) -> Decimal {
        self.carry_in
    }

    /// Cumulative value on the last day.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.carry_in + self.deltas.values().copied().sum::<Decimal>()
    }

    /// Walk the range one day at a time. Each call starts over.
    #[must_use]
    pub fn iter(&self) -> RunningBalance<'_> {
        RunningBalance {
            deltas: &self.deltas,
            next: Some(self.start).filter(|s| *s <= self.end),
            end: self.end,
            running: self.carry_in,
        }
    }

    /// Materialize the running balance.
    #[must_use]
    pub fn to_series(&self) -> DaySeries {
        DaySeries {
            carry_in: self.carry_in,
            points: self.iter().collect(),
        }
    }
}

/// Lazy day-by-day running balance, see [`DailyDeltas::iter`].
#[derive(Debug, Clone)]
pub struct RunningBalance<'a> {
    deltas: &'a BTreeMap<NaiveDate, Decimal>,
    next: Option<NaiveDate>,
    end: NaiveDate,
    running: Decimal,
}

impl Iterator for RunningBalance<'_> {
    type Item = DayPoint;

    fn next(&mut self) -> Option<DayPoint> {
        let date = self.next?;
        if let Some(delta) = self.deltas.get(&date) {
            self.running += *delta;
        }
        self.next = date.succ_opt().filter(|d| *d <= self.end);
        Some(DayPoint {
            date,
            cumulative: self.running,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.next.map_or(0, |d| {
            usize::try_from((self.end - d).num_days() + 1).unwrap_or(usize::MAX)
        });
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RunningBalance<'_> {}
