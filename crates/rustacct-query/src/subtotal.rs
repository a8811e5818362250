//! Grouping and subtotals.
//!
//! [`group`] walks a voucher stream once, evaluates every leaf of a
//! [`ResolvedQuery`] against every detail, and accumulates the scaled amounts
//! into a bucket tree shaped by [`SubtotalSpec::levels`]. Buckets keep the
//! order in which their keys were first seen unless sorting is requested.

use rust_decimal::Decimal;
use rustacct_core::{
    DateFilter, LedgerStore, NaiveDate, StoreError, Voucher, VoucherDetail, VoucherKind,
};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

use crate::error::QueryError;
use crate::named::ResolvedQuery;
use crate::series::{DailyDeltas, DaySeries, Granularity};

/// Scale at which a `NonZero` aggregate counts as zero.
const ZERO_SCALE: u32 = 8;

/// A grouping dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// Currency code
    Currency,
    /// Account code
    Title,
    /// Sub-account code
    SubTitle,
    /// Content text
    Content,
    /// Detail remark
    Remark,
    /// Owner
    User,
    /// Voucher kind
    Kind,
    /// Voucher date
    Day,
    /// ISO week of the voucher date, keyed by its Monday
    Week,
    /// Month of the voucher date, keyed by its first day
    Month,
    /// Year of the voucher date, keyed by January 1st
    Year,
}

impl GroupBy {
    /// Calendar granularity for date levels, `None` otherwise.
    #[must_use]
    pub const fn granularity(self) -> Option<Granularity> {
        match self {
            Self::Day => Some(Granularity::Day),
            Self::Week => Some(Granularity::Week),
            Self::Month => Some(Granularity::Month),
            Self::Year => Some(Granularity::Year),
            _ => None,
        }
    }

    fn key_of(self, detail: &VoucherDetail, voucher: &Voucher) -> BucketKey {
        match self {
            Self::Currency => BucketKey::Currency(detail.currency.clone()),
            Self::Title => BucketKey::Title(detail.title),
            Self::SubTitle => BucketKey::SubTitle(detail.sub_title),
            Self::Content => BucketKey::Content(detail.content.clone()),
            Self::Remark => BucketKey::Remark(detail.remark.clone()),
            Self::User => BucketKey::User(detail.user.clone()),
            Self::Kind => BucketKey::Kind(voucher.kind),
            Self::Day | Self::Week | Self::Month | Self::Year => {
                let granularity = self.granularity().unwrap_or(Granularity::Day);
                BucketKey::Date(voucher.date.map(|d| granularity.start_of(d)))
            }
        }
    }
}

/// How matched amounts are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Sum of scaled amounts.
    #[default]
    Sum,
    /// Number of matched entries, scaled by coefficient.
    Count,
    /// Sum, with zero buckets removed.
    NonZero,
    /// Running balance with one point per day of the range.
    EveryDay,
}

/// Ordering of sibling buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketOrder {
    /// The order keys were first encountered in the stream.
    #[default]
    FirstSeen,
    /// Ascending key order; undated and absent keys first.
    Sorted,
}

/// What to group and how to aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtotalSpec {
    /// Grouping levels, outermost first
    pub levels: Vec<GroupBy>,
    /// Aggregation mode
    pub aggregation: Aggregation,
    /// Report range; required with both bounds for `EveryDay`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<DateFilter>,
    /// Sibling order
    pub order: BucketOrder,
    /// Attach entry references to leaves
    pub itemize: bool,
}

impl SubtotalSpec {
    /// Sum over `levels`.
    #[must_use]
    pub fn new(levels: Vec<GroupBy>) -> Self {
        Self {
            levels,
            ..Self::default()
        }
    }

    /// Set the aggregation mode.
    #[must_use]
    pub const fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Restrict to `range`.
    #[must_use]
    pub const fn with_range(mut self, range: DateFilter) -> Self {
        self.range = Some(range);
        self
    }

    /// Sort siblings by key.
    #[must_use]
    pub const fn sorted(mut self) -> Self {
        self.order = BucketOrder::Sorted;
        self
    }

    /// Attach entry references to leaves.
    #[must_use]
    pub const fn itemized(mut self) -> Self {
        self.itemize = true;
        self
    }

    /// The inclusive day range of an `EveryDay` subtotal.
    fn every_day_bounds(&self) -> Result<(NaiveDate, NaiveDate), QueryError> {
        let range = self.range.ok_or_else(|| {
            QueryError::InvalidSubtotal("every-day aggregation needs a date range".to_string())
        })?;
        let (Some(start), Some(end)) = (range.start, range.end) else {
            return Err(QueryError::InvalidSubtotal(
                "every-day aggregation needs both a start and an end date".to_string(),
            ));
        };
        if start > end {
            return Err(QueryError::InvalidSubtotal(format!(
                "every-day range starts after it ends: {start} > {end}"
            )));
        }
        if let Some(level) = self.levels.iter().find(|l| l.granularity().is_some()) {
            return Err(QueryError::InvalidSubtotal(format!(
                "every-day aggregation cannot be grouped by {level:?}"
            )));
        }
        Ok((start, end))
    }

    /// Dates whose vouchers can contribute to this subtotal.
    ///
    /// This is the range handed to templates that inherit their caller's
    /// range. An `EveryDay` subtotal keeps everything up to its end, since
    /// earlier and undated vouchers feed the carry-in.
    #[must_use]
    pub fn contributing_range(&self) -> Option<DateFilter> {
        let range = self.range?;
        match self.aggregation {
            Aggregation::EveryDay => range.end.map(|e| DateFilter::until(e).with_nullable()),
            _ => Some(range),
        }
    }

    /// Date range outside of which no voucher contributes, given a query hint.
    #[must_use]
    pub fn scan_hint(&self, query_hint: DateFilter) -> DateFilter {
        match self.contributing_range() {
            Some(range) => query_hint.intersect(&range),
            None => query_hint,
        }
    }
}

/// Key of one bucket in the subtotal tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketKey {
    /// The root bucket
    Root,
    /// Currency code
    Currency(String),
    /// Account code
    Title(u32),
    /// Sub-account code
    SubTitle(Option<u8>),
    /// Content text
    Content(Option<String>),
    /// Detail remark
    Remark(Option<String>),
    /// Owner
    User(Option<String>),
    /// Voucher kind
    Kind(VoucherKind),
    /// First day of a calendar period, `None` for undated vouchers
    Date(Option<NaiveDate>),
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn text(f: &mut fmt::Formatter<'_>, value: Option<&String>) -> fmt::Result {
            match value {
                Some(s) => write!(f, "{s}"),
                None => write!(f, "[none]"),
            }
        }
        match self {
            Self::Root => write!(f, "TOTAL"),
            Self::Currency(c) => write!(f, "{c}"),
            Self::Title(t) => write!(f, "T{t:04}"),
            Self::SubTitle(Some(s)) => write!(f, "{s:02}"),
            Self::SubTitle(None) => write!(f, "[none]"),
            Self::Content(c) | Self::Remark(c) | Self::User(c) => text(f, c.as_ref()),
            Self::Kind(k) => write!(f, "{k}"),
            Self::Date(Some(d)) => write!(f, "{d}"),
            Self::Date(None) => write!(f, "[null]"),
        }
    }
}

impl Serialize for BucketKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Root => serializer.serialize_none(),
            Self::Currency(c) => serializer.serialize_str(c),
            Self::Title(t) => serializer.serialize_u32(*t),
            Self::SubTitle(s) => s.serialize(serializer),
            Self::Content(s) | Self::Remark(s) | Self::User(s) => s.serialize(serializer),
            Self::Kind(k) => k.serialize(serializer),
            Self::Date(d) => d.serialize(serializer),
        }
    }
}

/// Reference to one matched detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryRef {
    /// Id of the voucher
    pub voucher_id: Option<String>,
    /// Date of the voucher
    pub date: Option<NaiveDate>,
    /// Position of the detail within its voucher
    pub detail_index: usize,
    /// Coefficient the detail was counted with
    pub coefficient: Decimal,
}

/// One bucket of the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtotalNode {
    /// Bucket key
    pub key: BucketKey,
    /// Aggregated value
    pub aggregate: Decimal,
    /// Aggregate in the reporting currency, filled by consolidation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted: Option<Decimal>,
    /// Child buckets
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SubtotalNode>,
    /// Matched details, when itemized
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<EntryRef>,
    /// Running balance, for `EveryDay` leaves
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<DaySeries>,
}

impl SubtotalNode {
    /// Child with the given key.
    #[must_use]
    pub fn child(&self, key: &BucketKey) -> Option<&Self> {
        self.children.iter().find(|c| &c.key == key)
    }

    /// Descend through a sequence of keys.
    #[must_use]
    pub fn get(&self, path: &[BucketKey]) -> Option<&Self> {
        path.iter().try_fold(self, |node, key| node.child(key))
    }

    /// Whether this bucket has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Every leaf below (or at) this node, depth first.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Self> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_leaf() {
                out.push(node);
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }
}

/// A complete subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtotalResult {
    /// Grouping levels, outermost first
    pub levels: Vec<GroupBy>,
    /// Aggregation mode
    pub aggregation: Aggregation,
    /// Root bucket
    pub root: SubtotalNode,
}

/// Mutable bucket used while the stream is consumed.
struct Bucket {
    key: BucketKey,
    total: Decimal,
    days: Option<DailyDeltas>,
    entries: Vec<EntryRef>,
    children: Vec<Bucket>,
    index: HashMap<BucketKey, usize>,
}

impl Bucket {
    fn new(key: BucketKey, days: Option<&DailyDeltas>) -> Self {
        Self {
            key,
            total: Decimal::ZERO,
            days: days.cloned(),
            entries: Vec::new(),
            children: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn child_mut(&mut self, key: BucketKey, days: Option<&DailyDeltas>) -> &mut Self {
        let i = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                let i = self.children.len();
                self.index.insert(key.clone(), i);
                self.children.push(Self::new(key, days));
                i
            }
        };
        &mut self.children[i]
    }

    fn absorb(&mut self, date: Option<NaiveDate>, amount: Decimal) {
        match &mut self.days {
            Some(days) => days.add(date, amount),
            None => self.total += amount,
        }
    }

    fn finish(self, order: BucketOrder) -> SubtotalNode {
        let mut children: Vec<SubtotalNode> =
            self.children.into_iter().map(|c| c.finish(order)).collect();
        if order == BucketOrder::Sorted {
            children.sort_by(|a, b| a.key.cmp(&b.key));
        }
        let (aggregate, series) = match self.days {
            Some(days) => {
                let series = children.is_empty().then(|| days.to_series());
                (days.total(), series)
            }
            None => (self.total, None),
        };
        SubtotalNode {
            key: self.key,
            aggregate,
            converted: None,
            children,
            entries: self.entries,
            series,
        }
    }
}

fn prune_zero(node: &mut SubtotalNode) {
    node.children
        .retain(|c| !c.aggregate.round_dp(ZERO_SCALE).is_zero());
    for child in &mut node.children {
        prune_zero(child);
    }
}

/// Group and aggregate every detail of `vouchers` matched by `query`.
///
/// The stream is consumed forward only; the first store error aborts.
pub fn group<I>(
    vouchers: I,
    query: &ResolvedQuery,
    spec: &SubtotalSpec,
) -> Result<SubtotalResult, QueryError>
where
    I: IntoIterator<Item = Result<Voucher, StoreError>>,
{
    let template = match spec.aggregation {
        Aggregation::EveryDay => {
            let (start, end) = spec.every_day_bounds()?;
            Some(DailyDeltas::new(start, end))
        }
        _ => None,
    };
    let window = match spec.aggregation {
        Aggregation::EveryDay => None,
        _ => spec.range,
    };
    let upper = template.as_ref().and(spec.range.and_then(|r| r.end));

    let mut root = Bucket::new(BucketKey::Root, template.as_ref());
    let mut scanned = 0usize;
    let mut matched = 0usize;

    for voucher in vouchers {
        let voucher = voucher?;
        scanned += 1;
        if !window.map_or(true, |w| w.contains(voucher.date)) {
            continue;
        }
        if upper.is_some_and(|end| voucher.date.is_some_and(|d| d > end)) {
            continue;
        }
        for leaf in &query.leaves {
            if !leaf.admits(&voucher) {
                continue;
            }
            for (index, detail) in voucher.details.iter().enumerate() {
                if !leaf.matches(detail, &voucher) {
                    continue;
                }
                matched += 1;
                let amount = match spec.aggregation {
                    Aggregation::Count => leaf.coefficient,
                    _ => detail.fund_or_zero() * leaf.coefficient,
                };
                let mut node = &mut root;
                node.absorb(voucher.date, amount);
                for level in &spec.levels {
                    node = node.child_mut(level.key_of(detail, &voucher), template.as_ref());
                    node.absorb(voucher.date, amount);
                }
                if spec.itemize {
                    node.entries.push(EntryRef {
                        voucher_id: voucher.id.clone(),
                        date: voucher.date,
                        detail_index: index,
                        coefficient: leaf.coefficient,
                    });
                }
            }
        }
    }

    let mut root = root.finish(spec.order);
    if spec.aggregation == Aggregation::NonZero {
        prune_zero(&mut root);
    }
    tracing::debug!(
        scanned,
        matched,
        buckets = root.children.len(),
        "subtotal complete"
    );
    Ok(SubtotalResult {
        levels: spec.levels.clone(),
        aggregation: spec.aggregation,
        root,
    })
}

/// Scan `store` and group the result.
///
/// The store receives the query's date hint narrowed by the report range.
pub fn run(
    store: &dyn LedgerStore,
    query: &ResolvedQuery,
    spec: &SubtotalSpec,
) -> Result<SubtotalResult, QueryError> {
    if spec.aggregation == Aggregation::EveryDay {
        spec.every_day_bounds()?;
    }
    let hint = spec.scan_hint(query.date_hint());
    tracing::debug!(?hint, leaves = query.leaves.len(), "scanning ledger");
    let stream = store.scan(&hint)?;
    group(stream, query, spec)
}
