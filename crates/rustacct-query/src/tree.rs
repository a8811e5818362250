//! Filter trees: the query algebra.
//!
//! A [`FilterTree`] is a closed set of combinators over [`Atom`]s. Trees are
//! plain values: built once per query, compared structurally, never mutated.
//!
//! Evaluation always receives the enclosing voucher along with the detail,
//! since [`FilterTree::ForAll`] quantifies over the whole voucher.

use rustacct_core::{DateFilter, Voucher, VoucherDetail};

use crate::error::QueryError;
use crate::filter::{DetailFilter, VoucherFilter};

/// Detail, voucher and date criteria evaluated together.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Atom {
    /// Criteria on the detail
    pub detail: DetailFilter,
    /// Criteria on the enclosing voucher
    pub voucher: VoucherFilter,
    /// Date range of the enclosing voucher; `None` applies no date check
    pub range: Option<DateFilter>,
}

impl Atom {
    /// An atom with only detail criteria.
    #[must_use]
    pub fn new(detail: DetailFilter) -> Self {
        Self {
            detail,
            ..Self::default()
        }
    }

    /// Restrict the voucher date.
    #[must_use]
    pub const fn with_range(mut self, range: DateFilter) -> Self {
        self.range = Some(range);
        self
    }

    /// Restrict the voucher.
    #[must_use]
    pub fn with_voucher(mut self, voucher: VoucherFilter) -> Self {
        self.voucher = voucher;
        self
    }

    /// Whether the voucher-level parts (date and voucher criteria) hold.
    #[must_use]
    pub fn admits_voucher(&self, voucher: &Voucher) -> bool {
        self.range.map_or(true, |r| r.contains(voucher.date)) && self.voucher.matches(voucher)
    }

    /// Whether `detail` within `voucher` satisfies this atom.
    #[must_use]
    pub fn matches(&self, detail: &VoucherDetail, voucher: &Voucher) -> bool {
        self.detail.matches(detail) && self.admits_voucher(voucher)
    }
}

/// A compiled boolean expression over details and their vouchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterTree {
    /// Leaf criteria.
    Atom(Atom),
    /// True if any child is true.
    Union(Vec<FilterTree>),
    /// True if every child is true.
    Intersect(Vec<FilterTree>),
    /// True if the left side is true and the right side false.
    Subtract(Box<FilterTree>, Box<FilterTree>),
    /// True if the child is false.
    Complement(Box<FilterTree>),
    /// True if every detail of the voucher that matches `domain` (all of
    /// them when `domain` is `None`) also matches `predicate`.
    ForAll {
        /// Details the quantifier ranges over
        domain: Option<Box<FilterTree>>,
        /// Assertion every detail in the domain must satisfy
        predicate: Box<FilterTree>,
    },
}

impl FilterTree {
    /// A tree that matches every detail of every voucher.
    #[must_use]
    pub fn all() -> Self {
        Self::Atom(Atom::default())
    }

    /// A leaf on detail criteria only.
    #[must_use]
    pub fn detail(filter: DetailFilter) -> Self {
        Self::Atom(Atom::new(filter))
    }

    /// A leaf matching every detail of vouchers in `range`.
    #[must_use]
    pub fn range(range: DateFilter) -> Self {
        Self::Atom(Atom::default().with_range(range))
    }

    /// Disjunction. Needs at least one child.
    pub fn union(children: Vec<Self>) -> Result<Self, QueryError> {
        if children.is_empty() {
            return Err(QueryError::Arity {
                node: "union",
                expected: "at least 1",
                found: 0,
            });
        }
        Ok(Self::Union(children))
    }

    /// Conjunction. Needs at least one child.
    pub fn intersect(children: Vec<Self>) -> Result<Self, QueryError> {
        if children.is_empty() {
            return Err(QueryError::Arity {
                node: "intersect",
                expected: "at least 1",
                found: 0,
            });
        }
        Ok(Self::Intersect(children))
    }

    /// `left` and not `right`.
    #[must_use]
    pub fn subtract(left: Self, right: Self) -> Self {
        Self::Subtract(Box::new(left), Box::new(right))
    }

    /// Negation.
    #[must_use]
    pub fn complement(child: Self) -> Self {
        Self::Complement(Box::new(child))
    }

    /// Every detail of the voucher satisfies `predicate`.
    #[must_use]
    pub fn for_all(predicate: Self) -> Self {
        Self::ForAll {
            domain: None,
            predicate: Box::new(predicate),
        }
    }

    /// Every detail of the voucher matching `domain` satisfies `predicate`.
    #[must_use]
    pub fn for_all_in(domain: Self, predicate: Self) -> Self {
        Self::ForAll {
            domain: Some(Box::new(domain)),
            predicate: Box::new(predicate),
        }
    }

    /// Whether `detail`, within `voucher`, matches this tree.
    #[must_use]
    pub fn evaluate(&self, detail: &VoucherDetail, voucher: &Voucher) -> bool {
        match self {
            Self::Atom(atom) => atom.matches(detail, voucher),
            Self::Union(children) => children.iter().any(|c| c.evaluate(detail, voucher)),
            Self::Intersect(children) => children.iter().all(|c| c.evaluate(detail, voucher)),
            Self::Subtract(left, right) => {
                left.evaluate(detail, voucher) && !right.evaluate(detail, voucher)
            }
            Self::Complement(child) => !child.evaluate(detail, voucher),
            Self::ForAll { domain, predicate } => voucher
                .details
                .iter()
                .filter(|d| domain.as_ref().map_or(true, |dom| dom.evaluate(d, voucher)))
                .all(|d| predicate.evaluate(d, voucher)),
        }
    }

    /// Cheap test of whether any detail of `voucher` could match.
    ///
    /// Never false for a voucher that has a matching detail; may be true for
    /// a voucher that has none.
    #[must_use]
    pub fn transaction_admissible(&self, voucher: &Voucher) -> bool {
        match self {
            Self::Atom(atom) => {
                atom.admits_voucher(voucher) && voucher.details.iter().any(|d| atom.detail.matches(d))
            }
            Self::Union(children) => children.iter().any(|c| c.transaction_admissible(voucher)),
            Self::Intersect(children) => children.iter().all(|c| c.transaction_admissible(voucher)),
            Self::Subtract(left, _) => left.transaction_admissible(voucher),
            Self::Complement(_) | Self::ForAll { .. } => true,
        }
    }

    /// Details of `voucher` matching this tree, with their positions.
    pub fn matching_details<'v>(
        &'v self,
        voucher: &'v Voucher,
    ) -> impl Iterator<Item = (usize, &'v VoucherDetail)> + 'v {
        voucher
            .details
            .iter()
            .enumerate()
            .filter(move |(_, d)| self.evaluate(d, voucher))
    }

    /// Date range outside of which no voucher can match.
    ///
    /// Used as a scan hint for the ledger store.
    #[must_use]
    pub fn date_hint(&self) -> DateFilter {
        match self {
            Self::Atom(atom) => atom.range.unwrap_or_else(DateFilter::unconstrained),
            Self::Union(children) => children
                .iter()
                .map(Self::date_hint)
                .reduce(|a, b| a.hull(&b))
                .unwrap_or_else(DateFilter::empty),
            Self::Intersect(children) => children
                .iter()
                .map(Self::date_hint)
                .fold(DateFilter::unconstrained(), |a, b| a.intersect(&b)),
            Self::Subtract(left, _) => left.date_hint(),
            Self::Complement(_) | Self::ForAll { .. } => DateFilter::unconstrained(),
        }
    }
}

/// Whether `detail`, within `voucher`, matches `tree`.
#[must_use]
pub fn evaluate(detail: &VoucherDetail, voucher: &Voucher, tree: &FilterTree) -> bool {
    tree.evaluate(detail, voucher)
}

/// Whether `voucher` is worth scanning for `tree`.
#[must_use]
pub fn transaction_admissible(voucher: &Voucher, tree: &FilterTree) -> bool {
    tree.transaction_admissible(voucher)
}
