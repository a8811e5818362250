//! Atomic match criteria.
//!
//! A [`DetailFilter`] constrains the attributes of one voucher detail and a
//! [`VoucherFilter`] constrains the voucher around it. Every field left at its
//! default matches anything.

use regex::Regex;
use rust_decimal::Decimal;
use rustacct_core::{Voucher, VoucherDetail, VoucherKind};
use std::fmt;

use crate::error::QueryError;

/// Sign constraint on a detail's amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Either sign, zero and null included.
    #[default]
    Either,
    /// Strictly positive amounts only.
    Positive,
    /// Strictly negative amounts only.
    Negative,
}

impl Direction {
    /// Whether `fund` satisfies this constraint.
    ///
    /// Zero and null amounts never satisfy a directional constraint.
    #[must_use]
    pub fn admits(self, fund: Option<Decimal>) -> bool {
        match (self, fund) {
            (Self::Either, _) => true,
            (Self::Positive, Some(f)) => f > Decimal::ZERO,
            (Self::Negative, Some(f)) => f < Decimal::ZERO,
            (_, None) => false,
        }
    }
}

/// Constraint on the sub-account code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubTitleFilter {
    /// Any sub-code, including none.
    #[default]
    Any,
    /// Only details without a sub-code.
    None,
    /// Only this sub-code.
    Is(u8),
}

impl SubTitleFilter {
    /// Whether `sub_title` satisfies this constraint.
    #[must_use]
    pub fn admits(self, sub_title: Option<u8>) -> bool {
        match self {
            Self::Any => true,
            Self::None => sub_title.is_none(),
            Self::Is(n) => sub_title == Some(n),
        }
    }
}

/// A compiled regular expression that compares by its source text.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a regular expression. Matches anywhere in the text.
    pub fn regex(source: impl Into<String>) -> Result<Self, QueryError> {
        let source = source.into();
        let regex = Regex::new(&source).map_err(|e| QueryError::Pattern {
            pattern: source.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { source, regex })
    }

    /// Compile a wildcard pattern where `%` stands for any run of characters.
    ///
    /// The pattern must cover the whole text.
    pub fn wildcard(source: impl Into<String>) -> Result<Self, QueryError> {
        let source = source.into();
        let body = source
            .split('%')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("(?s)^{body}$")).map_err(|e| QueryError::Pattern {
            pattern: source.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { source, regex })
    }

    /// The text this pattern was built from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether `text` matches.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

/// Constraint on a free-text field (content or remark).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TextFilter {
    /// Anything, including no text.
    #[default]
    Any,
    /// No text, or the empty string.
    Absent,
    /// Exactly this text.
    Exact(String),
    /// `%` wildcard pattern over the whole text.
    Wildcard(Pattern),
    /// Regular expression, unanchored.
    Regex(Pattern),
}

impl TextFilter {
    /// Whether `value` satisfies this constraint.
    #[must_use]
    pub fn admits(&self, value: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Absent => value.map_or(true, str::is_empty),
            Self::Exact(s) => value == Some(s.as_str()),
            Self::Wildcard(p) | Self::Regex(p) => value.is_some_and(|v| p.is_match(v)),
        }
    }
}

/// Match criteria for a single voucher detail.
///
/// # Examples
///
/// ```
/// use rustacct_core::VoucherDetail;
/// use rustacct_query::{DetailFilter, Direction};
/// use rust_decimal_macros::dec;
///
/// let lunch = VoucherDetail::new(6602, dec!(100)).with_content("lunch");
///
/// assert!(DetailFilter::title(6602).matches(&lunch));
/// assert!(DetailFilter::title(6602).with_direction(Direction::Positive).matches(&lunch));
/// assert!(!DetailFilter::title(6602).with_direction(Direction::Negative).matches(&lunch));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetailFilter {
    /// Owner
    pub user: Option<String>,
    /// Currency code
    pub currency: Option<String>,
    /// Account code
    pub title: Option<u32>,
    /// Sub-account code
    pub sub_title: SubTitleFilter,
    /// Content
    pub content: TextFilter,
    /// Remark
    pub remark: TextFilter,
    /// Exact amount
    pub fund: Option<Decimal>,
    /// Amount sign
    pub direction: Direction,
}

impl DetailFilter {
    /// A filter that matches every detail.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// A filter on the account code.
    #[must_use]
    pub fn title(title: u32) -> Self {
        Self {
            title: Some(title),
            ..Self::default()
        }
    }

    /// Restrict the sub-account code.
    #[must_use]
    pub const fn with_sub_title(mut self, sub_title: SubTitleFilter) -> Self {
        self.sub_title = sub_title;
        self
    }

    /// Restrict the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Restrict the owner.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Restrict the content.
    #[must_use]
    pub fn with_content(mut self, content: TextFilter) -> Self {
        self.content = content;
        self
    }

    /// Restrict the remark.
    #[must_use]
    pub fn with_remark(mut self, remark: TextFilter) -> Self {
        self.remark = remark;
        self
    }

    /// Require an exact amount.
    #[must_use]
    pub const fn with_fund(mut self, fund: Decimal) -> Self {
        self.fund = Some(fund);
        self
    }

    /// Restrict the sign of the amount.
    #[must_use]
    pub const fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Whether `detail` satisfies every constraint.
    #[must_use]
    pub fn matches(&self, detail: &VoucherDetail) -> bool {
        if let Some(title) = self.title {
            if detail.title != title {
                return false;
            }
        }
        if !self.sub_title.admits(detail.sub_title) {
            return false;
        }
        if let Some(currency) = &self.currency {
            if &detail.currency != currency {
                return false;
            }
        }
        if let Some(user) = &self.user {
            if detail.user.as_ref() != Some(user) {
                return false;
            }
        }
        if let Some(fund) = self.fund {
            if detail.fund != Some(fund) {
                return false;
            }
        }
        self.direction.admits(detail.fund)
            && self.content.admits(detail.content.as_deref())
            && self.remark.admits(detail.remark.as_deref())
    }
}

/// Match criteria on the voucher enclosing a detail.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoucherFilter {
    /// Voucher kind
    pub kind: Option<VoucherKind>,
    /// Voucher remark
    pub remark: TextFilter,
}

impl VoucherFilter {
    /// Whether this filter places no constraint at all.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.kind.is_none() && self.remark == TextFilter::Any
    }

    /// Whether `voucher` satisfies every constraint.
    #[must_use]
    pub fn matches(&self, voucher: &Voucher) -> bool {
        self.kind.map_or(true, |k| voucher.kind == k) && self.remark.admits(voucher.remark.as_deref())
    }
}
