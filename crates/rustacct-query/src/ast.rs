//! Query abstract syntax.
//!
//! The grammar layer (outside this crate) delivers queries as [`QueryExpr`]
//! values, usually deserialized from JSON. [`compile`] turns them into
//! [`FilterTree`]s, checking operand counts and compiling text patterns.
//!
//! ```
//! use rustacct_query::{compile, QueryExpr};
//!
//! let expr: QueryExpr = serde_json::from_str(
//!     r#"{"op": "subtract", "operands": [
//!         {"op": "atom", "title": 6602},
//!         {"op": "atom", "content": {"like": "%taxi%"}}
//!     ]}"#,
//! ).unwrap();
//! let tree = compile(&expr).unwrap();
//! ```

use rust_decimal::Decimal;
use rustacct_core::{DateFilter, VoucherKind};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::filter::{DetailFilter, Direction, Pattern, SubTitleFilter, TextFilter, VoucherFilter};
use crate::tree::{Atom, FilterTree};

/// A query expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueryExpr {
    /// Leaf criteria.
    Atom(AtomExpr),
    /// Any operand (one or more).
    Union {
        /// Operands
        operands: Vec<QueryExpr>,
    },
    /// Every operand (one or more).
    Intersect {
        /// Operands
        operands: Vec<QueryExpr>,
    },
    /// First operand but not the second (exactly two).
    Subtract {
        /// Operands
        operands: Vec<QueryExpr>,
    },
    /// Not the operand (exactly one).
    Complement {
        /// Operands
        operands: Vec<QueryExpr>,
    },
    /// Every detail satisfies the predicate: `[predicate]` or `[domain, predicate]`.
    ForAll {
        /// Operands
        operands: Vec<QueryExpr>,
    },
}

/// Free-text criteria as written in a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextExpr {
    /// No text.
    Absent,
    /// Exact text.
    Exact(String),
    /// `%` wildcard pattern.
    Like(String),
    /// Regular expression.
    Regex(String),
}

/// Sub-account criteria as written in a query: a code, or `"none"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubTitleExpr {
    /// This code.
    Code(u8),
    /// A keyword.
    Keyword(SubTitleKeyword),
}

/// Keywords accepted for a sub-account criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTitleKeyword {
    /// Any sub-code.
    Any,
    /// No sub-code.
    None,
}

/// Sign criteria as written in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionExpr {
    /// Either sign.
    Either,
    /// Positive only.
    Positive,
    /// Negative only.
    Negative,
}

/// Leaf criteria as written in a query. Omitted fields match anything.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtomExpr {
    /// Owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Currency code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Account code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<u32>,
    /// Sub-account code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_title: Option<SubTitleExpr>,
    /// Content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<TextExpr>,
    /// Detail remark
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<TextExpr>,
    /// Exact amount
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fund: Option<Decimal>,
    /// Amount sign
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<DirectionExpr>,
    /// Voucher kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<VoucherKind>,
    /// Voucher remark
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher_remark: Option<TextExpr>,
    /// Voucher date range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<DateFilter>,
}

impl QueryExpr {
    /// Leaf on an account code.
    #[must_use]
    pub fn title(title: u32) -> Self {
        Self::Atom(AtomExpr {
            title: Some(title),
            ..AtomExpr::default()
        })
    }
}

fn compile_text(expr: Option<&TextExpr>) -> Result<TextFilter, QueryError> {
    Ok(match expr {
        None => TextFilter::Any,
        Some(TextExpr::Absent) => TextFilter::Absent,
        Some(TextExpr::Exact(s)) => TextFilter::Exact(s.clone()),
        Some(TextExpr::Like(s)) => TextFilter::Wildcard(Pattern::wildcard(s.as_str())?),
        Some(TextExpr::Regex(s)) => TextFilter::Regex(Pattern::regex(s.as_str())?),
    })
}

fn compile_atom(expr: &AtomExpr) -> Result<Atom, QueryError> {
    let sub_title = match expr.sub_title {
        None | Some(SubTitleExpr::Keyword(SubTitleKeyword::Any)) => SubTitleFilter::Any,
        Some(SubTitleExpr::Keyword(SubTitleKeyword::None)) => SubTitleFilter::None,
        Some(SubTitleExpr::Code(n)) => SubTitleFilter::Is(n),
    };
    let direction = match expr.direction {
        None | Some(DirectionExpr::Either) => Direction::Either,
        Some(DirectionExpr::Positive) => Direction::Positive,
        Some(DirectionExpr::Negative) => Direction::Negative,
    };
    let detail = DetailFilter {
        user: expr.user.clone(),
        currency: expr.currency.clone(),
        title: expr.title,
        sub_title,
        content: compile_text(expr.content.as_ref())?,
        remark: compile_text(expr.remark.as_ref())?,
        fund: expr.fund,
        direction,
    };
    let voucher = VoucherFilter {
        kind: expr.kind,
        remark: compile_text(expr.voucher_remark.as_ref())?,
    };
    Ok(Atom {
        detail,
        voucher,
        range: expr.range,
    })
}

fn exactly<const N: usize>(
    node: &'static str,
    expected: &'static str,
    operands: &[QueryExpr],
) -> Result<[FilterTree; N], QueryError> {
    let found = operands.len();
    let compiled = operands.iter().map(compile).collect::<Result<Vec<_>, _>>()?;
    compiled.try_into().map_err(|_| QueryError::Arity {
        node,
        expected,
        found,
    })
}

/// Compile an expression into a filter tree.
pub fn compile(expr: &QueryExpr) -> Result<FilterTree, QueryError> {
    match expr {
        QueryExpr::Atom(atom) => Ok(FilterTree::Atom(compile_atom(atom)?)),
        QueryExpr::Union { operands } => {
            FilterTree::union(operands.iter().map(compile).collect::<Result<_, _>>()?)
        }
        QueryExpr::Intersect { operands } => {
            FilterTree::intersect(operands.iter().map(compile).collect::<Result<_, _>>()?)
        }
        QueryExpr::Subtract { operands } => {
            let [left, right] = exactly::<2>("subtract", "2", operands)?;
            Ok(FilterTree::subtract(left, right))
        }
        QueryExpr::Complement { operands } => {
            let [child] = exactly::<1>("complement", "1", operands)?;
            Ok(FilterTree::complement(child))
        }
        QueryExpr::ForAll { operands } => match operands.len() {
            1 => {
                let [predicate] = exactly::<1>("for_all", "1 or 2", operands)?;
                Ok(FilterTree::for_all(predicate))
            }
            _ => {
                let [domain, predicate] = exactly::<2>("for_all", "1 or 2", operands)?;
                Ok(FilterTree::for_all_in(domain, predicate))
            }
        },
    }
}
