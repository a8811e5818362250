//! Query error types.

use rustacct_core::StoreError;
use thiserror::Error;

/// Error returned when building, resolving or running a query fails.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A template reference names no known template.
    #[error("unknown named query: {0}")]
    UnknownTemplate(String),
    /// Template references form a cycle; the chain ends with the repeated name.
    #[error("cyclic named query reference: {}", .0.join(" -> "))]
    CyclicReference(Vec<String>),
    /// Two templates share a name.
    #[error("duplicate named query: {0}")]
    DuplicateTemplate(String),
    /// A combinator received the wrong number of operands.
    #[error("{node} expects {expected} operand(s), found {found}")]
    Arity {
        /// Combinator name
        node: &'static str,
        /// Accepted operand count, human readable
        expected: &'static str,
        /// Operand count received
        found: usize,
    },
    /// A content/remark pattern does not compile.
    #[error("invalid pattern {pattern:?}: {message}")]
    Pattern {
        /// Pattern source
        pattern: String,
        /// Compiler message
        message: String,
    },
    /// The grouping specification cannot be executed.
    #[error("invalid subtotal: {0}")]
    InvalidSubtotal(String),
    /// The ledger store failed while being scanned.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coarse classification of a [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The query itself is wrong; retrying cannot help.
    MalformedQuery,
    /// A collaborator failed; the caller may retry.
    StoreUnavailable,
}

impl QueryError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(_) => ErrorKind::StoreUnavailable,
            Self::UnknownTemplate(_)
            | Self::CyclicReference(_)
            | Self::DuplicateTemplate(_)
            | Self::Arity { .. }
            | Self::Pattern { .. }
            | Self::InvalidSubtotal(_) => ErrorKind::MalformedQuery,
        }
    }
}
