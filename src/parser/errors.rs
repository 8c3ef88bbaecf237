use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which parse budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetKind {
    Steps(u64),
    Nodes(usize),
    /// Nested rule invocations.
    Depth(usize),
    Timeout(Duration),
}

impl fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetKind::Steps(limit) => write!(f, "step limit of {limit}"),
            BudgetKind::Nodes(limit) => write!(f, "node limit of {limit}"),
            BudgetKind::Depth(limit) => write!(f, "nesting limit of {limit}"),
            BudgetKind::Timeout(limit) => write!(f, "timeout of {limit:?}"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("parse aborted: exceeded {0}")]
    BudgetExceeded(BudgetKind),

    #[error("invalid edit: {reason}")]
    InvalidEdit { reason: String },

    #[error("tree was produced by grammar '{found}', parser uses '{expected}'")]
    GrammarMismatch { expected: String, found: String },
}
