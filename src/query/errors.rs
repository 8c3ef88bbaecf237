use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryErrorKind {
    Syntax,
    NodeKind,
    Field,
    Capture,
    /// A field that the parent kind never carries.
    Structure,
    Predicate,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            QueryErrorKind::Syntax => "syntax error",
            QueryErrorKind::NodeKind => "invalid node kind",
            QueryErrorKind::Field => "invalid field",
            QueryErrorKind::Capture => "invalid capture",
            QueryErrorKind::Structure => "impossible pattern",
            QueryErrorKind::Predicate => "invalid predicate",
        };
        f.write_str(text)
    }
}

/// A query that failed to compile. `offset` is a byte offset into the
/// query source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub offset: usize,
    pub message: String,
    pub suggestion: Option<String>,
}

impl QueryError {
    pub(crate) fn new(kind: QueryErrorKind, offset: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            offset,
            message: message.into(),
            suggestion: None,
        }
    }

    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Syntax, offset, message)
    }

    pub(crate) fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}: {}", self.kind, self.offset, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (did you mean '{suggestion}'?)")?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryError {}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("query matched 0 locations")]
    NoMatch,

    #[error("query matched {count} locations, expected exactly 1")]
    AmbiguousMatch { count: usize },

    #[error("capture '{name}' not found in query matches")]
    CaptureNotFound { name: String },
}
