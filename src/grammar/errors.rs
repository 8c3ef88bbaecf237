use std::fmt;
use std::path::{Path, PathBuf};

/// Failure to turn an artifact into a usable [`Grammar`](crate::Grammar).
///
/// Registration is all-or-nothing: any of these leaves the registry as it
/// was before the call.
#[derive(Debug)]
pub enum GrammarLoadError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Json {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
    Format {
        path: Option<PathBuf>,
        message: String,
    },
    Notation {
        grammar: String,
        rule: String,
        offset: usize,
        message: String,
    },
    Validation {
        path: Option<PathBuf>,
        grammar: String,
        source: ValidationError,
    },
}

impl GrammarLoadError {
    pub(crate) fn with_path(self, path: &Path) -> Self {
        let path = Some(path.to_path_buf());
        match self {
            GrammarLoadError::Toml { path: None, source } => GrammarLoadError::Toml { path, source },
            GrammarLoadError::Json { path: None, source } => GrammarLoadError::Json { path, source },
            GrammarLoadError::Format {
                path: None,
                message,
            } => GrammarLoadError::Format { path, message },
            GrammarLoadError::Validation {
                path: None,
                grammar,
                source,
            } => GrammarLoadError::Validation {
                path,
                grammar,
                source,
            },
            other => other,
        }
    }
}

fn location(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" ({})", path.display()),
        None => String::new(),
    }
}

impl fmt::Display for GrammarLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarLoadError::Io { path, source } => {
                write!(f, "failed to read grammar from {}: {}", path.display(), source)
            }
            GrammarLoadError::Toml { path, source } => write!(
                f,
                "failed to parse grammar TOML{}: {}",
                location(path),
                source
            ),
            GrammarLoadError::Json { path, source } => write!(
                f,
                "failed to parse grammar JSON{}: {}",
                location(path),
                source
            ),
            GrammarLoadError::Format { path, message } => {
                write!(f, "malformed grammar artifact{}: {}", location(path), message)
            }
            GrammarLoadError::Notation {
                grammar,
                rule,
                offset,
                message,
            } => write!(
                f,
                "grammar '{grammar}': rule '{rule}' has a notation error at offset {offset}: {message}"
            ),
            GrammarLoadError::Validation {
                path,
                grammar,
                source,
            } => write!(f, "invalid grammar '{grammar}'{}: {}", location(path), source),
        }
    }
}

impl std::error::Error for GrammarLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GrammarLoadError::Io { source, .. } => Some(source),
            GrammarLoadError::Toml { source, .. } => Some(source),
            GrammarLoadError::Json { source, .. } => Some(source),
            GrammarLoadError::Validation { source, .. } => Some(source),
            GrammarLoadError::Format { .. } | GrammarLoadError::Notation { .. } => None,
        }
    }
}

/// Every problem found while compiling a grammar, in discovery order.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyName,
    EmptyRuleSet,
    InvalidVersion {
        version: String,
        message: String,
    },
    UnsupportedAbi {
        found: u32,
        supported: u32,
    },
    DuplicateRule {
        name: String,
    },
    UnknownSymbol {
        rule: String,
        symbol: String,
    },
    HiddenStartRule {
        rule: String,
    },
    LexicalStartRule {
        rule: String,
    },
    InvalidPattern {
        rule: String,
        pattern: String,
        message: String,
    },
    EmptyMatch {
        rule: String,
        pattern: String,
    },
    LeftRecursion {
        cycle: Vec<String>,
    },
    InvalidExtra {
        extra: String,
    },
    UnknownLayoutKind {
        name: String,
    },
    UnknownBracket {
        text: String,
    },
    UnknownSyncKind {
        name: String,
    },
    SymbolInToken {
        rule: String,
        symbol: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyName => write!(f, "grammar name is empty"),
            ValidationIssue::EmptyRuleSet => write!(f, "grammar defines no rules"),
            ValidationIssue::InvalidVersion { version, message } => {
                write!(f, "version '{version}' is not valid semver: {message}")
            }
            ValidationIssue::UnsupportedAbi { found, supported } => {
                write!(f, "artifact abi {found} is not supported (expected {supported})")
            }
            ValidationIssue::DuplicateRule { name } => write!(f, "rule '{name}' is defined twice"),
            ValidationIssue::UnknownSymbol { rule, symbol } => {
                write!(f, "rule '{rule}' references unknown symbol '{symbol}'")
            }
            ValidationIssue::HiddenStartRule { rule } => {
                write!(f, "start rule '{rule}' is hidden")
            }
            ValidationIssue::LexicalStartRule { rule } => {
                write!(f, "start rule '{rule}' is a token rule")
            }
            ValidationIssue::InvalidPattern {
                rule,
                pattern,
                message,
            } => write!(f, "rule '{rule}' has invalid pattern /{pattern}/: {message}"),
            ValidationIssue::EmptyMatch { rule, pattern } => {
                write!(f, "rule '{rule}' has pattern /{pattern}/ that matches the empty string")
            }
            ValidationIssue::LeftRecursion { cycle } => {
                write!(f, "left recursion: {}", cycle.join(" -> "))
            }
            ValidationIssue::InvalidExtra { extra } => {
                write!(f, "extra '{extra}' must be a string, a pattern or a token rule")
            }
            ValidationIssue::UnknownLayoutKind { name } => {
                write!(f, "layout refers to '{name}', which is not a declared external")
            }
            ValidationIssue::UnknownBracket { text } => {
                write!(f, "layout bracket '{text}' is not a token of this grammar")
            }
            ValidationIssue::UnknownSyncKind { name } => {
                write!(f, "sync token '{name}' does not name a token of this grammar")
            }
            ValidationIssue::SymbolInToken { rule, symbol } => {
                write!(f, "token rule '{rule}' references symbol '{symbol}'")
            }
        }
    }
}
