//! Text predicates attached to a pattern: `#eq?`, `#not-eq?`, `#match?`,
//! `#not-match?` and `#any-of?`.

use crate::query::errors::{QueryError, QueryErrorKind};
use crate::query::syntax::{Argument, Name, PredicateCall};
use crate::tree::{NodeId, SyntaxTree};
use regex::bytes::Regex;

#[derive(Debug, Clone)]
pub(crate) enum Operand {
    Capture(u32),
    Text(Vec<u8>),
}

#[derive(Debug, Clone)]
pub(crate) enum Predicate {
    Eq {
        capture: u32,
        value: Operand,
        negated: bool,
    },
    Match {
        capture: u32,
        regex: Regex,
        negated: bool,
    },
    AnyOf {
        capture: u32,
        values: Vec<Vec<u8>>,
    },
}

pub(crate) const PREDICATE_NAMES: &[&str] =
    &["#eq?", "#not-eq?", "#match?", "#not-match?", "#any-of?"];

/// Resolve a predicate call. `capture` maps a capture name to its index.
pub(crate) fn compile(
    call: &PredicateCall,
    mut capture: impl FnMut(&Name) -> Result<u32, QueryError>,
) -> Result<Predicate, QueryError> {
    let name = call.name.text.as_str();
    let offset = call.name.offset;
    let arity_error = |expected: &str| {
        QueryError::new(
            QueryErrorKind::Predicate,
            offset,
            format!("{name} expects {expected}"),
        )
    };

    let subject = match call.arguments.first() {
        Some(Argument::Capture(first)) => capture(first)?,
        _ => return Err(arity_error("a capture as its first argument")),
    };
    let rest = &call.arguments[1..];

    match name {
        "#eq?" | "#not-eq?" => {
            let [second] = rest else {
                return Err(arity_error("two arguments"));
            };
            let value = match second {
                Argument::Capture(other) => Operand::Capture(capture(other)?),
                Argument::Text(text) => Operand::Text(text.text.clone().into_bytes()),
            };
            Ok(Predicate::Eq {
                capture: subject,
                value,
                negated: name == "#not-eq?",
            })
        }
        "#match?" | "#not-match?" => {
            let [Argument::Text(pattern)] = rest else {
                return Err(arity_error("a capture and a regular expression"));
            };
            let regex = Regex::new(&pattern.text).map_err(|err| {
                QueryError::new(
                    QueryErrorKind::Predicate,
                    pattern.offset,
                    format!("invalid regular expression: {err}"),
                )
            })?;
            Ok(Predicate::Match {
                capture: subject,
                regex,
                negated: name == "#not-match?",
            })
        }
        "#any-of?" => {
            let values = rest
                .iter()
                .map(|arg| match arg {
                    Argument::Text(text) => Ok(text.text.clone().into_bytes()),
                    Argument::Capture(_) => Err(arity_error("a capture followed by strings")),
                })
                .collect::<Result<Vec<_>, _>>()?;
            if values.is_empty() {
                return Err(arity_error("at least one string"));
            }
            Ok(Predicate::AnyOf {
                capture: subject,
                values,
            })
        }
        _ => Err(QueryError::new(
            QueryErrorKind::Predicate,
            offset,
            format!("unknown predicate '{name}'"),
        )
        .with_suggestion(crate::grammar::closest_name(
            name,
            PREDICATE_NAMES.iter().copied(),
        ))),
    }
}

impl Predicate {
    /// Check the predicate against one match. A capture that took no node
    /// in this match satisfies every predicate.
    pub(crate) fn holds(
        &self,
        captures: &[(u32, NodeId)],
        tree: &SyntaxTree,
        source: &[u8],
    ) -> bool {
        let text = move |id: NodeId| {
            let data = tree.data(id);
            source.get(data.start..data.end).unwrap_or_default()
        };
        let nodes = move |index: u32| {
            captures
                .iter()
                .filter(move |(c, _)| *c == index)
                .map(|(_, id)| *id)
        };

        match self {
            Predicate::Eq {
                capture,
                value: Operand::Text(expected),
                negated,
            } => nodes(*capture).all(|id| (text(id) == expected.as_slice()) != *negated),
            Predicate::Eq {
                capture,
                value: Operand::Capture(other),
                negated,
            } => match (nodes(*capture).next(), nodes(*other).next()) {
                (Some(a), Some(b)) => (text(a) == text(b)) != *negated,
                _ => true,
            },
            Predicate::Match {
                capture,
                regex,
                negated,
            } => nodes(*capture).all(|id| regex.is_match(text(id)) != *negated),
            Predicate::AnyOf { capture, values } => {
                nodes(*capture).all(|id| values.iter().any(|v| v.as_slice() == text(id)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::syntax::read;

    fn first_call(source: &str) -> PredicateCall {
        read(source).unwrap().remove(0).predicates.remove(0)
    }

    fn resolve(name: &Name) -> Result<u32, QueryError> {
        match name.text.as_str() {
            "a" => Ok(0),
            "b" => Ok(1),
            _ => Err(QueryError::new(QueryErrorKind::Capture, name.offset, "unknown")),
        }
    }

    #[test]
    fn rejects_unknown_predicates_with_suggestion() {
        let call = first_call("((x) @a (#eqq? @a \"1\"))");
        let err = compile(&call, resolve).unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Predicate);
        assert_eq!(err.suggestion.as_deref(), Some("#eq?"));
    }

    #[test]
    fn checks_arity_and_regex() {
        let call = first_call("((x) @a (#eq? @a))");
        assert_eq!(compile(&call, resolve).unwrap_err().kind, QueryErrorKind::Predicate);
        let call = first_call("((x) @a (#match? @a \"(\"))");
        assert_eq!(compile(&call, resolve).unwrap_err().kind, QueryErrorKind::Predicate);
        let call = first_call("((x) @a (#eq? @zz \"1\"))");
        assert_eq!(compile(&call, resolve).unwrap_err().kind, QueryErrorKind::Capture);
        let call = first_call("((x) @a (#any-of? @a one two \"three\"))");
        assert!(matches!(
            compile(&call, resolve).unwrap(),
            Predicate::AnyOf { values, .. } if values.len() == 3
        ));
    }
}
