//! Resolution of query source against a grammar.
//!
//! Names become kind and field ids up front, so matching never compares
//! strings.

use crate::grammar::{closest_name, FieldId, Grammar, KindId, ERROR_KIND};
use crate::query::errors::{QueryError, QueryErrorKind};
use crate::query::predicate::{self, Predicate};
use crate::query::syntax::{self, Atom, Entry, Item, Name, NodeName, Quantifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Matcher {
    Kind(KindId),
    Anonymous(KindId),
    /// `(_)`
    AnyNamed,
    /// `_`
    Any,
    Missing(Option<KindId>),
    Alternation(Vec<PatternNode>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PatternNode {
    pub matcher: Matcher,
    pub field: Option<FieldId>,
    pub captures: Vec<u32>,
    pub quantifier: Quantifier,
    pub children: Vec<PatternNode>,
    pub negated_fields: Vec<FieldId>,
    /// An anchor sits right before this child pattern.
    pub anchored: bool,
    /// An anchor follows the last child pattern.
    pub anchor_end: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct Pattern {
    pub root: PatternNode,
    pub predicates: Vec<Predicate>,
    /// Byte offset of the pattern in the query source.
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledQuery {
    pub patterns: Vec<Pattern>,
    pub capture_names: Vec<String>,
}

pub(crate) fn compile(grammar: &Grammar, source: &str) -> Result<CompiledQuery, QueryError> {
    let sources = syntax::read(source)?;
    let mut compiler = Compiler {
        grammar,
        capture_names: Vec::new(),
    };
    let mut patterns = Vec::with_capacity(sources.len());
    for pattern in &sources {
        if pattern.item.quantifier != Quantifier::One {
            return Err(QueryError::syntax(
                pattern.item.offset,
                "quantifier on a top-level pattern",
            ));
        }
        let root = compiler.item(&pattern.item, None)?;
        let predicates = pattern
            .predicates
            .iter()
            .map(|call| predicate::compile(call, |name| compiler.existing_capture(name)))
            .collect::<Result<Vec<_>, _>>()?;
        patterns.push(Pattern {
            root,
            predicates,
            offset: pattern.item.offset,
        });
    }
    Ok(CompiledQuery {
        patterns,
        capture_names: compiler.capture_names,
    })
}

struct Compiler<'g> {
    grammar: &'g Grammar,
    capture_names: Vec<String>,
}

impl Compiler<'_> {
    fn capture(&mut self, name: &Name) -> u32 {
        match self.capture_names.iter().position(|c| *c == name.text) {
            Some(index) => index as u32,
            None => {
                self.capture_names.push(name.text.clone());
                (self.capture_names.len() - 1) as u32
            }
        }
    }

    fn existing_capture(&self, name: &Name) -> Result<u32, QueryError> {
        self.capture_names
            .iter()
            .position(|c| *c == name.text)
            .map(|index| index as u32)
            .ok_or_else(|| {
                QueryError::new(
                    QueryErrorKind::Capture,
                    name.offset,
                    format!("unknown capture '@{}'", name.text),
                )
                .with_suggestion(closest_name(
                    &name.text,
                    self.capture_names.iter().map(String::as_str),
                ))
            })
    }

    /// Resolve `name` as a field of a child of `parent`.
    fn field(&self, name: &Name, parent: Option<KindId>) -> Result<FieldId, QueryError> {
        let grammar = self.grammar;
        let Some(field) = grammar.field_id_for_name(&name.text) else {
            let known = (0..grammar.field_count() as FieldId)
                .filter_map(|id| grammar.field_name_for_id(id));
            return Err(QueryError::new(
                QueryErrorKind::Field,
                name.offset,
                format!("unknown field '{}'", name.text),
            )
            .with_suggestion(closest_name(&name.text, known)));
        };
        if let Some(parent) = parent {
            let allowed = grammar.fields_for_kind(parent);
            if !allowed.contains(&field) {
                let known = allowed
                    .iter()
                    .filter_map(|id| grammar.field_name_for_id(*id));
                return Err(QueryError::new(
                    QueryErrorKind::Structure,
                    name.offset,
                    format!(
                        "'{}' nodes have no field '{}'",
                        grammar.kind_name(parent),
                        name.text
                    ),
                )
                .with_suggestion(closest_name(&name.text, known)));
            }
        }
        Ok(field)
    }

    fn named_kind(&self, name: &Name) -> Result<KindId, QueryError> {
        if name.text == "ERROR" {
            return Ok(ERROR_KIND);
        }
        match self.grammar.id_for_node_kind(&name.text, true) {
            Some(id) if self.grammar.node_kind_is_visible(id) => Ok(id),
            Some(_) => Err(QueryError::new(
                QueryErrorKind::NodeKind,
                name.offset,
                format!("'{}' is hidden and never appears in a tree", name.text),
            )),
            None => Err(QueryError::new(
                QueryErrorKind::NodeKind,
                name.offset,
                format!("unknown node kind '{}'", name.text),
            )
            .with_suggestion(closest_name(
                &name.text,
                self.grammar.named_kind_names(),
            ))),
        }
    }

    fn anonymous_kind(&self, name: &Name) -> Result<KindId, QueryError> {
        self.grammar
            .id_for_node_kind(&name.text, false)
            .ok_or_else(|| {
                QueryError::new(
                    QueryErrorKind::NodeKind,
                    name.offset,
                    format!("unknown anonymous node \"{}\"", name.text),
                )
            })
    }

    /// Compile one item; `parent` is the kind whose child it is, when known.
    fn item(&mut self, item: &Item, parent: Option<KindId>) -> Result<PatternNode, QueryError> {
        let field = item
            .field
            .as_ref()
            .map(|name| self.field(name, parent))
            .transpose()?;

        let mut node = PatternNode {
            matcher: Matcher::Any,
            field,
            captures: Vec::new(),
            quantifier: item.quantifier,
            children: Vec::new(),
            negated_fields: Vec::new(),
            anchored: false,
            anchor_end: false,
        };

        match &item.atom {
            Atom::Any => {}
            Atom::Anonymous(text) => node.matcher = Matcher::Anonymous(self.anonymous_kind(text)?),
            Atom::Alternation(alternatives) => {
                let mut compiled = Vec::with_capacity(alternatives.len());
                for alternative in alternatives {
                    if let Some(field) = &alternative.field {
                        return Err(QueryError::syntax(
                            field.offset,
                            "field prefix inside an alternation",
                        ));
                    }
                    if alternative.quantifier != Quantifier::One {
                        return Err(QueryError::syntax(
                            alternative.offset,
                            "quantifier inside an alternation",
                        ));
                    }
                    compiled.push(self.item(alternative, parent)?);
                }
                node.matcher = Matcher::Alternation(compiled);
            }
            Atom::Node { name, children, .. } => {
                let own_kind = match name {
                    NodeName::Wildcard => {
                        node.matcher = Matcher::AnyNamed;
                        None
                    }
                    NodeName::Kind(kind) => {
                        let id = self.named_kind(kind)?;
                        node.matcher = Matcher::Kind(id);
                        Some(id)
                    }
                    NodeName::Missing(None) => {
                        node.matcher = Matcher::Missing(None);
                        None
                    }
                    NodeName::Missing(Some((kind, named))) => {
                        let id = self
                            .grammar
                            .id_for_node_kind(&kind.text, *named)
                            .ok_or_else(|| {
                                QueryError::new(
                                    QueryErrorKind::NodeKind,
                                    kind.offset,
                                    format!("unknown node kind '{}'", kind.text),
                                )
                            })?;
                        node.matcher = Matcher::Missing(Some(id));
                        None
                    }
                };

                let mut anchor_pending = false;
                for entry in children {
                    match entry {
                        Entry::Anchor => anchor_pending = true,
                        Entry::NegatedField(name) => {
                            node.negated_fields.push(self.field(name, own_kind)?);
                        }
                        Entry::Item(child) => {
                            let mut compiled = self.item(child, own_kind)?;
                            compiled.anchored = std::mem::take(&mut anchor_pending);
                            node.children.push(compiled);
                        }
                    }
                }
                node.anchor_end = anchor_pending;
            }
        }

        // Captures are numbered in the order they are written.
        node.captures = item.captures.iter().map(|c| self.capture(c)).collect();
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::builtin_grammar;

    fn python() -> Grammar {
        builtin_grammar("python").unwrap()
    }

    #[test]
    fn resolves_kinds_fields_and_captures() {
        let grammar = python();
        let query = compile(
            &grammar,
            "(function_definition name: (identifier) @name body: (block) @body) @def",
        )
        .unwrap();
        assert_eq!(query.capture_names, ["name", "body", "def"]);
        let root = &query.patterns[0].root;
        assert_eq!(
            root.matcher,
            Matcher::Kind(grammar.id_for_node_kind("function_definition", true).unwrap())
        );
        assert_eq!(root.captures, [2]);
        assert_eq!(root.children[0].field, grammar.field_id_for_name("name"));
        assert_eq!(root.children[0].captures, [0]);
    }

    #[test]
    fn unknown_kind_reports_offset_and_suggestion() {
        let err = compile(&python(), "(function_definition name: (identifer))").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::NodeKind);
        assert_eq!(err.offset, 28);
        assert_eq!(err.suggestion.as_deref(), Some("identifier"));
    }

    #[test]
    fn unknown_and_misplaced_fields() {
        let err = compile(&python(), "(function_definition nam: (identifier))").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Field);
        assert_eq!(err.offset, 21);
        assert_eq!(err.suggestion.as_deref(), Some("name"));

        let err = compile(&python(), "(call condition: (identifier))").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Structure);
        assert_eq!(err.offset, 6);

        // Wildcard parents accept any known field.
        assert!(compile(&python(), "(_ condition: (_))").is_ok());
    }

    #[test]
    fn hidden_kinds_only_inside_missing() {
        let err = compile(&python(), "(_expression)").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::NodeKind);
        assert!(compile(&python(), "(MISSING _indent)").is_ok());
        assert!(compile(&python(), "(MISSING \")\")").is_ok());
        assert!(compile(&python(), "(ERROR) @err").is_ok());
    }

    #[test]
    fn anchors_mark_neighbouring_children() {
        let query = compile(&python(), "(block . (_) @first (_) .)").unwrap();
        let root = &query.patterns[0].root;
        assert!(root.children[0].anchored);
        assert!(!root.children[1].anchored);
        assert!(root.anchor_end);
    }

    #[test]
    fn predicates_need_known_captures() {
        let err = compile(&python(), "((identifier) @id (#eq? @idd \"x\"))").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Capture);
        assert_eq!(err.suggestion.as_deref(), Some("id"));
        assert_eq!(err.offset, 25);
    }

    #[test]
    fn unknown_anonymous_node() {
        let err = compile(&python(), "(binary_operator \"<>\")").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::NodeKind);
        assert_eq!(err.offset, 17);
    }
}
