//! Structural queries over syntax trees.
//!
//! Patterns use tree-sitter's S-expression syntax:
//!
//! ```text
//! (function_definition
//!   name: (identifier) @name
//!   body: (block) @body)
//! ```
//!
//! Captures are prefixed with `@` and can be referenced by name. A query is
//! compiled against one grammar and can then run over any tree of that
//! grammar.
//!
//! ```
//! use arbor::grammar::builtin_grammar;
//! use arbor::{Parser, Query};
//!
//! let grammar = builtin_grammar("python").unwrap();
//! let source = "def fibonacci(n): pass\n";
//! let tree = Parser::new(grammar.clone()).parse(source.as_bytes()).unwrap();
//!
//! let query = Query::new(&grammar, "(function_definition name: (identifier) @fn)").unwrap();
//! let names: Vec<_> = query
//!     .captures(&tree, source.as_bytes())
//!     .map(|capture| capture.node.text(source))
//!     .collect();
//! assert_eq!(names, ["fibonacci"]);
//! ```

mod compile;
mod errors;
mod exec;
mod predicate;
mod syntax;

pub use errors::{MatchError, QueryError, QueryErrorKind};
pub use exec::{QueryCaptures, QueryCursor, QueryMatches};

use crate::grammar::Grammar;
use crate::tree::{Node, SyntaxTree};
use compile::{CompiledQuery, Pattern};
use std::fmt;
use tracing::debug;

/// A compiled query.
#[derive(Clone)]
pub struct Query {
    grammar: Grammar,
    compiled: CompiledQuery,
}

/// Compile `source` against `grammar`.
pub fn compile(grammar: &Grammar, source: &str) -> Result<Query, QueryError> {
    Query::new(grammar, source)
}

impl Query {
    pub fn new(grammar: &Grammar, source: &str) -> Result<Self, QueryError> {
        let compiled = compile::compile(grammar, source).map_err(|err| {
            debug!(grammar = grammar.name(), error = %err, "query rejected");
            err
        })?;
        debug!(
            grammar = grammar.name(),
            patterns = compiled.patterns.len(),
            captures = compiled.capture_names.len(),
            "compiled query"
        );
        Ok(Self {
            grammar: grammar.clone(),
            compiled,
        })
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Capture names, indexed by [`QueryCapture::index`].
    pub fn capture_names(&self) -> &[String] {
        &self.compiled.capture_names
    }

    pub fn capture_index_for_name(&self, name: &str) -> Option<u32> {
        self.compiled
            .capture_names
            .iter()
            .position(|c| c == name)
            .map(|index| index as u32)
    }

    pub fn pattern_count(&self) -> usize {
        self.compiled.patterns.len()
    }

    /// Byte offset of a pattern within the query source.
    pub fn start_byte_for_pattern(&self, index: usize) -> Option<usize> {
        self.compiled.patterns.get(index).map(|p| p.offset)
    }

    pub(crate) fn patterns(&self) -> &[Pattern] {
        &self.compiled.patterns
    }

    /// All matches in `tree`, lazily.
    pub fn matches<'q, 't>(&'q self, tree: &'t SyntaxTree, source: &'t [u8]) -> QueryMatches<'q, 't> {
        QueryCursor::new().matches(self, tree, source)
    }

    /// All captures in `tree`, match by match.
    pub fn captures<'q, 't>(
        &'q self,
        tree: &'t SyntaxTree,
        source: &'t [u8],
    ) -> QueryCaptures<'q, 't> {
        QueryCursor::new().captures(self, tree, source)
    }

    /// Same as [`Query::captures`].
    pub fn execute<'q, 't>(&'q self, tree: &'t SyntaxTree, source: &'t [u8]) -> QueryCaptures<'q, 't> {
        self.captures(tree, source)
    }

    /// Run the query and expect exactly one match.
    pub fn find_unique<'t>(
        &self,
        tree: &'t SyntaxTree,
        source: &'t [u8],
    ) -> Result<QueryMatch<'t>, MatchError> {
        let mut matches = self.matches(tree, source);
        let first = matches.next().ok_or(MatchError::NoMatch)?;
        match matches.count() {
            0 => Ok(first),
            rest => Err(MatchError::AmbiguousMatch { count: rest + 1 }),
        }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("grammar", &self.grammar.name())
            .field("patterns", &self.compiled.patterns.len())
            .field("captures", &self.compiled.capture_names)
            .finish()
    }
}

/// One captured node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryCapture<'t> {
    pub node: Node<'t>,
    pub index: u32,
}

impl QueryCapture<'_> {
    pub fn name<'q>(&self, query: &'q Query) -> &'q str {
        query
            .capture_names()
            .get(self.index as usize)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// A pattern matched at one node. Captures are ordered depth-first, left to
/// right, with a node's own captures before those of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMatch<'t> {
    pub pattern_index: usize,
    pub captures: Vec<QueryCapture<'t>>,
}

impl<'t> QueryMatch<'t> {
    pub fn nodes_for_capture_index(&self, index: u32) -> impl Iterator<Item = Node<'t>> + '_ {
        self.captures
            .iter()
            .filter(move |c| c.index == index)
            .map(|c| c.node)
    }

    /// First node captured as `name`.
    pub fn capture(&self, query: &Query, name: &str) -> Result<Node<'t>, MatchError> {
        query
            .capture_index_for_name(name)
            .and_then(|index| self.nodes_for_capture_index(index).next())
            .ok_or_else(|| MatchError::CaptureNotFound {
                name: name.to_string(),
            })
    }
}

/// Common queries for the built-in grammars.
pub mod queries {
    /// Query for a Python function by name.
    pub fn function_by_name(name: &str) -> String {
        format!(
            r#"(function_definition
                name: (identifier) @name
                (#eq? @name "{name}")
            ) @function"#
        )
    }

    /// Query for a Python class by name.
    pub fn class_by_name(name: &str) -> String {
        format!(
            r#"(class_definition
                name: (identifier) @name
                (#eq? @name "{name}")
            ) @class"#
        )
    }

    /// Query for a method defined directly in a Python class body.
    pub fn method_by_name(class_name: &str, method_name: &str) -> String {
        format!(
            r#"(class_definition
                name: (identifier) @class_name
                (#eq? @class_name "{class_name}")
                body: (block
                    (function_definition
                        name: (identifier) @method_name
                        (#eq? @method_name "{method_name}")
                    ) @method
                )
            )"#
        )
    }

    /// Query for calls of a plain function name, in Python or JavaScript.
    pub fn call_by_name(python: bool, name: &str) -> String {
        let (kind, arguments) = if python {
            ("call", "argument_list")
        } else {
            ("call_expression", "arguments")
        };
        format!(
            r#"({kind}
                function: (identifier) @name
                (#eq? @name "{name}")
                arguments: ({arguments}) @arguments
            ) @call"#
        )
    }

    /// Query for a JavaScript function declaration by name.
    pub fn function_declaration_by_name(name: &str) -> String {
        format!(
            r#"(function_declaration
                name: (identifier) @name
                (#eq? @name "{name}")
            ) @function"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::builtin_grammar;
    use crate::parser::Parser;

    const SOURCE: &str = "\
class Greeter:
    def greet(self, name):
        return name

def fibonacci(n):
    if n < 2:
        return n
    return fibonacci(n - 1) + fibonacci(n - 2)
";

    fn parse(source: &str) -> SyntaxTree {
        Parser::new(builtin_grammar("python").unwrap())
            .parse(source.as_bytes())
            .unwrap()
    }

    #[test]
    fn find_unique_function() {
        let tree = parse(SOURCE);
        let query = Query::new(tree.grammar(), &queries::function_by_name("fibonacci")).unwrap();
        let found = query.find_unique(&tree, SOURCE.as_bytes()).unwrap();
        let function = found.capture(&query, "function").unwrap();
        assert_eq!(function.kind(), "function_definition");
        assert!(function.text(SOURCE).starts_with("def fibonacci(n):"));
        assert_eq!(found.capture(&query, "name").unwrap().text(SOURCE), "fibonacci");
        assert_eq!(
            found.capture(&query, "body").unwrap_err(),
            MatchError::CaptureNotFound {
                name: "body".to_string()
            }
        );
    }

    #[test]
    fn find_unique_reports_zero_and_many() {
        let tree = parse(SOURCE);
        let none = Query::new(tree.grammar(), &queries::function_by_name("missing")).unwrap();
        assert_eq!(
            none.find_unique(&tree, SOURCE.as_bytes()).unwrap_err(),
            MatchError::NoMatch
        );
        let calls = Query::new(tree.grammar(), &queries::call_by_name(true, "fibonacci")).unwrap();
        assert_eq!(
            calls.find_unique(&tree, SOURCE.as_bytes()).unwrap_err(),
            MatchError::AmbiguousMatch { count: 2 }
        );
    }

    #[test]
    fn method_inside_class() {
        let tree = parse(SOURCE);
        let query = Query::new(tree.grammar(), &queries::method_by_name("Greeter", "greet")).unwrap();
        let found = query.find_unique(&tree, SOURCE.as_bytes()).unwrap();
        let method = found.capture(&query, "method").unwrap();
        assert_eq!(method.start_position().row, 1);
        assert!(queries::class_by_name("Greeter").contains("class_definition"));
    }

    #[test]
    fn javascript_helpers_compile() {
        let grammar = builtin_grammar("javascript").unwrap();
        assert!(Query::new(&grammar, &queries::function_declaration_by_name("f")).is_ok());
        assert!(Query::new(&grammar, &queries::call_by_name(false, "f")).is_ok());
        // Python node kinds are unknown to the JavaScript grammar.
        let err = Query::new(&grammar, &queries::function_by_name("f")).unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::NodeKind);
    }

    #[test]
    fn capture_table_and_patterns() {
        let grammar = builtin_grammar("python").unwrap();
        let query = compile(&grammar, "(identifier) @id\n(integer) @num @id").unwrap();
        assert_eq!(query.pattern_count(), 2);
        assert_eq!(query.capture_names(), ["id", "num"]);
        assert_eq!(query.capture_index_for_name("num"), Some(1));
        assert_eq!(query.start_byte_for_pattern(1), Some(17));
        assert_eq!(query.start_byte_for_pattern(2), None);
    }

    #[test]
    fn overlapping_patterns_are_reported_separately() {
        let source = "x = 1\n";
        let tree = parse(source);
        let query = Query::new(tree.grammar(), "(identifier) @a\n(_) @b").unwrap();
        let matches: Vec<_> = query.matches(&tree, source.as_bytes()).collect();
        let on_x: Vec<_> = matches
            .iter()
            .filter(|m| m.captures[0].node.text(source) == "x")
            .map(|m| m.pattern_index)
            .collect();
        assert_eq!(on_x, [0, 1]);
    }
}
