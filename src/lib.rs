//! Arbor: grammar-driven parsing and structural queries
//!
//! A parsing engine driven by grammar tables loaded at runtime, with
//! error-tolerant and incremental parsing and tree-sitter style queries over
//! the resulting syntax trees.
//!
//! # Architecture
//!
//! Grammars are data. An artifact (TOML or JSON) compiles into a
//! [`Grammar`]: kind and field tables, token matchers and rules. The
//! [`registry`] maps names to grammars. A [`Parser`] turns bytes into an
//! immutable, arena-backed [`SyntaxTree`], and a [`Query`] compiled against
//! the same grammar streams matches and captures out of it.
//!
//! # Guarantees
//!
//! - Parsing never fails on malformed source; errors become `ERROR` and
//!   `MISSING` nodes
//! - The root of a tree always spans the whole input
//! - An incremental re-parse yields the same tree as a full parse
//! - All offsets are byte offsets
//!
//! # Example
//!
//! ```
//! use arbor::{registry, Parser, Query};
//!
//! registry::init().register_builtins().unwrap();
//! let python = registry::lookup("python").unwrap();
//!
//! let source = "def fibonacci(n):\n    return n\n";
//! let tree = Parser::new(python.clone()).parse(source.as_bytes()).unwrap();
//! assert!(!tree.has_error());
//!
//! let query = Query::new(&python, "(function_definition name: (identifier) @name)").unwrap();
//! for capture in query.captures(&tree, source.as_bytes()) {
//!     assert_eq!(capture.node.text(source), "fibonacci");
//! }
//! ```

pub mod cache;
pub mod edit;
pub mod grammar;
pub mod parser;
pub mod pool;
pub mod query;
pub mod registry;
pub mod tree;
pub mod validate;

// Re-exports
pub use edit::{EditError, EditVerification, InputEdit, TextEdit};
pub use grammar::{builtin_grammar, FieldId, Grammar, GrammarLoadError, KindId};
pub use parser::{BudgetKind, ParseError, ParseOptions, ParseStats, Parser, DEFAULT_MAX_DEPTH};
pub use query::{
    MatchError, Query, QueryCapture, QueryCaptures, QueryCursor, QueryError, QueryErrorKind,
    QueryMatch, QueryMatches,
};
pub use registry::{GrammarRegistry, RegistryError};
pub use tree::{Node, Point, SyntaxTree, TreeCursor};
pub use validate::{collect_errors, ErrorLocation, SyntaxValidator, ValidatedEdit};
