//! Arena syntax tree.
//!
//! Nodes live in one `Vec` in pre-order, so a subtree is a contiguous id
//! range and copying it into a new tree is an index shift. Children are
//! stored as contiguous runs in a separate link table.

mod builder;
mod cursor;
mod node;

pub use cursor::TreeCursor;
pub use node::{Descendants, Node};

pub(crate) use builder::{build, BuildContext, ReusedSpan};

use crate::grammar::{FieldId, Grammar, KindId, RuleId};
use crate::parser::lexer::Token;
use bitflags::bitflags;
use std::fmt;

pub(crate) type NodeId = u32;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) struct NodeFlags: u8 {
        const NAMED = 1;
        const ERROR = 1 << 1;
        const MISSING = 1 << 2;
        const EXTRA = 1 << 3;
        /// Set on every node whose subtree contains an error or missing node.
        const HAS_ERROR = 1 << 4;
    }
}

/// Row and byte column, both zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

impl Point {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeData {
    pub kind: KindId,
    pub field: Option<FieldId>,
    pub flags: NodeFlags,
    pub start: usize,
    pub end: usize,
    pub parent: Option<NodeId>,
    /// Position among the parent's children.
    pub index: u32,
    /// `(offset, len)` into the link table.
    pub children: (u32, u32),
    /// One past the last id of this node's subtree.
    pub subtree_end: NodeId,
    /// Rule that produced the node; `None` for tokens, errors and extras.
    pub rule: Option<RuleId>,
    /// Significant token span `[a, b)`.
    pub tokens: (u32, u32),
    /// One past the furthest significant token examined while parsing.
    pub lookahead: u32,
}

/// A parsed source buffer.
///
/// The tree does not keep the source; methods that need text take it as an
/// argument.
#[derive(Clone)]
pub struct SyntaxTree {
    pub(crate) grammar: Grammar,
    pub(crate) nodes: Vec<NodeData>,
    pub(crate) links: Vec<NodeId>,
    pub(crate) line_starts: Vec<usize>,
    pub(crate) source_len: usize,
    /// Merged token stream, extras included.
    pub(crate) tokens: Vec<Token>,
    /// Significant token indices where recovery was allowed.
    pub(crate) recovery: Vec<u32>,
}

impl SyntaxTree {
    pub fn root(&self) -> Node<'_> {
        Node::new(self, 0)
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn source_len(&self) -> usize {
        self.source_len
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn walk(&self) -> TreeCursor<'_> {
        TreeCursor::new(self.root())
    }

    /// Pre-order traversal of the whole tree.
    pub fn traverse(&self) -> Descendants<'_> {
        self.root().descendants()
    }

    /// Every `ERROR` and `MISSING` node, in pre-order.
    pub fn error_nodes(&self) -> Vec<Node<'_>> {
        if !self.has_error() {
            return Vec::new();
        }
        self.traverse()
            .filter(|n| n.is_error() || n.is_missing())
            .collect()
    }

    pub fn has_error(&self) -> bool {
        self.root().has_error()
    }

    pub fn to_sexp(&self) -> String {
        self.root().to_sexp()
    }

    pub(crate) fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id as usize]
    }

    pub(crate) fn child_ids(&self, id: NodeId) -> &[NodeId] {
        let (offset, len) = self.data(id).children;
        &self.links[offset as usize..(offset + len) as usize]
    }

    pub(crate) fn point_at(&self, offset: usize) -> Point {
        let row = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        let line_start = self.line_starts.get(row).copied().unwrap_or(0);
        Point::new(row, offset - line_start)
    }
}

impl fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxTree")
            .field("grammar", &self.grammar.name())
            .field("nodes", &self.nodes.len())
            .field("source_len", &self.source_len)
            .finish()
    }
}

impl fmt::Display for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.root(), f)
    }
}

pub(crate) fn line_starts(source: &[u8]) -> Vec<usize> {
    std::iter::once(0)
        .chain(
            source
                .iter()
                .enumerate()
                .filter(|(_, &b)| b == b'\n')
                .map(|(idx, _)| idx + 1),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_starts_and_points() {
        assert_eq!(line_starts(b"ab\ncd\n"), vec![0, 3, 6]);
        assert_eq!(line_starts(b""), vec![0]);
    }

    #[test]
    fn point_display() {
        assert_eq!(Point::new(2, 7).to_string(), "(2, 7)");
        assert!(Point::new(1, 9) < Point::new(2, 0));
    }
}
