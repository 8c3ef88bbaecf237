use crate::grammar::{FieldId, KindId};
use crate::tree::{NodeFlags, NodeId, Point, SyntaxTree, TreeCursor};
use std::fmt;
use std::ops::Range;

/// A handle to one node of a [`SyntaxTree`].
#[derive(Clone, Copy)]
pub struct Node<'t> {
    tree: &'t SyntaxTree,
    id: NodeId,
}

impl<'t> Node<'t> {
    pub(crate) fn new(tree: &'t SyntaxTree, id: NodeId) -> Self {
        Self { tree, id }
    }

    /// Pre-order index of this node in its tree.
    pub fn id(&self) -> usize {
        self.id as usize
    }

    pub fn tree(&self) -> &'t SyntaxTree {
        self.tree
    }

    fn flags(&self) -> NodeFlags {
        self.tree.data(self.id).flags
    }

    pub fn kind(&self) -> &'t str {
        self.tree.grammar.kind_name(self.kind_id())
    }

    pub fn kind_id(&self) -> KindId {
        self.tree.data(self.id).kind
    }

    pub fn is_named(&self) -> bool {
        self.flags().contains(NodeFlags::NAMED)
    }

    pub fn is_error(&self) -> bool {
        self.flags().contains(NodeFlags::ERROR)
    }

    pub fn is_missing(&self) -> bool {
        self.flags().contains(NodeFlags::MISSING)
    }

    pub fn is_extra(&self) -> bool {
        self.flags().contains(NodeFlags::EXTRA)
    }

    /// True if this node or any descendant is an error or missing node.
    pub fn has_error(&self) -> bool {
        self.flags().contains(NodeFlags::HAS_ERROR)
    }

    pub fn start_byte(&self) -> usize {
        self.tree.data(self.id).start
    }

    pub fn end_byte(&self) -> usize {
        self.tree.data(self.id).end
    }

    pub fn byte_range(&self) -> Range<usize> {
        self.start_byte()..self.end_byte()
    }

    pub fn start_position(&self) -> Point {
        self.tree.point_at(self.start_byte())
    }

    pub fn end_position(&self) -> Point {
        self.tree.point_at(self.end_byte())
    }

    pub fn child_count(&self) -> usize {
        self.tree.data(self.id).children.1 as usize
    }

    pub fn child(&self, index: usize) -> Option<Node<'t>> {
        self.tree
            .child_ids(self.id)
            .get(index)
            .map(|&id| Node::new(self.tree, id))
    }

    pub fn children(&self) -> impl ExactSizeIterator<Item = Node<'t>> + 't {
        let tree = self.tree;
        tree.child_ids(self.id)
            .iter()
            .map(move |&id| Node::new(tree, id))
    }

    pub fn named_children(&self) -> impl Iterator<Item = Node<'t>> + 't {
        self.children().filter(|c| c.is_named())
    }

    pub fn named_child_count(&self) -> usize {
        self.named_children().count()
    }

    pub fn field_id(&self) -> Option<FieldId> {
        self.tree.data(self.id).field
    }

    /// Field under which this node is attached to its parent.
    pub fn field_name(&self) -> Option<&'t str> {
        self.field_id()
            .and_then(|f| self.tree.grammar.field_name_for_id(f))
    }

    pub fn child_by_field_id(&self, field: FieldId) -> Option<Node<'t>> {
        self.children().find(|c| c.field_id() == Some(field))
    }

    pub fn child_by_field_name(&self, name: &str) -> Option<Node<'t>> {
        let field = self.tree.grammar.field_id_for_name(name)?;
        self.child_by_field_id(field)
    }

    pub fn children_by_field_name(&self, name: &str) -> impl Iterator<Item = Node<'t>> + 't {
        let field = self.tree.grammar.field_id_for_name(name);
        self.children()
            .filter(move |c| field.is_some() && c.field_id() == field)
    }

    pub fn parent(&self) -> Option<Node<'t>> {
        self.tree
            .data(self.id)
            .parent
            .map(|id| Node::new(self.tree, id))
    }

    pub fn next_sibling(&self) -> Option<Node<'t>> {
        let index = self.tree.data(self.id).index as usize;
        self.parent()?.child(index + 1)
    }

    pub fn prev_sibling(&self) -> Option<Node<'t>> {
        let index = self.tree.data(self.id).index as usize;
        self.parent()?.child(index.checked_sub(1)?)
    }

    pub fn next_named_sibling(&self) -> Option<Node<'t>> {
        let mut sibling = self.next_sibling();
        while let Some(node) = sibling {
            if node.is_named() {
                return Some(node);
            }
            sibling = node.next_sibling();
        }
        None
    }

    pub fn prev_named_sibling(&self) -> Option<Node<'t>> {
        let mut sibling = self.prev_sibling();
        while let Some(node) = sibling {
            if node.is_named() {
                return Some(node);
            }
            sibling = node.prev_sibling();
        }
        None
    }

    /// Source bytes covered by this node.
    pub fn bytes<'s>(&self, source: &'s [u8]) -> &'s [u8] {
        source.get(self.byte_range()).unwrap_or(&[])
    }

    pub fn utf8_text<'s>(&self, source: &'s [u8]) -> Result<&'s str, std::str::Utf8Error> {
        std::str::from_utf8(self.bytes(source))
    }

    /// Text covered by this node. Empty if the range does not fall on
    /// character boundaries of `source`.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.byte_range()).unwrap_or("")
    }

    /// Smallest node in this subtree that contains `start..end`.
    pub fn descendant_for_byte_range(&self, start: usize, end: usize) -> Option<Node<'t>> {
        let contains = |n: &Node<'_>| n.start_byte() <= start && end <= n.end_byte();
        if !contains(self) {
            return None;
        }
        let mut node = *self;
        'descend: loop {
            for child in node.children() {
                if contains(&child) && (child.start_byte() < child.end_byte() || start == end) {
                    node = child;
                    continue 'descend;
                }
            }
            return Some(node);
        }
    }

    /// This node and everything below it, in pre-order.
    pub fn descendants(&self) -> Descendants<'t> {
        Descendants {
            tree: self.tree,
            next: self.id,
            end: self.tree.data(self.id).subtree_end,
        }
    }

    pub fn walk(&self) -> TreeCursor<'t> {
        TreeCursor::new(*self)
    }

    /// S-expression of the named structure below this node, with field
    /// labels and `MISSING` markers.
    pub fn to_sexp(&self) -> String {
        enum Step<'n> {
            Open(Node<'n>),
            Close,
        }

        let mut out = String::new();
        let mut stack = vec![Step::Open(*self)];
        while let Some(step) = stack.pop() {
            let node = match step {
                Step::Close => {
                    out.push(')');
                    continue;
                }
                Step::Open(node) => node,
            };
            if node != *self {
                out.push(' ');
                if let Some(field) = node.field_name() {
                    out.push_str(field);
                    out.push_str(": ");
                }
            }
            if node.is_missing() {
                if node.is_named() {
                    out.push_str(&format!("(MISSING {})", node.kind()));
                } else {
                    out.push_str(&format!("(MISSING {:?})", node.kind()));
                }
                continue;
            }
            out.push('(');
            out.push_str(node.kind());
            stack.push(Step::Close);
            let shown: Vec<_> = node
                .children()
                .filter(|child| child.is_named() || child.is_missing())
                .collect();
            stack.extend(shown.into_iter().rev().map(Step::Open));
        }
        out
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl Eq for Node<'_> {}

impl std::hash::Hash for Node<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Node {} {} - {}}}",
            self.kind(),
            self.start_position(),
            self.end_position()
        )
    }
}

impl fmt::Display for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sexp())
    }
}

/// Pre-order iterator over a subtree. A clone resumes from the same point.
#[derive(Clone)]
pub struct Descendants<'t> {
    tree: &'t SyntaxTree,
    next: NodeId,
    end: NodeId,
}

impl<'t> Iterator for Descendants<'t> {
    type Item = Node<'t>;

    fn next(&mut self) -> Option<Node<'t>> {
        if self.next >= self.end {
            return None;
        }
        let node = Node::new(self.tree, self.next);
        self.next += 1;
        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.end - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Descendants<'_> {}

#[cfg(test)]
mod tests {
    use crate::grammar::builtin_grammar;
    use crate::parser::Parser;

    #[test]
    fn navigation_and_fields() {
        let grammar = builtin_grammar("python").unwrap();
        let source = "def add(a, b):\n    return a + b\n";
        let tree = Parser::new(grammar).parse(source.as_bytes()).unwrap();
        let root = tree.root();
        assert_eq!(root.kind(), "module");
        assert_eq!(root.byte_range(), 0..source.len());

        let func = root.child(0).unwrap();
        assert_eq!(func.kind(), "function_definition");
        let name = func.child_by_field_name("name").unwrap();
        assert_eq!(name.text(source), "add");
        assert_eq!(name.field_name(), Some("name"));
        assert_eq!(name.parent(), Some(func));
        assert_eq!(name.prev_sibling().unwrap().kind(), "def");
        assert_eq!(name.next_sibling().unwrap().kind(), "parameters");
        assert_eq!(name.next_named_sibling().unwrap().kind(), "parameters");

        let params: Vec<_> = func
            .child_by_field_name("parameters")
            .unwrap()
            .named_children()
            .map(|n| n.text(source))
            .collect();
        assert_eq!(params, vec!["a", "b"]);

        let body = func.child_by_field_name("body").unwrap();
        assert_eq!(body.start_position().row, 1);
        assert!(func.child_by_field_name("nope").is_none());
    }

    #[test]
    fn descendant_lookup_by_range() {
        let grammar = builtin_grammar("toy-arith").unwrap();
        let tree = Parser::new(grammar).parse(b"10 + 20").unwrap();
        let node = tree.root().descendant_for_byte_range(5, 6).unwrap();
        assert_eq!(node.kind(), "NUMBER");
        assert_eq!(node.byte_range(), 5..7);
        assert_eq!(tree.root().descendant_for_byte_range(0, 7), Some(tree.root()));
        assert!(tree.root().descendant_for_byte_range(3, 99).is_none());
    }

    #[test]
    fn sexp_skips_anonymous_nodes() {
        let grammar = builtin_grammar("toy-arith").unwrap();
        let tree = Parser::new(grammar).parse(b"1+2").unwrap();
        assert_eq!(tree.to_sexp(), "(expr (NUMBER) (NUMBER))");
        assert_eq!(tree.root().to_string(), tree.to_sexp());
    }

    #[test]
    fn descendants_are_preorder_and_restartable() {
        let grammar = builtin_grammar("toy-arith").unwrap();
        let tree = Parser::new(grammar).parse(b"1+2+3").unwrap();
        let walk = tree.traverse();
        let kinds: Vec<_> = walk.clone().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["expr", "NUMBER", "+", "NUMBER", "+", "NUMBER"]);
        assert_eq!(walk.count(), 6);
        assert_eq!(tree.traverse().count(), 6);
    }
}
