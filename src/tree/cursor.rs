use crate::tree::Node;

/// Stateful walker over a subtree. It never moves above the node it was
/// created on.
#[derive(Clone)]
pub struct TreeCursor<'t> {
    root: Node<'t>,
    current: Node<'t>,
    depth: usize,
}

impl<'t> TreeCursor<'t> {
    pub(crate) fn new(root: Node<'t>) -> Self {
        Self {
            root,
            current: root,
            depth: 0,
        }
    }

    pub fn node(&self) -> Node<'t> {
        self.current
    }

    pub fn field_name(&self) -> Option<&'t str> {
        if self.current == self.root {
            return None;
        }
        self.current.field_name()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn goto_first_child(&mut self) -> bool {
        match self.current.child(0) {
            Some(child) => {
                self.current = child;
                self.depth += 1;
                true
            }
            None => false,
        }
    }

    pub fn goto_next_sibling(&mut self) -> bool {
        if self.current == self.root {
            return false;
        }
        match self.current.next_sibling() {
            Some(sibling) => {
                self.current = sibling;
                true
            }
            None => false,
        }
    }

    pub fn goto_parent(&mut self) -> bool {
        if self.current == self.root {
            return false;
        }
        match self.current.parent() {
            Some(parent) => {
                self.current = parent;
                self.depth -= 1;
                true
            }
            None => false,
        }
    }

    /// Move to the first child that ends after `offset`.
    pub fn goto_first_child_for_byte(&mut self, offset: usize) -> Option<usize> {
        let (index, child) = self
            .current
            .children()
            .enumerate()
            .find(|(_, c)| c.end_byte() > offset)?;
        self.current = child;
        self.depth += 1;
        Some(index)
    }

    pub fn reset(&mut self, node: Node<'t>) {
        self.root = node;
        self.current = node;
        self.depth = 0;
    }
}

#[cfg(test)]
mod tests {
    use crate::grammar::builtin_grammar;
    use crate::parser::Parser;

    #[test]
    fn cursor_walks_whole_tree_in_preorder() {
        let grammar = builtin_grammar("toy-arith").unwrap();
        let tree = Parser::new(grammar).parse(b"1 + 2").unwrap();
        let mut cursor = tree.walk();
        let mut seen = Vec::new();
        'walk: loop {
            seen.push(cursor.node().kind());
            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    continue 'walk;
                }
                if !cursor.goto_parent() {
                    break 'walk;
                }
            }
        }
        let preorder: Vec<_> = tree.traverse().map(|n| n.kind()).collect();
        assert_eq!(seen, preorder);
        assert_eq!(cursor.depth(), 0);
    }

    #[test]
    fn cursor_stays_inside_its_subtree() {
        let grammar = builtin_grammar("toy-arith").unwrap();
        let tree = Parser::new(grammar).parse(b"1 + 2").unwrap();
        let first = tree.root().child(0).unwrap();
        let mut cursor = first.walk();
        assert!(!cursor.goto_next_sibling());
        assert!(!cursor.goto_parent());

        let mut cursor = tree.walk();
        assert_eq!(cursor.goto_first_child_for_byte(3), Some(2));
        assert_eq!(cursor.node().text("1 + 2"), "2");
    }
}
