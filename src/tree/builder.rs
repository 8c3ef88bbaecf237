//! Turns the parser's green tree into the arena.
//!
//! Three passes: lower green nodes to owned build nodes with byte ranges,
//! place extras by position, then flatten in pre-order. Reused subtrees
//! are copied from the old arena as one contiguous slice.

use crate::grammar::{FieldId, Grammar, KindId, RuleId, ERROR_KIND};
use crate::parser::engine::{Child, Green, GreenNode};
use crate::parser::lexer::Token;
use crate::parser::{BudgetKind, ParseError};
use crate::tree::{line_starts, NodeData, NodeFlags, NodeId, SyntaxTree};

/// A subtree of the previous tree to copy, with the offsets that move it
/// into the new source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReusedSpan {
    pub node: NodeId,
    pub byte_shift: isize,
    pub token_shift: i64,
}

impl ReusedSpan {
    fn byte(&self, offset: usize) -> usize {
        offset.saturating_add_signed(self.byte_shift)
    }

    fn token(&self, index: u32) -> u32 {
        (i64::from(index) + self.token_shift).max(0) as u32
    }
}

pub(crate) struct BuildContext<'a> {
    pub grammar: &'a Grammar,
    pub source: &'a [u8],
    /// Merged token stream, extras included.
    pub tokens: Vec<Token>,
    pub significant: &'a [Token],
    pub old: Option<&'a SyntaxTree>,
    pub recovery: Vec<u32>,
    pub max_nodes: Option<usize>,
}

struct BuildNode<'a> {
    kind: KindId,
    field: Option<FieldId>,
    flags: NodeFlags,
    start: usize,
    end: usize,
    rule: Option<RuleId>,
    tokens: (u32, u32),
    lookahead: u32,
    content: Content<'a>,
}

enum Content<'a> {
    Leaf,
    Children(Vec<BuildNode<'a>>),
    Reused(&'a SyntaxTree, ReusedSpan),
}

impl BuildNode<'_> {
    fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

pub(crate) fn build(ctx: BuildContext<'_>, root: &GreenNode) -> Result<SyntaxTree, ParseError> {
    let lowering = Lowering {
        grammar: ctx.grammar,
        significant: ctx.significant,
        source_len: ctx.source.len(),
        old: ctx.old,
    };
    let mut top = lowering.node(root, None);
    top.start = 0;
    top.end = ctx.source.len();

    for extra in ctx.tokens.iter().filter(|t| t.extra) {
        insert_extra(&mut top, lowering.extra(extra));
    }

    let mut arena = Arena::default();
    arena.flatten(top, None, 0);
    if let Some(limit) = ctx.max_nodes {
        if arena.nodes.len() > limit {
            return Err(ParseError::BudgetExceeded(BudgetKind::Nodes(limit)));
        }
    }

    Ok(SyntaxTree {
        grammar: ctx.grammar.clone(),
        nodes: arena.nodes,
        links: arena.links,
        line_starts: line_starts(ctx.source),
        source_len: ctx.source.len(),
        tokens: ctx.tokens,
        recovery: ctx.recovery,
    })
}

struct Lowering<'a> {
    grammar: &'a Grammar,
    significant: &'a [Token],
    source_len: usize,
    old: Option<&'a SyntaxTree>,
}

impl<'a> Lowering<'a> {
    /// Byte position of a zero-width item at significant token `index`.
    fn position(&self, index: u32) -> usize {
        self.significant
            .get(index as usize)
            .map_or(self.source_len, |t| t.start)
    }

    fn base_flags(&self, kind: KindId) -> NodeFlags {
        let mut flags = NodeFlags::empty();
        if self.grammar.node_kind_is_named(kind) {
            flags |= NodeFlags::NAMED;
        }
        if kind == ERROR_KIND {
            flags |= NodeFlags::ERROR | NodeFlags::HAS_ERROR;
        }
        flags
    }

    fn node(&self, green: &GreenNode, field: Option<FieldId>) -> BuildNode<'a> {
        let children: Vec<_> = green
            .children
            .iter()
            .filter_map(|child| self.child(child))
            .collect();

        let (a, b) = green.tokens;
        let mut range: Option<(usize, usize)> = None;
        let mut widen = |start: usize, end: usize| {
            range = Some(match range {
                Some((s, e)) => (s.min(start), e.max(end)),
                None => (start, end),
            });
        };
        for child in &children {
            widen(child.start, child.end);
        }
        let span = self
            .significant
            .get(a as usize..b as usize)
            .unwrap_or(&[]);
        for token in span.iter().filter(|t| !t.is_empty()) {
            widen(token.start, token.end);
        }
        let (start, end) = range.unwrap_or_else(|| {
            let at = self.position(a);
            (at, at)
        });

        let mut flags = self.base_flags(green.kind);
        if children
            .iter()
            .any(|c| c.flags.contains(NodeFlags::HAS_ERROR))
        {
            flags |= NodeFlags::HAS_ERROR;
        }

        BuildNode {
            kind: green.kind,
            field,
            flags,
            start,
            end,
            rule: green.rule,
            tokens: green.tokens,
            lookahead: green.lookahead,
            content: Content::Children(children),
        }
    }

    fn child(&self, child: &Child) -> Option<BuildNode<'a>> {
        match &child.green {
            Green::Node(node) => Some(self.node(node, child.field)),
            Green::Token(index) => {
                let token = self.significant.get(*index as usize)?;
                if token.kind == ERROR_KIND || !self.grammar.node_kind_is_visible(token.kind) {
                    return None;
                }
                Some(BuildNode {
                    kind: token.kind,
                    field: child.field,
                    flags: self.base_flags(token.kind),
                    start: token.start,
                    end: token.end,
                    rule: None,
                    tokens: (*index, index + 1),
                    lookahead: index + 1,
                    content: Content::Leaf,
                })
            }
            Green::Missing { kind, at } => {
                let pos = self.position(*at);
                let mut flags = self.base_flags(*kind) | NodeFlags::MISSING | NodeFlags::HAS_ERROR;
                flags.remove(NodeFlags::ERROR);
                Some(BuildNode {
                    kind: *kind,
                    field: child.field,
                    flags,
                    start: pos,
                    end: pos,
                    rule: None,
                    tokens: (*at, *at),
                    lookahead: at + 1,
                    content: Content::Leaf,
                })
            }
            Green::Reused(span) => {
                let old = self.old?;
                let data = old.data(span.node);
                Some(BuildNode {
                    kind: data.kind,
                    field: child.field,
                    flags: data.flags,
                    start: span.byte(data.start),
                    end: span.byte(data.end),
                    rule: data.rule,
                    tokens: (span.token(data.tokens.0), span.token(data.tokens.1)),
                    lookahead: span.token(data.lookahead),
                    content: Content::Reused(old, *span),
                })
            }
        }
    }

    fn extra(&self, token: &Token) -> BuildNode<'a> {
        BuildNode {
            kind: token.kind,
            field: None,
            flags: self.base_flags(token.kind) | NodeFlags::EXTRA,
            start: token.start,
            end: token.end,
            rule: None,
            tokens: (0, 0),
            lookahead: 0,
            content: Content::Leaf,
        }
    }
}

/// Place an extra under the deepest node whose range contains it. A reused
/// subtree already holds its own extras.
fn insert_extra<'a>(node: &mut BuildNode<'a>, extra: BuildNode<'a>) {
    let Content::Children(children) = &mut node.content else {
        return;
    };
    let holder = children.iter_mut().find(|c| {
        !c.is_empty()
            && !matches!(c.content, Content::Leaf)
            && c.start <= extra.start
            && extra.end <= c.end
    });
    if let Some(holder) = holder {
        insert_extra(holder, extra);
        return;
    }
    let at = children.partition_point(|c| c.start < extra.end);
    children.insert(at, extra);
}

#[derive(Default)]
struct Arena {
    nodes: Vec<NodeData>,
    links: Vec<NodeId>,
}

impl Arena {
    fn next_id(&self) -> NodeId {
        self.nodes.len() as NodeId
    }

    fn flatten(&mut self, node: BuildNode<'_>, parent: Option<NodeId>, index: u32) -> NodeId {
        let BuildNode {
            kind,
            field,
            flags,
            start,
            end,
            rule,
            tokens,
            lookahead,
            content,
        } = node;
        if let Content::Reused(old, span) = content {
            return self.copy(old, span, field, parent, index);
        }

        let id = self.next_id();
        self.nodes.push(NodeData {
            kind,
            field,
            flags,
            start,
            end,
            parent,
            index,
            children: (0, 0),
            subtree_end: id + 1,
            rule,
            tokens,
            lookahead,
        });

        if let Content::Children(children) = content {
            let offset = self.links.len();
            let count = children.len();
            self.links.resize(offset + count, 0);
            for (i, child) in children.into_iter().enumerate() {
                let child_id = self.flatten(child, Some(id), i as u32);
                self.links[offset + i] = child_id;
            }
            self.nodes[id as usize].children = (offset as u32, count as u32);
        }
        self.nodes[id as usize].subtree_end = self.next_id();
        id
    }

    fn copy(
        &mut self,
        old: &SyntaxTree,
        span: ReusedSpan,
        field: Option<FieldId>,
        parent: Option<NodeId>,
        index: u32,
    ) -> NodeId {
        let first = span.node;
        let last = old.data(first).subtree_end;
        let new_first = self.next_id();
        let offset = i64::from(new_first) - i64::from(first);
        let remap = |id: NodeId| (i64::from(id) + offset) as NodeId;

        for old_id in first..last {
            let data = old.data(old_id);
            let links = old.child_ids(old_id);
            let link_offset = self.links.len() as u32;
            self.links.extend(links.iter().map(|&c| remap(c)));

            let mut copy = data.clone();
            copy.children = (link_offset, links.len() as u32);
            copy.parent = data.parent.map(remap);
            copy.subtree_end = remap(data.subtree_end);
            copy.start = span.byte(data.start);
            copy.end = span.byte(data.end);
            copy.tokens = (span.token(data.tokens.0), span.token(data.tokens.1));
            copy.lookahead = span.token(data.lookahead);
            if old_id == first {
                copy.parent = parent;
                copy.index = index;
                copy.field = field;
            }
            self.nodes.push(copy);
        }
        new_first
    }
}

#[cfg(test)]
mod tests {
    use crate::grammar::builtin_grammar;
    use crate::parser::Parser;

    #[test]
    fn extras_are_placed_by_position() {
        let grammar = builtin_grammar("javascript").unwrap();
        let source = "function f() { // body\n  return 1; }\n// tail\n";
        let tree = Parser::new(grammar).parse(source.as_bytes()).unwrap();
        let root = tree.root();
        let comments: Vec<_> = root
            .descendants()
            .filter(|n| n.is_extra())
            .map(|n| (n.parent().unwrap().kind(), n.text(source)))
            .collect();
        assert_eq!(
            comments,
            vec![("statement_block", "// body"), ("program", "// tail")]
        );
        assert!(!tree.has_error());
    }

    #[test]
    fn children_are_ordered_and_contained() {
        let grammar = builtin_grammar("python").unwrap();
        let source = "x = [1, 2] # c\nif x:\n    f(x, y=2)\n";
        let tree = Parser::new(grammar).parse(source.as_bytes()).unwrap();
        for node in tree.traverse() {
            let mut last = node.start_byte();
            for child in node.children() {
                assert!(child.start_byte() >= last, "{node:?} / {child:?}");
                assert!(child.end_byte() <= node.end_byte());
                last = child.end_byte();
            }
        }
    }
}
