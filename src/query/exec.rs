//! Matching compiled patterns against a tree.
//!
//! Child patterns match a subsequence of the children: other siblings may
//! sit between them unless an anchor forbids it. Every distinct way a
//! pattern can match is reported as its own match.

use crate::query::compile::{Matcher, Pattern, PatternNode};
use crate::query::syntax::Quantifier;
use crate::query::{Query, QueryCapture, QueryMatch};
use crate::tree::{Node, NodeData, NodeFlags, NodeId, SyntaxTree};
use std::collections::VecDeque;
use std::ops::Range;
use tracing::warn;

type Captures = Vec<(u32, NodeId)>;

fn push_unique(out: &mut Vec<Captures>, captures: Captures) {
    if !out.contains(&captures) {
        out.push(captures);
    }
}

struct Matching<'t> {
    tree: &'t SyntaxTree,
    source: &'t [u8],
}

impl Matching<'_> {
    /// Distinct capture lists of `pattern` rooted at `id`, predicates applied.
    fn pattern_at(&self, pattern: &Pattern, id: NodeId) -> Vec<Captures> {
        let mut found = self.node(&pattern.root, id);
        if !pattern.predicates.is_empty() {
            found.retain(|captures| {
                pattern
                    .predicates
                    .iter()
                    .all(|p| p.holds(captures, self.tree, self.source))
            });
        }
        found
    }

    fn accepts(matcher: &Matcher, data: &NodeData) -> bool {
        let missing = data.flags.contains(NodeFlags::MISSING);
        match matcher {
            Matcher::Kind(kind) | Matcher::Anonymous(kind) => !missing && data.kind == *kind,
            Matcher::AnyNamed => data.flags.contains(NodeFlags::NAMED),
            Matcher::Any => true,
            Matcher::Missing(kind) => missing && kind.map_or(true, |k| data.kind == k),
            Matcher::Alternation(_) => false,
        }
    }

    /// Children that anchors may not skip over.
    fn significant(&self, id: NodeId) -> bool {
        let flags = self.tree.data(id).flags;
        flags.contains(NodeFlags::NAMED) && !flags.contains(NodeFlags::EXTRA)
    }

    fn node(&self, pattern: &PatternNode, id: NodeId) -> Vec<Captures> {
        let data = self.tree.data(id);
        if pattern.field.is_some() && data.field != pattern.field {
            return Vec::new();
        }

        let inner = match &pattern.matcher {
            Matcher::Alternation(alternatives) => {
                let mut all = Vec::new();
                for alternative in alternatives {
                    for captures in self.node(alternative, id) {
                        push_unique(&mut all, captures);
                    }
                }
                all
            }
            matcher => {
                if !Self::accepts(matcher, data) {
                    return Vec::new();
                }
                let children = self.tree.child_ids(id);
                let negated = pattern.negated_fields.iter().any(|field| {
                    children
                        .iter()
                        .any(|&c| self.tree.data(c).field == Some(*field))
                });
                if negated {
                    return Vec::new();
                }
                if pattern.children.is_empty() && !pattern.anchor_end {
                    vec![Vec::new()]
                } else {
                    let mut out = Vec::new();
                    let mut acc = Vec::new();
                    self.sequence(
                        &pattern.children,
                        pattern.anchor_end,
                        children,
                        0,
                        false,
                        &mut acc,
                        &mut out,
                    );
                    out
                }
            }
        };

        if pattern.captures.is_empty() {
            return inner;
        }
        inner
            .into_iter()
            .map(|captures| {
                pattern
                    .captures
                    .iter()
                    .map(|&c| (c, id))
                    .chain(captures)
                    .collect()
            })
            .collect()
    }

    /// Match `items` against `children[from..]`. `carry` is set when a
    /// skipped optional item passed its anchor on to the next one.
    #[allow(clippy::too_many_arguments)]
    fn sequence(
        &self,
        items: &[PatternNode],
        anchor_end: bool,
        children: &[NodeId],
        from: usize,
        carry: bool,
        acc: &mut Captures,
        out: &mut Vec<Captures>,
    ) {
        let Some((item, rest)) = items.split_first() else {
            let trailing = children[from..].iter().any(|&c| self.significant(c));
            if !anchor_end || !trailing {
                push_unique(out, acc.clone());
            }
            return;
        };

        let anchored = item.anchored || carry;
        let limit = if anchored {
            children[from..]
                .iter()
                .position(|&c| self.significant(c))
                .map_or(children.len(), |p| from + p + 1)
        } else {
            children.len()
        };

        match item.quantifier {
            Quantifier::One => {
                self.single(item, rest, anchor_end, children, from..limit, acc, out);
            }
            Quantifier::ZeroOrOne => {
                let mut found = Vec::new();
                self.single(item, rest, anchor_end, children, from..limit, acc, &mut found);
                if found.is_empty() {
                    self.sequence(rest, anchor_end, children, from, anchored, acc, &mut found);
                }
                for captures in found {
                    push_unique(out, captures);
                }
            }
            Quantifier::ZeroOrMore | Quantifier::OneOrMore => {
                let min = usize::from(item.quantifier == Quantifier::OneOrMore);
                let mut repeats: Vec<(usize, Captures)> = Vec::new();
                for (j, &child) in children.iter().enumerate().skip(from) {
                    if repeats.is_empty() && j >= limit {
                        break;
                    }
                    if let Some(captures) = self.node(item, child).into_iter().next() {
                        repeats.push((j, captures));
                    }
                }
                // Longest repetition that lets the rest of the pattern match.
                for count in (min..=repeats.len()).rev() {
                    let mark = acc.len();
                    for (_, captures) in &repeats[..count] {
                        acc.extend_from_slice(captures);
                    }
                    let next = match count {
                        0 => from,
                        _ => repeats[count - 1].0 + 1,
                    };
                    let mut found = Vec::new();
                    let carry = count == 0 && anchored;
                    self.sequence(rest, anchor_end, children, next, carry, acc, &mut found);
                    acc.truncate(mark);
                    if !found.is_empty() {
                        for captures in found {
                            push_unique(out, captures);
                        }
                        break;
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn single(
        &self,
        item: &PatternNode,
        rest: &[PatternNode],
        anchor_end: bool,
        children: &[NodeId],
        candidates: Range<usize>,
        acc: &mut Captures,
        out: &mut Vec<Captures>,
    ) {
        for j in candidates {
            for captures in self.node(item, children[j]) {
                let mark = acc.len();
                acc.extend(captures);
                self.sequence(rest, anchor_end, children, j + 1, false, acc, out);
                acc.truncate(mark);
            }
        }
    }
}

fn overlaps(data: &NodeData, range: &Range<usize>) -> bool {
    if data.start == data.end || range.start == range.end {
        range.start <= data.end && data.start <= range.end
    } else {
        data.start < range.end && range.start < data.end
    }
}

/// Execution settings for a query.
///
/// ```
/// use arbor::grammar::builtin_grammar;
/// use arbor::{Parser, Query, QueryCursor};
///
/// let grammar = builtin_grammar("toy-arith").unwrap();
/// let source = b"1 + 2 + 3";
/// let tree = Parser::new(grammar.clone()).parse(source).unwrap();
/// let query = Query::new(&grammar, "(NUMBER) @n").unwrap();
///
/// let mut cursor = QueryCursor::new();
/// cursor.set_byte_range(2..6);
/// let texts: Vec<_> = cursor
///     .captures(&query, &tree, source)
///     .map(|c| c.node.utf8_text(source).unwrap())
///     .collect();
/// assert_eq!(texts, ["2"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryCursor {
    byte_range: Option<Range<usize>>,
    match_limit: Option<usize>,
}

impl QueryCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only report matches whose root node overlaps `range`.
    pub fn set_byte_range(&mut self, range: Range<usize>) -> &mut Self {
        self.byte_range = Some(range);
        self
    }

    /// Stop after `limit` matches.
    pub fn set_match_limit(&mut self, limit: usize) -> &mut Self {
        self.match_limit = Some(limit);
        self
    }

    pub fn byte_range(&self) -> Option<Range<usize>> {
        self.byte_range.clone()
    }

    pub fn match_limit(&self) -> Option<usize> {
        self.match_limit
    }

    pub fn matches<'q, 't>(
        &self,
        query: &'q Query,
        tree: &'t SyntaxTree,
        source: &'t [u8],
    ) -> QueryMatches<'q, 't> {
        let end = if tree.grammar().same_as(query.grammar()) {
            tree.data(0).subtree_end
        } else {
            warn!(
                query = query.grammar().name(),
                tree = tree.grammar().name(),
                "query and tree use different grammars"
            );
            0
        };
        QueryMatches {
            query,
            tree,
            source,
            next: 0,
            end,
            byte_range: self.byte_range.clone(),
            remaining: self.match_limit,
            pending: VecDeque::new(),
        }
    }

    pub fn captures<'q, 't>(
        &self,
        query: &'q Query,
        tree: &'t SyntaxTree,
        source: &'t [u8],
    ) -> QueryCaptures<'q, 't> {
        QueryCaptures {
            matches: self.matches(query, tree, source),
            current: Vec::new().into_iter(),
        }
    }
}

/// Lazy sequence of matches, in pre-order of the matched node and then in
/// pattern order. Cloning yields an independent iterator at the same point.
#[derive(Clone)]
pub struct QueryMatches<'q, 't> {
    query: &'q Query,
    tree: &'t SyntaxTree,
    source: &'t [u8],
    next: NodeId,
    end: NodeId,
    byte_range: Option<Range<usize>>,
    remaining: Option<usize>,
    pending: VecDeque<QueryMatch<'t>>,
}

impl<'t> Iterator for QueryMatches<'_, 't> {
    type Item = QueryMatch<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining == Some(0) {
                return None;
            }
            if let Some(found) = self.pending.pop_front() {
                if let Some(remaining) = &mut self.remaining {
                    *remaining -= 1;
                }
                return Some(found);
            }
            if self.next >= self.end {
                return None;
            }

            let id = self.next;
            let data = self.tree.data(id);
            if let Some(range) = &self.byte_range {
                if !overlaps(data, range) {
                    self.next = data.subtree_end;
                    continue;
                }
            }
            self.next += 1;

            let matching = Matching {
                tree: self.tree,
                source: self.source,
            };
            for (index, pattern) in self.query.patterns().iter().enumerate() {
                for captures in matching.pattern_at(pattern, id) {
                    self.pending.push_back(QueryMatch {
                        pattern_index: index,
                        captures: captures
                            .into_iter()
                            .map(|(capture, node)| QueryCapture {
                                node: Node::new(self.tree, node),
                                index: capture,
                            })
                            .collect(),
                    });
                }
            }
        }
    }
}

/// Captures of every match, flattened in match order.
#[derive(Clone)]
pub struct QueryCaptures<'q, 't> {
    matches: QueryMatches<'q, 't>,
    current: std::vec::IntoIter<QueryCapture<'t>>,
}

impl<'t> Iterator for QueryCaptures<'_, 't> {
    type Item = QueryCapture<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(capture) = self.current.next() {
                return Some(capture);
            }
            self.current = self.matches.next()?.captures.into_iter();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::builtin_grammar;
    use crate::parser::Parser;

    fn texts(query: &Query, tree: &SyntaxTree, source: &str) -> Vec<String> {
        query
            .captures(tree, source.as_bytes())
            .map(|c| format!("{}={}", c.name(query), c.node.text(source)))
            .collect()
    }

    fn python(source: &str) -> (Query, SyntaxTree) {
        let grammar = builtin_grammar("python").unwrap();
        let tree = Parser::new(grammar.clone()).parse(source.as_bytes()).unwrap();
        (Query::new(&grammar, "(identifier) @id").unwrap(), tree)
    }

    #[test]
    fn loose_children_report_each_match() {
        let source = "f(a, b)\n";
        let (_, tree) = python(source);
        let query = Query::new(tree.grammar(), "(argument_list (identifier) @arg)").unwrap();
        assert_eq!(
            texts(&query, &tree, source),
            ["arg=a", "arg=b"]
        );
    }

    #[test]
    fn anchors_pin_first_and_last_children() {
        let source = "f(a, b, c)\n";
        let (_, tree) = python(source);
        let first = Query::new(tree.grammar(), "(argument_list . (identifier) @x)").unwrap();
        assert_eq!(texts(&first, &tree, source), ["x=a"]);
        let last = Query::new(tree.grammar(), "(argument_list (identifier) @x .)").unwrap();
        assert_eq!(texts(&last, &tree, source), ["x=c"]);
        let pair = Query::new(tree.grammar(), "(argument_list (identifier) @x . (identifier) @y)")
            .unwrap();
        assert_eq!(pair.matches(&tree, source.as_bytes()).count(), 2);
    }

    #[test]
    fn quantifiers_are_greedy() {
        let source = "f(a, b, c)\n";
        let (_, tree) = python(source);
        let all = Query::new(tree.grammar(), "(argument_list (identifier)* @ids)").unwrap();
        let matches: Vec<_> = all.matches(&tree, source.as_bytes()).collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].captures.len(), 3);

        let optional = Query::new(
            tree.grammar(),
            "(call function: (identifier) @f arguments: (argument_list (integer)? @n))",
        )
        .unwrap();
        let matches: Vec<_> = optional.matches(&tree, source.as_bytes()).collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].captures.len(), 1);

        let plus = Query::new(tree.grammar(), "(argument_list (integer)+)").unwrap();
        assert_eq!(plus.matches(&tree, source.as_bytes()).count(), 0);
    }

    #[test]
    fn fields_alternations_and_negation() {
        let source = "x = 1\ny += 2\nprint(z)\n";
        let (_, tree) = python(source);
        let query = Query::new(
            tree.grammar(),
            "[(assignment left: (identifier) @target) (augmented_assignment left: (_) @target)]",
        )
        .unwrap();
        assert_eq!(texts(&query, &tree, source), ["target=x", "target=y"]);

        let negated = Query::new(tree.grammar(), "(call !arguments) @c").unwrap();
        assert_eq!(negated.matches(&tree, source.as_bytes()).count(), 0);
    }

    #[test]
    fn predicates_filter_matches() {
        let source = "def main():\n    pass\n\ndef _helper():\n    pass\n";
        let (_, tree) = python(source);
        let grammar = tree.grammar();
        let eq = Query::new(
            grammar,
            r#"((function_definition name: (identifier) @name) (#eq? @name "main"))"#,
        )
        .unwrap();
        assert_eq!(texts(&eq, &tree, source), ["name=main"]);

        let private = Query::new(
            grammar,
            r#"((identifier) @name (#match? @name "^_"))"#,
        )
        .unwrap();
        assert_eq!(texts(&private, &tree, source), ["name=_helper"]);

        let any = Query::new(grammar, r#"((identifier) @n (#any-of? @n "main" "other"))"#).unwrap();
        assert_eq!(any.matches(&tree, source.as_bytes()).count(), 1);
        let not = Query::new(grammar, r#"((identifier) @n (#not-eq? @n "main"))"#).unwrap();
        assert_eq!(not.matches(&tree, source.as_bytes()).count(), 1);
    }

    #[test]
    fn error_and_missing_nodes_are_queryable() {
        let source = "def f(:";
        let (_, tree) = python(source);
        let missing = Query::new(tree.grammar(), "(MISSING \")\") @m").unwrap();
        let found: Vec<_> = missing.captures(&tree, source.as_bytes()).collect();
        assert_eq!(found.len(), 1);
        assert!(found[0].node.is_missing());
        let any_missing = Query::new(tree.grammar(), "(MISSING) @m").unwrap();
        assert!(any_missing.captures(&tree, source.as_bytes()).count() >= 1);
        // Missing nodes never satisfy a plain kind pattern.
        let paren = Query::new(tree.grammar(), "(parameters \")\" @p)").unwrap();
        assert_eq!(paren.matches(&tree, source.as_bytes()).count(), 0);
    }

    #[test]
    fn byte_range_and_limit() {
        let source = "a = b\nc = d\n";
        let (ids, tree) = python(source);
        let mut cursor = QueryCursor::new();
        cursor.set_byte_range(6..11);
        let found: Vec<_> = cursor
            .captures(&ids, &tree, source.as_bytes())
            .map(|c| c.node.text(source))
            .collect();
        assert_eq!(found, ["c", "d"]);

        let mut cursor = QueryCursor::new();
        cursor.set_match_limit(3);
        assert_eq!(cursor.matches(&ids, &tree, source.as_bytes()).count(), 3);
    }

    #[test]
    fn clones_restart_independently() {
        let source = "a = b\n";
        let (ids, tree) = python(source);
        let mut first = ids.captures(&tree, source.as_bytes());
        let head = first.next().unwrap();
        let resumed = first.clone();
        assert_eq!(
            first.map(|c| c.node).collect::<Vec<_>>(),
            resumed.map(|c| c.node).collect::<Vec<_>>()
        );
        assert_eq!(head.node.text(source), "a");
    }

    #[test]
    fn foreign_trees_yield_nothing() {
        let toy = builtin_grammar("toy-arith").unwrap();
        let tree = Parser::new(toy).parse(b"1").unwrap();
        let (ids, _) = python("x\n");
        assert_eq!(ids.matches(&tree, b"1").count(), 0);
    }
}
