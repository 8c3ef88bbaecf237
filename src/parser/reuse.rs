//! Which subtrees of a previous tree survive an edit.
//!
//! The old and new token streams are compared from both ends. A node can be
//! copied when every token it examined, lookahead included, lies in the
//! unchanged prefix or the unchanged suffix, and nothing in that window was
//! a recovery point.

use crate::edit::InputEdit;
use crate::grammar::RuleId;
use crate::parser::lexer::Token;
use crate::tree::{NodeFlags, ReusedSpan, SyntaxTree};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReuseEntry {
    pub span: ReusedSpan,
    /// Significant token index after the node, in new coordinates.
    pub end: u32,
    pub lookahead: u32,
}

#[derive(Debug, Default)]
pub(crate) struct ReuseIndex {
    entries: HashMap<(RuleId, u32), ReuseEntry>,
}

fn significant(tokens: &[Token]) -> u32 {
    tokens.iter().filter(|t| !t.extra).count() as u32
}

impl ReuseIndex {
    pub fn build(old: &SyntaxTree, new_tokens: &[Token], edit: &InputEdit) -> Self {
        let old_tokens = &old.tokens;
        let prefix_len = old_tokens
            .iter()
            .zip(new_tokens)
            .take_while(|(o, n)| o == n && o.end <= edit.start_byte)
            .count();
        let room = old_tokens.len().min(new_tokens.len()) - prefix_len;
        let suffix_len = old_tokens
            .iter()
            .rev()
            .zip(new_tokens.iter().rev())
            .take(room)
            .take_while(|(o, n)| {
                o.start >= edit.old_end_byte
                    && Token {
                        start: edit.shift(o.start),
                        end: edit.shift(o.end),
                        ..**o
                    } == **n
            })
            .count();

        let old_n = significant(old_tokens);
        let new_n = significant(new_tokens);
        let prefix = significant(&old_tokens[..prefix_len]);
        let suffix = significant(&old_tokens[old_tokens.len() - suffix_len..]);
        // The end of input counts as part of a prefix that covers everything.
        let prefix_limit = if prefix == old_n && old_n == new_n {
            prefix + 1
        } else {
            prefix
        };
        let suffix_start = old_n - suffix;
        let token_shift = i64::from(new_n) - i64::from(old_n);

        let mut entries = HashMap::new();
        let start_rule = old.grammar.data().start;
        for (id, data) in old.nodes.iter().enumerate() {
            let Some(rule) = data.rule else {
                continue;
            };
            if rule == start_rule
                || data
                    .flags
                    .intersects(NodeFlags::ERROR | NodeFlags::MISSING | NodeFlags::HAS_ERROR)
            {
                continue;
            }
            let (a, b) = data.tokens;
            let lookahead = data.lookahead;
            let recovered = old
                .recovery
                .get(old.recovery.partition_point(|&r| r < a))
                .is_some_and(|&r| r < lookahead);
            if recovered {
                continue;
            }

            let entry = if lookahead <= prefix_limit && data.end <= edit.start_byte {
                Some((
                    a,
                    ReuseEntry {
                        span: ReusedSpan {
                            node: id as u32,
                            byte_shift: 0,
                            token_shift: 0,
                        },
                        end: b,
                        lookahead,
                    },
                ))
            } else if a >= suffix_start && data.start >= edit.old_end_byte {
                let shift = |t: u32| (i64::from(t) + token_shift) as u32;
                Some((
                    shift(a),
                    ReuseEntry {
                        span: ReusedSpan {
                            node: id as u32,
                            byte_shift: edit.delta(),
                            token_shift,
                        },
                        end: shift(b),
                        lookahead: shift(lookahead),
                    },
                ))
            } else {
                None
            };
            if let Some((start, entry)) = entry {
                entries.entry((rule, start)).or_insert(entry);
            }
        }

        debug!(
            prefix,
            suffix,
            candidates = entries.len(),
            "computed reuse windows"
        );
        Self { entries }
    }

    pub fn lookup(&self, rule: RuleId, start: u32) -> Option<ReuseEntry> {
        self.entries.get(&(rule, start)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::builtin_grammar;
    use crate::parser::lexer::tokenize;
    use crate::parser::Parser;

    #[test]
    fn windows_around_an_edit() {
        let grammar = builtin_grammar("python").unwrap();
        let old_src = "a = 1\nb = 2\nc = 3\n";
        let new_src = "a = 1\nb = 22\nc = 3\n";
        let old = Parser::new(grammar.clone()).parse(old_src.as_bytes()).unwrap();
        let edit = InputEdit::new(10, 11, 12);
        let index = ReuseIndex::build(&old, &tokenize(&grammar, new_src.as_bytes()), &edit);
        assert!(!index.entries.is_empty());
        for (&(_, start), entry) in &index.entries {
            // Inside `a = 1 NEWLINE b =`, or inside `NEWLINE c = 3 NEWLINE` and shifted.
            assert!(
                entry.lookahead <= 6 || (start >= 7 && entry.span.byte_shift == 1),
                "{entry:?} at {start}"
            );
        }
        assert!(index.entries.values().any(|e| e.span.byte_shift == 1));
    }

    #[test]
    fn nodes_touching_the_edit_are_not_candidates() {
        let grammar = builtin_grammar("toy-arith").unwrap();
        let old = Parser::new(grammar.clone()).parse(b"1+2").unwrap();
        let edit = InputEdit::new(0, 3, 3);
        let index = ReuseIndex::build(&old, &tokenize(&grammar, b"4+5"), &edit);
        assert!(index.entries.is_empty());
        assert_eq!(index.lookup(0, 0), None);
    }
}
