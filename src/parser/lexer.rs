//! Byte-wise longest-match tokenizer with an optional offside-rule pass.

use crate::grammar::{Grammar, KindId, Layout, ERROR_KIND};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Token {
    pub kind: KindId,
    pub start: usize,
    pub end: usize,
    /// Named extras (comments and the like) sit between significant tokens.
    pub extra: bool,
}

impl Token {
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Split `source` into tokens, extras included, in position order.
///
/// Bytes no matcher accepts become one-character `ERROR` tokens. When the
/// grammar has a layout, zero-width newline/indent/dedent tokens are
/// inserted between significant tokens.
pub(crate) fn tokenize(grammar: &Grammar, source: &[u8]) -> Vec<Token> {
    let lexicon = &grammar.data().lexicon;
    let mut tokens = Vec::new();
    let mut joins = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        if lexicon.layout.is_some() && source[pos] == b'\\' {
            let rest = &source[pos + 1..];
            let skip = if rest.starts_with(b"\n") {
                Some(1)
            } else if rest.starts_with(b"\r\n") {
                Some(2)
            } else {
                None
            };
            if let Some(skip) = skip {
                joins.push(pos + skip);
                pos += skip + 1;
                continue;
            }
        }

        let rest = &source[pos..];
        let mut best: Option<(usize, Option<KindId>, bool)> = None;
        for matcher in &lexicon.matchers {
            if let Some(len) = matcher.pattern.match_len(rest) {
                if len > 0 && best.map_or(true, |(best_len, _, _)| len > best_len) {
                    best = Some((len, matcher.kind, matcher.extra));
                }
            }
        }

        match best {
            Some((len, kind, extra)) => {
                if let Some(kind) = kind {
                    tokens.push(Token {
                        kind,
                        start: pos,
                        end: pos + len,
                        extra,
                    });
                }
                pos += len;
            }
            None => {
                let len = utf8_len(source[pos]).min(source.len() - pos);
                tokens.push(Token {
                    kind: ERROR_KIND,
                    start: pos,
                    end: pos + len,
                    extra: false,
                });
                pos += len;
            }
        }
    }

    match &lexicon.layout {
        Some(layout) => apply_layout(layout, source, tokens, &joins),
        None => tokens,
    }
}

fn utf8_len(lead: u8) -> usize {
    match lead {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

fn layout_token(kind: KindId, at: usize) -> Token {
    Token {
        kind,
        start: at,
        end: at,
        extra: false,
    }
}

/// True if a line break that is not a `\` continuation lies in `from..to`.
fn breaks_line(source: &[u8], from: usize, to: usize, joins: &[usize]) -> bool {
    source[from..to]
        .iter()
        .enumerate()
        .any(|(offset, &b)| b == b'\n' && joins.binary_search(&(from + offset)).is_err())
}

fn column(source: &[u8], pos: usize, tab_width: usize) -> usize {
    let line_start = source[..pos]
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |idx| idx + 1);
    source[line_start..pos].iter().fold(0, |col, &b| match b {
        b'\t' => (col / tab_width + 1) * tab_width,
        0x0c => 0,
        _ => col + 1,
    })
}

/// Marks the bracket tokens among `significant` that have a partner of the
/// same pair. Unbalanced brackets are left unmarked.
fn matched_brackets(layout: &Layout, significant: &[Token]) -> Vec<bool> {
    let mut matched = vec![false; significant.len()];
    let mut open: Vec<(usize, usize)> = Vec::new();
    for (i, tok) in significant.iter().enumerate() {
        if let Some(pair) = layout.open.iter().position(|&k| k == tok.kind) {
            open.push((i, pair));
        } else if let Some(pair) = layout.close.iter().position(|&k| k == tok.kind) {
            if let Some(at) = open.iter().rposition(|&(_, p)| p == pair) {
                matched[open[at].0] = true;
                matched[i] = true;
                open.truncate(at);
            }
        }
    }
    matched
}

fn apply_layout(layout: &Layout, source: &[u8], tokens: Vec<Token>, joins: &[usize]) -> Vec<Token> {
    let significant: Vec<Token> = tokens.iter().filter(|t| !t.extra).copied().collect();
    let matched = matched_brackets(layout, &significant);
    let mut inserted = Vec::new();
    let mut stack = vec![0usize];
    let mut depth = 0usize;
    let mut prev: Option<Token> = None;

    for (i, tok) in significant.iter().enumerate() {
        match prev {
            None => {
                let col = column(source, tok.start, layout.tab_width);
                if col > 0 {
                    stack.push(col);
                    inserted.push(layout_token(layout.indent, tok.start));
                }
            }
            Some(p) => {
                if depth == 0 && breaks_line(source, p.end, tok.start, joins) {
                    inserted.push(layout_token(layout.newline, p.end));
                    let col = column(source, tok.start, layout.tab_width);
                    let top = stack.last().copied().unwrap_or(0);
                    if col > top {
                        stack.push(col);
                        inserted.push(layout_token(layout.indent, tok.start));
                    } else {
                        while stack.len() > 1 && col < stack.last().copied().unwrap_or(0) {
                            stack.pop();
                            inserted.push(layout_token(layout.dedent, tok.start));
                        }
                    }
                }
            }
        }
        if matched[i] {
            if layout.open.contains(&tok.kind) {
                depth += 1;
            } else {
                depth = depth.saturating_sub(1);
            }
        }
        prev = Some(*tok);
    }

    if let Some(last) = prev {
        inserted.push(layout_token(layout.newline, last.end));
        for _ in 1..stack.len() {
            inserted.push(layout_token(layout.dedent, last.end));
        }
    }

    let mut merged = Vec::with_capacity(tokens.len() + inserted.len());
    let mut pending = inserted.into_iter().peekable();
    for tok in tokens {
        while let Some(layout_tok) = pending.next_if(|l| l.start <= tok.start) {
            merged.push(layout_tok);
        }
        merged.push(tok);
    }
    merged.extend(pending);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::builtin_grammar;

    fn kinds(grammar: &Grammar, source: &str) -> Vec<String> {
        tokenize(grammar, source.as_bytes())
            .iter()
            .map(|t| grammar.kind_name(t.kind).to_string())
            .collect()
    }

    #[test]
    fn longest_match_and_literal_priority() {
        let grammar = builtin_grammar("python").unwrap();
        assert_eq!(
            kinds(&grammar, "def define <= 1.5"),
            vec!["def", "identifier", "<=", "float", "_newline"]
        );
    }

    #[test]
    fn unknown_bytes_become_error_tokens() {
        let grammar = builtin_grammar("toy-arith").unwrap();
        let tokens = tokenize(&grammar, "1 ? é".as_bytes());
        let spans: Vec<_> = tokens.iter().map(|t| (t.kind, t.start, t.end)).collect();
        let number = grammar.id_for_node_kind("NUMBER", true).unwrap();
        assert_eq!(
            spans,
            vec![(number, 0, 1), (ERROR_KIND, 2, 3), (ERROR_KIND, 4, 6)]
        );
    }

    #[test]
    fn named_extras_are_kept() {
        let grammar = builtin_grammar("javascript").unwrap();
        let tokens = tokenize(&grammar, "x // note\n".as_bytes());
        assert_eq!(tokens.len(), 2);
        assert!(tokens[1].extra);
        assert_eq!(grammar.kind_name(tokens[1].kind), "comment");
    }

    #[test]
    fn layout_tokens_follow_indentation() {
        let grammar = builtin_grammar("python").unwrap();
        let source = "if x:\n    y\nz\n";
        assert_eq!(
            kinds(&grammar, source),
            vec![
                "if", "identifier", ":", "_newline", "_indent", "identifier", "_newline",
                "_dedent", "identifier", "_newline"
            ]
        );
    }

    #[test]
    fn layout_ignores_breaks_inside_brackets_and_continuations() {
        let grammar = builtin_grammar("python").unwrap();
        assert_eq!(
            kinds(&grammar, "f(a,\n  b)\nx = 1 + \\\n  2\n"),
            vec![
                "identifier", "(", "identifier", ",", "identifier", ")", "_newline",
                "identifier", "=", "integer", "+", "integer", "_newline"
            ]
        );
    }

    #[test]
    fn unclosed_bracket_keeps_layout() {
        let grammar = builtin_grammar("python").unwrap();
        assert_eq!(
            kinds(&grammar, "def a(:\n    pass\nb\n"),
            vec![
                "def", "identifier", "(", ":", "_newline", "_indent", "pass", "_newline",
                "_dedent", "identifier", "_newline"
            ]
        );
        // A stray closer does not end an enclosing pair.
        assert_eq!(
            kinds(&grammar, "f(a ]\n  b)\n"),
            vec!["identifier", "(", "identifier", "]", "identifier", ")", "_newline"]
        );
    }

    #[test]
    fn layout_closes_open_blocks_at_end() {
        let grammar = builtin_grammar("python").unwrap();
        let tokens = tokenize(&grammar, "def f():\n  if x:\n    pass".as_bytes());
        let tail: Vec<_> = tokens[tokens.len() - 3..]
            .iter()
            .map(|t| (grammar.kind_name(t.kind).to_string(), t.start, t.end))
            .collect();
        assert_eq!(
            tail,
            vec![
                ("_newline".to_string(), 25, 25),
                ("_dedent".to_string(), 25, 25),
                ("_dedent".to_string(), 25, 25),
            ]
        );
    }

    #[test]
    fn newline_precedes_trailing_comment() {
        let grammar = builtin_grammar("python").unwrap();
        let tokens = tokenize(&grammar, "x # c\ny".as_bytes());
        let names: Vec<_> = tokens.iter().map(|t| grammar.kind_name(t.kind)).collect();
        assert_eq!(
            names,
            vec!["identifier", "_newline", "comment", "identifier", "_newline"]
        );
        assert_eq!((tokens[1].start, tokens[1].end), (1, 1));
    }
}
