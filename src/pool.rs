//! Thread-local parser pooling.
//!
//! Keeps one [`Parser`] per grammar per thread, created on first use. A
//! parser is exclusively owned while it parses, so the pool never shares
//! one across threads.

use crate::grammar::Grammar;
use crate::parser::Parser;
use std::cell::RefCell;
use std::collections::HashMap;

const MAX_POOLED_PARSERS: usize = 64;

thread_local! {
    static PARSERS: RefCell<HashMap<u64, Parser>> = RefCell::new(HashMap::new());
}

/// Execute function with this thread's parser for `grammar`.
///
/// # Example
///
/// ```
/// use arbor::grammar::builtin_grammar;
/// use arbor::pool::with_parser;
///
/// let grammar = builtin_grammar("toy-arith").unwrap();
/// let tree = with_parser(&grammar, |parser| parser.parse(b"1 + 2")).unwrap();
/// assert_eq!(tree.root().kind(), "expr");
/// ```
pub fn with_parser<F, R>(grammar: &Grammar, f: F) -> R
where
    F: FnOnce(&mut Parser) -> R,
{
    // Taken out of the map while in use so `f` may itself use the pool.
    let pooled = PARSERS.with(|cell| cell.borrow_mut().remove(&grammar.fingerprint()));
    let mut parser = match pooled {
        Some(parser) if parser.grammar().same_as(grammar) => parser,
        _ => Parser::new(grammar.clone()),
    };
    let result = f(&mut parser);
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        if parsers.len() >= MAX_POOLED_PARSERS {
            parsers.clear();
        }
        parsers.insert(grammar.fingerprint(), parser);
    });
    result
}

/// Number of parsers pooled on this thread.
pub fn pooled_parsers() -> usize {
    PARSERS.with(|cell| cell.borrow().len())
}

/// Drop this thread's pooled parsers.
pub fn clear_pool() {
    PARSERS.with(|cell| cell.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::builtin_grammar;

    #[test]
    fn one_parser_per_grammar() {
        clear_pool();
        let toy = builtin_grammar("toy-arith").unwrap();
        let python = builtin_grammar("python").unwrap();
        with_parser(&toy, |p| p.parse(b"1").unwrap());
        with_parser(&toy, |p| p.parse(b"2").unwrap());
        assert_eq!(pooled_parsers(), 1);
        with_parser(&python, |p| assert_eq!(p.grammar().name(), "python"));
        assert_eq!(pooled_parsers(), 2);
        clear_pool();
        assert_eq!(pooled_parsers(), 0);
    }

    #[test]
    fn nested_use_does_not_panic() {
        let toy = builtin_grammar("toy-arith").unwrap();
        let count = with_parser(&toy, |outer| {
            let inner = with_parser(&toy, |p| p.parse(b"3").unwrap().node_count());
            outer.parse(b"1+2").unwrap().node_count() + inner
        });
        assert_eq!(count, 6);
    }
}
