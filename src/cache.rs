//! Thread-local cache of compiled queries.
//!
//! Cache is capped at 256 entries; when full it is cleared and refilled on
//! demand.

use crate::grammar::Grammar;
use crate::query::{Query, QueryError};
use std::cell::RefCell;
use std::collections::HashMap;

const MAX_CACHE_ENTRIES: usize = 256;

thread_local! {
    // Keyed by grammar fingerprint: the same source means different things
    // in different grammars.
    static QUERY_CACHE: RefCell<HashMap<(u64, String), Query>> =
        RefCell::new(HashMap::new());
}

/// Get a compiled query from cache, or compile and cache it.
///
/// Failed compilations are not cached.
///
/// ```
/// use arbor::cache::{cache_size, get_or_compile};
/// use arbor::grammar::builtin_grammar;
///
/// let grammar = builtin_grammar("python").unwrap();
/// let query = get_or_compile(&grammar, "(identifier) @id").unwrap();
/// assert_eq!(query.capture_names(), ["id"]);
/// assert!(cache_size() >= 1);
/// ```
pub fn get_or_compile(grammar: &Grammar, source: &str) -> Result<Query, QueryError> {
    let key = (grammar.fingerprint(), source.to_string());

    let cached = QUERY_CACHE.with(|cache| {
        cache
            .borrow()
            .get(&key)
            .filter(|q| q.grammar().same_as(grammar))
            .cloned()
    });
    if let Some(query) = cached {
        return Ok(query);
    }

    let compiled = Query::new(grammar, source)?;
    QUERY_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }
        cache.insert(key, compiled.clone());
    });
    Ok(compiled)
}

/// Clear the query cache (mainly for testing).
pub fn clear_cache() {
    QUERY_CACHE.with(|cache| {
        cache.borrow_mut().clear();
    });
}

/// Number of cached queries on this thread.
pub fn cache_size() -> usize {
    QUERY_CACHE.with(|cache| cache.borrow().len())
}
