//! Grammars: artifact schema, rule notation, validation and the compiled
//! tables the lexer, parser and query compiler run on.
//!
//! A [`Grammar`] is immutable and cheap to clone. Compiling one assigns
//! every node kind a [`KindId`]:
//!
//! - `0` is always `ERROR`
//! - then one kind per rule, in declaration order
//! - then the externals
//! - then anonymous string tokens and inline patterns, as they are met
//!
//! Rule names starting with `_` are hidden: their nodes never appear in a
//! tree and their children are spliced into the parent.

mod builtin;
mod compile;
pub mod errors;
mod loader;
pub mod notation;
pub mod schema;
pub mod version;

pub(crate) use builtin::compile_builtins;
pub use builtin::{builtin_grammar, BUILTIN_ARTIFACTS};
pub use errors::{GrammarLoadError, ValidationError, ValidationIssue};
pub use loader::{load_artifact, load_grammar, load_path};
pub use version::{matches_requirement, VersionError};

use regex::bytes::Regex;
use semver::Version;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Index into a grammar's node kind table.
pub type KindId = u16;
/// Index into a grammar's field name table.
pub type FieldId = u16;
pub(crate) type RuleId = u32;

/// Kind of error nodes and of unrecognized bytes.
pub const ERROR_KIND: KindId = 0;

/// A compiled grammar.
#[derive(Clone)]
pub struct Grammar {
    inner: Arc<GrammarData>,
}

pub(crate) struct GrammarData {
    pub name: String,
    pub version: Version,
    pub fingerprint: u64,
    pub kinds: Vec<KindInfo>,
    pub kind_index: HashMap<(String, bool), KindId>,
    pub fields: Vec<String>,
    pub rules: Vec<SyntaxRule>,
    pub start: RuleId,
    pub lexicon: Lexicon,
    pub first: Vec<KindSet>,
    pub nullable: Vec<bool>,
    pub fields_by_kind: HashMap<KindId, Vec<FieldId>>,
}

#[derive(Debug, Clone)]
pub(crate) struct KindInfo {
    pub name: String,
    pub named: bool,
    pub visible: bool,
    pub sync: bool,
}

/// A syntactic rule compiled against the kind and field tables.
#[derive(Debug, Clone)]
pub(crate) struct SyntaxRule {
    pub name: String,
    pub kind: KindId,
    pub hidden: bool,
    pub body: Rule,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Rule {
    Blank,
    Token(KindId),
    Symbol(RuleId),
    Seq(Vec<Rule>),
    Choice(Vec<Rule>),
    Repeat(Box<Rule>),
    Repeat1(Box<Rule>),
    Optional(Box<Rule>),
    Field(FieldId, Box<Rule>),
}

/// Fixed-size bit set over kind ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KindSet {
    words: Vec<u64>,
}

impl KindSet {
    pub fn new(kinds: usize) -> Self {
        Self {
            words: vec![0; kinds.div_ceil(64)],
        }
    }

    pub fn insert(&mut self, kind: KindId) -> bool {
        let (word, bit) = (usize::from(kind) / 64, usize::from(kind) % 64);
        let before = self.words[word];
        self.words[word] |= 1u64 << bit;
        before != self.words[word]
    }

    pub fn contains(&self, kind: KindId) -> bool {
        let (word, bit) = (usize::from(kind) / 64, usize::from(kind) % 64);
        self.words
            .get(word)
            .is_some_and(|w| *w & (1u64 << bit) != 0)
    }

    /// Adds every member of `other`; reports whether anything changed.
    pub fn union_with(&mut self, other: &KindSet) -> bool {
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            let merged = *a | *b;
            changed |= merged != *a;
            *a = merged;
        }
        changed
    }
}

/// Token recognizers in priority order: string tokens, then patterns, then
/// extras. The longest match wins; ties go to the earlier matcher.
#[derive(Debug, Clone)]
pub(crate) struct Lexicon {
    pub matchers: Vec<TokenMatcher>,
    pub layout: Option<Layout>,
}

#[derive(Debug, Clone)]
pub(crate) struct TokenMatcher {
    pub pattern: TokenPattern,
    /// `None` for anonymous extras, which are skipped.
    pub kind: Option<KindId>,
    pub extra: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum TokenPattern {
    Literal(Vec<u8>),
    /// Anchored with `\A`; run on the remaining input.
    Regex(Regex),
}

impl TokenPattern {
    pub fn match_len(&self, rest: &[u8]) -> Option<usize> {
        match self {
            TokenPattern::Literal(text) => rest.starts_with(text).then_some(text.len()),
            TokenPattern::Regex(re) => re.find(rest).map(|m| m.end()),
        }
    }
}

/// Offside-rule configuration.
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    pub newline: KindId,
    pub indent: KindId,
    pub dedent: KindId,
    pub open: Vec<KindId>,
    pub close: Vec<KindId>,
    pub tab_width: usize,
}

impl Grammar {
    pub(crate) fn from_data(data: GrammarData) -> Self {
        Self {
            inner: Arc::new(data),
        }
    }

    pub(crate) fn data(&self) -> &GrammarData {
        &self.inner
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn version(&self) -> &Version {
        &self.inner.version
    }

    /// xxh3 hash of the grammar name and the artifact bytes it came from.
    pub fn fingerprint(&self) -> u64 {
        self.inner.fingerprint
    }

    /// True if both handles describe the same compiled grammar.
    pub fn same_as(&self, other: &Grammar) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.fingerprint == other.inner.fingerprint
                && self.inner.name == other.inner.name)
    }

    pub fn node_kind_count(&self) -> usize {
        self.inner.kinds.len()
    }

    pub fn node_kind_for_id(&self, id: KindId) -> Option<&str> {
        self.inner
            .kinds
            .get(usize::from(id))
            .map(|k| k.name.as_str())
    }

    /// Look up a kind by name. Named kinds are rule names; anonymous kinds
    /// are the text of string tokens.
    pub fn id_for_node_kind(&self, name: &str, named: bool) -> Option<KindId> {
        self.inner
            .kind_index
            .get(&(name.to_string(), named))
            .copied()
    }

    pub fn node_kind_is_named(&self, id: KindId) -> bool {
        self.inner
            .kinds
            .get(usize::from(id))
            .is_some_and(|k| k.named)
    }

    pub fn node_kind_is_visible(&self, id: KindId) -> bool {
        self.inner
            .kinds
            .get(usize::from(id))
            .is_some_and(|k| k.visible)
    }

    pub fn field_count(&self) -> usize {
        self.inner.fields.len()
    }

    pub fn field_name_for_id(&self, id: FieldId) -> Option<&str> {
        self.inner.fields.get(usize::from(id)).map(String::as_str)
    }

    pub fn field_id_for_name(&self, name: &str) -> Option<FieldId> {
        self.inner
            .fields
            .iter()
            .position(|f| f == name)
            .map(|idx| idx as FieldId)
    }

    /// Fields that nodes of `kind` may carry on their children.
    pub fn fields_for_kind(&self, kind: KindId) -> &[FieldId] {
        self.inner
            .fields_by_kind
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Names of all visible named kinds, for suggestions.
    pub(crate) fn named_kind_names(&self) -> impl Iterator<Item = &str> {
        self.inner
            .kinds
            .iter()
            .filter(|k| k.named && k.visible)
            .map(|k| k.name.as_str())
    }

    pub(crate) fn kind_name(&self, id: KindId) -> &str {
        self.node_kind_for_id(id).unwrap_or("ERROR")
    }
}

/// The candidate closest to `name` by edit distance, if any is within 3 edits.
pub(crate) fn closest_name<'a>(
    name: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    candidates
        .into_iter()
        .filter(|c| *c != name)
        .min_by_key(|c| strsim::levenshtein(name, c))
        .filter(|c| strsim::levenshtein(name, c) <= 3)
        .map(str::to_string)
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("name", &self.inner.name)
            .field("version", &self.inner.version.to_string())
            .field("kinds", &self.inner.kinds.len())
            .field("rules", &self.inner.rules.len())
            .finish()
    }
}
