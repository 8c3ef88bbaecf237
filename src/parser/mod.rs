//! Error-tolerant, incremental parsing.
//!
//! ```
//! use arbor::grammar::builtin_grammar;
//! use arbor::Parser;
//!
//! let grammar = builtin_grammar("toy-arith").unwrap();
//! let mut parser = Parser::new(grammar);
//! let tree = parser.parse(b"1 + 2 + 3").unwrap();
//! assert_eq!(tree.root().child_count(), 5);
//! assert!(!tree.has_error());
//! ```

pub(crate) mod engine;
mod errors;
pub(crate) mod lexer;
pub(crate) mod reuse;

pub use errors::{BudgetKind, ParseError};

use crate::edit::InputEdit;
use crate::grammar::Grammar;
use crate::pool;
use crate::tree::{build, BuildContext, SyntaxTree};
use engine::{count_reused, parse_tokens, Budget};
use lexer::Token;
use reuse::ReuseIndex;
use std::time::Duration;
use tracing::{debug, warn};

/// Default for [`ParseOptions::max_depth`]. Fits the default 2 MiB stack
/// of spawned threads in debug builds.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Limits for a single parse. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Rule invocations, summed over all recovery rounds.
    pub max_steps: Option<u64>,
    /// Nodes in the resulting tree.
    pub max_nodes: Option<usize>,
    /// Rule invocations nested inside one another. The parser recurses once
    /// per level, so raising this needs a correspondingly larger stack.
    pub max_depth: usize,
    pub timeout: Option<Duration>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_nodes: None,
            max_depth: DEFAULT_MAX_DEPTH,
            timeout: None,
        }
    }
}

impl ParseOptions {
    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn with_max_nodes(mut self, nodes: usize) -> Self {
        self.max_nodes = Some(nodes);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Counters from the most recent parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseStats {
    pub tokens: usize,
    pub reused_nodes: usize,
    pub recovery_rounds: usize,
    pub steps: u64,
}

/// Parses source with one grammar. Holds no per-parse state between calls
/// other than statistics, so one parser can be reused for many buffers.
#[derive(Debug, Clone)]
pub struct Parser {
    grammar: Grammar,
    options: ParseOptions,
    stats: ParseStats,
}

impl Parser {
    pub fn new(grammar: Grammar) -> Self {
        Self::with_options(grammar, ParseOptions::default())
    }

    pub fn with_options(grammar: Grammar, options: ParseOptions) -> Self {
        Self {
            grammar,
            options,
            stats: ParseStats::default(),
        }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: ParseOptions) {
        self.options = options;
    }

    pub fn last_stats(&self) -> ParseStats {
        self.stats
    }

    /// Parse `source` from scratch. Malformed input still yields a tree;
    /// only an exhausted budget is an error.
    pub fn parse(&mut self, source: &[u8]) -> Result<SyntaxTree, ParseError> {
        self.run(source, None)
    }

    /// Parse `source`, the result of applying `edit` to the text `old` was
    /// parsed from. The tree is identical to what [`Parser::parse`] returns.
    /// Reused subtrees are not re-entered, so a parse that would exceed
    /// [`ParseOptions::max_depth`] from scratch may still succeed here.
    pub fn parse_incremental(
        &mut self,
        source: &[u8],
        old: &SyntaxTree,
        edit: &InputEdit,
    ) -> Result<SyntaxTree, ParseError> {
        if !old.grammar().same_as(&self.grammar) {
            return Err(ParseError::GrammarMismatch {
                expected: self.grammar.name().to_string(),
                found: old.grammar().name().to_string(),
            });
        }
        edit.validate(old.source_len(), source.len())
            .map_err(|reason| ParseError::InvalidEdit { reason })?;
        self.run(source, Some((old, edit)))
    }

    fn run(
        &mut self,
        source: &[u8],
        previous: Option<(&SyntaxTree, &InputEdit)>,
    ) -> Result<SyntaxTree, ParseError> {
        let tokens = lexer::tokenize(&self.grammar, source);
        let significant: Vec<Token> = tokens.iter().filter(|t| !t.extra).copied().collect();
        let index = previous.map(|(old, edit)| ReuseIndex::build(old, &tokens, edit));

        let mut budget = Budget::new(&self.options);
        let outcome = parse_tokens(
            self.grammar.data(),
            &significant,
            index.as_ref(),
            &mut budget,
        )
        .map_err(|err| {
            warn!(grammar = self.grammar.name(), error = %err, "parse aborted");
            err
        })?;

        let reused_nodes = count_reused(&outcome.root);
        self.stats = ParseStats {
            tokens: significant.len(),
            reused_nodes,
            recovery_rounds: outcome.rounds,
            steps: budget.steps,
        };

        let tree = build(
            BuildContext {
                grammar: &self.grammar,
                source,
                tokens,
                significant: &significant,
                old: previous.map(|(old, _)| old),
                recovery: outcome.recovery,
                max_nodes: self.options.max_nodes,
            },
            &outcome.root,
        )
        .map_err(|err| {
            warn!(grammar = self.grammar.name(), error = %err, "parse aborted");
            err
        })?;

        debug!(
            grammar = self.grammar.name(),
            bytes = source.len(),
            tokens = self.stats.tokens,
            nodes = tree.node_count(),
            reused = reused_nodes,
            rounds = self.stats.recovery_rounds,
            steps = self.stats.steps,
            "parsed"
        );
        Ok(tree)
    }
}

/// Parse with this thread's pooled parser for `grammar`.
pub fn parse(grammar: &Grammar, source: &[u8]) -> Result<SyntaxTree, ParseError> {
    pool::with_parser(grammar, |parser| parser.parse(source))
}

/// Incremental form of [`parse`].
pub fn parse_incremental(
    grammar: &Grammar,
    source: &[u8],
    old: &SyntaxTree,
    edit: &InputEdit,
) -> Result<SyntaxTree, ParseError> {
    pool::with_parser(grammar, |parser| parser.parse_incremental(source, old, edit))
}
