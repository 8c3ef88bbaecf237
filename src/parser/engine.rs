//! Memoized ordered-choice descent with error recovery.
//!
//! A parse runs in rounds. Round zero is strict. When it fails, the index
//! just past the furthest examined token becomes a recovery point and the
//! parse is re-run; inside a recovering run a sequence that fails at a
//! recovery point may insert a zero-width `MISSING` node or skip tokens into
//! an `ERROR` node, and a repetition may skip tokens. A choice takes its
//! first strict alternative unless a recovering one gets further.
//!
//! Rounds stop when the input is consumed, a point repeats, or
//! [`MAX_RECOVERY_ROUNDS`] is reached. Whatever the start rule left over is
//! then resynchronized at the top level: tokens up to the next position
//! where the start rule matches again become an `ERROR` child of the root,
//! and parsing resumes there.
//!
//! Memo entries record how far each rule invocation looked ahead; that is
//! what makes subtree reuse across edits exact.

use crate::grammar::{FieldId, GrammarData, KindId, Rule, RuleId, ERROR_KIND};
use crate::parser::lexer::Token;
use crate::parser::reuse::ReuseIndex;
use crate::parser::{BudgetKind, ParseError, ParseOptions};
use crate::tree::ReusedSpan;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Each round re-parses the whole input, so errors beyond this many are
/// only recovered at the top level.
pub(crate) const MAX_RECOVERY_ROUNDS: usize = 32;
const TIMEOUT_CHECK_INTERVAL: u64 = 256;

#[derive(Debug, Clone)]
pub(crate) struct GreenNode {
    pub kind: KindId,
    pub rule: Option<RuleId>,
    /// Significant token span `[a, b)`.
    pub tokens: (u32, u32),
    pub lookahead: u32,
    pub children: Vec<Child>,
}

#[derive(Debug, Clone)]
pub(crate) struct Child {
    pub field: Option<FieldId>,
    pub green: Green,
}

#[derive(Debug, Clone)]
pub(crate) enum Green {
    Node(Rc<GreenNode>),
    /// Index into the significant tokens.
    Token(u32),
    Missing {
        kind: KindId,
        at: u32,
    },
    Reused(ReusedSpan),
}

impl Child {
    fn new(green: Green) -> Self {
        Self { field: None, green }
    }

    fn is_error(&self) -> bool {
        matches!(&self.green, Green::Node(node) if node.kind == ERROR_KIND)
    }
}

fn error_child(from: u32, to: u32) -> Child {
    Child::new(Green::Node(Rc::new(GreenNode {
        kind: ERROR_KIND,
        rule: None,
        tokens: (from, to),
        lookahead: to,
        children: (from..to).map(|i| Child::new(Green::Token(i))).collect(),
    })))
}

/// Step, depth and time limits for one parse.
pub(crate) struct Budget {
    max_steps: Option<u64>,
    max_depth: usize,
    timeout: Option<Duration>,
    started: Instant,
    pub steps: u64,
}

impl Budget {
    pub fn new(options: &ParseOptions) -> Self {
        Self {
            max_steps: options.max_steps,
            max_depth: options.max_depth,
            timeout: options.timeout,
            started: Instant::now(),
            steps: 0,
        }
    }

    fn enter(&self, depth: usize) -> Result<(), ParseError> {
        if depth > self.max_depth {
            return Err(ParseError::BudgetExceeded(BudgetKind::Depth(
                self.max_depth,
            )));
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<(), ParseError> {
        self.steps += 1;
        if let Some(limit) = self.max_steps {
            if self.steps > limit {
                return Err(ParseError::BudgetExceeded(BudgetKind::Steps(limit)));
            }
        }
        if self.steps % TIMEOUT_CHECK_INTERVAL == 0 {
            if let Some(limit) = self.timeout {
                if self.started.elapsed() >= limit {
                    return Err(ParseError::BudgetExceeded(BudgetKind::Timeout(limit)));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct Outcome {
    pub root: GreenNode,
    pub recovery: Vec<u32>,
    pub rounds: usize,
}

/// Parse the significant tokens with the grammar's start rule.
pub(crate) fn parse_tokens(
    grammar: &GrammarData,
    tokens: &[Token],
    reuse: Option<&ReuseIndex>,
    budget: &mut Budget,
) -> Result<Outcome, ParseError> {
    let n = tokens.len() as u32;
    let mut recovery = BTreeSet::new();
    let mut rounds = 0;

    loop {
        let mut run = Run {
            grammar,
            tokens,
            recovery: &recovery,
            reuse,
            budget: &mut *budget,
            memo: HashMap::new(),
            peek: 0,
            peek_max: 0,
            depth: 0,
        };
        let recovering = !recovery.is_empty();
        let result = run.symbol(grammar.start, 0, recovering)?;
        let peek_max = run.peek_max;

        let root = result.and_then(|(end, parsed)| match parsed {
            Parsed::Fresh(node) => Some((end, node)),
            Parsed::Reused(_) => None,
        });
        if let Some((end, node)) = &root {
            if *end == n {
                return Ok(Outcome {
                    root: GreenNode::clone(node),
                    recovery: recovery.into_iter().collect(),
                    rounds,
                });
            }
        }

        let failure = peek_max.saturating_sub(1).min(n);
        if recovery.contains(&failure) || rounds >= MAX_RECOVERY_ROUNDS {
            debug!(rounds, failure, "recovery exhausted, resynchronizing at top level");
            let root = run.resync(root)?;
            return Ok(Outcome {
                root,
                recovery: recovery.into_iter().collect(),
                rounds,
            });
        }
        recovery.insert(failure);
        rounds += 1;
        trace!(round = rounds, failure, "re-parsing with recovery");
    }
}

/// Kind reported for a `MISSING` node standing in for `rule`.
fn missing_kind(grammar: &GrammarData, rule: &Rule) -> KindId {
    match rule {
        Rule::Blank => ERROR_KIND,
        Rule::Token(kind) => *kind,
        Rule::Symbol(id) => grammar.rules[*id as usize].kind,
        Rule::Seq(members) | Rule::Choice(members) => members
            .first()
            .map_or(ERROR_KIND, |m| missing_kind(grammar, m)),
        Rule::Repeat(inner)
        | Rule::Repeat1(inner)
        | Rule::Optional(inner)
        | Rule::Field(_, inner) => missing_kind(grammar, inner),
    }
}

#[derive(Debug, Clone)]
enum Parsed {
    Fresh(Rc<GreenNode>),
    Reused(ReusedSpan),
}

struct Memo {
    result: Option<(u32, Parsed)>,
    peek: u32,
}

type Step = Result<Option<u32>, ParseError>;

struct Run<'a> {
    grammar: &'a GrammarData,
    tokens: &'a [Token],
    recovery: &'a BTreeSet<u32>,
    reuse: Option<&'a ReuseIndex>,
    budget: &'a mut Budget,
    memo: HashMap<(RuleId, u32, bool), Memo>,
    /// One past the furthest token examined by the current invocation.
    peek: u32,
    peek_max: u32,
    /// Nested `symbol` calls.
    depth: usize,
}

impl<'a> Run<'a> {
    fn len(&self) -> u32 {
        self.tokens.len() as u32
    }

    fn kind_at(&self, pos: u32) -> Option<KindId> {
        self.tokens.get(pos as usize).map(|t| t.kind)
    }

    fn bump(&mut self, peek: u32) {
        self.peek = self.peek.max(peek);
        self.peek_max = self.peek_max.max(peek);
    }

    fn examine(&mut self, pos: u32) {
        self.bump(pos + 1);
    }

    /// Any recovery point in `[from, to)`.
    fn hits(&self, from: u32, to: u32) -> bool {
        from < to && self.recovery.range(from..to).next().is_some()
    }

    fn is_sync(&self, pos: u32) -> bool {
        self.kind_at(pos)
            .and_then(|k| self.grammar.kinds.get(usize::from(k)))
            .is_some_and(|k| k.sync)
    }

    /// First synchronizing token at or after `pos`, or the end of input.
    fn sync_from(&self, pos: u32) -> u32 {
        (pos..self.len())
            .find(|&p| self.is_sync(p))
            .unwrap_or(self.len())
    }

    /// Evaluate with a fresh lookahead window; returns the window end too.
    fn eval_local(
        &mut self,
        rule: &Rule,
        pos: u32,
        recovering: bool,
        out: &mut Vec<Child>,
    ) -> Result<(Option<u32>, u32), ParseError> {
        let saved = self.peek;
        self.peek = pos;
        let result = self.eval(rule, pos, recovering, out)?;
        let local = self.peek;
        self.peek = saved.max(local);
        Ok((result, local))
    }

    fn probe(&mut self, rule: &Rule, pos: u32) -> Result<Option<(u32, Vec<Child>)>, ParseError> {
        let mut scratch = Vec::new();
        Ok(self
            .eval(rule, pos, false, &mut scratch)?
            .map(|end| (end, scratch)))
    }

    fn missing(&self, rule: &Rule, at: u32) -> Child {
        let field = match rule {
            Rule::Field(field, _) => Some(*field),
            _ => None,
        };
        Child {
            field,
            green: Green::Missing {
                kind: missing_kind(self.grammar, rule),
                at,
            },
        }
    }

    /// Evaluate `rule` at `pos`, appending children to `out`. On failure
    /// `out` is left as it was.
    fn eval(&mut self, rule: &Rule, pos: u32, recovering: bool, out: &mut Vec<Child>) -> Step {
        match rule {
            Rule::Blank => Ok(Some(pos)),
            Rule::Token(kind) => {
                self.examine(pos);
                if self.kind_at(pos) == Some(*kind) {
                    out.push(Child::new(Green::Token(pos)));
                    Ok(Some(pos + 1))
                } else {
                    Ok(None)
                }
            }
            Rule::Symbol(id) => self.symbol_into(*id, pos, recovering, out),
            Rule::Seq(members) => self.seq(members, pos, recovering, out),
            Rule::Choice(alternatives) => self.choice(alternatives, pos, recovering, out),
            Rule::Repeat(item) => self.repeat(item, pos, recovering, out, 0),
            Rule::Repeat1(item) => self.repeat(item, pos, recovering, out, 1),
            Rule::Optional(inner) => {
                let mark = out.len();
                match self.eval(inner, pos, recovering, out)? {
                    Some(end) => Ok(Some(end)),
                    None => {
                        out.truncate(mark);
                        Ok(Some(pos))
                    }
                }
            }
            Rule::Field(field, inner) => {
                let mark = out.len();
                let result = self.eval(inner, pos, recovering, out)?;
                if result.is_some() {
                    for child in &mut out[mark..] {
                        if child.field.is_none() && !child.is_error() {
                            child.field = Some(*field);
                        }
                    }
                }
                Ok(result)
            }
        }
    }

    /// Ordered choice. While recovering, the first recovering alternative
    /// replaces the first strict one only if it ends further on.
    fn choice(
        &mut self,
        alternatives: &[Rule],
        pos: u32,
        recovering: bool,
        out: &mut Vec<Child>,
    ) -> Step {
        let mark = out.len();
        let mut strict = None;
        for alternative in alternatives {
            if let Some(end) = self.eval(alternative, pos, false, out)? {
                strict = Some(end);
                break;
            }
            out.truncate(mark);
        }
        if !recovering {
            return Ok(strict);
        }

        let mut recovered = Vec::new();
        for alternative in alternatives {
            if let Some(end) = self.eval(alternative, pos, true, &mut recovered)? {
                if strict.map_or(true, |s| end > s) {
                    out.truncate(mark);
                    out.append(&mut recovered);
                    return Ok(Some(end));
                }
                break;
            }
            recovered.clear();
        }
        Ok(strict)
    }

    fn seq(&mut self, members: &[Rule], start: u32, recovering: bool, out: &mut Vec<Child>) -> Step {
        let mark = out.len();
        let mut pos = start;
        for (k, member) in members.iter().enumerate() {
            let (result, local) = self.eval_local(member, pos, recovering, out)?;
            if let Some(end) = result {
                pos = end;
                continue;
            }
            if !(recovering && pos > start && self.hits(pos, local)) {
                out.truncate(mark);
                return Ok(None);
            }

            if let Some(next) = members.get(k + 1) {
                if self.probe(next, pos)?.is_some() {
                    out.push(self.missing(member, pos));
                    continue;
                }
            }
            let limit = self.sync_from(pos);
            let mut resumed = None;
            for g in pos + 1..=limit {
                if let Some(found) = self.probe(member, g)? {
                    resumed = Some((g, found));
                    break;
                }
            }
            match resumed {
                Some((g, (end, children))) => {
                    out.push(error_child(pos, g));
                    out.extend(children);
                    pos = end;
                }
                None => out.push(self.missing(member, pos)),
            }
        }
        Ok(Some(pos))
    }

    fn repeat(
        &mut self,
        item: &Rule,
        start: u32,
        recovering: bool,
        out: &mut Vec<Child>,
        min: usize,
    ) -> Step {
        let mark = out.len();
        let mut pos = start;
        let mut count = 0;
        let mut skipped = false;
        loop {
            let iteration = out.len();
            let (result, local) = self.eval_local(item, pos, recovering, out)?;
            match result {
                Some(end) if end > pos => {
                    pos = end;
                    count += 1;
                }
                Some(_) => {
                    out.truncate(iteration);
                    count += 1;
                    break;
                }
                None => {
                    if recovering && pos < self.len() && !self.is_sync(pos) && self.hits(pos, local) {
                        let end = self.skip_end(item, pos)?;
                        out.push(error_child(pos, end));
                        pos = end;
                        skipped = true;
                        continue;
                    }
                    break;
                }
            }
        }
        if count < min && !skipped {
            out.truncate(mark);
            return Ok(None);
        }
        Ok(Some(pos))
    }

    /// Where skipping stops: before a synchronizing token or a position
    /// where `item` parses again.
    fn skip_end(&mut self, item: &Rule, pos: u32) -> Result<u32, ParseError> {
        for g in pos + 1..self.len() {
            if self.is_sync(g) || self.probe(item, g)?.is_some() {
                return Ok(g);
            }
        }
        Ok(self.len())
    }

    fn symbol_into(&mut self, id: RuleId, pos: u32, recovering: bool, out: &mut Vec<Child>) -> Step {
        let grammar = self.grammar;
        let index = id as usize;
        let may_recover = recovering && self.recovery.range(pos..).next().is_some();
        if !grammar.nullable[index] && !may_recover {
            self.examine(pos);
            let viable = self
                .kind_at(pos)
                .is_some_and(|kind| grammar.first[index].contains(kind));
            if !viable {
                return Ok(None);
            }
        }

        let Some((end, parsed)) = self.symbol(id, pos, recovering)? else {
            return Ok(None);
        };
        match parsed {
            Parsed::Fresh(node) if grammar.rules[index].hidden => {
                out.extend(node.children.iter().cloned());
            }
            Parsed::Fresh(node) => out.push(Child::new(Green::Node(node))),
            Parsed::Reused(span) => out.push(Child::new(Green::Reused(span))),
        }
        Ok(Some(end))
    }

    fn symbol(
        &mut self,
        id: RuleId,
        pos: u32,
        recovering: bool,
    ) -> Result<Option<(u32, Parsed)>, ParseError> {
        let key = (id, pos, recovering);
        if let Some(memo) = self.memo.get(&key) {
            let peek = memo.peek;
            let result = memo.result.clone();
            self.bump(peek);
            return Ok(result);
        }

        if let Some(found) = self.reused(id, pos) {
            return Ok(Some(found));
        }

        self.budget.tick()?;
        self.budget.enter(self.depth + 1)?;
        let grammar = self.grammar;
        let rule = &grammar.rules[id as usize];
        let saved = self.peek;
        self.peek = pos;
        let mut children = Vec::new();
        self.depth += 1;
        let result = self.eval(&rule.body, pos, recovering, &mut children);
        self.depth -= 1;
        let result = result?;
        if result == Some(pos) && !rule.hidden {
            self.examine(pos);
        }
        let local = self.peek;
        self.peek = saved.max(local);

        let result = result.map(|end| {
            let node = GreenNode {
                kind: rule.kind,
                rule: Some(id),
                tokens: (pos, end),
                lookahead: local,
                children,
            };
            (end, Parsed::Fresh(Rc::new(node)))
        });
        self.memo.insert(
            key,
            Memo {
                result: result.clone(),
                peek: local,
            },
        );
        Ok(result)
    }

    /// Finish the root after the last round. Tokens the start rule did not
    /// reach are skipped up to the next position where it strictly matches
    /// a non-empty span again, repeatedly, until the input is consumed.
    fn resync(&mut self, parsed: Option<(u32, Rc<GreenNode>)>) -> Result<GreenNode, ParseError> {
        let grammar = self.grammar;
        let start = &grammar.rules[grammar.start as usize];
        let n = self.len();
        let (mut children, mut pos) = match parsed {
            Some((end, node)) => (node.children.clone(), end),
            None => (Vec::new(), 0),
        };

        while pos < n {
            let mut resumed = None;
            for g in pos + 1..n {
                if let Some((end, Parsed::Fresh(node))) =
                    self.symbol(grammar.start, g, false)?
                {
                    if end > g {
                        resumed = Some((g, end, node));
                        break;
                    }
                }
            }
            match resumed {
                Some((g, end, node)) => {
                    trace!(from = pos, to = g, "skipped tokens at top level");
                    children.push(error_child(pos, g));
                    children.extend(node.children.iter().cloned());
                    pos = end;
                }
                None => {
                    children.push(error_child(pos, n));
                    pos = n;
                }
            }
        }

        if children.is_empty() {
            children.push(Child::new(Green::Missing {
                kind: missing_kind(grammar, &start.body),
                at: 0,
            }));
        }
        Ok(GreenNode {
            kind: start.kind,
            rule: Some(grammar.start),
            tokens: (0, n),
            lookahead: n + 1,
            children,
        })
    }

    fn reused(&mut self, id: RuleId, pos: u32) -> Option<(u32, Parsed)> {
        if id == self.grammar.start {
            return None;
        }
        let entry = self.reuse?.lookup(id, pos)?;
        if self.hits(pos, entry.lookahead) {
            return None;
        }
        self.bump(entry.lookahead);
        Some((entry.end, Parsed::Reused(entry.span)))
    }
}

/// Number of subtrees copied from a previous tree.
pub(crate) fn count_reused(node: &GreenNode) -> usize {
    node.children
        .iter()
        .map(|child| match &child.green {
            Green::Node(inner) => count_reused(inner),
            Green::Reused(_) => 1,
            _ => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::builtin_grammar;
    use crate::parser::lexer::tokenize;

    fn significant(grammar: &crate::grammar::Grammar, source: &str) -> Vec<Token> {
        tokenize(grammar, source.as_bytes())
            .into_iter()
            .filter(|t| !t.extra)
            .collect()
    }

    #[test]
    fn strict_parse_needs_no_recovery() {
        let grammar = builtin_grammar("toy-arith").unwrap();
        let tokens = significant(&grammar, "1 + 2 + 3");
        let mut budget = Budget::new(&ParseOptions::default());
        let outcome = parse_tokens(grammar.data(), &tokens, None, &mut budget).unwrap();
        assert_eq!(outcome.rounds, 0);
        assert!(outcome.recovery.is_empty());
        assert_eq!(outcome.root.tokens, (0, 5));
        assert_eq!(outcome.root.children.len(), 5);
    }

    #[test]
    fn recovery_records_failure_points() {
        let grammar = builtin_grammar("toy-arith").unwrap();
        let tokens = significant(&grammar, "1 + + 2");
        let mut budget = Budget::new(&ParseOptions::default());
        let outcome = parse_tokens(grammar.data(), &tokens, None, &mut budget).unwrap();
        assert!(outcome.rounds > 0);
        assert!(outcome.recovery.contains(&2));
        assert_eq!(outcome.root.tokens, (0, 4));
    }

    #[test]
    fn step_budget_aborts() {
        let grammar = builtin_grammar("python").unwrap();
        let tokens = significant(&grammar, "x = f(1, 2, 3)\n");
        let options = ParseOptions {
            max_steps: Some(3),
            ..ParseOptions::default()
        };
        let mut budget = Budget::new(&options);
        let err = parse_tokens(grammar.data(), &tokens, None, &mut budget).unwrap_err();
        assert_eq!(err, ParseError::BudgetExceeded(BudgetKind::Steps(3)));
    }

    #[test]
    fn depth_budget_counts_rule_invocations() {
        let grammar = builtin_grammar("toy-arith").unwrap();
        let tokens = significant(&grammar, "1 + 2");
        let mut budget = Budget::new(&ParseOptions::default().with_max_depth(0));
        let err = parse_tokens(grammar.data(), &tokens, None, &mut budget).unwrap_err();
        assert_eq!(err, ParseError::BudgetExceeded(BudgetKind::Depth(0)));

        let mut budget = Budget::new(&ParseOptions::default().with_max_depth(1));
        assert!(parse_tokens(grammar.data(), &tokens, None, &mut budget).is_ok());
    }

    #[test]
    fn choice_prefers_longer_recovering_alternative() {
        let grammar = builtin_grammar("python").unwrap();
        let tokens = significant(&grammar, "x = = 1\n");
        let mut budget = Budget::new(&ParseOptions::default());
        let outcome = parse_tokens(grammar.data(), &tokens, None, &mut budget).unwrap();
        assert_eq!(outcome.root.tokens, (0, tokens.len() as u32));
        // One statement: the assignment absorbed the stray `=`.
        assert_eq!(outcome.root.children.len(), 2);
    }

    #[test]
    fn leftover_after_round_limit_is_resynchronized() {
        let grammar = builtin_grammar("toy-arith").unwrap();
        let source = (0..=40).map(|i| i.to_string()).collect::<Vec<_>>().join(" + + ");
        let tokens = significant(&grammar, &source);
        let mut budget = Budget::new(&ParseOptions::default());
        let outcome = parse_tokens(grammar.data(), &tokens, None, &mut budget).unwrap();
        assert_eq!(outcome.rounds, MAX_RECOVERY_ROUNDS);
        assert_eq!(outcome.root.tokens, (0, tokens.len() as u32));

        let number = grammar.id_for_node_kind("NUMBER", true).unwrap();
        let numbers = outcome
            .root
            .children
            .iter()
            .filter(|c| matches!(c.green, Green::Token(i) if tokens[i as usize].kind == number))
            .count();
        assert_eq!(numbers, 41);
        let errors = outcome.root.children.iter().filter(|c| c.is_error()).count();
        assert!(errors > 0 && errors <= 41 - MAX_RECOVERY_ROUNDS);
    }

    #[test]
    fn missing_kind_prefers_first_leaf() {
        let grammar = builtin_grammar("toy-arith").unwrap();
        let data = grammar.data();
        let number = grammar.id_for_node_kind("NUMBER", true).unwrap();
        assert_eq!(missing_kind(data, &data.rules[data.start as usize].body), number);
        assert_eq!(missing_kind(data, &Rule::Blank), ERROR_KIND);
    }
}
