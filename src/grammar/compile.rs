//! Turns a [`GrammarDef`] into the tables of a [`Grammar`].
//!
//! Validation collects every issue before failing, so one load reports all
//! problems of an artifact.

use crate::grammar::errors::{GrammarLoadError, ValidationError, ValidationIssue};
use crate::grammar::notation;
use crate::grammar::schema::{GrammarDef, RuleDef, RuleSource, SUPPORTED_ABI};
use crate::grammar::{
    FieldId, Grammar, GrammarData, KindId, KindInfo, KindSet, Layout, Lexicon, Rule, RuleId,
    SyntaxRule, TokenMatcher, TokenPattern, ERROR_KIND,
};
use regex::bytes::Regex;
use semver::Version;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy)]
enum RuleRef {
    Syntax(RuleId),
    Token(KindId),
}

struct PendingPattern {
    kind: KindId,
    source: String,
    rule: String,
}

struct Compiler {
    issues: Vec<ValidationIssue>,
    kinds: Vec<KindInfo>,
    kind_index: HashMap<(String, bool), KindId>,
    fields: Vec<String>,
    rule_index: HashMap<String, RuleRef>,
    literal_kinds: HashMap<String, KindId>,
    pattern_kinds: HashMap<String, KindId>,
    literals: Vec<(KindId, String)>,
    patterns: Vec<PendingPattern>,
    externals: HashSet<KindId>,
}

impl Compiler {
    fn new() -> Self {
        let mut compiler = Self {
            issues: Vec::new(),
            kinds: Vec::new(),
            kind_index: HashMap::new(),
            fields: Vec::new(),
            rule_index: HashMap::new(),
            literal_kinds: HashMap::new(),
            pattern_kinds: HashMap::new(),
            literals: Vec::new(),
            patterns: Vec::new(),
            externals: HashSet::new(),
        };
        let error = compiler.add_kind("ERROR", true, true);
        debug_assert_eq!(error, ERROR_KIND);
        compiler
    }

    fn add_kind(&mut self, name: &str, named: bool, visible: bool) -> KindId {
        let id = self.kinds.len() as KindId;
        self.kinds.push(KindInfo {
            name: name.to_string(),
            named,
            visible,
            sync: false,
        });
        self.kind_index
            .entry((name.to_string(), named))
            .or_insert(id);
        id
    }

    fn field(&mut self, name: &str) -> FieldId {
        match self.fields.iter().position(|f| f == name) {
            Some(idx) => idx as FieldId,
            None => {
                self.fields.push(name.to_string());
                (self.fields.len() - 1) as FieldId
            }
        }
    }

    fn literal(&mut self, text: &str) -> KindId {
        if let Some(&kind) = self.literal_kinds.get(text) {
            return kind;
        }
        let kind = self.add_kind(text, false, true);
        self.literal_kinds.insert(text.to_string(), kind);
        self.literals.push((kind, text.to_string()));
        kind
    }

    fn inline_pattern(&mut self, source: String, rule: &str) -> KindId {
        if let Some(&kind) = self.pattern_kinds.get(&source) {
            return kind;
        }
        let kind = self.add_kind(&format!("/{source}/"), false, false);
        self.pattern_kinds.insert(source.clone(), kind);
        self.patterns.push(PendingPattern {
            kind,
            source,
            rule: rule.to_string(),
        });
        kind
    }

    /// Flattens a token rule into one regex.
    fn token_regex(&mut self, def: &RuleDef, rule: &str) -> String {
        match def {
            RuleDef::Blank => String::new(),
            RuleDef::String { value } => regex::escape(value),
            RuleDef::Pattern { value } => format!("(?:{value})"),
            RuleDef::Seq { members } => members
                .iter()
                .map(|m| self.token_regex(m, rule))
                .collect(),
            RuleDef::Choice { members } => {
                let alts: Vec<_> = members
                    .iter()
                    .map(|m| self.token_regex(m, rule))
                    .collect();
                format!("(?:{})", alts.join("|"))
            }
            RuleDef::Repeat { content } => format!("(?:{})*", self.token_regex(content, rule)),
            RuleDef::Repeat1 { content } => format!("(?:{})+", self.token_regex(content, rule)),
            RuleDef::Optional { content } => format!("(?:{})?", self.token_regex(content, rule)),
            RuleDef::Field { content, .. }
            | RuleDef::Token { content }
            | RuleDef::Prec { content } => self.token_regex(content, rule),
            RuleDef::Symbol { name } => {
                self.issues.push(ValidationIssue::SymbolInToken {
                    rule: rule.to_string(),
                    symbol: name.clone(),
                });
                String::new()
            }
        }
    }

    fn lower(&mut self, def: &RuleDef, rule: &str) -> Rule {
        match def {
            RuleDef::Blank => Rule::Blank,
            RuleDef::String { value } => Rule::Token(self.literal(value)),
            RuleDef::Pattern { value } => Rule::Token(self.inline_pattern(value.clone(), rule)),
            RuleDef::Token { content } => {
                let source = self.token_regex(content, rule);
                Rule::Token(self.inline_pattern(source, rule))
            }
            RuleDef::Symbol { name } => match self.rule_index.get(name) {
                Some(RuleRef::Syntax(id)) => Rule::Symbol(*id),
                Some(RuleRef::Token(kind)) => Rule::Token(*kind),
                None => {
                    self.issues.push(ValidationIssue::UnknownSymbol {
                        rule: rule.to_string(),
                        symbol: name.clone(),
                    });
                    Rule::Blank
                }
            },
            RuleDef::Seq { members } => {
                Rule::Seq(members.iter().map(|m| self.lower(m, rule)).collect())
            }
            RuleDef::Choice { members } => {
                Rule::Choice(members.iter().map(|m| self.lower(m, rule)).collect())
            }
            RuleDef::Repeat { content } => Rule::Repeat(Box::new(self.lower(content, rule))),
            RuleDef::Repeat1 { content } => Rule::Repeat1(Box::new(self.lower(content, rule))),
            RuleDef::Optional { content } => Rule::Optional(Box::new(self.lower(content, rule))),
            RuleDef::Field { name, content } => {
                let field = self.field(name);
                Rule::Field(field, Box::new(self.lower(content, rule)))
            }
            RuleDef::Prec { content } => self.lower(content, rule),
        }
    }

    fn compile_regex(&mut self, source: &str, rule: &str) -> Option<Regex> {
        match Regex::new(&format!(r"\A(?:{source})")) {
            Ok(re) => {
                if re.is_match(b"") {
                    self.issues.push(ValidationIssue::EmptyMatch {
                        rule: rule.to_string(),
                        pattern: source.to_string(),
                    });
                    None
                } else {
                    Some(re)
                }
            }
            Err(err) => {
                self.issues.push(ValidationIssue::InvalidPattern {
                    rule: rule.to_string(),
                    pattern: source.to_string(),
                    message: err.to_string(),
                });
                None
            }
        }
    }

    fn external_kind(&mut self, name: &str) -> Option<KindId> {
        match self.rule_index.get(name) {
            Some(RuleRef::Token(kind)) if self.externals.contains(kind) => Some(*kind),
            _ => {
                self.issues.push(ValidationIssue::UnknownLayoutKind {
                    name: name.to_string(),
                });
                None
            }
        }
    }
}

fn parse_rule(grammar: &str, rule: &str, source: RuleSource) -> Result<RuleDef, GrammarLoadError> {
    match source {
        RuleSource::Tree(def) => Ok(def),
        RuleSource::Notation(text) => {
            notation::parse(&text).map_err(|err| GrammarLoadError::Notation {
                grammar: grammar.to_string(),
                rule: rule.to_string(),
                offset: err.offset,
                message: err.message,
            })
        }
    }
}

/// Compile and validate one grammar definition.
pub(crate) fn compile(def: GrammarDef, fingerprint: u64) -> Result<Grammar, GrammarLoadError> {
    let grammar_name = def.name.clone();
    let mut c = Compiler::new();

    if def.name.trim().is_empty() {
        c.issues.push(ValidationIssue::EmptyName);
    }
    let version = match Version::parse(&def.version) {
        Ok(version) => version,
        Err(err) => {
            c.issues.push(ValidationIssue::InvalidVersion {
                version: def.version.clone(),
                message: err.to_string(),
            });
            Version::new(0, 0, 0)
        }
    };
    if def.abi != SUPPORTED_ABI {
        c.issues.push(ValidationIssue::UnsupportedAbi {
            found: def.abi,
            supported: SUPPORTED_ABI,
        });
    }

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for (name, source) in def.rules.entries {
        let rule = parse_rule(&grammar_name, &name, source)?;
        if !seen.insert(name.clone()) {
            c.issues.push(ValidationIssue::DuplicateRule { name });
            continue;
        }
        entries.push((name, rule));
    }
    let mut extras = Vec::new();
    for text in &def.extras {
        let rule = parse_rule(&grammar_name, "extras", RuleSource::Notation(text.clone()))?;
        extras.push((text.clone(), rule));
    }

    if entries.is_empty() {
        c.issues.push(ValidationIssue::EmptyRuleSet);
        return Err(GrammarLoadError::Validation {
            path: None,
            grammar: grammar_name,
            source: ValidationError { issues: c.issues },
        });
    }

    // Kinds for every rule, then externals.
    let mut syntax: Vec<(String, KindId, bool, RuleDef)> = Vec::new();
    let mut lexical: Vec<(String, KindId, RuleDef)> = Vec::new();
    for (name, rule) in &entries {
        let hidden = name.starts_with('_');
        let kind = c.add_kind(name, true, !hidden);
        if rule.is_lexical() {
            c.rule_index.insert(name.clone(), RuleRef::Token(kind));
            lexical.push((name.clone(), kind, rule.unwrap_prec().clone()));
        } else {
            c.rule_index
                .insert(name.clone(), RuleRef::Syntax(syntax.len() as RuleId));
            syntax.push((name.clone(), kind, hidden, rule.clone()));
        }
    }
    for name in &def.externals {
        if c.rule_index.contains_key(name) {
            c.issues.push(ValidationIssue::DuplicateRule { name: name.clone() });
            continue;
        }
        let kind = c.add_kind(name, true, false);
        c.externals.insert(kind);
        c.rule_index.insert(name.clone(), RuleRef::Token(kind));
    }

    let (start_name, start_rule) = &entries[0];
    if start_name.starts_with('_') {
        c.issues.push(ValidationIssue::HiddenStartRule {
            rule: start_name.clone(),
        });
    }
    if start_rule.is_lexical() {
        c.issues.push(ValidationIssue::LexicalStartRule {
            rule: start_name.clone(),
        });
    }

    // Token rules claim their literal text before anonymous uses do.
    for (name, kind, rule) in &lexical {
        match rule {
            RuleDef::String { value } => {
                if !c.literal_kinds.contains_key(value) {
                    c.literal_kinds.insert(value.clone(), *kind);
                }
                c.literals.push((*kind, value.clone()));
            }
            RuleDef::Pattern { value } => c.patterns.push(PendingPattern {
                kind: *kind,
                source: value.clone(),
                rule: name.clone(),
            }),
            RuleDef::Token { content } => {
                let source = c.token_regex(content, name);
                c.patterns.push(PendingPattern {
                    kind: *kind,
                    source,
                    rule: name.clone(),
                });
            }
            _ => {}
        }
    }

    let rules: Vec<SyntaxRule> = syntax
        .iter()
        .map(|(name, kind, hidden, def)| SyntaxRule {
            name: name.clone(),
            kind: *kind,
            hidden: *hidden,
            body: c.lower(def, name),
        })
        .collect();

    // Extras: anonymous ones are skipped, named ones stay in the tree.
    let mut extra_kinds = HashSet::new();
    let mut anonymous_extras = Vec::new();
    for (text, def) in &extras {
        match def.unwrap_prec() {
            RuleDef::String { value } => {
                anonymous_extras.push(TokenPattern::Literal(value.as_bytes().to_vec()))
            }
            RuleDef::Pattern { value } => {
                if let Some(re) = c.compile_regex(value, "extras") {
                    anonymous_extras.push(TokenPattern::Regex(re));
                }
            }
            RuleDef::Symbol { name } => match c.rule_index.get(name) {
                Some(RuleRef::Token(kind)) if !c.externals.contains(kind) => {
                    extra_kinds.insert(*kind);
                }
                _ => c.issues.push(ValidationIssue::InvalidExtra {
                    extra: text.clone(),
                }),
            },
            _ => c.issues.push(ValidationIssue::InvalidExtra {
                extra: text.clone(),
            }),
        }
    }

    let mut matchers = Vec::new();
    for (kind, text) in std::mem::take(&mut c.literals) {
        matchers.push(TokenMatcher {
            pattern: TokenPattern::Literal(text.into_bytes()),
            kind: Some(kind),
            extra: extra_kinds.contains(&kind),
        });
    }
    for pending in std::mem::take(&mut c.patterns) {
        if let Some(re) = c.compile_regex(&pending.source, &pending.rule) {
            matchers.push(TokenMatcher {
                pattern: TokenPattern::Regex(re),
                kind: Some(pending.kind),
                extra: extra_kinds.contains(&pending.kind),
            });
        }
    }
    for pattern in anonymous_extras {
        matchers.push(TokenMatcher {
            pattern,
            kind: None,
            extra: true,
        });
    }

    let layout = def.layout.as_ref().and_then(|layout| {
        let newline = c.external_kind(&layout.newline);
        let indent = c.external_kind(&layout.indent);
        let dedent = c.external_kind(&layout.dedent);
        let mut open = Vec::new();
        let mut close = Vec::new();
        for [o, cl] in &layout.brackets {
            for (text, out) in [(o, &mut open), (cl, &mut close)] {
                match c.literal_kinds.get(text) {
                    Some(&kind) => out.push(kind),
                    None => c.issues.push(ValidationIssue::UnknownBracket { text: text.clone() }),
                }
            }
        }
        Some(Layout {
            newline: newline?,
            indent: indent?,
            dedent: dedent?,
            open,
            close,
            tab_width: layout.tab_width.max(1),
        })
    });
    if let Some(layout) = &layout {
        for kind in [layout.newline, layout.indent, layout.dedent] {
            c.kinds[usize::from(kind)].sync = true;
        }
    }
    for name in &def.sync {
        let kind = c
            .kind_index
            .get(&(name.clone(), true))
            .copied()
            .or_else(|| c.literal_kinds.get(name).copied());
        match kind {
            Some(kind) => c.kinds[usize::from(kind)].sync = true,
            None => c.issues.push(ValidationIssue::UnknownSyncKind { name: name.clone() }),
        }
    }

    let (nullable, first) = analyze(&rules, c.kinds.len());
    for cycle in left_recursion(&rules, &nullable, &first, c.kinds.len()) {
        c.issues.push(ValidationIssue::LeftRecursion {
            cycle: cycle
                .into_iter()
                .map(|id| rules[id as usize].name.clone())
                .collect(),
        });
    }

    if !c.issues.is_empty() {
        return Err(GrammarLoadError::Validation {
            path: None,
            grammar: grammar_name,
            source: ValidationError { issues: c.issues },
        });
    }

    let fields_by_kind = fields_by_kind(&rules);
    let start = match c.rule_index.get(start_name) {
        Some(RuleRef::Syntax(id)) => *id,
        _ => 0,
    };

    Ok(Grammar::from_data(GrammarData {
        name: grammar_name,
        version,
        fingerprint,
        kinds: c.kinds,
        kind_index: c.kind_index,
        fields: c.fields,
        rules,
        start,
        lexicon: Lexicon { matchers, layout },
        first,
        nullable,
        fields_by_kind,
    }))
}

/// Nullability and FIRST token sets of every rule, by fixpoint.
fn analyze(rules: &[SyntaxRule], kind_count: usize) -> (Vec<bool>, Vec<KindSet>) {
    let mut nullable = vec![false; rules.len()];
    let mut first = vec![KindSet::new(kind_count); rules.len()];
    loop {
        let mut changed = false;
        for (idx, rule) in rules.iter().enumerate() {
            let (nl, set) = first_of(&rule.body, &nullable, &first, kind_count);
            if nl && !nullable[idx] {
                nullable[idx] = true;
                changed = true;
            }
            changed |= first[idx].union_with(&set);
        }
        if !changed {
            return (nullable, first);
        }
    }
}

pub(crate) fn first_of(
    rule: &Rule,
    nullable: &[bool],
    first: &[KindSet],
    kind_count: usize,
) -> (bool, KindSet) {
    match rule {
        Rule::Blank => (true, KindSet::new(kind_count)),
        Rule::Token(kind) => {
            let mut set = KindSet::new(kind_count);
            set.insert(*kind);
            (false, set)
        }
        Rule::Symbol(id) => (nullable[*id as usize], first[*id as usize].clone()),
        Rule::Seq(members) => {
            let mut set = KindSet::new(kind_count);
            for member in members {
                let (nl, member_set) = first_of(member, nullable, first, kind_count);
                set.union_with(&member_set);
                if !nl {
                    return (false, set);
                }
            }
            (true, set)
        }
        Rule::Choice(members) => {
            let mut set = KindSet::new(kind_count);
            let mut any_nullable = false;
            for member in members {
                let (nl, member_set) = first_of(member, nullable, first, kind_count);
                set.union_with(&member_set);
                any_nullable |= nl;
            }
            (any_nullable, set)
        }
        Rule::Repeat(inner) | Rule::Optional(inner) => {
            (true, first_of(inner, nullable, first, kind_count).1)
        }
        Rule::Repeat1(inner) | Rule::Field(_, inner) => {
            first_of(inner, nullable, first, kind_count)
        }
    }
}

fn leftmost_symbols(
    rule: &Rule,
    nullable: &[bool],
    first: &[KindSet],
    kind_count: usize,
    out: &mut Vec<RuleId>,
) {
    match rule {
        Rule::Blank | Rule::Token(_) => {}
        Rule::Symbol(id) => out.push(*id),
        Rule::Seq(members) => {
            for member in members {
                leftmost_symbols(member, nullable, first, kind_count, out);
                if !first_of(member, nullable, first, kind_count).0 {
                    break;
                }
            }
        }
        Rule::Choice(members) => {
            for member in members {
                leftmost_symbols(member, nullable, first, kind_count, out);
            }
        }
        Rule::Repeat(inner)
        | Rule::Repeat1(inner)
        | Rule::Optional(inner)
        | Rule::Field(_, inner) => leftmost_symbols(inner, nullable, first, kind_count, out),
    }
}

/// Cycles in the "can start with" graph; each cycle reported once.
fn left_recursion(
    rules: &[SyntaxRule],
    nullable: &[bool],
    first: &[KindSet],
    kind_count: usize,
) -> Vec<Vec<RuleId>> {
    let edges: Vec<Vec<RuleId>> = rules
        .iter()
        .map(|rule| {
            let mut out = Vec::new();
            leftmost_symbols(&rule.body, nullable, first, kind_count, &mut out);
            out.sort_unstable();
            out.dedup();
            out
        })
        .collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    fn visit(
        node: RuleId,
        edges: &[Vec<RuleId>],
        marks: &mut [Mark],
        stack: &mut Vec<RuleId>,
        cycles: &mut Vec<Vec<RuleId>>,
        seen: &mut HashSet<Vec<RuleId>>,
    ) {
        marks[node as usize] = Mark::Active;
        stack.push(node);
        for &next in &edges[node as usize] {
            match marks[next as usize] {
                Mark::New => visit(next, edges, marks, stack, cycles, seen),
                Mark::Active => {
                    if let Some(pos) = stack.iter().position(|&n| n == next) {
                        let cycle = stack[pos..].to_vec();
                        let mut key = cycle.clone();
                        key.sort_unstable();
                        if seen.insert(key) {
                            let mut cycle = cycle;
                            cycle.push(next);
                            cycles.push(cycle);
                        }
                    }
                }
                Mark::Done => {}
            }
        }
        stack.pop();
        marks[node as usize] = Mark::Done;
    }

    let mut marks = vec![Mark::New; rules.len()];
    let mut cycles = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = Vec::new();
    for node in 0..rules.len() as RuleId {
        if marks[node as usize] == Mark::New {
            visit(node, &edges, &mut marks, &mut stack, &mut cycles, &mut seen);
        }
    }
    cycles
}

/// Fields each visible rule can assign, looking through hidden rules.
fn fields_by_kind(rules: &[SyntaxRule]) -> HashMap<KindId, Vec<FieldId>> {
    fn collect(
        rule: &Rule,
        rules: &[SyntaxRule],
        visited: &mut HashSet<RuleId>,
        out: &mut Vec<FieldId>,
    ) {
        match rule {
            Rule::Blank | Rule::Token(_) => {}
            Rule::Symbol(id) => {
                let target = &rules[*id as usize];
                if target.hidden && visited.insert(*id) {
                    collect(&target.body, rules, visited, out);
                }
            }
            Rule::Seq(members) | Rule::Choice(members) => {
                for member in members {
                    collect(member, rules, visited, out);
                }
            }
            Rule::Repeat(inner) | Rule::Repeat1(inner) | Rule::Optional(inner) => {
                collect(inner, rules, visited, out)
            }
            Rule::Field(field, inner) => {
                out.push(*field);
                collect(inner, rules, visited, out);
            }
        }
    }

    let mut map = HashMap::new();
    for rule in rules.iter().filter(|r| !r.hidden) {
        let mut out = Vec::new();
        collect(&rule.body, rules, &mut HashSet::new(), &mut out);
        out.sort_unstable();
        out.dedup();
        let entry: &mut Vec<FieldId> = map.entry(rule.kind).or_default();
        entry.extend(out);
    }
    map
}

#[cfg(test)]
mod tests {
    use crate::grammar::errors::{GrammarLoadError, ValidationIssue};
    use crate::grammar::loader::load_grammar;

    fn issues(artifact: &str) -> Vec<ValidationIssue> {
        match load_grammar(artifact.as_bytes()) {
            Err(GrammarLoadError::Validation { source, .. }) => source.issues,
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("grammar unexpectedly compiled"),
        }
    }

    #[test]
    fn unknown_symbols_and_duplicates_are_collected() {
        let found = issues(
            r#"{"name": "t", "version": "1.0.0", "rules": {
                "start": "item missing",
                "item": "'x'",
                "item": "'y'"
            }}"#,
        );
        assert!(found.contains(&ValidationIssue::DuplicateRule {
            name: "item".into()
        }));
        assert!(found.contains(&ValidationIssue::UnknownSymbol {
            rule: "start".into(),
            symbol: "missing".into()
        }));
    }

    #[test]
    fn left_recursion_detected_through_nullable_prefix() {
        let found = issues(
            r#"
name = "t"
version = "1.0.0"

[rules]
expr = "opt expr '+' NUM | NUM"
opt = "'-'?"
NUM = "/[0-9]+/"
"#,
        );
        assert_eq!(
            found,
            vec![ValidationIssue::LeftRecursion {
                cycle: vec!["expr".into(), "expr".into()]
            }]
        );
    }

    #[test]
    fn indirect_left_recursion_detected() {
        let found = issues(
            r#"
name = "t"
version = "1.0.0"

[rules]
a = "b 'x'"
b = "c | 'y'"
c = "a 'z'"
"#,
        );
        assert_eq!(
            found,
            vec![ValidationIssue::LeftRecursion {
                cycle: vec!["a".into(), "b".into(), "c".into(), "a".into()]
            }]
        );
    }

    #[test]
    fn patterns_are_checked() {
        let found = issues(
            r#"
name = "t"
version = "nope"
abi = 7

[rules]
start = "A B"
A = "/[a-/"
B = "/b*/"
"#,
        );
        assert!(matches!(found[0], ValidationIssue::InvalidVersion { .. }));
        assert!(found.contains(&ValidationIssue::UnsupportedAbi {
            found: 7,
            supported: 1
        }));
        assert!(found
            .iter()
            .any(|i| matches!(i, ValidationIssue::InvalidPattern { rule, .. } if rule == "A")));
        assert!(found.contains(&ValidationIssue::EmptyMatch {
            rule: "B".into(),
            pattern: "b*".into()
        }));
    }

    #[test]
    fn start_rule_must_be_visible_syntax() {
        let found = issues(
            r#"
name = "t"
version = "1.0.0"

[rules]
_start = "'a'"
"#,
        );
        assert_eq!(
            found,
            vec![
                ValidationIssue::HiddenStartRule {
                    rule: "_start".into()
                },
                ValidationIssue::LexicalStartRule {
                    rule: "_start".into()
                },
            ]
        );
    }

    #[test]
    fn layout_and_sync_names_are_resolved() {
        let found = issues(
            r#"
name = "t"
version = "1.0.0"
externals = ["_nl"]
sync = [";", "nothing"]

[layout]
newline = "_nl"
indent = "_in"
dedent = "_nl"
brackets = [["(", ")"]]

[rules]
start = "'a' ';'"
"#,
        );
        assert_eq!(
            found,
            vec![
                ValidationIssue::UnknownLayoutKind { name: "_in".into() },
                ValidationIssue::UnknownBracket { text: "(".into() },
                ValidationIssue::UnknownBracket { text: ")".into() },
                ValidationIssue::UnknownSyncKind {
                    name: "nothing".into()
                },
            ]
        );
    }

    #[test]
    fn token_rules_reject_symbols() {
        let found = issues(
            r#"{"name": "t", "version": "1.0.0", "rules": {
                "start": "word",
                "word": {"type": "TOKEN", "content": {"type": "SEQ", "members": [
                    {"type": "PATTERN", "value": "[a-z]"},
                    {"type": "SYMBOL", "name": "start"}
                ]}}
            }}"#,
        );
        assert_eq!(
            found,
            vec![ValidationIssue::SymbolInToken {
                rule: "word".into(),
                symbol: "start".into()
            }]
        );
    }

    #[test]
    fn notation_errors_fail_fast() {
        let err = load_grammar(
            b"name = \"t\"\nversion = \"1.0.0\"\n[rules]\nstart = \"'a' (\"\n",
        )
        .unwrap_err();
        match err {
            GrammarLoadError::Notation { rule, offset, .. } => {
                assert_eq!(rule, "start");
                assert_eq!(offset, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn anonymous_literal_resolves_to_named_token() {
        let grammar = load_grammar(
            br#"
name = "t"
version = "1.0.0"

[rules]
start = "'+' plus"
plus = "'+'"
"#,
        )
        .unwrap();
        assert!(grammar.id_for_node_kind("+", false).is_none());
        assert!(grammar.id_for_node_kind("plus", true).is_some());
    }
}
