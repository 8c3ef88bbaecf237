//! Reader for the S-expression query language.
//!
//! Produces an untyped tree with byte offsets; names are resolved against
//! a grammar afterwards.

use crate::query::errors::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Quantifier {
    #[default]
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Name {
    pub text: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeName {
    Kind(Name),
    /// `(_)`
    Wildcard,
    /// `(MISSING)` or `(MISSING kind)`; the flag marks a quoted, anonymous
    /// kind.
    Missing(Option<(Name, bool)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Atom {
    Node {
        name: NodeName,
        offset: usize,
        children: Vec<Entry>,
    },
    /// `"text"`
    Anonymous(Name),
    /// `_`
    Any,
    Alternation(Vec<Item>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Item {
    pub field: Option<Name>,
    pub atom: Atom,
    pub quantifier: Quantifier,
    pub captures: Vec<Name>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Entry {
    Item(Item),
    Anchor,
    NegatedField(Name),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Argument {
    Capture(Name),
    Text(Name),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PredicateCall {
    pub name: Name,
    pub arguments: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PatternSource {
    pub item: Item,
    pub predicates: Vec<PredicateCall>,
}

/// Read every top-level pattern of `source`.
pub(crate) fn read(source: &str) -> Result<Vec<PatternSource>, QueryError> {
    Reader {
        src: source,
        pos: 0,
        predicates: Vec::new(),
    }
    .read_all()
}

struct Reader<'s> {
    src: &'s str,
    pos: usize,
    /// Predicates seen while reading the current top-level pattern.
    predicates: Vec<PredicateCall>,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

impl<'s> Reader<'s> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, skip: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(skip)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), QueryError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{c}'")))
        }
    }

    fn unexpected(&self, context: &str) -> QueryError {
        match self.peek() {
            Some(c) => QueryError::syntax(self.pos, format!("{context}, found '{c}'")),
            None => QueryError::syntax(self.pos, format!("{context}, found end of query")),
        }
    }

    /// Skip whitespace and `;` line comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some(';') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn name(&mut self) -> Option<Name> {
        let offset = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.bump();
        }
        (self.pos > offset).then(|| Name {
            text: self.src[offset..self.pos].to_string(),
            offset,
        })
    }

    fn required_name(&mut self, what: &str) -> Result<Name, QueryError> {
        self.name()
            .ok_or_else(|| self.unexpected(&format!("expected {what}")))
    }

    fn string(&mut self) -> Result<Name, QueryError> {
        let offset = self.pos;
        self.expect('"')?;
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(Name { text, offset }),
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some(c) => text.push(c),
                    None => break,
                },
                Some(c) => text.push(c),
                None => break,
            }
        }
        Err(QueryError::syntax(offset, "unterminated string"))
    }

    /// At `(` followed by `#`, ignoring whitespace.
    fn at_predicate(&self) -> bool {
        if self.peek() != Some('(') {
            return false;
        }
        self.src[self.pos + 1..].trim_start().starts_with('#')
    }

    fn read_all(mut self) -> Result<Vec<PatternSource>, QueryError> {
        let mut patterns: Vec<PatternSource> = Vec::new();
        loop {
            self.skip_trivia();
            if self.peek().is_none() {
                return Ok(patterns);
            }
            if self.at_predicate() {
                let offset = self.pos;
                let call = self.predicate()?;
                match patterns.last_mut() {
                    Some(last) => last.predicates.push(call),
                    None => {
                        return Err(QueryError::syntax(offset, "predicate before any pattern"));
                    }
                }
                continue;
            }
            if self.peek() == Some('.') {
                return Err(QueryError::syntax(self.pos, "anchor outside of a node pattern"));
            }
            let item = self.item()?;
            if let Some(field) = &item.field {
                return Err(QueryError::syntax(
                    field.offset,
                    "field prefix on a top-level pattern",
                ));
            }
            patterns.push(PatternSource {
                item,
                predicates: std::mem::take(&mut self.predicates),
            });
        }
    }

    fn item(&mut self) -> Result<Item, QueryError> {
        let offset = self.pos;
        let mut field = None;
        if self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            let save = self.pos;
            if let Some(name) = self.name() {
                self.skip_trivia();
                if self.eat(':') {
                    self.skip_trivia();
                    field = Some(name);
                } else {
                    self.pos = save;
                }
            }
        }

        let (atom, group_quantifier, group_captures) = self.atom()?;
        let mut quantifier = group_quantifier;
        match self.peek() {
            Some('?') => quantifier = Quantifier::ZeroOrOne,
            Some('*') => quantifier = Quantifier::ZeroOrMore,
            Some('+') => quantifier = Quantifier::OneOrMore,
            _ => {}
        }
        if quantifier != group_quantifier {
            self.bump();
        }

        let mut captures = group_captures;
        loop {
            let save = self.pos;
            self.skip_trivia();
            if self.eat('@') {
                captures.push(self.required_name("capture name")?);
            } else {
                self.pos = save;
                break;
            }
        }

        Ok(Item {
            field,
            atom,
            quantifier,
            captures,
            offset,
        })
    }

    fn atom(&mut self) -> Result<(Atom, Quantifier, Vec<Name>), QueryError> {
        let offset = self.pos;
        match self.peek() {
            Some('"') => Ok((Atom::Anonymous(self.string()?), Quantifier::One, Vec::new())),
            Some('[') => {
                self.bump();
                let mut alternatives = Vec::new();
                loop {
                    self.skip_trivia();
                    if self.eat(']') {
                        break;
                    }
                    if self.peek().is_none() {
                        return Err(QueryError::syntax(offset, "unclosed alternation"));
                    }
                    alternatives.push(self.item()?);
                }
                if alternatives.is_empty() {
                    return Err(QueryError::syntax(offset, "empty alternation"));
                }
                Ok((Atom::Alternation(alternatives), Quantifier::One, Vec::new()))
            }
            Some('_') if !self.peek_at(1).is_some_and(is_name_char) => {
                self.bump();
                Ok((Atom::Any, Quantifier::One, Vec::new()))
            }
            Some('(') => {
                self.bump();
                self.skip_trivia();
                match self.peek() {
                    Some('(' | '[' | '"') => self.group(offset),
                    Some('_') if !self.peek_at(1).is_some_and(is_name_char) => {
                        self.bump();
                        let children = self.children()?;
                        Ok((
                            Atom::Node {
                                name: NodeName::Wildcard,
                                offset,
                                children,
                            },
                            Quantifier::One,
                            Vec::new(),
                        ))
                    }
                    _ => {
                        let kind = self.required_name("node kind")?;
                        if kind.text == "MISSING" {
                            return self.missing(offset);
                        }
                        let children = self.children()?;
                        Ok((
                            Atom::Node {
                                name: NodeName::Kind(kind),
                                offset,
                                children,
                            },
                            Quantifier::One,
                            Vec::new(),
                        ))
                    }
                }
            }
            _ => Err(self.unexpected("expected a pattern")),
        }
    }

    fn missing(&mut self, offset: usize) -> Result<(Atom, Quantifier, Vec<Name>), QueryError> {
        self.skip_trivia();
        let kind = match self.peek() {
            Some('"') => Some((self.string()?, false)),
            Some(')') => None,
            _ => Some((self.required_name("node kind")?, true)),
        };
        self.skip_trivia();
        self.expect(')')?;
        Ok((
            Atom::Node {
                name: NodeName::Missing(kind),
                offset,
                children: Vec::new(),
            },
            Quantifier::One,
            Vec::new(),
        ))
    }

    /// `((pattern) (#pred ...))`: one pattern plus predicates.
    fn group(&mut self, offset: usize) -> Result<(Atom, Quantifier, Vec<Name>), QueryError> {
        let mut inner: Option<Item> = None;
        loop {
            self.skip_trivia();
            if self.eat(')') {
                break;
            }
            if self.peek().is_none() {
                return Err(QueryError::syntax(offset, "unclosed group"));
            }
            if self.at_predicate() {
                let call = self.predicate()?;
                self.predicates.push(call);
                continue;
            }
            let at = self.pos;
            let item = self.item()?;
            if inner.is_some() {
                return Err(QueryError::syntax(
                    at,
                    "groups of sibling patterns are not supported",
                ));
            }
            inner = Some(item);
        }
        let item = inner.ok_or_else(|| QueryError::syntax(offset, "empty group"))?;
        if let Some(field) = &item.field {
            return Err(QueryError::syntax(field.offset, "field prefix inside a group"));
        }
        Ok((item.atom, item.quantifier, item.captures))
    }

    fn children(&mut self) -> Result<Vec<Entry>, QueryError> {
        let mut entries = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(')') => {
                    self.bump();
                    return Ok(entries);
                }
                None => return Err(self.unexpected("expected ')'")),
                Some('.') => {
                    self.bump();
                    entries.push(Entry::Anchor);
                }
                Some('!') => {
                    self.bump();
                    entries.push(Entry::NegatedField(self.required_name("field name")?));
                }
                Some('(') if self.at_predicate() => {
                    let call = self.predicate()?;
                    self.predicates.push(call);
                }
                _ => entries.push(Entry::Item(self.item()?)),
            }
        }
    }

    fn predicate(&mut self) -> Result<PredicateCall, QueryError> {
        self.expect('(')?;
        self.skip_trivia();
        let offset = self.pos;
        self.expect('#')?;
        while self
            .peek()
            .is_some_and(|c| is_name_char(c) || matches!(c, '?' | '!'))
        {
            self.bump();
        }
        let name = Name {
            text: self.src[offset..self.pos].to_string(),
            offset,
        };
        if name.text.len() == 1 {
            return Err(QueryError::syntax(offset, "expected predicate name"));
        }

        let mut arguments = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(')') => {
                    self.bump();
                    return Ok(PredicateCall { name, arguments });
                }
                Some('@') => {
                    self.bump();
                    arguments.push(Argument::Capture(self.required_name("capture name")?));
                }
                Some('"') => arguments.push(Argument::Text(self.string()?)),
                Some(c) if is_name_char(c) => {
                    let word = self.required_name("argument")?;
                    arguments.push(Argument::Text(word));
                }
                _ => return Err(self.unexpected("expected predicate argument or ')'")),
            }
        }
    }
}
