//! Compact rule notation.
//!
//! ```text
//! alt  := seq ('|' seq)*
//! seq  := item*
//! item := [label ':'] atom ('*' | '+' | '?')*
//! atom := ident | 'lit' | "lit" | /regex/ | '(' alt ')'
//! ```
//!
//! An empty sequence (including `()`) is a blank rule.

use crate::grammar::schema::RuleDef;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at offset {offset}")]
pub struct NotationError {
    pub offset: usize,
    pub message: String,
}

/// Parse notation text into a rule tree.
pub fn parse(text: &str) -> Result<RuleDef, NotationError> {
    let mut parser = NotationParser {
        src: text.as_bytes(),
        pos: 0,
    };
    let rule = parser.alternation()?;
    parser.skip_ws();
    if parser.pos < parser.src.len() {
        return Err(parser.error(format!(
            "unexpected '{}'",
            char::from(parser.src[parser.pos])
        )));
    }
    Ok(rule)
}

struct NotationParser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> NotationParser<'a> {
    fn error(&self, message: impl Into<String>) -> NotationError {
        NotationError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn alternation(&mut self) -> Result<RuleDef, NotationError> {
        let mut members = vec![self.sequence()?];
        loop {
            self.skip_ws();
            if self.peek() != Some(b'|') {
                break;
            }
            self.pos += 1;
            members.push(self.sequence()?);
        }
        Ok(if members.len() == 1 {
            members.remove(0)
        } else {
            RuleDef::Choice { members }
        })
    }

    fn sequence(&mut self) -> Result<RuleDef, NotationError> {
        let mut members = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None | Some(b'|') | Some(b')') => break,
                _ => members.push(self.item()?),
            }
        }
        Ok(match members.len() {
            0 => RuleDef::Blank,
            1 => members.remove(0),
            _ => RuleDef::Seq { members },
        })
    }

    fn item(&mut self) -> Result<RuleDef, NotationError> {
        let start = self.pos;
        let mut label = None;
        if matches!(self.peek(), Some(b) if is_ident_start(b)) {
            let ident = self.ident();
            self.skip_ws();
            if self.peek() == Some(b':') {
                self.pos += 1;
                label = Some(ident);
            } else {
                self.pos = start;
            }
        }

        let mut rule = self.atom()?;
        loop {
            rule = match self.peek() {
                Some(b'*') => RuleDef::Repeat {
                    content: Box::new(rule),
                },
                Some(b'+') => RuleDef::Repeat1 {
                    content: Box::new(rule),
                },
                Some(b'?') => RuleDef::Optional {
                    content: Box::new(rule),
                },
                _ => break,
            };
            self.pos += 1;
        }

        Ok(match label {
            Some(name) => RuleDef::Field {
                name,
                content: Box::new(rule),
            },
            None => rule,
        })
    }

    fn atom(&mut self) -> Result<RuleDef, NotationError> {
        self.skip_ws();
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let inner = self.alternation()?;
                self.skip_ws();
                if self.peek() != Some(b')') {
                    return Err(self.error("expected ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(quote @ (b'\'' | b'"')) => {
                let value = self.string(quote)?;
                if value.is_empty() {
                    return Err(self.error("empty string token"));
                }
                Ok(RuleDef::String { value })
            }
            Some(b'/') => Ok(RuleDef::Pattern {
                value: self.regex()?,
            }),
            Some(b) if is_ident_start(b) => Ok(RuleDef::Symbol { name: self.ident() }),
            Some(b) => Err(self.error(format!("unexpected '{}'", char::from(b)))),
            None => Err(self.error("unexpected end of rule")),
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if is_ident_continue(b)) {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn string(&mut self, quote: u8) -> Result<String, NotationError> {
        let open = self.pos;
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => {
                    self.pos = open;
                    return Err(self.error("unterminated string"));
                }
                Some(b) if b == quote => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    let escaped = match self.src.get(self.pos + 1) {
                        Some(b'n') => b'\n',
                        Some(b't') => b'\t',
                        Some(b'r') => b'\r',
                        Some(&c @ (b'\\' | b'\'' | b'"')) => c,
                        _ => return Err(self.error("invalid escape")),
                    };
                    out.push(escaped);
                    self.pos += 2;
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
        String::from_utf8(out).map_err(|_| self.error("string token is not valid UTF-8"))
    }

    fn regex(&mut self) -> Result<String, NotationError> {
        let open = self.pos;
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => {
                    self.pos = open;
                    return Err(self.error("unterminated pattern"));
                }
                Some(b'/') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') if self.src.get(self.pos + 1) == Some(&b'/') => {
                    out.push(b'/');
                    self.pos += 2;
                }
                Some(b'\\') => {
                    out.push(b'\\');
                    if let Some(&next) = self.src.get(self.pos + 1) {
                        out.push(next);
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                    }
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
        if out.is_empty() {
            self.pos = open;
            return Err(self.error("empty pattern"));
        }
        String::from_utf8(out).map_err(|_| self.error("pattern is not valid UTF-8"))
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> RuleDef {
        RuleDef::Symbol { name: name.into() }
    }

    fn lit(value: &str) -> RuleDef {
        RuleDef::String {
            value: value.into(),
        }
    }

    #[test]
    fn parse_sequence_with_repeat() {
        let rule = parse("NUMBER ('+' NUMBER)*").unwrap();
        assert_eq!(
            rule,
            RuleDef::Seq {
                members: vec![
                    sym("NUMBER"),
                    RuleDef::Repeat {
                        content: Box::new(RuleDef::Seq {
                            members: vec![lit("+"), sym("NUMBER")]
                        })
                    }
                ]
            }
        );
    }

    #[test]
    fn parse_fields_and_choice() {
        let rule = parse("name: identifier | 'x'").unwrap();
        assert_eq!(
            rule,
            RuleDef::Choice {
                members: vec![
                    RuleDef::Field {
                        name: "name".into(),
                        content: Box::new(sym("identifier")),
                    },
                    lit("x"),
                ]
            }
        );
    }

    #[test]
    fn field_wraps_quantified_atom() {
        let rule = parse("args: expr*").unwrap();
        assert_eq!(
            rule,
            RuleDef::Field {
                name: "args".into(),
                content: Box::new(RuleDef::Repeat {
                    content: Box::new(sym("expr"))
                }),
            }
        );
    }

    #[test]
    fn parse_patterns_and_escapes() {
        assert_eq!(
            parse(r"/a\/b\d/").unwrap(),
            RuleDef::Pattern {
                value: r"a/b\d".into()
            }
        );
        assert_eq!(parse(r#""\"\n""#).unwrap(), lit("\"\n"));
        assert_eq!(parse("'it''s'").unwrap(), RuleDef::Seq {
            members: vec![lit("it"), lit("s")]
        });
    }

    #[test]
    fn empty_group_is_blank() {
        assert_eq!(parse("()").unwrap(), RuleDef::Blank);
        assert_eq!(parse("").unwrap(), RuleDef::Blank);
    }

    #[test]
    fn errors_carry_offsets() {
        let err = parse("a (b").unwrap_err();
        assert_eq!(err.offset, 4);
        assert_eq!(err.message, "expected ')'");

        let err = parse("a 'open").unwrap_err();
        assert_eq!(err.offset, 2);

        let err = parse("a )").unwrap_err();
        assert_eq!(err.offset, 2);

        let err = parse("a # b").unwrap_err();
        assert_eq!(err.offset, 2);
    }
}
