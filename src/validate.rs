//! Syntax diagnostics for source buffers and edits.
//!
//! This module provides:
//! - Error collection (`ERROR` and `MISSING` nodes with line and column)
//! - Checks that an edit does not introduce new syntax errors
//!
//! An edit that leaves existing errors alone is accepted; only errors that
//! were not there before reject it.

use crate::edit::{EditError, InputEdit, TextEdit};
use crate::grammar::Grammar;
use crate::parser::{ParseError, Parser};
use crate::pool;
use crate::tree::SyntaxTree;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Parse error introduced: found {count} new error nodes")]
    ParseErrorIntroduced {
        count: usize,
        errors: Vec<ErrorLocation>,
    },

    #[error("Source has {count} syntax errors")]
    SyntaxErrors {
        count: usize,
        errors: Vec<ErrorLocation>,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Location of an error node in the source. `line` and `column` are
/// 1-based; `column` counts bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLocation {
    pub byte_start: usize,
    pub byte_end: usize,
    pub line: usize,
    pub column: usize,
    pub missing: bool,
    pub context: String,
}

/// Collect all error and missing nodes of `tree`, in source order.
pub fn collect_errors(tree: &SyntaxTree, source: &str) -> Vec<ErrorLocation> {
    tree.error_nodes()
        .into_iter()
        .map(|node| {
            let start = node.start_position();
            let byte_start = node.start_byte();
            let byte_end = node.end_byte();

            // Up to 20 bytes either side of the error.
            let mut context_start = byte_start.saturating_sub(20);
            while !source.is_char_boundary(context_start) {
                context_start -= 1;
            }
            let mut context_end = (byte_end + 20).min(source.len());
            while !source.is_char_boundary(context_end) {
                context_end += 1;
            }
            let context = source
                .get(context_start..context_end)
                .unwrap_or("")
                .replace('\n', "\\n");

            ErrorLocation {
                byte_start,
                byte_end,
                line: start.row + 1,
                column: start.column + 1,
                missing: node.is_missing(),
                context,
            }
        })
        .collect()
}

fn error_positions(tree: &SyntaxTree) -> HashSet<(usize, usize)> {
    tree.error_nodes()
        .into_iter()
        .map(|node| (node.start_byte(), node.end_byte()))
        .collect()
}

/// Map error positions of the old tree into the edited text. Errors inside
/// the edited range have no counterpart and are dropped.
fn shifted_positions(tree: &SyntaxTree, edit: &InputEdit) -> HashSet<(usize, usize)> {
    error_positions(tree)
        .into_iter()
        .filter_map(|(start, end)| {
            if end <= edit.start_byte {
                Some((start, end))
            } else if start >= edit.old_end_byte {
                Some((edit.shift(start), edit.shift(end)))
            } else {
                None
            }
        })
        .collect()
}

fn check_clean(tree: &SyntaxTree, source: &str) -> Result<(), ValidationError> {
    let errors = collect_errors(tree, source);
    if !errors.is_empty() {
        return Err(ValidationError::SyntaxErrors {
            count: errors.len(),
            errors,
        });
    }
    Ok(())
}

fn check_new_errors(
    known: &HashSet<(usize, usize)>,
    edited: &SyntaxTree,
    source: &str,
) -> Result<(), ValidationError> {
    let new_errors: Vec<_> = collect_errors(edited, source)
        .into_iter()
        .filter(|e| !known.contains(&(e.byte_start, e.byte_end)))
        .collect();
    if !new_errors.is_empty() {
        return Err(ValidationError::ParseErrorIntroduced {
            count: new_errors.len(),
            errors: new_errors,
        });
    }
    Ok(())
}

/// Syntax validator bound to one grammar.
pub struct SyntaxValidator {
    parser: Parser,
}

impl SyntaxValidator {
    pub fn new(grammar: Grammar) -> Self {
        Self {
            parser: Parser::new(grammar),
        }
    }

    /// Validate that source has no syntax errors.
    pub fn validate(&mut self, source: &str) -> Result<(), ValidationError> {
        let tree = self.parser.parse(source.as_bytes())?;
        check_clean(&tree, source)
    }

    /// Validate a file path.
    pub fn validate_file(&mut self, path: impl AsRef<Path>) -> Result<(), ValidationError> {
        let source = std::fs::read_to_string(path)?;
        self.validate(&source)
    }

    /// Compare two sources and check if new errors were introduced.
    ///
    /// Errors are compared by byte range, so this suits edits that do not
    /// move existing errors. [`ValidatedEdit`] accounts for the shift.
    pub fn validate_edit(&mut self, original: &str, edited: &str) -> Result<(), ValidationError> {
        let original_tree = self.parser.parse(original.as_bytes())?;
        let edited_tree = self.parser.parse(edited.as_bytes())?;
        check_new_errors(&error_positions(&original_tree), &edited_tree, edited)
    }
}

/// Validation functions that reuse parsers from the thread-local pool.
pub mod pooled {
    use super::*;

    /// Validate source code using a pooled parser.
    pub fn validate(grammar: &Grammar, source: &str) -> Result<(), ValidationError> {
        let tree = pool::with_parser(grammar, |parser| parser.parse(source.as_bytes()))?;
        check_clean(&tree, source)
    }

    /// Compare two sources and check if new errors were introduced using a
    /// pooled parser.
    pub fn validate_edit(
        grammar: &Grammar,
        original: &str,
        edited: &str,
    ) -> Result<(), ValidationError> {
        pool::with_parser(grammar, |parser| {
            let original_tree = parser.parse(original.as_bytes())?;
            let edited_tree = parser.parse(edited.as_bytes())?;
            check_new_errors(&error_positions(&original_tree), &edited_tree, edited)
        })
    }
}

/// A text edit that is only applied if it introduces no syntax errors.
pub struct ValidatedEdit {
    edit: TextEdit,
    validate_parse: bool,
}

impl ValidatedEdit {
    pub fn new(edit: TextEdit) -> Self {
        Self {
            edit,
            validate_parse: true,
        }
    }

    /// Disable parse validation (useful when intentionally editing broken code).
    pub fn skip_parse_validation(mut self) -> Self {
        self.validate_parse = false;
        self
    }

    /// Apply the edit to `source`, whose tree is `tree`.
    ///
    /// Returns the edited text and its tree, re-parsed incrementally.
    pub fn apply(
        &self,
        source: &str,
        tree: &SyntaxTree,
    ) -> Result<(String, SyntaxTree), ValidationError> {
        let (edited, input_edit) = self.edit.apply(source)?;
        let grammar = tree.grammar().clone();
        let edited_tree = pool::with_parser(&grammar, |parser| {
            parser.parse_incremental(edited.as_bytes(), tree, &input_edit)
        })?;
        if self.validate_parse {
            check_new_errors(&shifted_positions(tree, &input_edit), &edited_tree, &edited)?;
        }
        Ok((edited, edited_tree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::builtin_grammar;

    fn python() -> Grammar {
        builtin_grammar("python").unwrap()
    }

    #[test]
    fn clean_source_validates() {
        let mut validator = SyntaxValidator::new(python());
        assert!(validator.validate("x = 1\n").is_ok());
        assert!(pooled::validate(&python(), "def f():\n    pass\n").is_ok());
    }

    #[test]
    fn errors_carry_line_and_context() {
        let source = "x = 1\ndef f(:\n";
        let err = pooled::validate(&python(), source).unwrap_err();
        let ValidationError::SyntaxErrors { errors, count } = err else {
            panic!("expected syntax errors");
        };
        assert_eq!(count, errors.len());
        assert_eq!(errors[0].line, 2);
        assert!(errors.iter().all(|e| e.line >= 2));
        assert!(errors.iter().any(|e| e.missing));
        assert!(errors[0].context.contains("def f(:"));
    }

    #[test]
    fn edit_introducing_errors_is_rejected() {
        let mut validator = SyntaxValidator::new(python());
        assert!(validator.validate_edit("x = 1\n", "x = 2\n").is_ok());
        let err = validator.validate_edit("x = 1\n", "x = (\n").unwrap_err();
        assert!(matches!(err, ValidationError::ParseErrorIntroduced { .. }));
    }

    #[test]
    fn validated_edit_tolerates_existing_errors() {
        let grammar = python();
        let source = "y = 1\ndef f(:\n";
        let tree = Parser::new(grammar.clone()).parse(source.as_bytes()).unwrap();

        // The error after the edit moves by one byte but is not new.
        let edit = ValidatedEdit::new(TextEdit::new(4, 5, "10", "1"));
        let (edited, edited_tree) = edit.apply(source, &tree).unwrap();
        assert_eq!(edited, "y = 10\ndef f(:\n");
        assert!(edited_tree.has_error());

        let breaking = ValidatedEdit::new(TextEdit::new(0, 1, "(", "y"));
        assert!(matches!(
            breaking.apply(source, &tree),
            Err(ValidationError::ParseErrorIntroduced { .. })
        ));
        assert!(breaking.skip_parse_validation().apply(source, &tree).is_ok());
    }

    #[test]
    fn mismatched_edit_text_is_reported() {
        let tree = Parser::new(python()).parse(b"x = 1\n").unwrap();
        let edit = ValidatedEdit::new(TextEdit::new(4, 5, "2", "9"));
        assert!(matches!(
            edit.apply("x = 1\n", &tree),
            Err(ValidationError::Edit(EditError::BeforeTextMismatch { .. }))
        ));
    }
}
