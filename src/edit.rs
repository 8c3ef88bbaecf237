//! Edit descriptors for incremental re-parsing.
//!
//! [`InputEdit`] is what the parser consumes: which bytes changed, in old and
//! new coordinates. [`TextEdit`] is the verified replacement that produces
//! both the new source and the matching `InputEdit`.

use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// A single contiguous change to a source buffer.
///
/// Bytes `[start_byte, old_end_byte)` of the old source were replaced by
/// bytes `[start_byte, new_end_byte)` of the new source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputEdit {
    pub start_byte: usize,
    pub old_end_byte: usize,
    pub new_end_byte: usize,
}

impl InputEdit {
    pub fn new(start_byte: usize, old_end_byte: usize, new_end_byte: usize) -> Self {
        Self {
            start_byte,
            old_end_byte,
            new_end_byte,
        }
    }

    /// Change in source length.
    pub fn delta(&self) -> isize {
        self.new_end_byte as isize - self.old_end_byte as isize
    }

    /// Map an old offset at or after `old_end_byte` into new coordinates.
    pub fn shift(&self, offset: usize) -> usize {
        offset
            .saturating_add(self.new_end_byte)
            .saturating_sub(self.old_end_byte)
    }

    /// Check the edit against the old and new source lengths.
    pub fn validate(&self, old_len: usize, new_len: usize) -> Result<(), String> {
        if self.start_byte > self.old_end_byte {
            return Err(format!(
                "start {} is after old end {}",
                self.start_byte, self.old_end_byte
            ));
        }
        if self.start_byte > self.new_end_byte {
            return Err(format!(
                "start {} is after new end {}",
                self.start_byte, self.new_end_byte
            ));
        }
        if self.old_end_byte > old_len {
            return Err(format!(
                "old end {} exceeds old length {}",
                self.old_end_byte, old_len
            ));
        }
        if self.new_end_byte > new_len {
            return Err(format!(
                "new end {} exceeds new length {}",
                self.new_end_byte, new_len
            ));
        }
        if old_len - self.old_end_byte != new_len - self.new_end_byte {
            return Err(format!(
                "edit changes length by {} but source went from {} to {} bytes",
                self.delta(),
                old_len,
                new_len
            ));
        }
        Ok(())
    }
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EditError {
    #[error("before-text verification failed at [{byte_start}, {byte_end}): found {found:?}")]
    BeforeTextMismatch {
        byte_start: usize,
        byte_end: usize,
        found: String,
    },

    #[error("invalid byte range: [{byte_start}, {byte_end}) in source of length {source_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        source_len: usize,
    },

    #[error("edit boundary {offset} is not on a UTF-8 character boundary")]
    InvalidUtf8Edit { offset: usize },
}

/// Byte-span replacement checked against the text it expects to replace.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "TextEdit does nothing until apply() is called"]
pub struct TextEdit {
    pub byte_start: usize,
    pub byte_end: usize,
    pub new_text: String,
    pub expected_before: EditVerification,
}

impl TextEdit {
    pub fn new(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl AsRef<str>,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before.as_ref()),
        }
    }

    /// Insertion at `offset`; nothing to verify.
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::new(offset, offset, text, "")
    }

    /// The `InputEdit` this replacement corresponds to.
    pub fn input_edit(&self) -> InputEdit {
        InputEdit::new(
            self.byte_start,
            self.byte_end,
            self.byte_start + self.new_text.len(),
        )
    }

    /// Apply to `source`, returning the new text and its `InputEdit`.
    pub fn apply(&self, source: &str) -> Result<(String, InputEdit), EditError> {
        if self.byte_start > self.byte_end || self.byte_end > source.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                source_len: source.len(),
            });
        }
        for offset in [self.byte_start, self.byte_end] {
            if !source.is_char_boundary(offset) {
                return Err(EditError::InvalidUtf8Edit { offset });
            }
        }

        let current = &source[self.byte_start..self.byte_end];
        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                found: current.to_string(),
            });
        }

        let mut updated =
            String::with_capacity(source.len() - current.len() + self.new_text.len());
        updated.push_str(&source[..self.byte_start]);
        updated.push_str(&self.new_text);
        updated.push_str(&source[self.byte_end..]);
        Ok((updated, self.input_edit()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_verification_exact_match() {
        let verify = EditVerification::ExactMatch("hello world".to_string());
        assert!(verify.matches("hello world"));
        assert!(!verify.matches("hello"));
    }

    #[test]
    fn test_edit_verification_hash() {
        let verify = EditVerification::from_text(&"x".repeat(2000));
        assert!(matches!(verify, EditVerification::Hash(_)));
        assert!(verify.matches(&"x".repeat(2000)));
        assert!(!verify.matches(&"y".repeat(2000)));
    }

    #[test]
    fn test_apply_replacement() {
        let edit = TextEdit::new(4, 13, "fib", "fibonacci");
        let (text, input) = edit.apply("def fibonacci(n): pass").unwrap();
        assert_eq!(text, "def fib(n): pass");
        assert_eq!(input, InputEdit::new(4, 13, 7));
        assert_eq!(input.delta(), -6);
        assert_eq!(input.shift(13), 7);
        assert!(input.validate(22, 16).is_ok());
    }

    #[test]
    fn test_apply_rejects_mismatch_and_bad_ranges() {
        let source = "let x = 1;";
        assert!(matches!(
            TextEdit::new(4, 5, "y", "z").apply(source),
            Err(EditError::BeforeTextMismatch { .. })
        ));
        assert!(matches!(
            TextEdit::new(8, 20, "2", "").apply(source),
            Err(EditError::InvalidByteRange { .. })
        ));
        assert!(matches!(
            TextEdit::insert(1, "!").apply("é"),
            Err(EditError::InvalidUtf8Edit { offset: 1 })
        ));
    }

    #[test]
    fn test_input_edit_validation() {
        assert!(InputEdit::new(2, 1, 3).validate(10, 12).is_err());
        assert!(InputEdit::new(0, 11, 11).validate(10, 10).is_err());
        assert!(InputEdit::new(0, 2, 5).validate(10, 10).is_err());
        assert!(InputEdit::new(3, 3, 5).validate(10, 12).is_ok());
    }
}
