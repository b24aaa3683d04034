//! Message validation and the prompt-injection denylist.
//!
//! The denylist is best-effort: it catches the common role-impersonation
//! and override phrasings, it does not make a message injection-safe.

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Limit on the trimmed message, counted in Unicode scalar values. Text
/// outside the Basic Multilingual Plane (emoji, for one) counts once per
/// character here, where a UTF-16 length would count it twice.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Case-insensitive patterns rejected by [`ContentFilter::default`].
pub const DEFAULT_PATTERNS: &[&str] = &[
    r"ignore\s+previous\s+instructions",
    r"system\s*:",
    r"assistant\s*:",
    r"\[system\]",
    r"\[assistant\]",
    r"roleplay\s+as",
    r"pretend\s+to\s+be",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Message is required and must be a string")]
    Missing,

    #[error("Message cannot be empty")]
    Empty,

    #[error("Message too long (max {max} characters)")]
    TooLong { max: usize },

    #[error("Message contains prohibited content")]
    Prohibited,
}

#[derive(Debug, Clone)]
pub struct ContentFilter {
    patterns: Vec<Regex>,
    max_chars: usize,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERNS).expect("default denylist patterns are valid regexes")
    }
}

impl ContentFilter {
    /// Build a filter from raw patterns. Each is compiled case-insensitively.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){}", p.as_ref())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            max_chars: MAX_MESSAGE_CHARS,
        })
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_prohibited(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }

    /// Validate the raw `message` field of a request and return the trimmed text.
    pub fn validate(&self, message: Option<&Value>) -> Result<String, ValidationError> {
        let raw = match message {
            Some(Value::String(s)) => s,
            _ => return Err(ValidationError::Missing),
        };

        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }

        if trimmed.chars().count() > self.max_chars {
            return Err(ValidationError::TooLong {
                max: self.max_chars,
            });
        }

        if self.is_prohibited(trimmed) {
            return Err(ValidationError::Prohibited);
        }

        Ok(trimmed.to_string())
    }
}
