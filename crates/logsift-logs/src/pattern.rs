use std::fmt;

use regex::Regex;
use serde::Deserialize;

use logsift_types::LogField;

/// How the patterns of a reader combine into one log
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
pub enum LogPatternMatchingMode {
    /// Patterns match consecutive lines in the configured order
    #[default]
    Sequential,
    /// Every non-skippable pattern must match some line, in any order
    Arbitrary,
    /// Like `Arbitrary`, but the first pattern must match before the others
    ArbitraryAfterFirstMatch,
}

/// Compiled regex describing one line of a log
///
/// Named capture groups whose names are [`LogField`] names fill the
/// matching field of the log being built.
#[derive(Clone, Debug)]
pub struct LogPattern {
    /// Compiled regex
    regex: Regex,

    /// May match several consecutive lines of the same log
    repeatable: bool,

    /// May be bypassed when the line does not match
    skippable: bool,

    /// Free text shown to users
    description: Option<String>,
}

impl LogPattern {
    /// Compile a pattern
    pub fn new(pattern: &str, repeatable: bool, skippable: bool) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            repeatable,
            skippable,
            description: None,
        })
    }

    /// Compile a pattern that matches exactly one line
    pub fn single(pattern: &str) -> Result<Self, regex::Error> {
        Self::new(pattern, false, false)
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_repeatable(&self) -> bool {
        self.repeatable
    }

    pub fn is_skippable(&self) -> bool {
        self.skippable
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Log fields this pattern can capture, in group order
    pub fn defined_fields(&self) -> Vec<LogField> {
        let mut fields: Vec<LogField> = Vec::new();
        for field in self
            .regex
            .capture_names()
            .flatten()
            .filter_map(LogField::from_name)
        {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        fields
    }
}

impl PartialEq for LogPattern {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str()
            && self.repeatable == other.repeatable
            && self.skippable == other.skippable
    }
}

impl Eq for LogPattern {}

impl fmt::Display for LogPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.regex.as_str())?;
        if self.repeatable {
            f.write_str(" (R)")?;
        }
        if self.skippable {
            f.write_str(" (S)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defined_fields() {
        let pattern =
            LogPattern::single(r"^(?<Timestamp>\S+) (?<Level>\w) (?<Other>\S+) (\d+) (?<Message>.*)$")
                .unwrap();
        assert_eq!(
            pattern.defined_fields(),
            vec![LogField::Timestamp, LogField::Level, LogField::Message]
        );
    }

    #[test]
    fn test_equality_uses_text_and_flags() {
        let a = LogPattern::new("^a$", true, false).unwrap();
        let b = LogPattern::new("^a$", true, false).unwrap();
        let c = LogPattern::new("^a$", false, false).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, b.with_description("same pattern"));
    }

    #[test]
    fn test_display() {
        let pattern = LogPattern::new("^x$", true, true).unwrap();
        assert_eq!(pattern.to_string(), "^x$ (R) (S)");
    }

    #[test]
    fn test_invalid_regex() {
        assert!(LogPattern::single("(unclosed").is_err());
    }
}
