//! Shared types for logsift
//!
//! This crate contains the log data model used across the logsift crates:
//! levels, field encodings, the field table, built logs, the builder that
//! produces them and the reading precondition that filters them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod builder;
mod field;
mod log;
mod precondition;

pub use builder::{LogBuilder, StringPool, parse_time_span_text, parse_timestamp_text};
pub use field::{FieldKind, LogField};
pub use log::{Log, LogIdAllocator, LogValue};
pub use precondition::{LogReadingPrecondition, Range};

// ============================================================================
// Log Level
// ============================================================================

/// Log severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum LogLevel {
    #[default]
    Undefined,
    Verbose,
    Trace,
    Debug,
    Info,
    Success,
    Warn,
    Failure,
    Error,
    Fatal,
}

impl LogLevel {
    /// All levels in ascending severity
    pub const ALL: [LogLevel; 10] = [
        Self::Undefined,
        Self::Verbose,
        Self::Trace,
        Self::Debug,
        Self::Info,
        Self::Success,
        Self::Warn,
        Self::Failure,
        Self::Error,
        Self::Fatal,
    ];

    /// Name of the level as written in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "Undefined",
            Self::Verbose => "Verbose",
            Self::Trace => "Trace",
            Self::Debug => "Debug",
            Self::Info => "Info",
            Self::Success => "Success",
            Self::Warn => "Warn",
            Self::Failure => "Failure",
            Self::Error => "Error",
            Self::Fatal => "Fatal",
        }
    }

    /// Short display string (3 chars)
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Self::Undefined => "???",
            Self::Verbose => "VRB",
            Self::Trace => "TRC",
            Self::Debug => "DBG",
            Self::Info => "INF",
            Self::Success => "SUC",
            Self::Warn => "WRN",
            Self::Failure => "FAL",
            Self::Error => "ERR",
            Self::Fatal => "FTL",
        }
    }

    /// Position of the level in [`LogLevel::ALL`]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not the name of a [`LogLevel`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| ParseLevelError(s.to_string()))
    }
}

// ============================================================================
// Field Encodings
// ============================================================================

/// How captured string values are escaped in the source text
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogStringEncoding {
    #[default]
    Plain,
    /// XML entities (`&lt;`, `&#x41;`, ...)
    Xml,
    /// JSON string escapes (`\n`, `\t`, ...)
    Json,
}

/// How captured timestamps are written in the source text
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogTimestampEncoding {
    /// Parsed with the configured format list
    #[default]
    Custom,
    /// Seconds since the Unix epoch
    Unix,
    UnixMilliseconds,
    UnixMicroseconds,
}

/// How captured time spans are written in the source text
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogTimeSpanEncoding {
    /// Parsed with the configured format list
    #[default]
    Custom,
    TotalDays,
    TotalHours,
    TotalMinutes,
    TotalSeconds,
    TotalMilliseconds,
    TotalMicroseconds,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_str() {
        assert_eq!("info".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!("FATAL".parse::<LogLevel>(), Ok(LogLevel::Fatal));
        assert!("nope".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Verbose < LogLevel::Debug);
        assert_eq!(LogLevel::Fatal.index(), LogLevel::ALL.len() - 1);
    }

    #[test]
    fn test_level_serde_uses_names() {
        let json = serde_json::to_string(&LogLevel::Warn).unwrap();
        assert_eq!(json, "\"Warn\"");
        let level: LogLevel = serde_json::from_str("\"Success\"").unwrap();
        assert_eq!(level, LogLevel::Success);
    }
}
