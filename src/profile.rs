use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use logsift_logs::{
    LogLevel, LogPattern, LogPatternMatchingMode, LogReadingWindow, LogStringEncoding,
    LogTimeSpanEncoding, LogTimestampEncoding, ReadingOptions,
};

/// One pattern of a log profile
#[derive(Debug, Deserialize)]
pub struct PatternEntry {
    pub regex: String,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub skippable: bool,
    pub description: Option<String>,
}

/// How to read one kind of log file, loaded from TOML
#[derive(Debug, Deserialize)]
pub struct LogProfile {
    pub patterns: Vec<PatternEntry>,

    #[serde(default)]
    pub matching_mode: LogPatternMatchingMode,

    #[serde(default)]
    pub string_encoding: LogStringEncoding,

    #[serde(default)]
    pub timestamp_encoding: LogTimestampEncoding,

    #[serde(default)]
    pub timestamp_formats: Vec<String>,

    #[serde(default)]
    pub time_span_encoding: LogTimeSpanEncoding,

    #[serde(default)]
    pub time_span_formats: Vec<String>,

    /// Raw level text to level
    #[serde(default)]
    pub level_map: HashMap<String, LogLevel>,

    pub raw_level_property: Option<String>,

    #[serde(default)]
    pub continuous: bool,

    pub reading_window: Option<LogReadingWindow>,

    pub max_log_count: Option<usize>,

    pub restart_reading_delay_ms: Option<u64>,
}

impl LogProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid profile {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Compile the patterns into reader options
    pub fn reading_options(&self) -> Result<ReadingOptions> {
        let patterns = self
            .patterns
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let pattern = LogPattern::new(&entry.regex, entry.repeatable, entry.skippable)
                    .with_context(|| format!("Invalid regex in pattern {}", i + 1))?;
                Ok(match &entry.description {
                    Some(description) => pattern.with_description(description.clone()),
                    None => pattern,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ReadingOptions {
            patterns,
            matching_mode: self.matching_mode,
            string_encoding: self.string_encoding,
            timestamp_encoding: self.timestamp_encoding,
            timestamp_formats: self.timestamp_formats.clone(),
            time_span_encoding: self.time_span_encoding,
            time_span_formats: self.time_span_formats.clone(),
            level_map: self.level_map.clone(),
            raw_level_property: self.raw_level_property.clone(),
            is_continuous: self.continuous,
            reading_window: self.reading_window,
        })
    }
}
