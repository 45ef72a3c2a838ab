use std::collections::HashMap;

use serde::Deserialize;

use logsift_types::{LogLevel, LogStringEncoding, LogTimeSpanEncoding, LogTimestampEncoding};

use crate::pattern::{LogPattern, LogPatternMatchingMode};

/// Which end of the data source is kept when a pass reaches the max log count
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum LogReadingWindow {
    /// Stop reading once the max log count is reached
    StartOfDataSource,
    /// Keep reading and drop the oldest logs instead
    EndOfDataSource,
}

/// How lines are turned into logs
///
/// Can only be changed while the reader is preparing.
#[derive(Clone, Debug, Default)]
pub struct ReadingOptions {
    pub patterns: Vec<LogPattern>,

    pub matching_mode: LogPatternMatchingMode,

    pub string_encoding: LogStringEncoding,

    pub timestamp_encoding: LogTimestampEncoding,

    /// `strftime` layouts, the last one is tried first
    pub timestamp_formats: Vec<String>,

    pub time_span_encoding: LogTimeSpanEncoding,

    /// `strftime` time-of-day layouts, the last one is tried first
    pub time_span_formats: Vec<String>,

    /// Raw level text to level
    pub level_map: HashMap<String, LogLevel>,

    /// Capture group holding the raw level, `Level` when unset
    pub raw_level_property: Option<String>,

    /// Keep reading after the end of the data and restart on EOF
    pub is_continuous: bool,

    pub reading_window: Option<LogReadingWindow>,
}
