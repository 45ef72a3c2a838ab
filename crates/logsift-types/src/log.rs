use std::fmt;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDateTime, TimeDelta};

use crate::{LogField, LogLevel};

/// Typed value of one log field
#[derive(Clone, Debug, PartialEq)]
pub enum LogValue {
    Text(Arc<str>),
    Timestamp(NaiveDateTime),
    TimeSpan(TimeDelta),
    Integer(i64),
    Level(LogLevel),
}

impl LogValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(timestamp) => Some(*timestamp),
            _ => None,
        }
    }

    pub fn as_time_span(&self) -> Option<TimeDelta> {
        match self {
            Self::TimeSpan(span) => Some(*span),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_level(&self) -> Option<LogLevel> {
        match self {
            Self::Level(level) => Some(*level),
            _ => None,
        }
    }

    fn heap_size(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            _ => 0,
        }
    }
}

impl fmt::Display for LogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Timestamp(timestamp) => write!(f, "{}", timestamp.format("%Y-%m-%d %H:%M:%S%.3f")),
            Self::TimeSpan(span) => {
                let sign = if *span < TimeDelta::zero() { "-" } else { "" };
                let span = span.abs();
                let days = span.num_days();
                let hours = span.num_hours() % 24;
                let minutes = span.num_minutes() % 60;
                let seconds = span.num_seconds() % 60;
                let millis = span.num_milliseconds() % 1000;
                if days > 0 {
                    write!(f, "{sign}{days}.{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
                } else {
                    write!(f, "{sign}{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
                }
            }
            Self::Integer(value) => write!(f, "{value}"),
            Self::Level(level) => f.write_str(level.as_str()),
        }
    }
}

/// Hands out unique log ids
///
/// Cloned allocators share the same counter, so one allocator can be
/// passed to every reader that writes into the same view.
#[derive(Clone, Debug, Default)]
pub struct LogIdAllocator(Arc<AtomicU64>);

impl LogIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// An immutable parsed log
///
/// Only fields that were captured are stored. A missing field is absent
/// rather than empty, so `text(LogField::Message)` returning `Some("")`
/// means the message was captured as an empty string.
#[derive(Clone, Debug)]
pub struct Log {
    id: u64,
    read_time: NaiveDateTime,
    /// Sorted by field
    fields: Box<[(LogField, LogValue)]>,
}

impl Log {
    pub(crate) fn new(id: u64, read_time: NaiveDateTime, fields: Vec<(LogField, LogValue)>) -> Self {
        debug_assert!(fields.windows(2).all(|w| w[0].0 < w[1].0));
        Self {
            id,
            read_time,
            fields: fields.into_boxed_slice(),
        }
    }

    /// Unique id assigned when the log was built
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Local time the log was built
    pub fn read_time(&self) -> NaiveDateTime {
        self.read_time
    }

    pub fn get(&self, field: LogField) -> Option<&LogValue> {
        self.fields
            .binary_search_by_key(&field, |(f, _)| *f)
            .ok()
            .map(|i| &self.fields[i].1)
    }

    /// Look a field up by name, as configured by users
    pub fn property(&self, name: &str) -> Option<&LogValue> {
        LogField::from_name(name).and_then(|field| self.get(field))
    }

    /// Iterate over the captured fields in field order
    pub fn fields(&self) -> impl Iterator<Item = (LogField, &LogValue)> {
        self.fields.iter().map(|(field, value)| (*field, value))
    }

    pub fn text(&self, field: LogField) -> Option<&str> {
        self.get(field).and_then(LogValue::as_text)
    }

    pub fn timestamp_of(&self, field: LogField) -> Option<NaiveDateTime> {
        self.get(field).and_then(LogValue::as_timestamp)
    }

    pub fn time_span_of(&self, field: LogField) -> Option<TimeDelta> {
        self.get(field).and_then(LogValue::as_time_span)
    }

    pub fn integer(&self, field: LogField) -> Option<i64> {
        self.get(field).and_then(LogValue::as_integer)
    }

    pub fn level(&self) -> Option<LogLevel> {
        self.get(LogField::Level).and_then(LogValue::as_level)
    }

    pub fn message(&self) -> Option<&str> {
        self.text(LogField::Message)
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp_of(LogField::Timestamp)
    }

    pub fn time_span(&self) -> Option<TimeDelta> {
        self.time_span_of(LogField::TimeSpan)
    }

    pub fn process_id(&self) -> Option<i64> {
        self.integer(LogField::ProcessId)
    }

    pub fn process_name(&self) -> Option<&str> {
        self.text(LogField::ProcessName)
    }

    pub fn thread_id(&self) -> Option<i64> {
        self.integer(LogField::ThreadId)
    }

    pub fn thread_name(&self) -> Option<&str> {
        self.text(LogField::ThreadName)
    }

    pub fn source_name(&self) -> Option<&str> {
        self.text(LogField::SourceName)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.text(LogField::UserId)
    }

    pub fn user_name(&self) -> Option<&str> {
        self.text(LogField::UserName)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.text(LogField::FileName)
    }

    pub fn line_number(&self) -> Option<i64> {
        self.integer(LogField::LineNumber)
    }

    /// Earliest and latest of the beginning, ending and plain timestamps
    pub fn earliest_and_latest_timestamp(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let mut bounds: Option<(NaiveDateTime, NaiveDateTime)> = None;
        for field in LogField::TIMESTAMPS {
            if let Some(timestamp) = self.timestamp_of(field) {
                bounds = Some(match bounds {
                    Some((earliest, latest)) => (earliest.min(timestamp), latest.max(timestamp)),
                    None => (timestamp, timestamp),
                });
            }
        }
        bounds
    }

    /// Approximate number of bytes held by this log
    pub fn memory_size(&self) -> usize {
        mem::size_of::<Self>()
            + self.fields.len() * mem::size_of::<(LogField, LogValue)>()
            + self.fields.iter().map(|(_, v)| v.heap_size()).sum::<usize>()
    }
}
