use chrono::{DateTime, NaiveDateTime, TimeDelta};
use serde_json::{Map, Value};

use crate::{Log, LogField};

const TIME_SPAN_RANGE_KEY: &str = "TimeSpanRange";
const TIMESTAMP_RANGE_KEY: &str = "TimestampRange";

/// Inclusive range with optional ends
///
/// A missing end leaves that side unbounded. A range with neither end is
/// universal and contains every value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Range<T> {
    pub start: Option<T>,
    pub end: Option<T>,
}

impl<T: PartialOrd> Range<T> {
    pub fn new(start: Option<T>, end: Option<T>) -> Self {
        Self { start, end }
    }

    pub fn universal() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub fn is_universal(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, value: &T) -> bool {
        self.start.as_ref().is_none_or(|start| value >= start)
            && self.end.as_ref().is_none_or(|end| value <= end)
    }
}

/// Range filters applied to built logs before they are delivered
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LogReadingPrecondition {
    pub time_span_range: Range<TimeDelta>,
    pub timestamp_range: Range<NaiveDateTime>,
}

impl LogReadingPrecondition {
    /// True when neither range constrains anything
    pub fn is_empty(&self) -> bool {
        self.time_span_range.is_universal() && self.timestamp_range.is_universal()
    }

    /// Check whether a log may be delivered
    ///
    /// A log passes as soon as any of its time span or timestamp fields
    /// falls inside the matching constrained range. Otherwise it passes only
    /// if it has no value at all in the constrained dimensions, so a log
    /// carrying none of the constrained fields is always accepted.
    pub fn matches(&self, log: &Log) -> bool {
        let mut has_time_span = false;
        if !self.time_span_range.is_universal() {
            for field in LogField::TIME_SPANS {
                if let Some(span) = log.time_span_of(field) {
                    if self.time_span_range.contains(&span) {
                        return true;
                    }
                    has_time_span = true;
                }
            }
        }

        let mut has_timestamp = false;
        if !self.timestamp_range.is_universal() {
            for field in LogField::TIMESTAMPS {
                if let Some(timestamp) = log.timestamp_of(field) {
                    if self.timestamp_range.contains(&timestamp) {
                        return true;
                    }
                    has_timestamp = true;
                }
            }
        }

        !has_time_span && !has_timestamp
    }

    /// Serialize as `{"TimeSpanRange": [start, end], "TimestampRange": [start, end]}`
    ///
    /// Universal ranges are left out. Unbounded ends are written as `null`.
    /// Time spans are stored as nanoseconds and timestamps as nanoseconds
    /// since the Unix epoch. Values beyond the range of an `i64` are written
    /// as decimal strings.
    pub fn save(&self) -> Value {
        let mut object = Map::new();
        if !self.time_span_range.is_universal() {
            let range = &self.time_span_range;
            object.insert(
                TIME_SPAN_RANGE_KEY.to_string(),
                Value::Array(vec![
                    bound_value(range.start.as_ref().map(span_nanos)),
                    bound_value(range.end.as_ref().map(span_nanos)),
                ]),
            );
        }
        if !self.timestamp_range.is_universal() {
            let range = &self.timestamp_range;
            object.insert(
                TIMESTAMP_RANGE_KEY.to_string(),
                Value::Array(vec![
                    bound_value(range.start.as_ref().map(timestamp_nanos)),
                    bound_value(range.end.as_ref().map(timestamp_nanos)),
                ]),
            );
        }
        Value::Object(object)
    }

    /// Load from the form written by [`LogReadingPrecondition::save`]
    ///
    /// Missing or malformed parts are treated as unbounded.
    pub fn load(value: &Value) -> Self {
        let bounds = |key: &str| -> (Option<i128>, Option<i128>) {
            match value.get(key).and_then(Value::as_array).map(Vec::as_slice) {
                Some([start, end]) => (parse_bound(start), parse_bound(end)),
                _ => (None, None),
            }
        };

        let (start, end) = bounds(TIME_SPAN_RANGE_KEY);
        let time_span_range = Range::new(
            start.and_then(span_from_nanos),
            end.and_then(span_from_nanos),
        );

        let (start, end) = bounds(TIMESTAMP_RANGE_KEY);
        let timestamp_range = Range::new(
            start.and_then(timestamp_from_nanos),
            end.and_then(timestamp_from_nanos),
        );

        Self {
            time_span_range,
            timestamp_range,
        }
    }
}

const NANOS_PER_SECOND: i128 = 1_000_000_000;

fn span_nanos(span: &TimeDelta) -> i128 {
    span.num_seconds() as i128 * NANOS_PER_SECOND + span.subsec_nanos() as i128
}

fn timestamp_nanos(timestamp: &NaiveDateTime) -> i128 {
    let utc = timestamp.and_utc();
    utc.timestamp() as i128 * NANOS_PER_SECOND + utc.timestamp_subsec_nanos() as i128
}

/// Split into whole seconds and a non-negative nanosecond part
fn split_nanos(nanos: i128) -> Option<(i64, u32)> {
    let seconds = i64::try_from(nanos.div_euclid(NANOS_PER_SECOND)).ok()?;
    let nanos = u32::try_from(nanos.rem_euclid(NANOS_PER_SECOND)).ok()?;
    Some((seconds, nanos))
}

fn span_from_nanos(nanos: i128) -> Option<TimeDelta> {
    let (seconds, nanos) = split_nanos(nanos)?;
    TimeDelta::new(seconds, nanos)
}

fn timestamp_from_nanos(nanos: i128) -> Option<NaiveDateTime> {
    let (seconds, nanos) = split_nanos(nanos)?;
    DateTime::from_timestamp(seconds, nanos).map(|dt| dt.naive_utc())
}

fn bound_value(nanos: Option<i128>) -> Value {
    match nanos {
        None => Value::Null,
        Some(nanos) => match i64::try_from(nanos) {
            Ok(nanos) => Value::from(nanos),
            Err(_) => Value::String(nanos.to_string()),
        },
    }
}

fn parse_bound(value: &Value) -> Option<i128> {
    match value {
        Value::Number(number) => number.as_i64().map(i128::from),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}
