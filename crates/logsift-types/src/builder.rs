use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeDelta};

use crate::{FieldKind, Log, LogField, LogIdAllocator, LogLevel, LogValue};

/// Layouts tried when a timestamp is stored as text
const TIMESTAMP_LAYOUTS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
];

/// Bounded pool sharing repeated field values between logs
pub struct StringPool {
    strings: HashSet<Arc<str>>,
    capacity: usize,
}

impl StringPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            strings: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Get the shared copy of `s`, adding it when missing
    ///
    /// The pool is emptied once it holds `capacity` strings.
    pub fn intern(&mut self, s: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(s) {
            return Arc::clone(existing);
        }
        if self.strings.len() >= self.capacity {
            self.strings.clear();
        }
        let shared: Arc<str> = Arc::from(s);
        self.strings.insert(Arc::clone(&shared));
        shared
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Accumulates raw field strings for one log
///
/// Values stay raw until [`LogBuilder::build`], which converts each field
/// to its typed form. Field buffers are kept across [`LogBuilder::reset`]
/// so building many logs in a row does not reallocate.
pub struct LogBuilder {
    ids: LogIdAllocator,
    values: [String; LogField::COUNT],
    /// Bit `i` set when field `i` holds a value
    present: u64,
    pool: Option<StringPool>,
}

impl LogBuilder {
    pub fn new(ids: LogIdAllocator) -> Self {
        Self {
            ids,
            values: std::array::from_fn(|_| String::new()),
            present: 0,
            pool: None,
        }
    }

    /// Share the values of repetitive fields through `pool`
    pub fn with_string_pool(mut self, pool: StringPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn contains(&self, field: LogField) -> bool {
        self.present & (1 << field.index()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.present == 0
    }

    pub fn is_not_empty(&self) -> bool {
        self.present != 0
    }

    /// Overwrite the value of a field
    pub fn set(&mut self, field: LogField, value: &str) {
        let slot = &mut self.values[field.index()];
        slot.clear();
        slot.push_str(value);
        self.present |= 1 << field.index();
    }

    /// Concatenate to the current value of a field
    pub fn append(&mut self, field: LogField, value: &str) {
        if self.contains(field) {
            self.values[field.index()].push_str(value);
        } else {
            self.set(field, value);
        }
    }

    /// Add a value on a new line after the current value of a field
    pub fn append_to_next_line(&mut self, field: LogField, value: &str) {
        if self.contains(field) {
            let slot = &mut self.values[field.index()];
            slot.push('\n');
            slot.push_str(value);
        } else {
            self.set(field, value);
        }
    }

    /// Store a timestamp in its binary form
    pub fn set_timestamp(&mut self, field: LogField, timestamp: NaiveDateTime) {
        let micros = timestamp.and_utc().timestamp_micros();
        self.set(field, &micros.to_string());
    }

    /// Store a time span as total milliseconds
    pub fn set_time_span(&mut self, field: LogField, span: TimeDelta) {
        let millis = span.num_microseconds().map_or_else(
            || span.num_milliseconds() as f64,
            |micros| micros as f64 / 1000.0,
        );
        self.set(field, &millis.to_string());
    }

    /// Raw value of a field
    pub fn get_str(&self, field: LogField) -> Option<&str> {
        self.contains(field).then(|| self.values[field.index()].as_str())
    }

    pub fn get_i32(&self, field: LogField) -> Option<i32> {
        self.get_str(field)
            .and_then(parse_integer)
            .and_then(|v| i32::try_from(v).ok())
    }

    pub fn get_i64(&self, field: LogField) -> Option<i64> {
        self.get_str(field).and_then(|s| {
            let s = s.trim();
            parse_integer(s.strip_suffix('L').unwrap_or(s))
        })
    }

    pub fn get_timestamp(&self, field: LogField) -> Option<NaiveDateTime> {
        self.get_str(field).and_then(parse_stored_timestamp)
    }

    pub fn get_time_span(&self, field: LogField) -> Option<TimeDelta> {
        self.get_str(field).and_then(parse_stored_time_span)
    }

    pub fn get_enum<T: FromStr>(&self, field: LogField) -> Option<T> {
        self.get_str(field).and_then(|s| s.trim().parse().ok())
    }

    /// Snapshot the current fields into a log
    pub fn build(&mut self) -> Log {
        let mut fields = Vec::with_capacity(self.present.count_ones() as usize);
        for field in LogField::ALL {
            if !self.contains(field) {
                continue;
            }
            let raw = self.values[field.index()].as_str();
            let value = match field.kind() {
                FieldKind::Text | FieldKind::MultiLineText => {
                    let text = match self.pool.as_mut() {
                        Some(pool) if field.is_interned() => pool.intern(raw),
                        _ => Arc::from(raw),
                    };
                    Some(LogValue::Text(text))
                }
                FieldKind::Timestamp => parse_stored_timestamp(raw).map(LogValue::Timestamp),
                FieldKind::TimeSpan => parse_stored_time_span(raw).map(LogValue::TimeSpan),
                FieldKind::Integer => {
                    let raw = raw.trim();
                    parse_integer(raw.strip_suffix('L').unwrap_or(raw)).map(LogValue::Integer)
                }
                FieldKind::Level => raw.trim().parse::<LogLevel>().ok().map(LogValue::Level),
            };
            if let Some(value) = value {
                fields.push((field, value));
            }
        }
        Log::new(self.ids.next_id(), Local::now().naive_local(), fields)
    }

    pub fn build_and_reset(&mut self) -> Log {
        let log = self.build();
        self.reset();
        log
    }

    /// Drop all values, keeping the buffers
    pub fn reset(&mut self) {
        if self.present == 0 {
            return;
        }
        for field in LogField::ALL {
            if self.contains(field) {
                self.values[field.index()].clear();
            }
        }
        self.present = 0;
    }
}

/// Parse a decimal or `0x` hexadecimal integer
fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if digits.starts_with(['-', '+']) {
        return None;
    }
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

/// Text timestamp first, then the binary form written by `set_timestamp`
fn parse_stored_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    parse_timestamp_text(s).or_else(|| {
        s.parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_micros)
            .map(|dt| dt.naive_utc())
    })
}

/// Milliseconds first, then the time span text form
fn parse_stored_time_span(s: &str) -> Option<TimeDelta> {
    let s = s.trim();
    match s.parse::<f64>() {
        Ok(millis) if millis.is_finite() => {
            let micros = (millis * 1000.0).round();
            if micros.abs() < i64::MAX as f64 {
                Some(TimeDelta::microseconds(micros as i64))
            } else {
                None
            }
        }
        _ => parse_time_span_text(s),
    }
}

/// Parse a timestamp written in one of the common ISO-like layouts
pub fn parse_timestamp_text(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    TIMESTAMP_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse `[-][d.]hh:mm[:ss[.fffffff]]`, or a bare number of days
pub fn parse_time_span_text(s: &str) -> Option<TimeDelta> {
    let s = s.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let parts: Vec<&str> = s.split(':').collect();
    let span = match parts.as_slice() {
        [days] => TimeDelta::try_days(parse_digits(days)?)?,
        [head, minutes, rest @ ..] if rest.len() <= 1 => {
            let (days, hours) = match head.split_once('.') {
                Some((days, hours)) => (parse_digits(days)?, parse_digits(hours)?),
                None => (0, parse_digits(head)?),
            };
            let minutes = parse_digits(minutes)?;
            let (seconds, nanos) = match rest.first() {
                Some(sec) => match sec.split_once('.') {
                    Some((whole, fraction)) => (parse_digits(whole)?, parse_fraction(fraction)?),
                    None => (parse_digits(sec)?, 0),
                },
                None => (0, 0),
            };
            if hours >= 24 || minutes >= 60 || seconds >= 60 {
                return None;
            }
            TimeDelta::try_days(days)?
                + TimeDelta::hours(hours)
                + TimeDelta::minutes(minutes)
                + TimeDelta::seconds(seconds)
                + TimeDelta::nanoseconds(nanos)
        }
        _ => return None,
    };
    Some(if negative { -span } else { span })
}

fn parse_digits(s: &str) -> Option<i64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Fraction digits as nanoseconds
fn parse_fraction(s: &str) -> Option<i64> {
    if s.is_empty() || s.len() > 9 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i64 = s.parse().ok()?;
    Some(value * 10_i64.pow(9 - s.len() as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> LogBuilder {
        LogBuilder::new(LogIdAllocator::new())
    }

    #[test]
    fn test_build_and_reset_twice_leaves_empty_builder() {
        let mut b = builder();
        b.set(LogField::Message, "m");
        let first = b.build_and_reset();
        assert!(b.is_empty());
        let second = b.build_and_reset();
        assert!(b.is_empty());
        assert_eq!(first.message(), Some("m"));
        assert_eq!(second.fields().count(), 0);
        assert!(b.get_str(LogField::Message).is_none());
    }

    #[test]
    fn test_append_to_next_line() {
        let mut b = builder();
        b.append_to_next_line(LogField::Message, "first");
        b.append_to_next_line(LogField::Message, "second");
        b.append(LogField::Title, "a");
        b.append(LogField::Title, "b");
        assert_eq!(b.get_str(LogField::Message), Some("first\nsecond"));
        assert_eq!(b.get_str(LogField::Title), Some("ab"));
    }

    #[test]
    fn test_integer_getters() {
        let mut b = builder();
        b.set(LogField::ProcessId, "0x1F");
        b.set(LogField::ThreadId, "-12");
        b.set(LogField::LineNumber, "5000000000L");
        b.set(LogField::Title, "abc");
        assert_eq!(b.get_i32(LogField::ProcessId), Some(31));
        assert_eq!(b.get_i32(LogField::ThreadId), Some(-12));
        assert_eq!(b.get_i32(LogField::LineNumber), None);
        assert_eq!(b.get_i64(LogField::LineNumber), Some(5_000_000_000));
        assert_eq!(b.get_i64(LogField::Title), None);
    }

    #[test]
    fn test_timestamp_round_trip_through_binary() {
        let mut b = builder();
        let ts = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_micro_opt(5, 6, 7, 890)
            .unwrap();
        b.set_timestamp(LogField::Timestamp, ts);
        assert_eq!(b.get_timestamp(LogField::Timestamp), Some(ts));
        b.set(LogField::Timestamp, "2024-03-04 05:06:07.000890");
        assert_eq!(b.get_timestamp(LogField::Timestamp), Some(ts));
        b.set(LogField::Timestamp, "garbage");
        assert_eq!(b.get_timestamp(LogField::Timestamp), None);
    }

    #[test]
    fn test_time_span_getter() {
        let mut b = builder();
        b.set_time_span(LogField::TimeSpan, TimeDelta::milliseconds(1500));
        assert_eq!(b.get_time_span(LogField::TimeSpan), Some(TimeDelta::milliseconds(1500)));
        b.set(LogField::TimeSpan, "1.02:03:04.5");
        let expected = TimeDelta::days(1)
            + TimeDelta::hours(2)
            + TimeDelta::minutes(3)
            + TimeDelta::milliseconds(4500);
        assert_eq!(b.get_time_span(LogField::TimeSpan), Some(expected));
        b.set(LogField::TimeSpan, "25:00");
        assert_eq!(b.get_time_span(LogField::TimeSpan), None);
    }

    #[test]
    fn test_enum_getter() {
        let mut b = builder();
        b.set(LogField::Level, "error");
        assert_eq!(b.get_enum::<LogLevel>(LogField::Level), Some(LogLevel::Error));
        b.set(LogField::Level, "E");
        assert_eq!(b.get_enum::<LogLevel>(LogField::Level), None);
    }

    #[test]
    fn test_unparsable_fields_are_absent_after_build() {
        let mut b = builder();
        b.set(LogField::ProcessId, "pid");
        b.set(LogField::Message, "");
        let log = b.build();
        assert_eq!(log.process_id(), None);
        assert_eq!(log.message(), Some(""));
    }

    #[test]
    fn test_interned_fields_share_storage() {
        let mut b = builder().with_string_pool(StringPool::new(16));
        b.set(LogField::SourceName, "svc");
        let a = b.build_and_reset();
        b.set(LogField::SourceName, "svc");
        let c = b.build_and_reset();
        match (a.get(LogField::SourceName), c.get(LogField::SourceName)) {
            (Some(LogValue::Text(x)), Some(LogValue::Text(y))) => assert!(Arc::ptr_eq(x, y)),
            other => panic!("unexpected values {other:?}"),
        }
    }

    #[test]
    fn test_string_pool_is_bounded() {
        let mut pool = StringPool::new(2);
        pool.intern("a");
        pool.intern("b");
        pool.intern("c");
        assert_eq!(pool.len(), 1);
    }
}
