use std::borrow::Cow;
use std::collections::HashMap;

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use regex::Captures;
use tracing::trace;

use logsift_types::{
    FieldKind, LogBuilder, LogField, LogLevel, LogStringEncoding, LogTimeSpanEncoding,
    LogTimestampEncoding, parse_time_span_text,
};

use crate::options::ReadingOptions;
use crate::pattern::LogPattern;

/// What a capture group feeds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GroupTarget {
    Field(LogField),
    /// Field that is also the raw level
    FieldAndLevel(LogField),
    /// Raw level only, the group is not a log field
    RawLevel,
}

/// Capture group index to target, resolved once per pattern
pub(crate) type GroupBindings = Vec<(usize, GroupTarget)>;

/// Writes regex captures into a [`LogBuilder`]
pub(crate) struct CaptureDecoder {
    string_encoding: LogStringEncoding,
    timestamp_encoding: LogTimestampEncoding,
    timestamp_formats: Vec<String>,
    time_span_encoding: LogTimeSpanEncoding,
    time_span_formats: Vec<String>,
    level_map: HashMap<String, LogLevel>,
    raw_level_property: Option<String>,
}

impl CaptureDecoder {
    pub fn new(options: &ReadingOptions) -> Self {
        Self {
            string_encoding: options.string_encoding,
            timestamp_encoding: options.timestamp_encoding,
            timestamp_formats: options.timestamp_formats.clone(),
            time_span_encoding: options.time_span_encoding,
            time_span_formats: options.time_span_formats.clone(),
            level_map: options.level_map.clone(),
            raw_level_property: options.raw_level_property.clone(),
        }
    }

    /// Resolve the named groups of a pattern
    ///
    /// Unnamed groups and names that are neither a log field nor the raw
    /// level property are structural only.
    pub fn bind(&self, pattern: &LogPattern) -> GroupBindings {
        let mut bindings = Vec::new();
        for (index, name) in pattern.regex().capture_names().enumerate() {
            let Some(name) = name else {
                continue;
            };
            let field = LogField::from_name(name);
            let is_raw_level = match &self.raw_level_property {
                Some(property) => property == name,
                None => field == Some(LogField::Level),
            };
            let target = match (field, is_raw_level) {
                (Some(field), false) => GroupTarget::Field(field),
                (Some(field), true) => GroupTarget::FieldAndLevel(field),
                (None, true) => GroupTarget::RawLevel,
                (None, false) => continue,
            };
            bindings.push((index, target));
        }
        bindings
    }

    /// Apply the captures of one matched line
    pub fn apply(&self, builder: &mut LogBuilder, captures: &Captures<'_>, bindings: &[(usize, GroupTarget)]) {
        for &(index, target) in bindings {
            let Some(group) = captures.get(index) else {
                continue;
            };
            let value = self.decode_string(group.as_str());
            match target {
                GroupTarget::Field(field) => self.set_field(builder, field, &value),
                GroupTarget::FieldAndLevel(field) => {
                    self.set_field(builder, field, &value);
                    self.set_level(builder, &value);
                }
                GroupTarget::RawLevel => self.set_level(builder, &value),
            }
        }
    }

    fn set_level(&self, builder: &mut LogBuilder, raw: &str) {
        if let Some(level) = self.level_map.get(raw) {
            builder.set(LogField::Level, level.as_str());
        }
    }

    fn set_field(&self, builder: &mut LogBuilder, field: LogField, value: &str) {
        match field.kind() {
            FieldKind::MultiLineText => builder.append_to_next_line(field, value),
            FieldKind::Timestamp => self.set_timestamp(builder, field, value),
            FieldKind::TimeSpan => self.set_time_span(builder, field, value),
            FieldKind::Text | FieldKind::Integer | FieldKind::Level => builder.set(field, value),
        }
    }

    fn set_timestamp(&self, builder: &mut LogBuilder, field: LogField, value: &str) {
        let parsed = match self.timestamp_encoding {
            LogTimestampEncoding::Custom => {
                if self.timestamp_formats.is_empty() {
                    builder.set(field, value);
                    return;
                }
                parse_timestamp(value, &self.timestamp_formats)
            }
            LogTimestampEncoding::Unix => from_unix(value, 1_000_000.0),
            LogTimestampEncoding::UnixMilliseconds => from_unix(value, 1_000.0),
            LogTimestampEncoding::UnixMicroseconds => from_unix(value, 1.0),
        };
        match parsed {
            Some(timestamp) => builder.set_timestamp(field, timestamp),
            None => trace!(value, %field, "unable to parse timestamp"),
        }
    }

    fn set_time_span(&self, builder: &mut LogBuilder, field: LogField, value: &str) {
        let millis_per_unit = match self.time_span_encoding {
            LogTimeSpanEncoding::Custom => {
                match parse_time_span(value, &self.time_span_formats) {
                    Some(span) => builder.set_time_span(field, span),
                    None => trace!(value, %field, "unable to parse time span"),
                }
                return;
            }
            LogTimeSpanEncoding::TotalDays => 86_400_000.0,
            LogTimeSpanEncoding::TotalHours => 3_600_000.0,
            LogTimeSpanEncoding::TotalMinutes => 60_000.0,
            LogTimeSpanEncoding::TotalSeconds => 1_000.0,
            LogTimeSpanEncoding::TotalMilliseconds => 1.0,
            LogTimeSpanEncoding::TotalMicroseconds => 0.001,
        };
        match value.trim().parse::<f64>() {
            Ok(units) if units.is_finite() => {
                builder.set(field, &(units * millis_per_unit).to_string());
            }
            _ => trace!(value, %field, "unable to parse time span"),
        }
    }

    /// Trim and unescape a captured value
    pub fn decode_string<'a>(&self, value: &'a str) -> Cow<'a, str> {
        decode_string(self.string_encoding, value)
    }
}

pub(crate) fn decode_string(encoding: LogStringEncoding, value: &str) -> Cow<'_, str> {
    let value = value.trim_end();
    if value.is_empty() {
        return Cow::Borrowed(value);
    }
    match encoding {
        LogStringEncoding::Plain => Cow::Borrowed(value),
        LogStringEncoding::Xml => decode_xml(value),
        LogStringEncoding::Json => decode_json(value),
    }
}

fn decode_xml(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    let mut decoded = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        if let Some(semi) = tail.find(';').filter(|&semi| semi <= 12) {
            if let Some(c) = decode_entity(&tail[1..semi]) {
                decoded.push(c);
                rest = &tail[semi + 1..];
                continue;
            }
        }
        decoded.push('&');
        rest = &tail[1..];
    }
    decoded.push_str(rest);
    Cow::Owned(decoded)
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

fn decode_json(value: &str) -> Cow<'_, str> {
    if !value.contains('\\') {
        return Cow::Borrowed(value);
    }
    match serde_json::from_str::<String>(&format!("\"{value}\"")) {
        Ok(decoded) => Cow::Owned(decoded),
        Err(_) => Cow::Borrowed(value),
    }
}

/// Try the layouts from last to first
pub(crate) fn parse_timestamp(value: &str, formats: &[String]) -> Option<NaiveDateTime> {
    formats
        .iter()
        .rev()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

/// Try the time-of-day layouts from last to first, or the plain span form
pub(crate) fn parse_time_span(value: &str, formats: &[String]) -> Option<TimeDelta> {
    if formats.is_empty() {
        return parse_time_span_text(value);
    }
    formats.iter().rev().find_map(|format| {
        NaiveTime::parse_from_str(value, format).ok().map(|time| {
            TimeDelta::seconds(i64::from(time.num_seconds_from_midnight()))
                + TimeDelta::nanoseconds(i64::from(time.nanosecond()))
        })
    })
}

/// Convert a Unix time in units of `micros_per_unit` microseconds to local time
fn from_unix(value: &str, micros_per_unit: f64) -> Option<NaiveDateTime> {
    let units = value.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
    let micros = (units * micros_per_unit).round();
    if micros.abs() >= i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_micros(micros as i64).map(|utc| utc.with_timezone(&Local).naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsift_types::LogIdAllocator;

    fn options() -> ReadingOptions {
        ReadingOptions::default()
    }

    fn apply(decoder: &CaptureDecoder, pattern: &str, line: &str) -> LogBuilder {
        let pattern = LogPattern::single(pattern).unwrap();
        let bindings = decoder.bind(&pattern);
        let mut builder = LogBuilder::new(LogIdAllocator::new());
        let captures = pattern.regex().captures(line).unwrap();
        decoder.apply(&mut builder, &captures, &bindings);
        builder
    }

    #[test]
    fn test_level_map_lookup() {
        let mut opts = options();
        opts.level_map.insert("I".to_string(), LogLevel::Info);
        let decoder = CaptureDecoder::new(&opts);
        let mut builder = apply(&decoder, r"^(?<Level>\w) (?<Message>.*)$", "I hello  ");
        let log = builder.build();
        assert_eq!(log.level(), Some(LogLevel::Info));
        assert_eq!(log.message(), Some("hello"));
    }

    #[test]
    fn test_raw_level_property() {
        let mut opts = options();
        opts.level_map.insert("E".to_string(), LogLevel::Error);
        opts.raw_level_property = Some("RawLevel".to_string());
        let decoder = CaptureDecoder::new(&opts);
        let pattern = LogPattern::single(r"^(?<RawLevel>\w) (?<Level>\w+)$").unwrap();
        assert_eq!(
            decoder.bind(&pattern),
            vec![
                (1, GroupTarget::RawLevel),
                (2, GroupTarget::Field(LogField::Level))
            ]
        );
        let mut builder = apply(&decoder, r"^(?<RawLevel>\w)$", "E");
        assert_eq!(builder.build().level(), Some(LogLevel::Error));
    }

    #[test]
    fn test_unknown_groups_are_ignored() {
        let decoder = CaptureDecoder::new(&options());
        let pattern = LogPattern::single(r"^(\d+) (?<Junk>\w+) (?<Message>.*)$").unwrap();
        assert_eq!(
            decoder.bind(&pattern),
            vec![(3, GroupTarget::Field(LogField::Message))]
        );
    }

    #[test]
    fn test_custom_timestamp_formats_tried_in_reverse() {
        let mut opts = options();
        opts.timestamp_formats = vec!["%Y-%m-%d %H:%M:%S".to_string(), "%d/%m/%Y %H:%M:%S".to_string()];
        let decoder = CaptureDecoder::new(&opts);
        let builder = apply(&decoder, r"^(?<Timestamp>.+)$", "04/03/2024 01:02:03");
        let ts = builder.get_timestamp(LogField::Timestamp).unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-03-04 01:02:03");
    }

    #[test]
    fn test_unparsable_timestamp_is_dropped() {
        let mut opts = options();
        opts.timestamp_formats = vec!["%Y-%m-%d".to_string()];
        let decoder = CaptureDecoder::new(&opts);
        let builder = apply(&decoder, r"^(?<Timestamp>.+)$", "yesterday");
        assert!(!builder.contains(LogField::Timestamp));
    }

    #[test]
    fn test_unix_timestamp() {
        let mut opts = options();
        opts.timestamp_encoding = LogTimestampEncoding::UnixMilliseconds;
        let decoder = CaptureDecoder::new(&opts);
        let builder = apply(&decoder, r"^(?<Timestamp>\d+)$", "1700000000123");
        let expected = DateTime::from_timestamp_millis(1_700_000_000_123)
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(builder.get_timestamp(LogField::Timestamp), Some(expected));
    }

    #[test]
    fn test_total_time_span_encodings() {
        let mut opts = options();
        opts.time_span_encoding = LogTimeSpanEncoding::TotalSeconds;
        let decoder = CaptureDecoder::new(&opts);
        let builder = apply(&decoder, r"^(?<TimeSpan>.+)$", "1.5");
        assert_eq!(builder.get_time_span(LogField::TimeSpan), Some(TimeDelta::milliseconds(1500)));

        let builder = apply(&decoder, r"^(?<TimeSpan>.+)$", "NaN");
        assert!(!builder.contains(LogField::TimeSpan));
    }

    #[test]
    fn test_custom_time_span() {
        let mut opts = options();
        opts.time_span_formats = vec!["%M:%S%.f".to_string()];
        let decoder = CaptureDecoder::new(&opts);
        assert_eq!(
            parse_time_span("00:02:05", &[]),
            Some(TimeDelta::seconds(125))
        );
        assert_eq!(
            parse_time_span("01:02:03", &["%H:%M:%S".to_string()]),
            Some(TimeDelta::seconds(3723))
        );
        let builder = apply(&decoder, r"^(?<TimeSpan>.+)$", "bad");
        assert!(!builder.contains(LogField::TimeSpan));
    }

    #[test]
    fn test_multi_line_fields_append() {
        let decoder = CaptureDecoder::new(&options());
        let pattern = LogPattern::single(r"^(?<Message>.*)$").unwrap();
        let bindings = decoder.bind(&pattern);
        let mut builder = LogBuilder::new(LogIdAllocator::new());
        for line in ["a", "b"] {
            let captures = pattern.regex().captures(line).unwrap();
            decoder.apply(&mut builder, &captures, &bindings);
        }
        assert_eq!(builder.get_str(LogField::Message), Some("a\nb"));
    }

    #[test]
    fn test_string_encodings() {
        assert_eq!(
            decode_string(LogStringEncoding::Xml, "a &lt;b&gt; &amp;&#65;&#x42; &bogus; &"),
            "a <b> &AB &bogus; &"
        );
        assert_eq!(decode_string(LogStringEncoding::Json, r"line\nnext\tA"), "line\nnext\tA");
        assert_eq!(decode_string(LogStringEncoding::Json, r#"bad\"#), r#"bad\"#);
        assert_eq!(decode_string(LogStringEncoding::Plain, "keep  "), "keep");
    }
}
