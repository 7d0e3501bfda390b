//! Text forms of the packed schedule record.
//!
//! Three entry points produce a [`ScheduleRecord`]: a six-field CSV record,
//! the `HH:MM` / `MM/DD` command-line shorthand, and a delay relative to the
//! device clock. Wildcard handling depends on the connected firmware, so every
//! parser takes the [`FirmwareVersion`] it is validating against.

use std::ops::RangeInclusive;

use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use log::debug;
use shared_types::{
    Action, DayMatch, Feature, FirmwareVersion, Recurrence, ScheduleRecord, Weekday,
};

use crate::config::{CSV_SCHEDULE_HEADER, MAX_RELATIVE_DELAY_MIN, ZERO_DELAY_MARGIN_S};
use crate::error::{ParseError, PmgrError};

pub const CSV_FIELDS: usize = 6;

pub fn to_display_string(record: &ScheduleRecord) -> String {
    record.to_string()
}

/// `ON, Repeat, 05, 10, 21, 30`, with `*` for wildcards.
pub fn to_csv_fields(record: &ScheduleRecord) -> String {
    let month = record
        .month()
        .map_or_else(|| "*".to_string(), |m| format!("{m:02}"));
    let day = match record.day() {
        DayMatch::Any => "*".to_string(),
        DayMatch::Date(date) => format!("{date:02}"),
        DayMatch::Weekday(weekday) => weekday.abbreviation().to_string(),
        DayMatch::Unknown(n) => format!("?{n}"),
    };
    let hour = record
        .hour()
        .map_or_else(|| "*".to_string(), |h| format!("{h:02}"));
    format!(
        "{}, {}, {}, {}, {}, {:02}",
        record.action().name(),
        record.recurrence().name(),
        month,
        day,
        hour,
        record.minute()
    )
}

/// Header line followed by one line per record.
pub fn to_csv(records: &[ScheduleRecord]) -> String {
    let mut out = String::from(CSV_SCHEDULE_HEADER);
    out.push('\n');
    for record in records {
        out.push_str(&to_csv_fields(record));
        out.push('\n');
    }
    out
}

/// Parse `[action, repeat-mode, month, day, hour, minute]`.
pub fn from_text(fields: &[&str], version: FirmwareVersion) -> Result<ScheduleRecord, ParseError> {
    if fields.len() != CSV_FIELDS {
        return Err(ParseError::FieldCount {
            expected: CSV_FIELDS,
            found: fields.len(),
        });
    }

    let action = parse_action(fields[0])?;
    let recurrence = parse_recurrence(fields[1])?;
    let minute = parse_minute(fields[5])?;

    let mut parser = DateParser::new(version);
    let hour = parser.hour(fields[4])?;
    let day = parser.day(fields[3])?;
    let month = parser.month(fields[2])?;

    Ok(ScheduleRecord::new(
        action, recurrence, month, day, hour, minute,
    ))
}

pub fn parse_csv_line(line: &str, version: FirmwareVersion) -> Result<ScheduleRecord, ParseError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    from_text(&fields, version)
}

/// Parse a whole CSV document. The first line and blank lines are skipped;
/// the first bad line fails the whole document.
pub fn parse_csv(
    content: &str,
    version: FirmwareVersion,
) -> Result<Vec<ScheduleRecord>, ParseError> {
    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if index == 0 || line.trim().is_empty() {
            continue;
        }
        let record = parse_csv_line(line, version).map_err(|e| ParseError::Line {
            line: index + 1,
            content: line.to_string(),
            source: Box::new(e),
        })?;
        records.push(record);
    }
    debug!("parsed {} schedules from csv", records.len());
    Ok(records)
}

/// A schedule given as `HH:MM` and an optional `MM/DD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub action: Action,
    pub recurrence: Recurrence,
    pub date: Option<String>,
    pub time: String,
}

pub fn parse_request(
    request: &ScheduleRequest,
    version: FirmwareVersion,
) -> Result<ScheduleRecord, ParseError> {
    let time: Vec<&str> = request.time.split(':').collect();
    let [hour, minute] = time[..] else {
        return Err(ParseError::InvalidField {
            field: "time",
            value: request.time.clone(),
        });
    };
    let minute = parse_minute(minute)?;

    let mut parser = DateParser::new(version);
    let hour = parser.hour(hour)?;

    let (month, day) = match &request.date {
        None => (None, DayMatch::Any),
        Some(date) => {
            let parts: Vec<&str> = date.split('/').collect();
            let [month, day] = parts[..] else {
                return Err(ParseError::InvalidField {
                    field: "date",
                    value: date.clone(),
                });
            };
            let day = parser.day(day)?;
            (parser.month(month)?, day)
        }
    };

    Ok(ScheduleRecord::new(
        request.action,
        request.recurrence,
        month,
        day,
        hour,
        minute,
    ))
}

/// What a relative delay turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeSchedule {
    /// Request shutdown right away instead of storing a schedule
    ShutdownNow,
    Record(ScheduleRecord),
}

/// A zero delay becomes a shutdown request on firmware that has one,
/// whatever the requested action.
pub fn is_immediate_shutdown(delay_minutes: u16, version: FirmwareVersion) -> bool {
    delay_minutes == 0 && version.supports(Feature::ImmediateShutdown)
}

/// Schedule `action` `delay_minutes` after `now` (device local time).
///
/// Seconds are rounded up to the next minute. A zero delay gets a 75 second
/// margin so the device clock cannot pass the target before the record lands.
pub fn relative_schedule(
    now: NaiveDateTime,
    action: Action,
    delay_minutes: u16,
    version: FirmwareVersion,
) -> Result<RelativeSchedule, PmgrError> {
    if delay_minutes > MAX_RELATIVE_DELAY_MIN {
        return Err(PmgrError::InvalidValue {
            option: "delay",
            value: i64::from(delay_minutes),
            expected: format!("0 - {MAX_RELATIVE_DELAY_MIN}"),
        });
    }

    if is_immediate_shutdown(delay_minutes, version) {
        return Ok(RelativeSchedule::ShutdownNow);
    }

    let target = if delay_minutes == 0 {
        now + Duration::seconds(ZERO_DELAY_MARGIN_S)
    } else {
        now + Duration::minutes(i64::from(delay_minutes) + 1)
    };
    debug!("relative schedule target {}", target);

    Ok(RelativeSchedule::Record(ScheduleRecord::new(
        action,
        Recurrence::OneTime,
        Some(target.month() as u8),
        DayMatch::Date(target.day() as u8),
        Some(target.hour() as u8),
        target.minute() as u8,
    )))
}

fn is_wildcard(value: &str) -> bool {
    matches!(value, "*" | "**")
}

fn parse_number(
    field: &'static str,
    value: &str,
    range: RangeInclusive<u8>,
) -> Result<u8, ParseError> {
    value
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|n| range.contains(n))
        .ok_or_else(|| ParseError::InvalidField {
            field,
            value: value.to_string(),
        })
}

fn parse_action(value: &str) -> Result<Action, ParseError> {
    if value.eq_ignore_ascii_case("on") {
        Ok(Action::On)
    } else if value.eq_ignore_ascii_case("off") {
        Ok(Action::Off)
    } else {
        Err(ParseError::InvalidField {
            field: "action",
            value: value.to_string(),
        })
    }
}

fn parse_recurrence(value: &str) -> Result<Recurrence, ParseError> {
    match value.to_ascii_lowercase().as_str() {
        "repeat" | "r" => Ok(Recurrence::Repeat),
        "onetime" | "o" => Ok(Recurrence::OneTime),
        _ => Err(ParseError::InvalidField {
            field: "repeat mode",
            value: value.to_string(),
        }),
    }
}

fn parse_minute(value: &str) -> Result<u8, ParseError> {
    if is_wildcard(value) {
        return Err(ParseError::Wildcard { field: "minute" });
    }
    parse_number("minute", value, 0..=59)
}

/// Parses hour, day and month in that order, tracking wildcards.
///
/// Firmware before 1.3 cannot match a concrete day or month once a
/// wildcard hour or day has been given.
struct DateParser {
    version: FirmwareVersion,
    wildcard_seen: bool,
}

impl DateParser {
    fn new(version: FirmwareVersion) -> Self {
        Self {
            version,
            wildcard_seen: false,
        }
    }

    fn hour(&mut self, value: &str) -> Result<Option<u8>, ParseError> {
        if is_wildcard(value) {
            self.wildcard_seen = true;
            return Ok(None);
        }
        parse_number("hour", value, 0..=23).map(Some)
    }

    fn day(&mut self, value: &str) -> Result<DayMatch, ParseError> {
        if is_wildcard(value) {
            self.wildcard_seen = true;
            return Ok(DayMatch::Any);
        }
        let day = match Weekday::from_abbreviation(value) {
            Some(weekday) => DayMatch::Weekday(weekday),
            None => DayMatch::Date(parse_number("day", value, 1..=31)?),
        };
        self.check_combination("day", value)?;
        Ok(day)
    }

    fn month(&mut self, value: &str) -> Result<Option<u8>, ParseError> {
        if is_wildcard(value) {
            self.wildcard_seen = true;
            return Ok(None);
        }
        let month = parse_number("month", value, 1..=12)?;
        self.check_combination("month", value)?;
        Ok(Some(month))
    }

    fn check_combination(&self, field: &'static str, value: &str) -> Result<(), ParseError> {
        if self.wildcard_seen && !self.version.supports(Feature::WildcardCombination) {
            return Err(ParseError::WildcardCombination {
                field,
                value: value.to_string(),
                version: self.version,
            });
        }
        Ok(())
    }
}
