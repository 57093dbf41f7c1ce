//! Time parser
//!
//! Normalizes the three accepted input shapes into a zoned [`Instant`]:
//!
//! ```text
//! Date(2024-06-01)            → 2024-06-01 00:00:00 <zone>   (23:59:59 with end_of_day)
//! Instant(2024-06-01T00:00Z)  → same instant, wall clock of <zone>
//! Text("01/06/2024 10:30")    → first matching format, localized in <zone>
//! ```

use crate::time::error::{TimeError, TimeResult};
use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike, Utc,
};
use chrono_tz::Tz;

/// A timezone-attributed point in time
pub type Instant = DateTime<Tz>;

/// Seconds from the start of a day to its last whole second
const LAST_SECOND_OF_DAY: i64 = 86_399;

/// Datetime formats tried in order against free text
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Date-only formats, tried after the datetime formats
const DATE_FORMATS: &[&str] = &["%Y-%m-%d"];

/// Day-first variants, tried last
const DAY_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DAY_FIRST_DATE_FORMATS: &[&str] = &["%d-%m-%Y", "%d/%m/%Y"];

/// A time value as supplied by a caller
#[derive(Debug, Clone, PartialEq)]
pub enum TimeInput {
    /// A calendar date with no time of day
    Date(NaiveDate),
    /// An instant that already carries a zone
    Instant(Instant),
    /// Free text in one of the accepted formats
    Text(String),
}

impl From<NaiveDate> for TimeInput {
    fn from(date: NaiveDate) -> Self {
        TimeInput::Date(date)
    }
}

impl From<Instant> for TimeInput {
    fn from(instant: Instant) -> Self {
        TimeInput::Instant(instant)
    }
}

impl From<DateTime<Utc>> for TimeInput {
    fn from(instant: DateTime<Utc>) -> Self {
        TimeInput::Instant(instant.with_timezone(&Tz::UTC))
    }
}

impl From<DateTime<FixedOffset>> for TimeInput {
    fn from(instant: DateTime<FixedOffset>) -> Self {
        TimeInput::Instant(instant.with_timezone(&Tz::UTC))
    }
}

impl From<&str> for TimeInput {
    fn from(text: &str) -> Self {
        TimeInput::Text(text.to_string())
    }
}

impl From<String> for TimeInput {
    fn from(text: String) -> Self {
        TimeInput::Text(text)
    }
}

impl TryFrom<&serde_json::Value> for TimeInput {
    type Error = TimeError;

    /// Only JSON strings describe a time; every other shape is rejected
    fn try_from(value: &serde_json::Value) -> TimeResult<Self> {
        match value {
            serde_json::Value::String(text) => Ok(TimeInput::Text(text.clone())),
            other => Err(TimeError::UnsupportedInput(other.to_string())),
        }
    }
}

impl std::fmt::Display for TimeInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeInput::Date(date) => write!(f, "{}", date),
            TimeInput::Instant(instant) => write!(f, "{}", instant.to_rfc3339()),
            TimeInput::Text(text) => write!(f, "{}", text),
        }
    }
}

/// Parse a time input into an instant in `zone`
///
/// With `end_of_day` set, inputs that carry only a date resolve to 23:59:59
/// instead of 00:00:00. Inputs with a time of day are never adjusted.
pub fn parse(input: &TimeInput, zone: Tz, end_of_day: bool) -> TimeResult<Instant> {
    match input {
        TimeInput::Date(date) => Ok(day_boundary(*date, zone, end_of_day)),
        TimeInput::Instant(instant) => Ok(instant.with_timezone(&zone)),
        TimeInput::Text(text) => parse_text(text, zone, end_of_day),
    }
}

/// Parse then render as `YYYY-MM-DDTHH:MM:SSZ`
pub fn to_utc_string(input: &TimeInput, zone: Tz, end_of_day: bool) -> TimeResult<String> {
    parse(input, zone, end_of_day).map(|instant| utc_string(&instant))
}

/// Render an instant as second-precision UTC ISO-8601 with a `Z` suffix
pub fn utc_string<Z: TimeZone>(instant: &DateTime<Z>) -> String {
    instant
        .with_timezone(&Utc)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

/// Midnight at the start of `date` in `zone`
pub fn start_of_day(date: NaiveDate, zone: Tz) -> Instant {
    localize(date.and_time(NaiveTime::MIN), zone)
}

/// 23:59:59 on `date` in `zone`
pub fn end_of_day(date: NaiveDate, zone: Tz) -> Instant {
    localize(
        date.and_time(NaiveTime::MIN) + Duration::seconds(LAST_SECOND_OF_DAY),
        zone,
    )
}

/// Look up an IANA zone by name
pub fn parse_zone(name: &str) -> TimeResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| TimeError::UnknownZone(name.to_string()))
}

/// Attach `zone` to a wall-clock time
///
/// A time that occurs twice (DST fold) resolves to the earlier instant. A
/// time that never occurs (DST gap) moves forward to the first valid minute.
pub fn localize(naive: NaiveDateTime, zone: Tz) -> Instant {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let mut probe = naive
                .with_second(0)
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(naive);
            // Gaps are at most a few hours; a day of probing is plenty
            for _ in 0..(24 * 60) {
                probe += Duration::minutes(1);
                if let Some(instant) = zone.from_local_datetime(&probe).earliest() {
                    return instant;
                }
            }
            Utc.from_utc_datetime(&naive).with_timezone(&zone)
        }
    }
}

fn day_boundary(date: NaiveDate, zone: Tz, end: bool) -> Instant {
    if end {
        end_of_day(date, zone)
    } else {
        start_of_day(date, zone)
    }
}

fn parse_text(text: &str, zone: Tz, end: bool) -> TimeResult<Instant> {
    let trimmed = text.trim();

    // An explicit offset makes the text a zoned instant
    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant.with_timezone(&zone));
    }

    if let Some(naive) = first_datetime(trimmed, DATETIME_FORMATS) {
        return Ok(localize(naive, zone));
    }
    if let Some(date) = first_date(trimmed, DATE_FORMATS) {
        return Ok(day_boundary(date, zone, end));
    }
    if let Some(naive) = first_datetime(trimmed, DAY_FIRST_DATETIME_FORMATS) {
        return Ok(localize(naive, zone));
    }
    if let Some(date) = first_date(trimmed, DAY_FIRST_DATE_FORMATS) {
        return Ok(day_boundary(date, zone, end));
    }

    Err(TimeError::Parse(text.to_string()))
}

fn first_datetime(text: &str, formats: &[&str]) -> Option<NaiveDateTime> {
    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

fn first_date(text: &str, formats: &[&str]) -> Option<NaiveDate> {
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}
