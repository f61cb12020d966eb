//! Free-form date/time entry.
//!
//! Operators type timestamps in whatever shape is convenient: `2024-03-05 21:40`,
//! `05.03.2024 21:40:12`, `h=21 m=40`, ... The text is scanned left to right
//! against an ordered table of token patterns; every field that is not
//! mentioned keeps its value from a reference "now" timestamp.
//!
//! Text that cannot be tokenised, or that names a date that does not exist,
//! yields the reference timestamp unchanged.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use time::format_description;
use time::{Date, Month as CalendarMonth, OffsetDateTime, PrimitiveDateTime, Time};

#[derive(Error, Debug)]
pub enum DatetimeError {
    #[error("Invalid format description: {0}")]
    InvalidFormat(#[from] time::error::InvalidFormatDescription),
    #[error("Formatting failed: {0}")]
    Format(#[from] time::error::Format),
    #[error("Timestamp {0} is out of range")]
    OutOfRange(f64),
    #[error("Unsupported strftime directive %{0}")]
    UnsupportedDirective(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

use Field::*;

/// Token patterns in priority order. `None` marks separators that carry no fields.
static DATETIME_PATTERNS: Lazy<Vec<(Regex, Option<&'static [Field]>)>> = Lazy::new(|| {
    let table: [(&str, Option<&'static [Field]>); 14] = [
        (r"\s+", None),
        (r"(\d+)-(\d+)-(\d+)", Some(&[Year, Month, Day])),
        (r"(\d+)\.(\d+)\.(\d+)", Some(&[Day, Month, Year])),
        (r"(\d+):(\d+):(\d+):(\d+)", Some(&[Hour, Minute, Second, Millisecond])),
        (r"(\d+):(\d+):(\d+)\.(\d+)", Some(&[Hour, Minute, Second, Millisecond])),
        (r"(\d+):(\d+):(\d+)", Some(&[Hour, Minute, Second])),
        (r"(\d+):(\d+)", Some(&[Hour, Minute])),
        // manual entry
        (r"Y\s*=\s*(\d+)", Some(&[Year])),
        (r"M\s*=\s*(\d+)", Some(&[Month])),
        (r"D\s*=\s*(\d+)", Some(&[Day])),
        (r"h\s*=\s*(\d+)", Some(&[Hour])),
        (r"ms\s*=\s*(\d+)", Some(&[Millisecond])),
        (r"m\s*=\s*(\d+)", Some(&[Minute])),
        (r"s\s*=\s*(\d+)", Some(&[Second])),
    ];
    table
        .into_iter()
        .map(|(src, fields)| (Regex::new(src).expect("static pattern"), fields))
        .collect()
});

/// Calendar fields being assembled, indexed by [`Field`]
#[derive(Debug, Clone, Copy)]
struct Fields([i64; 7]);

impl Fields {
    fn from_datetime(dt: PrimitiveDateTime) -> Self {
        Self([
            dt.year() as i64,
            u8::from(dt.month()) as i64,
            dt.day() as i64,
            dt.hour() as i64,
            dt.minute() as i64,
            dt.second() as i64,
            dt.millisecond() as i64,
        ])
    }

    fn set(&mut self, field: Field, value: i64) {
        self.0[field as usize] = value;
    }

    fn get(&self, field: Field) -> i64 {
        self.0[field as usize]
    }

    fn to_datetime(self) -> Option<PrimitiveDateTime> {
        let month = CalendarMonth::try_from(u8::try_from(self.get(Month)).ok()?).ok()?;
        let date = Date::from_calendar_date(
            i32::try_from(self.get(Year)).ok()?,
            month,
            u8::try_from(self.get(Day)).ok()?,
        )
        .ok()?;
        let time = Time::from_hms_milli(
            u8::try_from(self.get(Hour)).ok()?,
            u8::try_from(self.get(Minute)).ok()?,
            u8::try_from(self.get(Second)).ok()?,
            u16::try_from(self.get(Millisecond)).ok()?,
        )
        .ok()?;
        Some(PrimitiveDateTime::new(date, time))
    }
}

/// Outcome of matching one token at a position
enum Token {
    Separator,
    Values(Vec<(Field, i64)>),
}

fn match_token(text: &str, start: usize) -> Option<(Token, usize)> {
    for (regex, fields) in DATETIME_PATTERNS.iter() {
        let Some(caps) = regex.captures_at(text, start) else {
            continue;
        };
        let whole = caps.get(0)?;
        if whole.start() != start {
            continue;
        }
        let token = match fields {
            None => Token::Separator,
            Some(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                for (k, field) in fields.iter().enumerate() {
                    // Absurdly long digit runs cannot form a valid date anyway
                    let value = caps.get(k + 1)?.as_str().parse::<i64>().ok()?;
                    values.push((*field, value));
                }
                Token::Values(values)
            }
        };
        return Some((token, whole.end()));
    }
    None
}

/// Parse free-form text into a calendar timestamp.
///
/// Fields not present in `text` are taken from `now`.
pub fn parse_datetime(text: &str, now: PrimitiveDateTime) -> PrimitiveDateTime {
    let mut fields = Fields::from_datetime(now);
    let mut start = 0;
    while start < text.len() {
        let Some((token, end)) = match_token(text, start) else {
            return now;
        };
        start = end;
        if let Token::Values(values) = token {
            for (field, value) in values {
                fields.set(field, value);
            }
        }
    }
    fields.to_datetime().unwrap_or(now)
}

/// Parse free-form text into seconds since the Unix epoch (UTC).
pub fn parse_datetimes(text: &str, now: PrimitiveDateTime) -> f64 {
    datetime_to_unixtime(parse_datetime(text, now))
}

/// Seconds since the Unix epoch for a naive UTC timestamp
pub fn datetime_to_unixtime(dt: PrimitiveDateTime) -> f64 {
    dt.assume_utc().unix_timestamp_nanos() as f64 * 1e-9
}

/// Inverse of [`datetime_to_unixtime`]
pub fn unixtime_to_datetime(unix: f64) -> Result<OffsetDateTime, DatetimeError> {
    if !unix.is_finite() {
        return Err(DatetimeError::OutOfRange(unix));
    }
    OffsetDateTime::from_unix_timestamp_nanos((unix * 1e9).round() as i128)
        .map_err(|_| DatetimeError::OutOfRange(unix))
}

/// Translate a strftime pattern (`%Y-%m-%d %H:%M:%S`) into a time crate
/// format description
pub fn strftime_to_description(format: &str) -> Result<String, DatetimeError> {
    let mut out = String::with_capacity(format.len() * 2);
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                let component = match chars.next() {
                    // A trailing percent sign is literal
                    None => "%",
                    Some(directive) => match directive {
                        'Y' => "[year]",
                        'y' => "[year repr:last_two]",
                        'm' => "[month]",
                        'b' | 'h' => "[month repr:short]",
                        'B' => "[month repr:long]",
                        'd' => "[day]",
                        'e' => "[day padding:space]",
                        'j' => "[ordinal]",
                        'a' => "[weekday repr:short]",
                        'A' => "[weekday repr:long]",
                        'H' => "[hour]",
                        'I' => "[hour repr:12]",
                        'p' => "[period]",
                        'M' => "[minute]",
                        'S' => "[second]",
                        'f' => "[subsecond digits:6]",
                        '%' => "%",
                        other => return Err(DatetimeError::UnsupportedDirective(other)),
                    },
                };
                out.push_str(component);
            }
            '[' => out.push_str("[["),
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Render a Unix timestamp with a time crate format description, or with a
/// strftime pattern when `format` contains `%` directives
pub fn format_unixtime(unix: f64, format: &str) -> Result<String, DatetimeError> {
    let translated;
    let format = if format.contains('%') {
        translated = strftime_to_description(format)?;
        translated.as_str()
    } else {
        format
    };
    let description = format_description::parse(format)?;
    Ok(unixtime_to_datetime(unix)?.format(&description)?)
}

/// Current UTC wall-clock time without offset
pub fn utc_now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}
