//! Publication timestamp resolution.
//!
//! A rate document states its validity as two labelled lines, e.g.
//!
//! ```text
//! Date 05-01-2024
//! Time 10:30 AM
//! ```
//!
//! Numeric dates are read both day-first and month-first. When the readings
//! disagree the document's creation date breaks the tie; without a matching
//! creation date resolution fails rather than guess.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;
use time::{Date, Month, Time};
use tracing::debug;

use crate::{IngestError, PublishedAt};

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})\b").expect("iso date regex should compile")
});

static NUMERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})\s*[-/.]\s*(\d{1,2})\s*[-/.]\s*(\d{4}|\d{2})\b")
        .expect("numeric date regex should compile")
});

static DAY_MONTH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?[\s\-,]*([a-z]{3,9})\.?[\s\-,]*(\d{4})\b")
        .expect("day month-name regex should compile")
});

static MONTH_NAME_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b")
        .expect("month-name day regex should compile")
});

static CLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s*[:.]\s*(\d{2})(?:\s*[:.]\s*\d{2})?(?:\s*(a\.?m\.?|p\.?m\.?))?")
        .expect("clock regex should compile")
});

/// Why a timestamp could not be resolved.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DateTimeError {
    #[error("no line introducing the {0}")]
    MissingLine(&'static str),

    #[error("unrecognized date '{0}'")]
    UnrecognizedDate(String),

    #[error("unrecognized time '{0}'")]
    UnrecognizedTime(String),

    #[error(
        "ambiguous date '{text}': day-first {day_first}, month-first {month_first}, \
         and no creation date selects one"
    )]
    Ambiguous {
        text: String,
        day_first: Date,
        month_first: Date,
    },
}

impl DateTimeError {
    /// Ambiguity is a property of the printed text, so no other extraction
    /// path can resolve it.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }
}

impl From<DateTimeError> for IngestError {
    fn from(value: DateTimeError) -> Self {
        Self::DateTimeExtraction(value.to_string())
    }
}

/// The locale readings of a date string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateReading {
    Unambiguous(Date),
    Ambiguous { day_first: Date, month_first: Date },
}

impl DateReading {
    /// Settles an ambiguous reading with the document creation date, if it
    /// matches exactly one candidate.
    pub fn settle(self, created_on: Option<Date>) -> Option<Date> {
        match self {
            Self::Unambiguous(date) => Some(date),
            Self::Ambiguous {
                day_first,
                month_first,
            } => match created_on {
                Some(created) if created == day_first => Some(day_first),
                Some(created) if created == month_first => Some(month_first),
                _ => None,
            },
        }
    }
}

/// Resolves the publication timestamp of a document.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeResolver;

impl DateTimeResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolves from the extracted pages, in page order.
    pub fn resolve_pages(
        &self,
        pages: &[String],
        created_on: Option<Date>,
    ) -> Result<PublishedAt, DateTimeError> {
        self.resolve(&pages.join("\n"), created_on)
    }

    /// Scans `text` for the date and time lines and combines them.
    pub fn resolve(&self, text: &str, created_on: Option<Date>) -> Result<PublishedAt, DateTimeError> {
        let (date_text, inline_time) =
            find_labelled(text, "date").ok_or(DateTimeError::MissingLine("date"))?;
        let time_text = match find_labelled(text, "time") {
            Some((time_text, _)) => time_text,
            None => inline_time.ok_or(DateTimeError::MissingLine("time"))?,
        };
        self.resolve_parts(date_text, time_text, created_on)
    }

    /// Combines separately located date and time strings, e.g. the fields of
    /// a vision read.
    pub fn resolve_parts(
        &self,
        date_text: &str,
        time_text: &str,
        created_on: Option<Date>,
    ) -> Result<PublishedAt, DateTimeError> {
        let reading = read_date(date_text)?;
        let date = reading
            .settle(created_on)
            .ok_or_else(|| match reading {
                DateReading::Ambiguous {
                    day_first,
                    month_first,
                } => DateTimeError::Ambiguous {
                    text: date_text.trim().to_owned(),
                    day_first,
                    month_first,
                },
                DateReading::Unambiguous(_) => DateTimeError::UnrecognizedDate(date_text.to_owned()),
            })?;
        let time = read_time(time_text)?;
        let published_at = PublishedAt::new(date, time);
        debug!(%published_at, ?reading, ?created_on, "resolved publication timestamp");
        Ok(published_at)
    }
}

/// Finds the first line introduced by `label` and returns its value. When the
/// other label follows on the same line (`Date 05-01-2024 Time 10:30`), the
/// value is split there and the remainder returned alongside.
fn find_labelled<'a>(text: &'a str, label: &str) -> Option<(&'a str, Option<&'a str>)> {
    text.lines().find_map(|line| {
        let value = introduced_by(line, label)?;
        if label != "date" {
            return Some((value, None));
        }
        match value.to_ascii_lowercase().find("time") {
            Some(index) => {
                let inline = introduced_by(&value[index..], "time");
                Some((&value[..index], inline))
            }
            None => Some((value, None)),
        }
    })
}

fn introduced_by<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let line = line.trim_start();
    let head = line.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    let rest = &line[label.len()..];
    // "Dated:" introduces a date as well as "Date:" does.
    let rest = rest
        .strip_prefix('d')
        .or_else(|| rest.strip_prefix('D'))
        .unwrap_or(rest);
    if rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(rest.trim_start_matches(|c: char| c == ':' || c == '-' || c.is_whitespace()))
}

/// Reads a date string under both locale assumptions.
pub fn read_date(text: &str) -> Result<DateReading, DateTimeError> {
    let unrecognized = || DateTimeError::UnrecognizedDate(text.trim().to_owned());

    if let Some(caps) = ISO_DATE.captures(text) {
        let (year, month, day) = (number(&caps, 1), number(&caps, 2), number(&caps, 3));
        return calendar_date(year, month, day)
            .map(DateReading::Unambiguous)
            .ok_or_else(unrecognized);
    }

    if let Some(caps) = DAY_MONTH_NAME.captures(text) {
        if let Some(month) = month_from_name(&caps[2]) {
            return Date::from_calendar_date(number(&caps, 3) as i32, month, number(&caps, 1) as u8)
                .map(DateReading::Unambiguous)
                .map_err(|_| unrecognized());
        }
    }

    if let Some(caps) = MONTH_NAME_DAY.captures(text) {
        if let Some(month) = month_from_name(&caps[1]) {
            return Date::from_calendar_date(number(&caps, 3) as i32, month, number(&caps, 2) as u8)
                .map(DateReading::Unambiguous)
                .map_err(|_| unrecognized());
        }
    }

    let caps = NUMERIC_DATE.captures(text).ok_or_else(unrecognized)?;
    let (first, second) = (number(&caps, 1), number(&caps, 2));
    let year = match number(&caps, 3) {
        short if caps[3].len() == 2 => 2000 + short,
        full => full,
    };

    match (
        calendar_date(year, second, first),
        calendar_date(year, first, second),
    ) {
        (Some(day_first), Some(month_first)) if day_first == month_first => {
            Ok(DateReading::Unambiguous(day_first))
        }
        (Some(day_first), Some(month_first)) => Ok(DateReading::Ambiguous {
            day_first,
            month_first,
        }),
        (Some(date), None) | (None, Some(date)) => Ok(DateReading::Unambiguous(date)),
        (None, None) => Err(unrecognized()),
    }
}

/// Reads `H:MM` or `H.MM`, with an optional AM/PM suffix.
pub fn read_time(text: &str) -> Result<Time, DateTimeError> {
    let unrecognized = || DateTimeError::UnrecognizedTime(text.trim().to_owned());
    let caps = CLOCK.captures(text).ok_or_else(unrecognized)?;
    let (hour, minute) = (number(&caps, 1), number(&caps, 2));

    let hour = match caps.get(3).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(suffix) => {
            if !(1..=12).contains(&hour) {
                return Err(unrecognized());
            }
            match (suffix.starts_with('p'), hour) {
                (false, 12) => 0,
                (false, h) => h,
                (true, 12) => 12,
                (true, h) => h + 12,
            }
        }
        None => hour,
    };

    u8::try_from(hour)
        .ok()
        .zip(u8::try_from(minute).ok())
        .and_then(|(hour, minute)| Time::from_hms(hour, minute, 0).ok())
        .ok_or_else(unrecognized)
}

fn number(caps: &Captures<'_>, index: usize) -> u32 {
    caps.get(index)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or_default()
}

fn calendar_date(year: u32, month: u32, day: u32) -> Option<Date> {
    let month = Month::try_from(u8::try_from(month).ok()?).ok()?;
    Date::from_calendar_date(i32::try_from(year).ok()?, month, u8::try_from(day).ok()?).ok()
}

fn month_from_name(name: &str) -> Option<Month> {
    const MONTHS: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];
    let lowered = name.to_ascii_lowercase();
    if lowered.len() < 3 {
        return None;
    }
    MONTHS
        .into_iter()
        .find(|month| month.to_string().to_ascii_lowercase().starts_with(&lowered))
}
