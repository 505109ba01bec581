use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time};

const MINUTE_FORMAT: &[FormatItem<'_>] = format_description!("[year]-[month]-[day] [hour]:[minute]");
const SECOND_FORMAT: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const DATE_FORMAT: &[FormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// Formats a series key in the on-disk display format `YYYY-MM-DD HH:MM`.
pub fn format_timestamp(value: PrimitiveDateTime) -> String {
    value
        .format(MINUTE_FORMAT)
        .unwrap_or_else(|_| value.to_string())
}

/// Formats a calendar date as `YYYY-MM-DD`.
pub fn format_date(value: Date) -> String {
    value.format(DATE_FORMAT).unwrap_or_else(|_| value.to_string())
}

/// Parses a stored series key.
///
/// Accepts the canonical minute format plus the second-precision and
/// date-only forms found in older files. Seconds are truncated.
pub fn parse_timestamp(input: &str) -> Option<PrimitiveDateTime> {
    let trimmed = input.trim();
    if let Ok(parsed) = PrimitiveDateTime::parse(trimmed, MINUTE_FORMAT) {
        return Some(parsed);
    }
    if let Ok(parsed) = PrimitiveDateTime::parse(trimmed, SECOND_FORMAT) {
        return parsed.replace_second(0).ok();
    }
    Date::parse(trimmed, DATE_FORMAT)
        .ok()
        .map(|date| date.with_time(Time::MIDNIGHT))
}
