use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{Date, PrimitiveDateTime, Time};

use crate::ValidationError;

/// Publication timestamp printed on a rate document, at minute precision.
///
/// The document states local wall-clock time with no offset, so this is a
/// naive date-time. It is the dedup key of every series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublishedAt(PrimitiveDateTime);

impl PublishedAt {
    /// Combines a date and time, truncating seconds and below.
    pub fn new(date: Date, time: Time) -> Self {
        let minute = Time::from_hms(time.hour(), time.minute(), 0).unwrap_or(Time::MIDNIGHT);
        Self(PrimitiveDateTime::new(date, minute))
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        refrate_store::parse_timestamp(input)
            .map(|value| Self::new(value.date(), value.time()))
            .ok_or_else(|| ValidationError::InvalidTimestamp {
                value: input.to_owned(),
            })
    }

    pub fn date(self) -> Date {
        self.0.date()
    }

    pub fn into_inner(self) -> PrimitiveDateTime {
        self.0
    }

    /// `YYYY-MM-DD HH:MM`, the series display format.
    pub fn format(self) -> String {
        refrate_store::format_timestamp(self.0)
    }
}

impl From<PrimitiveDateTime> for PublishedAt {
    fn from(value: PrimitiveDateTime) -> Self {
        Self::new(value.date(), value.time())
    }
}

impl Display for PublishedAt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

impl Serialize for PublishedAt {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format())
    }
}

impl<'de> Deserialize<'de> for PublishedAt {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}
