use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// A rate exactly as printed in the source document.
///
/// The literal is kept verbatim (`83.50` stays `83.50`) so the series records
/// what the document said, not a float rendering of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RateValue(String);

impl RateValue {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let invalid = || ValidationError::InvalidRate {
            value: trimmed.to_owned(),
        };
        let (whole, fraction) = match trimmed.split_once('.') {
            Some((whole, fraction)) => (whole, Some(fraction)),
            None => (trimmed, None),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if let Some(fraction) = fraction {
            if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Formats a numeric reading (e.g. from the vision path) with two decimals,
    /// the precision the rate tables print.
    pub fn from_f64(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::InvalidRate {
                value: value.to_string(),
            });
        }
        Ok(Self(format!("{value:.2}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0.parse().unwrap_or_default()
    }
}

impl Display for RateValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for RateValue {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RateValue> for String {
    fn from(value: RateValue) -> Self {
        value.0
    }
}

/// Ordered rate-column names negotiated from a table header, e.g.
/// `["TT BUY", "TT SELL", "BILL BUY", "BILL SELL"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSchema(Vec<String>);

impl ColumnSchema {
    pub fn new<I, S>(columns: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns: Vec<String> = columns
            .into_iter()
            .map(|column| canonical_column(column.as_ref()))
            .filter(|column| !column.is_empty())
            .collect();
        if columns.is_empty() {
            return Err(ValidationError::EmptySchema);
        }
        Ok(Self(columns))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    /// Validates that a row's value count matches the schema arity.
    pub fn check_arity(&self, actual: usize) -> Result<(), ValidationError> {
        if actual == self.0.len() {
            Ok(())
        } else {
            Err(ValidationError::ArityMismatch {
                expected: self.0.len(),
                actual,
            })
        }
    }
}

/// Words of a header cell or line, split on whitespace, `|`, `,` and `/`,
/// stripped to ASCII alphanumerics and uppercased: `"T.T. Buy"` yields
/// `TT`, `BUY`.
pub fn column_words(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(|c: char| c.is_whitespace() || matches!(c, '|' | ',' | '/'))
        .map(|word| {
            word.chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_ascii_uppercase()
        })
        .filter(|word| !word.is_empty())
}

/// Column name as stored: `"t.t.  buy"` → `"TT BUY"`.
pub fn canonical_column(raw: &str) -> String {
    column_words(raw).collect::<Vec<_>>().join(" ")
}
