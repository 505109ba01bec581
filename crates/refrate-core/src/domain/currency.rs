use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// ISO 4217 style three-letter currency code, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parses a code such as `usd`, `USD`, or the paired form `USD/INR`.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let base = trimmed.split('/').next().unwrap_or_default().trim();
        let normalized = base.to_ascii_uppercase();
        if normalized.len() != 3 || !normalized.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ValidationError::InvalidCurrency {
                value: trimmed.to_owned(),
            });
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CurrencyCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for CurrencyCode {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_strips_quote_currency() {
        assert_eq!(CurrencyCode::parse("usd").expect("valid").as_str(), "USD");
        assert_eq!(CurrencyCode::parse("GBP/INR").expect("valid").as_str(), "GBP");
    }

    #[test]
    fn rejects_wrong_length_and_digits() {
        assert!(matches!(
            CurrencyCode::parse("US"),
            Err(ValidationError::InvalidCurrency { .. })
        ));
        assert!(CurrencyCode::parse("US1").is_err());
        assert!(CurrencyCode::parse("").is_err());
    }
}
