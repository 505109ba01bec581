use refrate_store::{Record, SOURCE_COLUMN};
use serde::Serialize;

use crate::{ColumnSchema, CurrencyCode, PublishedAt, RateValue, ValidationError};

/// One currency's rates from one document. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateObservation {
    published_at: PublishedAt,
    currency: CurrencyCode,
    schema: ColumnSchema,
    rates: Vec<RateValue>,
    source_reference: String,
}

impl RateObservation {
    pub fn new(
        published_at: PublishedAt,
        currency: CurrencyCode,
        schema: ColumnSchema,
        rates: Vec<RateValue>,
        source_reference: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        schema.check_arity(rates.len())?;
        Ok(Self {
            published_at,
            currency,
            schema,
            rates,
            source_reference: source_reference.into(),
        })
    }

    pub fn published_at(&self) -> PublishedAt {
        self.published_at
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub fn rates(&self) -> &[RateValue] {
        &self.rates
    }

    pub fn source_reference(&self) -> &str {
        &self.source_reference
    }

    /// Rate under a named column, if the schema has it.
    pub fn rate(&self, column: &str) -> Option<&RateValue> {
        self.schema
            .columns()
            .iter()
            .position(|name| name.eq_ignore_ascii_case(column))
            .and_then(|index| self.rates.get(index))
    }

    /// Store record addressed by column name, plus the source column.
    pub fn to_record(&self) -> Record {
        let record = self
            .schema
            .columns()
            .iter()
            .zip(&self.rates)
            .fold(Record::new(self.published_at.into_inner()), |record, (column, rate)| {
                record.with_field(column.as_str(), rate.as_str())
            });
        record.with_field(SOURCE_COLUMN, self.source_reference.as_str())
    }
}

/// Parsed table row before it is bound to a timestamp and source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateRow {
    pub currency: CurrencyCode,
    pub rates: Vec<RateValue>,
}
