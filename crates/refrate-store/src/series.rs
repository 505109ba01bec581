//! In-memory model of one currency's series.
//!
//! A [`Series`] is a key-indexed ordered map from publication timestamp to the
//! row's field literals. The map's ordering is the on-disk ordering, so a
//! series can never be written unsorted or with two rows on the same key.

use std::collections::BTreeMap;
use std::ops::RangeBounds;

use serde::Serialize;
use time::PrimitiveDateTime;

/// Name of the timestamp column that leads every series file.
pub const DATE_COLUMN: &str = "DATE";

/// Name of the trailing informational column pointing back at the source document.
pub const SOURCE_COLUMN: &str = "PDF FILE";

/// One dated record to merge, with its fields addressed by column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub published_at: PrimitiveDateTime,
    pub fields: Vec<(String, String)>,
}

impl Record {
    pub fn new(published_at: PrimitiveDateTime) -> Self {
        Self {
            published_at,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((column.into(), value.into()));
        self
    }

    fn field(&self, column: &str) -> Option<&str> {
        // Last write wins if a column was named twice.
        self.fields
            .iter()
            .rev()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }
}

/// Whether a merge added a new key or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Inserted,
    Replaced,
}

/// Result of aligning a [`Record`] to a series header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub outcome: MergeOutcome,
    /// Record columns that the series header does not know about.
    pub ignored_columns: Vec<String>,
    /// Header columns the record did not provide (written empty).
    pub missing_columns: Vec<String>,
    pub series_len: usize,
}

/// Full, ordered, deduplicated history for one currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Series {
    currency: String,
    header: Vec<String>,
    rows: BTreeMap<PrimitiveDateTime, Vec<String>>,
}

impl Series {
    /// Creates an empty series. `columns` are the value columns between the
    /// leading [`DATE_COLUMN`] and the trailing [`SOURCE_COLUMN`].
    pub fn new(currency: impl Into<String>, columns: &[String]) -> Self {
        let mut header = Vec::with_capacity(columns.len() + 2);
        header.push(String::from(DATE_COLUMN));
        header.extend(columns.iter().cloned());
        header.push(String::from(SOURCE_COLUMN));
        Self::with_header(currency, header)
    }

    /// Creates an empty series from a full header as read from disk.
    pub(crate) fn with_header(currency: impl Into<String>, header: Vec<String>) -> Self {
        Self {
            currency: currency.into(),
            header,
            rows: BTreeMap::new(),
        }
    }

    pub(crate) fn insert_raw(&mut self, published_at: PrimitiveDateTime, mut fields: Vec<String>) {
        fields.resize(self.header.len().saturating_sub(1), String::new());
        self.rows.insert(published_at, fields);
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Full header, starting with the date column.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn timestamps(&self) -> impl DoubleEndedIterator<Item = PrimitiveDateTime> + '_ {
        self.rows.keys().copied()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (PrimitiveDateTime, &[String])> + '_ {
        self.rows.iter().map(|(ts, fields)| (*ts, fields.as_slice()))
    }

    pub fn range<R>(
        &self,
        range: R,
    ) -> impl DoubleEndedIterator<Item = (PrimitiveDateTime, &[String])> + '_
    where
        R: RangeBounds<PrimitiveDateTime>,
    {
        self.rows
            .range(range)
            .map(|(ts, fields)| (*ts, fields.as_slice()))
    }

    /// Field literals stored at `published_at`, aligned with `header()[1..]`.
    pub fn get(&self, published_at: PrimitiveDateTime) -> Option<&[String]> {
        self.rows.get(&published_at).map(Vec::as_slice)
    }

    /// Rate columns of the header, without the date and source columns.
    pub fn rate_columns(&self) -> impl Iterator<Item = &str> + '_ {
        self.header
            .iter()
            .skip(1)
            .map(String::as_str)
            .filter(|name| *name != SOURCE_COLUMN)
    }

    /// True when `record` carries at least one of this series' rate columns.
    pub fn accepts(&self, record: &Record) -> bool {
        self.rate_columns()
            .any(|column| record.field(column).is_some())
    }

    /// Index of `column` within a row's fields (not within the header).
    pub fn field_index(&self, column: &str) -> Option<usize> {
        self.header
            .iter()
            .skip(1)
            .position(|name| name.eq_ignore_ascii_case(column))
    }

    pub fn value(&self, published_at: PrimitiveDateTime, column: &str) -> Option<&str> {
        let index = self.field_index(column)?;
        self.rows
            .get(&published_at)
            .and_then(|fields| fields.get(index))
            .map(String::as_str)
    }

    /// Merges one record, replacing any row already stored on the same
    /// timestamp. Fields are aligned by column name to the existing header.
    pub fn upsert(&mut self, record: &Record) -> MergeReport {
        let value_columns = &self.header[1..];
        let fields: Vec<String> = value_columns
            .iter()
            .map(|column| record.field(column).unwrap_or_default().to_owned())
            .collect();

        let missing_columns = value_columns
            .iter()
            .filter(|column| record.field(column).is_none())
            .cloned()
            .collect();
        let ignored_columns = record
            .fields
            .iter()
            .filter(|(name, _)| !value_columns.contains(name))
            .map(|(name, _)| name.clone())
            .collect();

        let outcome = match self.rows.insert(record.published_at, fields) {
            Some(_) => MergeOutcome::Replaced,
            None => MergeOutcome::Inserted,
        };

        MergeReport {
            outcome,
            ignored_columns,
            missing_columns,
            series_len: self.rows.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn columns() -> Vec<String> {
        vec![String::from("TT BUY"), String::from("TT SELL")]
    }

    fn record(ts: PrimitiveDateTime, buy: &str, sell: &str) -> Record {
        Record::new(ts)
            .with_field("TT BUY", buy)
            .with_field("TT SELL", sell)
            .with_field(SOURCE_COLUMN, "doc.pdf")
    }

    #[test]
    fn new_series_wraps_columns_with_date_and_source() {
        let series = Series::new("USD", &columns());
        assert_eq!(series.header(), ["DATE", "TT BUY", "TT SELL", "PDF FILE"]);
        assert!(series.is_empty());
    }

    #[test]
    fn upsert_keeps_keys_sorted_regardless_of_call_order() {
        let mut series = Series::new("USD", &columns());
        let t1 = datetime!(2024-01-01 10:00);
        let t2 = datetime!(2024-01-02 10:00);
        let t3 = datetime!(2024-01-03 10:00);

        series.upsert(&record(t3, "3.00", "3.10"));
        series.upsert(&record(t1, "1.00", "1.10"));
        series.upsert(&record(t2, "2.00", "2.10"));

        assert_eq!(series.timestamps().collect::<Vec<_>>(), vec![t1, t2, t3]);
    }

    #[test]
    fn upsert_on_existing_key_replaces_in_place() {
        let mut series = Series::new("USD", &columns());
        let ts = datetime!(2024-01-05 10:30);

        let first = series.upsert(&record(ts, "83.50", "84.40"));
        let second = series.upsert(&record(ts, "83.55", "84.45"));

        assert_eq!(first.outcome, MergeOutcome::Inserted);
        assert_eq!(second.outcome, MergeOutcome::Replaced);
        assert_eq!(series.len(), 1);
        assert_eq!(series.value(ts, "TT BUY"), Some("83.55"));
    }

    #[test]
    fn upsert_aligns_by_name_and_reports_header_drift() {
        let mut series = Series::new("USD", &columns());
        let ts = datetime!(2024-02-01 09:00);
        let drifted = Record::new(ts)
            .with_field("TT SELL", "84.40")
            .with_field("CN BUY", "82.00");

        let report = series.upsert(&drifted);

        assert_eq!(report.ignored_columns, vec![String::from("CN BUY")]);
        assert_eq!(
            report.missing_columns,
            vec![String::from("TT BUY"), String::from(SOURCE_COLUMN)]
        );
        assert_eq!(
            series.get(ts),
            Some(&[String::new(), String::from("84.40"), String::new()][..])
        );
    }
}
