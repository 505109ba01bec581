//! # Refrate Store
//!
//! Durable per-currency time series for reference-rate observations.
//!
//! ## Overview
//!
//! Each currency owns one CSV file named `<prefix><CODE>.csv`:
//!
//! ```text
//! DATE,TT BUY,TT SELL,...,PDF FILE
//! 2024-01-05 10:30,83.50,84.40,...,pdf_files/2024/1/2024-01-05.pdf
//! ```
//!
//! - The header is fixed by the first write and reused by every later write.
//! - Rows are unique by `DATE` and always sorted ascending.
//! - Every merge rewrites the whole file through a temporary file in the same
//!   directory that is renamed over the canonical name only after a complete,
//!   flushed write. A failure at any point leaves the previous file intact.
//!
//! The store is single-writer. Concurrent processes writing the same
//! directory must be serialized by the caller.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use refrate_store::{Record, SeriesStore, StoreConfig, SOURCE_COLUMN};
//! use time::macros::datetime;
//!
//! let store = SeriesStore::open(StoreConfig::new("./csv_files"))?;
//! let record = Record::new(datetime!(2024-01-05 10:30))
//!     .with_field("TT BUY", "83.50")
//!     .with_field("TT SELL", "84.40")
//!     .with_field(SOURCE_COLUMN, "2024-01-05.pdf");
//! let columns = vec![String::from("TT BUY"), String::from("TT SELL")];
//! store.merge("USD", &columns, &record)?;
//! # Ok::<(), refrate_store::StoreError>(())
//! ```

pub mod rollup;
pub mod series;
pub mod timestamp;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

pub use rollup::{month_end, month_ends, MonthEndRow, MonthEndTable};
pub use series::{MergeOutcome, MergeReport, Record, Series, DATE_COLUMN, SOURCE_COLUMN};
pub use timestamp::{format_date, format_timestamp, parse_timestamp};

/// Default series file prefix.
pub const DEFAULT_FILE_PREFIX: &str = "SBI_REFERENCE_RATES_";

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] io::Error),

    /// CSV encoding or decoding error.
    #[error("csv error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A stored row could not be interpreted.
    #[error("corrupt row at {path}:{line}: {reason}")]
    CorruptRow {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    /// A record shares no rate column with the stored header.
    #[error("{currency} record columns {record:?} match none of the stored columns {stored:?}")]
    ColumnMismatch {
        currency: String,
        stored: Vec<String>,
        record: Vec<String>,
    },

    /// The completed temporary file could not replace the series file.
    #[error("failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Store location and naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding one CSV file per currency.
    pub dir: PathBuf,
    /// File name prefix before the currency code.
    pub file_prefix: String,
}

impl StoreConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file_prefix: String::from(DEFAULT_FILE_PREFIX),
        }
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }
}

/// CSV-backed owner of every per-currency series in one directory.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    config: StoreConfig,
}

impl SeriesStore {
    /// Opens the store, creating its directory when missing.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.dir)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn path_for(&self, currency: &str) -> PathBuf {
        self.config
            .dir
            .join(format!("{}{}.csv", self.config.file_prefix, currency))
    }

    /// Currency codes with a series file, sorted.
    pub fn currencies(&self) -> Result<Vec<String>, StoreError> {
        let mut codes = Vec::new();
        for entry in fs::read_dir(&self.config.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let code = name
                .strip_prefix(self.config.file_prefix.as_str())
                .and_then(|rest| rest.strip_suffix(".csv"));
            if let Some(code) = code {
                if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
                    codes.push(code.to_owned());
                }
            }
        }
        codes.sort();
        Ok(codes)
    }

    /// Reads a series, or `None` when the currency has never been written.
    pub fn read(&self, currency: &str) -> Result<Option<Series>, StoreError> {
        let path = self.path_for(currency);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let csv_error = |source| StoreError::Csv {
            path: path.clone(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes.as_slice());
        let header: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|name| name.trim().to_owned())
            .collect();
        if header.len() < 2 {
            return Err(StoreError::CorruptRow {
                path,
                line: 1,
                reason: String::from("header must name a date column and at least one value"),
            });
        }

        let mut series = Series::with_header(currency, header);
        for result in reader.records() {
            let record = result.map_err(csv_error)?;
            let line = record.position().map(|pos| pos.line()).unwrap_or_default();
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            let raw_ts = record.get(0).unwrap_or_default();
            let published_at = parse_timestamp(raw_ts).ok_or_else(|| StoreError::CorruptRow {
                path: path.clone(),
                line,
                reason: format!("unparseable {DATE_COLUMN} value '{raw_ts}'"),
            })?;
            let fields = record.iter().skip(1).map(str::to_owned).collect();
            series.insert_raw(published_at, fields);
        }

        debug!(currency, rows = series.len(), path = %path.display(), "series loaded");
        Ok(Some(series))
    }

    /// Rewrites a series from scratch.
    ///
    /// The rows are written to a temporary file next to the target, flushed
    /// and synced, then renamed over the target. The temporary file is removed
    /// on every error path.
    pub fn write(&self, series: &Series) -> Result<(), StoreError> {
        let path = self.path_for(series.currency());
        let mut staged = tempfile::Builder::new()
            .prefix(".refrate-")
            .suffix(".csv.tmp")
            .tempfile_in(&self.config.dir)?;

        {
            let csv_error = |source| StoreError::Csv {
                path: path.clone(),
                source,
            };
            let mut writer = csv::Writer::from_writer(staged.as_file_mut());
            writer.write_record(series.header()).map_err(csv_error)?;
            for (published_at, fields) in series.iter() {
                writer
                    .write_record(
                        std::iter::once(format_timestamp(published_at))
                            .chain(fields.iter().cloned()),
                    )
                    .map_err(csv_error)?;
            }
            writer.flush()?;
        }
        staged.as_file_mut().flush()?;
        staged.as_file().sync_all()?;

        staged.persist(&path).map_err(|error| StoreError::Persist {
            path: path.clone(),
            source: error.error,
        })?;
        Ok(())
    }

    /// Fails with [`StoreError::ColumnMismatch`] when a stored series exists
    /// and `record` would land in it with every rate column blank.
    pub fn ensure_compatible(&self, currency: &str, record: &Record) -> Result<(), StoreError> {
        match self.read(currency)? {
            Some(series) => check_columns(&series, record),
            None => Ok(()),
        }
    }

    /// Read-modify-write merge of one record into a currency's series.
    ///
    /// `columns` seeds the header only when the series does not exist yet.
    pub fn merge(
        &self,
        currency: &str,
        columns: &[String],
        record: &Record,
    ) -> Result<MergeReport, StoreError> {
        let mut series = match self.read(currency)? {
            Some(series) => series,
            None => {
                info!(currency, "starting new series");
                Series::new(currency, columns)
            }
        };

        check_columns(&series, record)?;
        let report = series.upsert(record);
        if !report.ignored_columns.is_empty() {
            warn!(
                currency,
                ignored = ?report.ignored_columns,
                "record carries columns unknown to the stored header"
            );
        }

        self.write(&series)?;
        info!(
            currency,
            published_at = %format_timestamp(record.published_at),
            outcome = ?report.outcome,
            series_len = report.series_len,
            "series merged"
        );
        Ok(report)
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }
}

fn check_columns(series: &Series, record: &Record) -> Result<(), StoreError> {
    if series.accepts(record) {
        return Ok(());
    }
    Err(StoreError::ColumnMismatch {
        currency: series.currency().to_owned(),
        stored: series.rate_columns().map(str::to_owned).collect(),
        record: record
            .fields
            .iter()
            .map(|(name, _)| name.clone())
            .filter(|name| name != SOURCE_COLUMN)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn columns() -> Vec<String> {
        vec![String::from("TT BUY"), String::from("TT SELL")]
    }

    #[test]
    fn read_of_unknown_currency_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SeriesStore::open(StoreConfig::new(temp.path())).expect("open");
        assert!(store.read("USD").expect("read").is_none());
    }

    #[test]
    fn merge_creates_file_with_header_and_canonical_timestamp() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SeriesStore::open(StoreConfig::new(temp.path())).expect("open");
        let record = Record::new(datetime!(2024-01-05 10:30))
            .with_field("TT BUY", "83.50")
            .with_field("TT SELL", "84.40")
            .with_field(SOURCE_COLUMN, "a.pdf");

        store.merge("USD", &columns(), &record).expect("merge");

        let contents = fs::read_to_string(store.path_for("USD")).expect("read file");
        assert_eq!(
            contents,
            "DATE,TT BUY,TT SELL,PDF FILE\n2024-01-05 10:30,83.50,84.40,a.pdf\n"
        );
    }

    #[test]
    fn record_sharing_no_rate_column_is_refused() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SeriesStore::open(StoreConfig::new(temp.path())).expect("open");
        let first = Record::new(datetime!(2024-01-05 10:30))
            .with_field("TT BUY", "83.50")
            .with_field("TT SELL", "84.40")
            .with_field(SOURCE_COLUMN, "a.pdf");
        store.merge("USD", &columns(), &first).expect("merge");
        let before = fs::read_to_string(store.path_for("USD")).expect("read file");

        let stray = Record::new(datetime!(2024-01-06 10:30))
            .with_field("T.T. BUY", "83.60")
            .with_field(SOURCE_COLUMN, "b.pdf");
        assert!(matches!(
            store.ensure_compatible("USD", &stray),
            Err(StoreError::ColumnMismatch { .. })
        ));
        let error = store.merge("USD", &columns(), &stray).expect_err("blank row refused");
        assert!(matches!(error, StoreError::ColumnMismatch { ref record, .. } if record == &["T.T. BUY"]));

        assert_eq!(fs::read_to_string(store.path_for("USD")).expect("read file"), before);
        assert!(store.ensure_compatible("EUR", &stray).is_ok());
    }

    #[test]
    fn corrupt_row_is_reported_with_line() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SeriesStore::open(StoreConfig::new(temp.path())).expect("open");
        fs::write(
            store.path_for("EUR"),
            "DATE,TT BUY,PDF FILE\n2024-01-05 10:30,90.10,a.pdf\nyesterday,90.20,b.pdf\n",
        )
        .expect("seed");

        let error = store.read("EUR").expect_err("corrupt row must fail");
        assert!(matches!(error, StoreError::CorruptRow { line: 3, .. }), "{error}");
    }

    #[test]
    fn currencies_lists_only_matching_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SeriesStore::open(StoreConfig::new(temp.path())).expect("open");
        for name in [
            "SBI_REFERENCE_RATES_USD.csv",
            "SBI_REFERENCE_RATES_EUR.csv",
            "SBI_REFERENCE_RATES_usd.csv",
            "forex_inr_rates.csv",
        ] {
            fs::write(temp.path().join(name), "DATE,TT BUY\n").expect("seed");
        }

        assert_eq!(store.currencies().expect("list"), vec!["EUR", "USD"]);
    }
}
