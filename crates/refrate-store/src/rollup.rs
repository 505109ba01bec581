//! Month-end cross-currency snapshot built from the stored series.
//!
//! For each calendar month end in a window, every currency contributes the
//! latest observation on or before that date whose selected column holds a
//! positive number. The look-back never crosses the window start.

use std::io::Write;
use std::path::Path;

use time::macros::time;
use time::{Date, Month, PrimitiveDateTime};

use crate::{format_date, SeriesStore, StoreError};

/// One month-end line of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthEndRow {
    pub date: Date,
    /// One entry per currency, in `MonthEndTable::currencies` order.
    pub values: Vec<Option<String>>,
}

/// Month-end snapshot across currencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthEndTable {
    pub column: String,
    pub currencies: Vec<String>,
    pub rows: Vec<MonthEndRow>,
}

/// Last day of every month whose month end falls inside `[start, today]`.
pub fn month_ends(start: Date, today: Date) -> Vec<Date> {
    let mut dates = Vec::new();
    let (mut year, mut month) = (start.year(), start.month());
    loop {
        let Some(end) = last_day_of(year, month) else {
            break;
        };
        if end > today {
            break;
        }
        if end >= start {
            dates.push(end);
        }
        if month == Month::December {
            year += 1;
        }
        month = month.next();
    }
    dates
}

fn last_day_of(year: i32, month: Month) -> Option<Date> {
    let next_year = if month == Month::December { year + 1 } else { year };
    Date::from_calendar_date(next_year, month.next(), 1)
        .ok()?
        .previous_day()
}

/// Builds the month-end snapshot for every currency in the store.
pub fn month_end(
    store: &SeriesStore,
    column: &str,
    start: Date,
    today: Date,
) -> Result<MonthEndTable, StoreError> {
    let currencies = store.currencies()?;
    let mut series = Vec::with_capacity(currencies.len());
    for currency in &currencies {
        series.push(store.read(currency)?);
    }

    let rows = month_ends(start, today)
        .into_iter()
        .map(|date| {
            let ceiling = PrimitiveDateTime::new(date, time!(23:59:59));
            let values = series
                .iter()
                .map(|series| {
                    let series = series.as_ref()?;
                    let index = series.field_index(column)?;
                    series
                        .range(..=ceiling)
                        .rev()
                        .take_while(|(ts, _)| ts.date() >= start)
                        .find_map(|(_, fields)| {
                            let raw = fields.get(index)?.trim();
                            let value: f64 = raw.parse().ok()?;
                            (value > 0.0).then(|| raw.to_owned())
                        })
                })
                .collect();
            MonthEndRow { date, values }
        })
        .collect();

    Ok(MonthEndTable {
        column: column.to_owned(),
        currencies,
        rows,
    })
}

impl MonthEndTable {
    /// Writes the snapshot as `Date,<CODE>...` CSV, replacing `path` atomically.
    pub fn write_csv(&self, path: &Path) -> Result<(), StoreError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = tempfile::Builder::new()
            .prefix(".refrate-")
            .suffix(".csv.tmp")
            .tempfile_in(dir)?;

        {
            let csv_error = |source| StoreError::Csv {
                path: path.to_path_buf(),
                source,
            };
            let mut writer = csv::Writer::from_writer(staged.as_file_mut());
            writer
                .write_record(std::iter::once("Date").chain(self.currencies.iter().map(String::as_str)))
                .map_err(csv_error)?;
            for row in &self.rows {
                let date = format_date(row.date);
                let values = row
                    .values
                    .iter()
                    .map(|value| value.clone().unwrap_or_default());
                writer
                    .write_record(std::iter::once(date).chain(values))
                    .map_err(csv_error)?;
            }
            writer.flush()?;
        }
        staged.as_file_mut().flush()?;
        staged.as_file().sync_all()?;

        staged.persist(path).map_err(|error| StoreError::Persist {
            path: path.to_path_buf(),
            source: error.error,
        })?;
        Ok(())
    }
}
