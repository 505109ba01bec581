//! Behavior-driven tests for the per-currency series store.
//!
//! These tests verify what a reader of the CSV files sees after merges,
//! re-ingestion and damaged input.

use std::fs;

use refrate_core::{
    merge_observation, month_end, ColumnSchema, CurrencyCode, MergeOutcome, PublishedAt,
    RateObservation, RateValue, SeriesStore, StoreConfig,
};
use tempfile::tempdir;
use time::macros::date;

fn store_in(dir: &std::path::Path) -> SeriesStore {
    SeriesStore::open(StoreConfig::new(dir)).expect("store open")
}

fn observation(at: &str, code: &str, buy: &str, sell: &str, source: &str) -> RateObservation {
    RateObservation::new(
        PublishedAt::parse(at).expect("timestamp"),
        CurrencyCode::parse(code).expect("code"),
        ColumnSchema::new(["TT BUY", "TT SELL"]).expect("schema"),
        vec![
            RateValue::parse(buy).expect("buy"),
            RateValue::parse(sell).expect("sell"),
        ],
        source,
    )
    .expect("observation")
}

// =============================================================================
// Store: Ordering and Idempotence
// =============================================================================

#[test]
fn when_the_same_document_is_ingested_twice_the_series_does_not_grow() {
    // Given: A series holding one observation
    let temp = tempdir().expect("tempdir");
    let store = store_in(temp.path());
    let first = observation("2024-01-05 10:30", "USD", "83.50", "84.40", "a.pdf");
    merge_observation(&store, &first).expect("first merge");
    let before = fs::read_to_string(store.path_for("USD")).expect("read");

    // When: The identical observation is merged again
    let report = merge_observation(&store, &first).expect("second merge");

    // Then: The row is replaced in place and the file is byte-identical
    assert_eq!(report.outcome, MergeOutcome::Replaced);
    assert_eq!(report.series_len, 1);
    let after = fs::read_to_string(store.path_for("USD")).expect("read");
    assert_eq!(before, after);
}

#[test]
fn when_documents_arrive_out_of_order_the_file_is_still_chronological() {
    // Given: An empty store
    let temp = tempdir().expect("tempdir");
    let store = store_in(temp.path());

    // When: T3, T1 and T2 are merged in that order
    for (at, buy) in [
        ("2024-01-03 10:00", "3.00"),
        ("2024-01-01 10:00", "1.00"),
        ("2024-01-02 10:00", "2.00"),
    ] {
        merge_observation(&store, &observation(at, "EUR", buy, "9.99", "x.pdf")).expect("merge");
    }

    // Then: Rows appear in ascending timestamp order
    let contents = fs::read_to_string(store.path_for("EUR")).expect("read");
    let dates: Vec<&str> = contents
        .lines()
        .skip(1)
        .map(|line| line.split(',').next().unwrap_or_default())
        .collect();
    assert_eq!(
        dates,
        ["2024-01-01 10:00", "2024-01-02 10:00", "2024-01-03 10:00"]
    );
}

#[test]
fn when_a_correction_is_published_the_latest_values_win() {
    // Given: A series with two observations
    let temp = tempdir().expect("tempdir");
    let store = store_in(temp.path());
    merge_observation(&store, &observation("2024-01-05 10:30", "USD", "83.50", "84.40", "a.pdf"))
        .expect("merge");
    merge_observation(&store, &observation("2024-01-06 10:30", "USD", "83.60", "84.50", "b.pdf"))
        .expect("merge");

    // When: The first timestamp is re-published with different rates
    let report =
        merge_observation(&store, &observation("2024-01-05 10:30", "USD", "83.55", "84.45", "c.pdf"))
            .expect("merge");

    // Then: Cardinality is unchanged and the new values are stored
    assert_eq!(report.outcome, MergeOutcome::Replaced);
    assert_eq!(report.series_len, 2);
    let series = store.read("USD").expect("read").expect("series");
    let key = PublishedAt::parse("2024-01-05 10:30").expect("ts").into_inner();
    assert_eq!(series.value(key, "TT BUY"), Some("83.55"));
    assert_eq!(series.value(key, "PDF FILE"), Some("c.pdf"));
}

// =============================================================================
// Store: Header Drift and Damage
// =============================================================================

#[test]
fn when_the_column_layout_changes_the_stored_header_is_kept() {
    // Given: A series created with TT BUY / TT SELL
    let temp = tempdir().expect("tempdir");
    let store = store_in(temp.path());
    merge_observation(&store, &observation("2024-01-05 10:30", "GBP", "105.10", "106.20", "a.pdf"))
        .expect("merge");

    // When: A document with an extra column is merged
    let wider = RateObservation::new(
        PublishedAt::parse("2024-01-06 10:30").expect("ts"),
        CurrencyCode::parse("GBP").expect("code"),
        ColumnSchema::new(["TT BUY", "TT SELL", "BILL BUY"]).expect("schema"),
        vec![
            RateValue::parse("105.20").expect("rate"),
            RateValue::parse("106.30").expect("rate"),
            RateValue::parse("104.90").expect("rate"),
        ],
        "b.pdf",
    )
    .expect("observation");
    let report = merge_observation(&store, &wider).expect("merge");

    // Then: The unknown column is reported and the header is untouched
    assert_eq!(report.ignored_columns, ["BILL BUY"]);
    let contents = fs::read_to_string(store.path_for("GBP")).expect("read");
    assert_eq!(contents.lines().next(), Some("DATE,TT BUY,TT SELL,PDF FILE"));
    assert!(contents.contains("2024-01-06 10:30,105.20,106.30,b.pdf"));
}

#[test]
fn when_a_stored_row_is_corrupt_the_merge_aborts_and_the_file_survives() {
    // Given: A series file with an unreadable timestamp
    let temp = tempdir().expect("tempdir");
    let store = store_in(temp.path());
    let damaged = "DATE,TT BUY,TT SELL,PDF FILE\n2024-01-05 10:30,83.50,84.40,a.pdf\nnot a date,1,2,b.pdf\n";
    fs::write(store.path_for("USD"), damaged).expect("seed");

    // When: A new observation is merged
    let error = merge_observation(&store, &observation("2024-01-06 10:30", "USD", "83.60", "84.50", "c.pdf"))
        .expect_err("corrupt series must abort");

    // Then: The error names the row and the file is unchanged
    assert!(error.to_string().contains("not a date"), "{error}");
    assert_eq!(fs::read_to_string(store.path_for("USD")).expect("read"), damaged);
}

#[test]
fn legacy_second_precision_rows_are_rewritten_at_minute_precision() {
    // Given: An older file written with seconds
    let temp = tempdir().expect("tempdir");
    let store = store_in(temp.path());
    fs::write(
        store.path_for("JPY"),
        "DATE,TT BUY,TT SELL,PDF FILE\n2024-01-05 10:30:00,0.57,0.59,a.pdf\n",
    )
    .expect("seed");

    // When: The same minute is merged again
    let report = merge_observation(&store, &observation("2024-01-05 10:30", "JPY", "0.58", "0.60", "b.pdf"))
        .expect("merge");

    // Then: The legacy row is treated as the same key
    assert_eq!(report.outcome, MergeOutcome::Replaced);
    let contents = fs::read_to_string(store.path_for("JPY")).expect("read");
    assert_eq!(
        contents,
        "DATE,TT BUY,TT SELL,PDF FILE\n2024-01-05 10:30,0.58,0.60,b.pdf\n"
    );
}

// =============================================================================
// Store: Month-End Snapshot
// =============================================================================

#[test]
fn month_end_snapshot_uses_the_last_positive_rate_per_month() {
    // Given: Two currencies with a zero rate near the end of January
    let temp = tempdir().expect("tempdir");
    let store = store_in(temp.path());
    for (at, code, buy) in [
        ("2024-01-10 10:00", "USD", "83.10"),
        ("2024-01-31 10:00", "USD", "0.00"),
        ("2024-02-28 10:00", "USD", "83.40"),
        ("2024-02-15 10:00", "EUR", "90.20"),
    ] {
        merge_observation(&store, &observation(at, code, buy, "1.00", "x.pdf")).expect("merge");
    }

    // When: The snapshot is built through February
    let table = month_end(&store, "TT BUY", date!(2024-01-01), date!(2024-02-29))
        .expect("snapshot");

    // Then: The zero is skipped and months without data stay empty
    assert_eq!(table.currencies, ["EUR", "USD"]);
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0].values, [None, Some(String::from("83.10"))]);
    assert_eq!(
        table.rows[1].values,
        [Some(String::from("90.20")), Some(String::from("83.40"))]
    );

    let output = temp.path().join("forex_inr_rates.csv");
    table.write_csv(&output).expect("write");
    let csv = fs::read_to_string(&output).expect("read");
    assert_eq!(csv, "Date,EUR,USD\n2024-01-31,,83.10\n2024-02-29,90.20,83.40\n");
}

#[test]
fn opening_a_store_in_a_missing_directory_creates_it() {
    let temp = tempdir().expect("tempdir");
    let nested = temp.path().join("csv_files").join("nested");
    let store = SeriesStore::open(StoreConfig::new(&nested)).expect("open");
    assert!(nested.is_dir());
    assert!(matches!(store.read("USD"), Ok(None)));
}
