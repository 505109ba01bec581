//! Rate-table parsing with header-driven column negotiation.
//!
//! The header row fixes the column list; every data row must carry exactly
//! that many rates. Columns can be added, removed or reordered between
//! documents without code changes.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::{column_words, ColumnSchema, CurrencyCode, IngestError, RateRow, RateValue};

/// `<label> <CODE>[/<CODE>] <rates...>`
static CURRENCY_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<label>[A-Za-z][A-Za-z0-9 .()&',-]*?)\s*(?P<code>[A-Z]{3})(?:\s*/\s*[A-Z]{3})?\s*(?P<rates>\d[\d.\s]*?)\s*$",
    )
    .expect("currency row regex should compile")
});

/// Two-decimal literals printed back to back by a lossy text layer.
static FUSED_RATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,6}\.\d{2}").expect("fused rate regex should compile"));

/// Words that label the currency column rather than a rate category.
const NON_CATEGORY_WORDS: &[&str] = &[
    "CURRENCY", "CURRENCIES", "CODE", "CODES", "NAME", "ISO", "RATE", "RATES", "INR", "SR", "NO",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("no header row naming BUY/SELL columns")]
    NoHeader,

    #[error("header {columns:?} found but no row carries {arity} rate(s)")]
    NoRows { columns: Vec<String>, arity: usize },
}

impl From<TableError> for IngestError {
    fn from(value: TableError) -> Self {
        Self::NoRatesFound(value.to_string())
    }
}

/// Rows extracted under one negotiated schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTable {
    pub schema: ColumnSchema,
    pub rows: Vec<RateRow>,
}

impl ParsedTable {
    /// Inserts a row; a currency seen again replaces its earlier row in place.
    pub fn push(&mut self, row: RateRow) {
        match self.rows.iter_mut().find(|held| held.currency == row.currency) {
            Some(held) => *held = row,
            None => self.rows.push(row),
        }
    }
}

/// Locates the rate table in extracted text and reads one row per currency.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateTableParser;

impl RateTableParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses the extracted pages as one text, in page order.
    pub fn parse_pages(&self, pages: &[String]) -> Result<ParsedTable, TableError> {
        self.parse(&pages.join("\n"))
    }

    /// Tries every header-like line in order. A candidate is taken only when
    /// a row fitting its schema follows before the next header-like line;
    /// from there on, every later line is read under that schema.
    pub fn parse(&self, text: &str) -> Result<ParsedTable, TableError> {
        let lines: Vec<&str> = text.lines().collect();
        let mut rejected: Option<ColumnSchema> = None;

        for (index, line) in lines.iter().enumerate() {
            let Some(schema) = negotiate_schema(line) else {
                continue;
            };
            let rest = &lines[index + 1..];
            let fits = rest
                .iter()
                .take_while(|line| negotiate_schema(line).is_none())
                .any(|line| parse_row(line, &schema).is_some());
            if !fits {
                debug!(columns = ?schema.columns(), "header candidate has no fitting rows");
                rejected.get_or_insert(schema);
                continue;
            }

            debug!(columns = ?schema.columns(), "negotiated column schema");
            let mut table = ParsedTable {
                schema,
                rows: Vec::new(),
            };
            for line in rest {
                if let Some(row) = parse_row(line, &table.schema) {
                    table.push(row);
                }
            }
            debug!(rows = table.rows.len(), "parsed rate rows");
            return Ok(table);
        }

        match rejected {
            Some(schema) => Err(TableError::NoRows {
                columns: schema.columns().to_vec(),
                arity: schema.len(),
            }),
            None => Err(TableError::NoHeader),
        }
    }
}

/// Derives the column list from a header line.
///
/// Each run of words ending in `BUY` or `SELL` names one column, so
/// `CURRENCY TT BUY TT SELL FOREX TRAVEL CARD BUY` yields
/// `["TT BUY", "TT SELL", "FOREX TRAVEL CARD BUY"]`. A bare `SELL` right after
/// a column reuses that column's category.
pub fn negotiate_schema(line: &str) -> Option<ColumnSchema> {
    let mut columns = Vec::new();
    let mut category: Vec<String> = Vec::new();
    let mut previous_category = String::new();

    for upper in column_words(line) {
        if upper == "BUY" || upper == "SELL" {
            let name = if category.is_empty() {
                previous_category.clone()
            } else {
                category.join(" ")
            };
            if !name.is_empty() {
                columns.push(format!("{name} {upper}"));
                previous_category = name;
            }
            category.clear();
        } else if upper.bytes().all(|b| b.is_ascii_alphabetic())
            && !NON_CATEGORY_WORDS.contains(&upper.as_str())
        {
            category.push(upper);
        } else {
            category.clear();
        }
    }

    if columns.is_empty() {
        return None;
    }
    ColumnSchema::new(columns).ok()
}

/// Matches one currency row and checks its rate count against `schema`.
pub fn parse_row(line: &str, schema: &ColumnSchema) -> Option<RateRow> {
    let caps = CURRENCY_ROW.captures(line)?;
    let currency = CurrencyCode::parse(&caps["code"]).ok()?;
    let rates = split_rates(&caps["rates"])?;
    if schema.check_arity(rates.len()).is_err() {
        return None;
    }
    Some(RateRow { currency, rates })
}

fn split_rates(text: &str) -> Option<Vec<RateValue>> {
    let mut rates = Vec::new();
    for token in text.split_whitespace() {
        if token.matches('.').count() <= 1 && !token.ends_with('.') {
            rates.push(RateValue::parse(token).ok()?);
            continue;
        }
        let pieces: Vec<&str> = FUSED_RATE.find_iter(token).map(|m| m.as_str()).collect();
        if pieces.concat() != token {
            return None;
        }
        for piece in pieces {
            rates.push(RateValue::parse(piece).ok()?);
        }
    }
    Some(rates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_columns() -> ColumnSchema {
        ColumnSchema::new(["TT BUY", "TT SELL"]).expect("schema")
    }

    #[test]
    fn header_runs_become_columns() {
        let schema = negotiate_schema("CURRENCY | TT BUY | TT SELL | FOREX TRAVEL CARD BUY | SELL")
            .expect("header");
        assert_eq!(
            schema.columns(),
            ["TT BUY", "TT SELL", "FOREX TRAVEL CARD BUY", "FOREX TRAVEL CARD SELL"]
        );
        assert!(negotiate_schema("United States Dollar USD/INR 83.50 84.40").is_none());
    }

    #[test]
    fn dotted_and_slashed_headers() {
        let schema = negotiate_schema("Currency  T.T. Buy/Sell   Bill Buy  Bill Sell").expect("header");
        assert_eq!(schema.columns(), ["TT BUY", "TT SELL", "BILL BUY", "BILL SELL"]);
    }

    #[test]
    fn irregular_spacing_still_parses() {
        let row = parse_row("United States Dollar   USD /INR\t83.50     84.40 ", &two_columns())
            .expect("row");
        assert_eq!(row.currency.as_str(), "USD");
        assert_eq!(
            row.rates.iter().map(RateValue::as_str).collect::<Vec<_>>(),
            ["83.50", "84.40"]
        );

        let fused = parse_row("Euro EUR/INR 89.1090.20", &two_columns()).expect("fused");
        assert_eq!(
            fused.rates.iter().map(RateValue::as_str).collect::<Vec<_>>(),
            ["89.10", "90.20"]
        );
    }

    #[test]
    fn arity_mismatch_is_skipped() {
        assert!(parse_row("United States Dollar USD/INR 83.50 84.40 85.00", &two_columns()).is_none());
        assert!(parse_row("United States Dollar USD/INR 83.50", &two_columns()).is_none());
    }

    #[test]
    fn footnotes_and_headers_are_skipped_silently() {
        let text = "\
CURRENCY TT BUY TT SELL
United States Dollar USD/INR 83.50 84.40
* Rates are indicative. Page 2 of 2
Euro EUR 89.10 90.20
";
        let table = RateTableParser::new().parse(text).expect("table");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].currency.as_str(), "EUR");
    }

    #[test]
    fn prose_mentioning_buy_and_sell_does_not_become_the_header() {
        let text = "\
We buy and sell foreign currency at card rates
CURRENCY TT BUY TT SELL
United States Dollar USD/INR 83.50 84.40
";
        let table = RateTableParser::new().parse(text).expect("table");
        assert_eq!(table.schema.columns(), ["TT BUY", "TT SELL"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn a_candidate_whose_rows_do_not_fit_is_passed_over() {
        let text = "\
Card BUY
United States Dollar USD/INR 83.50 84.40
CURRENCY TT BUY TT SELL
Euro EUR/INR 90.10 91.90
";
        let table = RateTableParser::new().parse(text).expect("table");
        assert_eq!(table.schema.columns(), ["TT BUY", "TT SELL"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].currency.as_str(), "EUR");
    }

    #[test]
    fn repeated_header_on_a_later_page_keeps_collecting_rows() {
        let text = "\
CURRENCY TT BUY TT SELL
United States Dollar USD/INR 83.50 84.40
CURRENCY TT BUY TT SELL
Euro EUR/INR 90.10 91.90
";
        let table = RateTableParser::new().parse(text).expect("table");
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn duplicate_currency_keeps_last_row() {
        let text = "TT BUY TT SELL\nDollar USD 83.50 84.40\nDollar USD 83.60 84.50\n";
        let table = RateTableParser::new().parse(text).expect("table");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].rates[0].as_str(), "83.60");
    }

    #[test]
    fn header_without_rows_reports_no_rates() {
        let error = RateTableParser::new()
            .parse("TT BUY TT SELL\nnothing here\n")
            .expect_err("no rows");
        assert_eq!(
            error,
            TableError::NoRows {
                columns: vec![String::from("TT BUY"), String::from("TT SELL")],
                arity: 2
            }
        );
        assert_eq!(
            RateTableParser::new().parse("Date 05-01-2024").expect_err("no header"),
            TableError::NoHeader
        );
    }
}
