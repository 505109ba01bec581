//! CLI argument definitions for refrate.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Download the current rate document and ingest it |
//! | `ingest` | Ingest one local document |
//! | `batch` | Ingest every document under a directory |
//! | `month-end` | Build the month-end rate snapshot |
//! | `series` | Print a stored currency series |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | none | JSON config file |
//! | `--data-dir` | `$REFRATE_HOME/csv_files` | Series directory |
//! | `--archive-dir` | `$REFRATE_HOME/pdf_files` | Document archive |
//! | `--no-archive` | `false` | Do not archive fetched documents |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! refrate fetch
//! refrate ingest ./FOREX_CARD_RATES.pdf --pretty
//! refrate batch ./pdf_files
//! refrate month-end --column "TT SELL" --start 2021-01-01 --output month_end.csv
//! refrate series USD --limit 10
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use time::macros::format_description;
use time::Date;

/// Reference-rate ingestion CLI.
#[derive(Debug, Parser)]
#[command(
    name = "refrate",
    author,
    version,
    about = "Collects published forex reference rates into per-currency series"
)]
pub struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true, env = "REFRATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the per-currency series files.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory fetched documents are archived under.
    #[arg(long, global = true)]
    pub archive_dir: Option<PathBuf>,

    /// Do not archive fetched documents.
    #[arg(long, global = true, default_value_t = false, conflicts_with = "archive_dir")]
    pub no_archive: bool,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download the current rate document and ingest it.
    ///
    /// Tries the primary URL, then the fallback URL, then proxies.
    Fetch(FetchArgs),

    /// Ingest one local PDF or scanned image.
    Ingest(IngestArgs),

    /// Ingest every document under a directory, continuing past failures.
    ///
    /// Exits with code 3 when any document failed.
    Batch(BatchArgs),

    /// Last positive rate on or before each month end, per currency.
    MonthEnd(MonthEndArgs),

    /// Print a stored currency series.
    Series(SeriesArgs),
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Override the primary document URL.
    #[arg(long)]
    pub primary_url: Option<String>,

    /// Override the fallback document URL.
    #[arg(long)]
    pub fallback_url: Option<String>,

    /// Proxy URL for the last-resort tier; repeatable.
    #[arg(long = "proxy")]
    pub proxies: Vec<String>,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// PDF, PNG or JPEG document.
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Directory searched recursively for documents.
    pub dir: PathBuf,
}

#[derive(Debug, Args)]
pub struct MonthEndArgs {
    /// Rate column to report.
    #[arg(long, default_value = "TT BUY")]
    pub column: String,

    /// First date considered (YYYY-MM-DD).
    #[arg(long, default_value = "2020-01-01", value_parser = parse_date)]
    pub start: Date,

    /// Last date considered (YYYY-MM-DD); defaults to today (UTC).
    #[arg(long, value_parser = parse_date)]
    pub until: Option<Date>,

    /// CSV output path.
    #[arg(long, default_value = "forex_inr_rates.csv")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct SeriesArgs {
    /// Three-letter currency code.
    pub code: String,

    /// Only the most recent N rows.
    #[arg(long)]
    pub limit: Option<usize>,
}

fn parse_date(raw: &str) -> Result<Date, String> {
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn month_end_defaults() {
        let cli = Cli::parse_from(["refrate", "month-end"]);
        let Command::MonthEnd(args) = cli.command else {
            panic!("expected month-end");
        };
        assert_eq!(args.column, "TT BUY");
        assert_eq!(args.start.to_string(), "2020-01-01");
        assert_eq!(args.output, PathBuf::from("forex_inr_rates.csv"));
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::parse_from(["refrate", "batch", "docs", "--data-dir", "/tmp/s", "--pretty"]);
        assert!(cli.pretty);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/s")));
    }

    #[test]
    fn bad_dates_are_rejected() {
        assert!(Cli::try_parse_from(["refrate", "month-end", "--start", "01/02/2020"]).is_err());
    }
}
