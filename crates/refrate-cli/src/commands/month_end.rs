use refrate_core::{month_end, IngestConfig, SeriesStore};
use serde::Serialize;
use time::OffsetDateTime;

use crate::cli::MonthEndArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct MonthEndSummary {
    column: String,
    start: String,
    until: String,
    output: String,
    currencies: Vec<String>,
    months: usize,
    /// Month-end cells with no qualifying rate.
    empty_cells: usize,
}

pub fn run(args: &MonthEndArgs, config: &IngestConfig) -> Result<CommandResult, CliError> {
    let until = args
        .until
        .unwrap_or_else(|| OffsetDateTime::now_utc().date());
    if until < args.start {
        return Err(CliError::Command(format!(
            "--until {until} is before --start {}",
            args.start
        )));
    }

    let store = SeriesStore::open(config.store_config())?;
    let table = month_end(&store, &args.column, args.start, until)?;
    table.write_csv(&args.output)?;

    let empty_cells = table
        .rows
        .iter()
        .flat_map(|row| row.values.iter())
        .filter(|value| value.is_none())
        .count();
    let summary = MonthEndSummary {
        column: table.column.clone(),
        start: args.start.to_string(),
        until: until.to_string(),
        output: args.output.display().to_string(),
        currencies: table.currencies.clone(),
        months: table.rows.len(),
        empty_cells,
    };
    Ok(CommandResult::ok(serde_json::to_value(summary)?))
}
