use refrate_core::{CurrencyCode, IngestConfig, PublishedAt, SeriesStore};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::cli::SeriesArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct SeriesResponseData {
    currency: String,
    path: String,
    total_rows: usize,
    header: Vec<String>,
    rows: Vec<Map<String, Value>>,
}

pub fn run(args: &SeriesArgs, config: &IngestConfig) -> Result<CommandResult, CliError> {
    let code = CurrencyCode::parse(&args.code)?;
    let store = SeriesStore::open(config.store_config())?;
    let Some(series) = store.read(code.as_str())? else {
        return Err(CliError::Command(format!(
            "no series stored for {code} under {}",
            store.dir().display()
        )));
    };

    let skip = args
        .limit
        .map_or(0, |limit| series.len().saturating_sub(limit));
    let header = series.header();
    let rows = series
        .iter()
        .skip(skip)
        .map(|(published_at, fields)| {
            let mut row = Map::new();
            row.insert(
                header[0].clone(),
                Value::String(PublishedAt::from(published_at).format()),
            );
            for (column, value) in header[1..].iter().zip(fields) {
                row.insert(column.clone(), Value::String(value.clone()));
            }
            row
        })
        .collect();

    let data = SeriesResponseData {
        currency: series.currency().to_owned(),
        path: store.path_for(code.as_str()).display().to_string(),
        total_rows: series.len(),
        header: header.to_vec(),
        rows,
    };
    Ok(CommandResult::ok(serde_json::to_value(data)?))
}
