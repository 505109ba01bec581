use refrate_core::{DocumentFailure, IngestConfig};

use crate::cli::IngestArgs;
use crate::error::CliError;

use super::{build_ingestor, CommandResult};

pub async fn run(args: &IngestArgs, config: &IngestConfig) -> Result<CommandResult, CliError> {
    let (ingestor, _) = build_ingestor(config)?;
    let outcome = ingestor
        .ingest_file(&args.file)
        .await
        .map_err(|error| DocumentFailure::new(args.file.display().to_string(), error))?;
    Ok(CommandResult::ok(serde_json::to_value(&outcome)?))
}
