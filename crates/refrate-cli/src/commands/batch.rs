use refrate_core::{run_batch, IngestConfig};

use crate::cli::BatchArgs;
use crate::error::CliError;

use super::{build_ingestor, CommandResult};

pub async fn run(args: &BatchArgs, config: &IngestConfig) -> Result<CommandResult, CliError> {
    let (ingestor, _) = build_ingestor(config)?;
    let report = run_batch(&ingestor, &args.dir).await?;
    let failed = !report.is_clean();
    Ok(CommandResult::ok(serde_json::to_value(&report)?).with_failure(failed))
}
