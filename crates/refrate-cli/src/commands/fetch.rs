use refrate_core::{DocumentFailure, IngestConfig, SourceFetcher};
use tracing::info;

use crate::cli::FetchArgs;
use crate::error::CliError;

use super::{build_ingestor, CommandResult};

pub async fn run(args: &FetchArgs, config: &IngestConfig) -> Result<CommandResult, CliError> {
    let mut fetch = config.fetch.clone();
    if let Some(url) = &args.primary_url {
        fetch.primary_url = url.clone();
    }
    if let Some(url) = &args.fallback_url {
        fetch.fallback_url = Some(url.clone());
    }
    if !args.proxies.is_empty() {
        fetch.proxies = args.proxies.clone();
    }

    let (ingestor, client) = build_ingestor(config)?;
    let primary = fetch.primary_url.clone();
    let fetcher = SourceFetcher::new(client, fetch);

    let outcome = ingestor
        .fetch_and_ingest(&fetcher)
        .await
        .map_err(|error| DocumentFailure::new(primary, error))?;
    info!(
        published_at = %outcome.published_at,
        currencies = outcome.observations.len(),
        "fetch complete"
    );
    Ok(CommandResult::ok(serde_json::to_value(&outcome)?))
}
