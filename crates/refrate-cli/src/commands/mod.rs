mod batch;
mod fetch;
mod ingest;
mod month_end;
mod series;

use std::sync::Arc;

use refrate_core::{HttpClient, IngestConfig, Ingestor, ReqwestHttpClient};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    /// Set when the command completed but some of its work failed.
    pub failed: bool,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            failed: false,
        }
    }

    pub fn with_failure(mut self, failed: bool) -> Self {
        self.failed = failed;
        self
    }
}

/// Defaults, then the config file, then the environment, then CLI flags.
pub fn load_config(cli: &Cli) -> Result<IngestConfig, CliError> {
    let mut config = IngestConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dir) = &cli.archive_dir {
        config.archive_dir = Some(dir.clone());
    }
    if cli.no_archive {
        config.archive_dir = None;
    }
    Ok(config)
}

pub async fn run(cli: &Cli, config: &IngestConfig) -> Result<CommandResult, CliError> {
    match &cli.command {
        Command::Fetch(args) => fetch::run(args, config).await,
        Command::Ingest(args) => ingest::run(args, config).await,
        Command::Batch(args) => batch::run(args, config).await,
        Command::MonthEnd(args) => month_end::run(args, config),
        Command::Series(args) => series::run(args, config),
    }
}

fn build_ingestor(config: &IngestConfig) -> Result<(Ingestor, Arc<dyn HttpClient>), CliError> {
    let client: Arc<dyn HttpClient> =
        Arc::new(ReqwestHttpClient::new(config.fetch.user_agent.clone()));
    let ingestor = Ingestor::from_config(config, Arc::clone(&client))?;
    Ok((ingestor, client))
}
