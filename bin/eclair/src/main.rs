//! eclair runs ordered contract migrations against an EVM chain.

mod cli;
mod config;
mod steps;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use cli::Cli;
use config::{ECLAIR_CONFIG_FILENAME, EclairConfig};
use eclair_migrate::{
    ArtifactSource, CancelFlag, ChainTransport, DirArtifactSource, FileLedger, HttpTransport,
    MemoryLedger, OfflineTransport, RunOutcome, Runner, RunnerOptions, SharedLedger, shared_ledger,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = match &cli.config {
        Some(path) => EclairConfig::load_from_file(path)?,
        None => EclairConfig::from_cli(&cli)?,
    };

    if cli.save_config {
        config.save_to_file(&PathBuf::from(ECLAIR_CONFIG_FILENAME))?;
    }

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("cancellation requested; finishing the current step first");
                cancel.cancel();
            }
        });
    }

    let options = RunnerOptions {
        continue_on_error: cli.continue_on_error,
        deploy: config.deploy_options(cli.redeploy),
        cancel,
    };

    let artifacts: Arc<dyn ArtifactSource> =
        Arc::new(DirArtifactSource::new(&config.artifacts_dir));

    let (transport, ledger): (Arc<dyn ChainTransport>, SharedLedger) = if cli.dry_run {
        tracing::info!("dry run: offline transport, in-memory ledger");
        (
            Arc::new(OfflineTransport::new()),
            shared_ledger(MemoryLedger::new()),
        )
    } else {
        let url: Url = config
            .rpc_url
            .parse()
            .with_context(|| format!("Invalid RPC URL: {}", config.rpc_url))?;
        (
            Arc::new(HttpTransport::new(url, config.sender)?),
            shared_ledger(FileLedger::open(config.ledger_path())?),
        )
    };

    tracing::info!(
        network = %config.network,
        rpc_url = %config.rpc_url,
        artifacts = %config.artifacts_dir.display(),
        "starting migration run"
    );

    let runner = Runner::new(
        config.network.clone().into(),
        artifacts,
        transport,
        ledger,
        options,
    );
    let result = runner.run(steps::steps()).await?;

    for failure in &result.failures {
        tracing::error!(
            ordinal = failure.ordinal,
            name = %failure.name,
            error = %failure.error,
            "step failed"
        );
    }

    match result.outcome {
        RunOutcome::Completed if result.failures.is_empty() => {
            tracing::info!("migration run complete");
            Ok(())
        }
        RunOutcome::Completed => {
            anyhow::bail!("run completed with {} failed step(s)", result.failures.len())
        }
        RunOutcome::Halted => anyhow::bail!("run halted after a step failure"),
        RunOutcome::Cancelled => anyhow::bail!("run cancelled"),
    }
}
