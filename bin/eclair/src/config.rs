//! Run configuration: Eclair.toml loading, saving, and CLI merging.

use std::path::PathBuf;
use std::time::Duration;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use eclair_migrate::DeployOptions;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// The default name for the eclair configuration file.
pub const ECLAIR_CONFIG_FILENAME: &str = "Eclair.toml";

/// Everything a migration run needs to know about its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EclairConfig {
    /// Logical network name; partitions the deployment ledger.
    pub network: String,
    /// JSON-RPC endpoint of the target chain.
    pub rpc_url: String,
    /// Sender account for deployment transactions (node-managed).
    pub sender: Address,
    /// Directory holding compiled artifact JSON files.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    /// Directory holding the per-network deployment ledgers.
    #[serde(default = "default_ledger_dir")]
    pub ledger_dir: PathBuf,
    /// Confirmation depth required before a deployment counts as final.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Upper bound on the confirmation wait per deployment, in seconds.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    /// Submission retries (beyond the first attempt) for transient failures.
    #[serde(default = "default_submit_retries")]
    pub submit_retries: usize,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_ledger_dir() -> PathBuf {
    PathBuf::from("deployments")
}

fn default_confirmations() -> u64 {
    1
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

fn default_submit_retries() -> usize {
    2
}

impl EclairConfig {
    /// Build the configuration from CLI flags alone.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let rpc_url = match &cli.rpc_url {
            Some(url) => url.to_string(),
            None => cli
                .network
                .default_rpc_url()
                // A dry run never dials out, so any placeholder endpoint does.
                .or(cli.dry_run.then_some("http://127.0.0.1:8545"))
                .with_context(|| format!("--rpc-url is required for network {}", cli.network))?
                .to_owned(),
        };

        let sender = match cli.sender {
            Some(sender) => sender,
            None if cli.dry_run => Address::ZERO,
            None => anyhow::bail!("--sender is required for live runs"),
        };

        Ok(Self {
            network: cli.network.to_string(),
            rpc_url,
            sender,
            artifacts_dir: cli.artifacts.clone(),
            ledger_dir: cli.ledger_dir.clone(),
            confirmations: cli.confirmations,
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            submit_retries: default_submit_retries(),
        })
    }

    /// Load the configuration from a TOML file.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!(
                "Configuration file or directory not found: {}",
                path.display()
            );
        }

        let config_path = if path.is_dir() {
            path.join(ECLAIR_CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .context(format!("Failed to read config from {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Path of this network's ledger file.
    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_dir.join(format!("{}.json", self.network))
    }

    pub fn deploy_options(&self, force_redeploy: bool) -> DeployOptions {
        DeployOptions {
            force_redeploy,
            confirmations: self.confirmations,
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
            submit_retries: self.submit_retries,
        }
    }
}
