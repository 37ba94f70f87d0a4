use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use url::Url;

/// Known target networks, or any custom name.
///
/// The name partitions the deployment ledger; named networks also carry a
/// default public RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum NetworkName {
    Localhost,
    Sepolia,
    Mainnet,
    #[strum(default)]
    Custom(String),
}

impl NetworkName {
    /// Default RPC endpoint for named networks.
    ///
    /// Public endpoints come from `<https://publicnode.com/>`, as for a
    /// quick start; production runs should pass their own `--rpc-url`.
    pub fn default_rpc_url(&self) -> Option<&'static str> {
        match self {
            NetworkName::Localhost => Some("http://127.0.0.1:8545"),
            NetworkName::Sepolia => Some("https://ethereum-sepolia-rpc.publicnode.com"),
            NetworkName::Mainnet => Some("https://ethereum-mainnet-rpc.publicnode.com"),
            NetworkName::Custom(_) => None,
        }
    }
}

#[derive(Parser)]
#[command(name = "eclair")]
#[command(
    author,
    version,
    about = "Run ordered contract migrations against an EVM chain"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "ECLAIR_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to an Eclair.toml configuration file (or its directory).
    ///
    /// When provided, the file supplies the run configuration and the other
    /// connection flags are ignored.
    #[arg(short, long, env = "ECLAIR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Target network name (deployment ledger partition key).
    #[arg(short, long, env = "ECLAIR_NETWORK", default_value_t = NetworkName::Localhost)]
    pub network: NetworkName,

    /// JSON-RPC endpoint of the target chain.
    ///
    /// Named networks fall back to a public endpoint when omitted.
    #[arg(long, alias = "rpc", env = "ECLAIR_RPC_URL")]
    pub rpc_url: Option<Url>,

    /// Sender account for deployment transactions.
    ///
    /// The account must be managed (unlocked) by the node or the wallet
    /// sitting in front of it.
    #[arg(long, env = "ECLAIR_SENDER")]
    pub sender: Option<Address>,

    /// Directory holding compiled artifact JSON files.
    #[arg(long, env = "ECLAIR_ARTIFACTS", default_value = "artifacts")]
    pub artifacts: PathBuf,

    /// Directory holding the per-network deployment ledgers.
    #[arg(long, env = "ECLAIR_LEDGER_DIR", default_value = "deployments")]
    pub ledger_dir: PathBuf,

    /// Confirmation depth required before a deployment counts as final.
    #[arg(long, env = "ECLAIR_CONFIRMATIONS", default_value_t = 1)]
    pub confirmations: u64,

    /// Redeploy contracts even when the ledger already records them.
    #[arg(long, env = "ECLAIR_REDEPLOY")]
    pub redeploy: bool,

    /// Keep running past failed steps and report every failure at the end.
    #[arg(long)]
    pub continue_on_error: bool,

    /// Validate the pipeline offline: in-memory ledger, no transactions.
    #[arg(long)]
    pub dry_run: bool,

    /// Write the effective configuration to Eclair.toml before running.
    #[arg(long)]
    pub save_config: bool,
}
