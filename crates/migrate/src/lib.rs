//! eclair-migrate - Contract migration library for EVM chains.
//!
//! This crate provides the deployment pipeline primitives: resolving compiled
//! contract artifacts, submitting deployment transactions, tracking confirmed
//! deployments per network in a ledger so re-runs are idempotent, and running
//! ordered migration steps that report the addresses they produced.

use serde::{Deserialize, Serialize};

mod artifact;
pub use artifact::{Artifact, ArtifactSource, DirArtifactSource};

mod deployer;
pub use deployer::{ContractHandle, DeployOptions, Deployer};

mod error;
pub use error::{ErrorClass, MigrateError};

mod ledger;
pub use ledger::{
    DeploymentLedger, DeploymentRecord, FileLedger, MemoryLedger, SharedLedger, shared_ledger,
};

mod reporter;
pub use reporter::{ReportEntry, Reporter};

pub mod rpc;

mod runner;
pub use runner::{
    CancelFlag, MigrationStep, RunOutcome, RunResult, Runner, RunnerOptions, StepDescriptor,
    StepFailure,
};

mod transport;
pub use transport::{ChainTransport, Confirmation, HttpTransport, OfflineTransport};

/// Logical target network identifier.
///
/// Deployment records are partitioned by network: the same contract deployed
/// to two networks yields two independent ledger entries.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[display("{_0}")]
pub struct Network(String);

impl Network {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Network {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}
