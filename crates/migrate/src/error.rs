//! Error taxonomy for migration runs.
//!
//! Every failure a run can surface is one of these variants. The class of an
//! error decides how the [`Runner`](crate::Runner) reacts to it: configuration
//! and ledger-integrity errors always halt a run, transient chain errors are
//! retried and then subject to the halt/continue policy.

use alloy_core::primitives::B256;
use thiserror::Error;

use crate::Network;

#[derive(Debug, Error)]
pub enum MigrateError {
    /// The logical contract name did not resolve to an artifact.
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    /// An artifact resolved but could not be used for deployment.
    #[error("invalid artifact for {name}: {reason}")]
    InvalidArtifact { name: String, reason: String },

    /// Constructor arguments disagree with the artifact's constructor signature.
    #[error("constructor argument mismatch for {contract}: {reason}")]
    ArgumentMismatch { contract: String, reason: String },

    /// The transport rejected the deployment transaction or it reverted.
    #[error("deployment submission failed: {0}")]
    SubmissionFailed(String),

    /// No receipt with the requested confirmation depth arrived in time.
    #[error("no confirmation for transaction {tx} within {timeout_secs}s")]
    ConfirmationTimeout { tx: B256, timeout_secs: u64 },

    /// Two registered steps share an ordinal.
    #[error("duplicate step ordinal {ordinal}: {first} and {second}")]
    DuplicateOrdinal {
        ordinal: u32,
        first: String,
        second: String,
    },

    /// A deployment record already exists for this (contract, network) pair.
    #[error("deployment record already exists for {contract} on {network}")]
    AlreadyExists { contract: String, network: Network },

    /// The ledger store could not be read, locked, or written.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// A step body failed outside of deployment itself (wiring, IO, ...).
    #[error("migration step failed: {0:#}")]
    Step(anyhow::Error),
}

/// Coarse classification driving the runner's halt/continue decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Defective pipeline definition. Never retryable, always halts.
    Configuration,
    /// Transient chain condition. Retryable with backoff.
    Transient,
    /// Correctness violation in the ledger. Always fatal.
    LedgerIntegrity,
    /// Failure inside a step body. Subject to the halt/continue policy.
    Step,
}

impl MigrateError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ArtifactNotFound(_)
            | Self::InvalidArtifact { .. }
            | Self::ArgumentMismatch { .. }
            | Self::DuplicateOrdinal { .. } => ErrorClass::Configuration,
            Self::SubmissionFailed(_) | Self::ConfirmationTimeout { .. } => ErrorClass::Transient,
            Self::AlreadyExists { .. } | Self::Ledger(_) => ErrorClass::LedgerIntegrity,
            Self::Step(_) => ErrorClass::Step,
        }
    }

    /// Whether a bounded retry with backoff may resolve this error.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Whether this error halts the run regardless of the continue policy.
    pub fn halts_run(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Configuration | ErrorClass::LedgerIntegrity
        )
    }
}

impl From<anyhow::Error> for MigrateError {
    fn from(err: anyhow::Error) -> Self {
        Self::Step(err)
    }
}
