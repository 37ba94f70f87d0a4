//! Ledger-aware contract deployment.

use std::sync::Arc;
use std::time::Duration;

use alloy_core::dyn_abi::DynSolValue;
use alloy_core::primitives::{Address, Bytes};
use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::artifact::{Artifact, ArtifactSource};
use crate::ledger::{DeploymentRecord, SharedLedger};
use crate::transport::ChainTransport;
use crate::{MigrateError, Network};

/// A live handle to a deployed contract: address plus bound ABI.
///
/// Ephemeral; reconstructed per run from either a fresh deployment or an
/// existing ledger record.
#[derive(Debug, Clone)]
pub struct ContractHandle {
    pub name: String,
    pub address: Address,
    pub network: Network,
    pub abi: Value,
}

/// Tuning for a run's deployments.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Redeploy even when the ledger already holds a record.
    pub force_redeploy: bool,
    /// Blocks of depth required on top of the inclusion block.
    pub confirmations: u64,
    /// Upper bound on the confirmation wait per deployment.
    pub confirmation_timeout: Duration,
    /// Submission retries (beyond the first attempt) for transient failures.
    pub submit_retries: usize,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            force_redeploy: false,
            confirmations: 1,
            confirmation_timeout: Duration::from_secs(120),
            submit_retries: 2,
        }
    }
}

/// Deploys contracts for one migration step.
///
/// Bound to the run's network, transport, and shared ledger; handed to each
/// step by the runner. A ledger hit short-circuits to the recorded address,
/// so re-running a pipeline submits nothing for contracts that are already
/// live.
pub struct Deployer {
    network: Network,
    artifacts: Arc<dyn ArtifactSource>,
    transport: Arc<dyn ChainTransport>,
    ledger: SharedLedger,
    options: DeployOptions,
}

impl Deployer {
    pub fn new(
        network: Network,
        artifacts: Arc<dyn ArtifactSource>,
        transport: Arc<dyn ChainTransport>,
        ledger: SharedLedger,
        options: DeployOptions,
    ) -> Self {
        Self {
            network,
            artifacts,
            transport,
            ledger,
            options,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Address of a contract already recorded for this network, if any.
    ///
    /// Lets later steps wire earlier deployments into constructor arguments
    /// without holding on to the earlier step's handle.
    pub fn deployed(&self, name: &str) -> Option<Address> {
        self.ledger
            .lock()
            .expect("ledger lock poisoned")
            .lookup(name, &self.network)
            .map(|record| record.address)
    }

    /// Deploy `name` with the given constructor arguments.
    ///
    /// Arity and types are checked against the artifact's constructor
    /// signature before anything is submitted. Transient submission failures
    /// are retried with exponential backoff; the confirmation wait is bounded
    /// by the configured timeout. On success the deployment is recorded in
    /// the shared ledger immediately, so a cancelled run never loses a
    /// confirmed address.
    pub async fn deploy(
        &self,
        name: &str,
        args: &[DynSolValue],
    ) -> Result<ContractHandle, MigrateError> {
        let artifact = self.artifacts.resolve(name)?;
        check_args(&artifact, args)?;
        let bytecode_hash = hash_bytecode(&artifact.bytecode);

        if !self.options.force_redeploy {
            let recorded = self
                .ledger
                .lock()
                .expect("ledger lock poisoned")
                .lookup(name, &self.network)
                .cloned();
            if let Some(record) = recorded {
                if record.bytecode_hash != bytecode_hash {
                    tracing::warn!(
                        contract = name,
                        network = %self.network,
                        "artifact bytecode changed since deployment; pass --redeploy to replace it"
                    );
                }
                tracing::info!(
                    contract = name,
                    address = %record.address,
                    "reusing recorded deployment"
                );
                return Ok(ContractHandle {
                    name: name.to_owned(),
                    address: record.address,
                    network: self.network.clone(),
                    abi: artifact.abi,
                });
            }
        }

        let init_code = encode_init_code(&artifact, args);

        let tx_hash = (|| async { self.transport.submit(init_code.clone()).await })
            .retry(
                ExponentialBuilder::default().with_max_times(self.options.submit_retries),
            )
            .when(MigrateError::is_retryable)
            .notify(|err: &MigrateError, delay: Duration| {
                tracing::warn!(
                    contract = name,
                    error = %err,
                    retry_in = ?delay,
                    "submission failed, retrying"
                );
            })
            .await?;

        tracing::info!(contract = name, tx = %tx_hash, "deployment transaction submitted");

        let confirmation = self
            .transport
            .await_confirmation(
                tx_hash,
                self.options.confirmations,
                self.options.confirmation_timeout,
            )
            .await?;

        let record = DeploymentRecord {
            contract: name.to_owned(),
            network: self.network.clone(),
            address: confirmation.address,
            tx_hash: confirmation.tx_hash,
            block_number: confirmation.block_number,
            bytecode_hash,
            deployed_at: Utc::now(),
        };
        self.ledger
            .lock()
            .expect("ledger lock poisoned")
            .record(record, self.options.force_redeploy)?;

        tracing::info!(
            contract = name,
            address = %confirmation.address,
            block = confirmation.block_number,
            "contract deployed"
        );

        Ok(ContractHandle {
            name: name.to_owned(),
            address: confirmation.address,
            network: self.network.clone(),
            abi: artifact.abi,
        })
    }
}

/// Check arity and types of constructor arguments against the artifact.
fn check_args(artifact: &Artifact, args: &[DynSolValue]) -> Result<(), MigrateError> {
    if artifact.constructor.len() != args.len() {
        return Err(MigrateError::ArgumentMismatch {
            contract: artifact.name.clone(),
            reason: format!(
                "expected {} constructor arguments, got {}",
                artifact.constructor.len(),
                args.len()
            ),
        });
    }

    for (index, (ty, value)) in artifact.constructor.iter().zip(args).enumerate() {
        if !ty.matches(value) {
            return Err(MigrateError::ArgumentMismatch {
                contract: artifact.name.clone(),
                reason: format!("argument {index} does not match type {ty}"),
            });
        }
    }

    Ok(())
}

/// Creation bytecode followed by the ABI-encoded constructor arguments.
fn encode_init_code(artifact: &Artifact, args: &[DynSolValue]) -> Bytes {
    let mut code = artifact.bytecode.to_vec();
    if !args.is_empty() {
        code.extend(DynSolValue::Tuple(args.to_vec()).abi_encode_params());
    }
    code.into()
}

pub(crate) fn hash_bytecode(bytecode: &Bytes) -> String {
    hex::encode(Sha256::digest(bytecode))
}
