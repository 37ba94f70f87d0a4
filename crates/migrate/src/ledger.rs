//! Deployment ledger: which contracts are already deployed per network.
//!
//! The ledger is the only mutable state shared across a run. It is written by
//! the deployer after a confirmed deployment and flushed to storage by the
//! runner at step boundaries, so re-running a pipeline reuses prior successful
//! deployments instead of redeploying.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use alloy_core::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::{MigrateError, Network};

/// One confirmed deployment of a contract on a network.
///
/// Created exactly once per (contract, network) pair on first successful
/// deployment and immutable thereafter, unless a redeploy is forced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub contract: String,
    pub network: Network,
    pub address: Address,
    pub tx_hash: B256,
    pub block_number: u64,
    /// SHA-256 of the creation bytecode at deployment time, hex-encoded.
    /// Used to detect artifacts that changed since they were deployed.
    pub bytecode_hash: String,
    pub deployed_at: DateTime<Utc>,
}

impl DeploymentRecord {
    fn key(&self) -> String {
        ledger_key(&self.contract, &self.network)
    }
}

fn ledger_key(contract: &str, network: &Network) -> String {
    format!("{contract}@{network}")
}

/// Read/write contract for deployment tracking.
///
/// Key uniqueness invariant: no two records share (contract, network) unless
/// an explicit force override replaced the earlier one.
pub trait DeploymentLedger: Send {
    /// Look up the record for a contract on a network, if any.
    fn lookup(&self, contract: &str, network: &Network) -> Option<&DeploymentRecord>;

    /// Insert a record. Fails with [`MigrateError::AlreadyExists`] if the key
    /// is taken and `force` is not set; with `force` the record is replaced.
    fn record(&mut self, record: DeploymentRecord, force: bool) -> Result<(), MigrateError>;

    /// Persist the current state to the backing store.
    fn commit(&mut self) -> Result<(), MigrateError>;
}

/// Ledger handle shared between the runner and the per-step deployers.
///
/// The mutex is only held around synchronous lookups and inserts, never
/// across an await point.
pub type SharedLedger = Arc<Mutex<Box<dyn DeploymentLedger>>>;

pub fn shared_ledger(ledger: impl DeploymentLedger + 'static) -> SharedLedger {
    Arc::new(Mutex::new(Box::new(ledger)))
}

fn insert_record(
    entries: &mut BTreeMap<String, DeploymentRecord>,
    record: DeploymentRecord,
    force: bool,
) -> Result<(), MigrateError> {
    let key = record.key();
    if entries.contains_key(&key) {
        if !force {
            return Err(MigrateError::AlreadyExists {
                contract: record.contract,
                network: record.network,
            });
        }
        tracing::warn!(
            contract = %record.contract,
            network = %record.network,
            "replacing existing deployment record"
        );
    }
    entries.insert(key, record);
    Ok(())
}

/// In-memory ledger. Used by tests and dry runs; nothing survives the run.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: BTreeMap<String, DeploymentRecord>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeploymentLedger for MemoryLedger {
    fn lookup(&self, contract: &str, network: &Network) -> Option<&DeploymentRecord> {
        self.entries.get(&ledger_key(contract, network))
    }

    fn record(&mut self, record: DeploymentRecord, force: bool) -> Result<(), MigrateError> {
        insert_record(&mut self.entries, record, force)
    }

    fn commit(&mut self) -> Result<(), MigrateError> {
        Ok(())
    }
}

/// File-backed ledger: a pretty-printed JSON map keyed `"<contract>@<network>"`.
///
/// An advisory lock on a sibling `.lock` file is held for the ledger's
/// lifetime, so two concurrent runs cannot interleave writes to the same
/// store. Commits write to a temp file and rename over the target.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    entries: BTreeMap<String, DeploymentRecord>,
    // Held until drop; dropping the file releases the advisory lock.
    _lock: File,
}

impl FileLedger {
    /// Open (or create) the ledger file at `path` and take its lock.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MigrateError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MigrateError::Ledger(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let lock_path = path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                MigrateError::Ledger(format!("failed to open {}: {e}", lock_path.display()))
            })?;
        lock.try_lock_exclusive().map_err(|_| {
            MigrateError::Ledger(format!(
                "another migration run holds the ledger lock at {}",
                lock_path.display()
            ))
        })?;

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                MigrateError::Ledger(format!("failed to read {}: {e}", path.display()))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                MigrateError::Ledger(format!("failed to parse {}: {e}", path.display()))
            })?
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), records = entries.len(), "ledger opened");
        Ok(Self {
            path,
            entries,
            _lock: lock,
        })
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DeploymentLedger for FileLedger {
    fn lookup(&self, contract: &str, network: &Network) -> Option<&DeploymentRecord> {
        self.entries.get(&ledger_key(contract, network))
    }

    fn record(&mut self, record: DeploymentRecord, force: bool) -> Result<(), MigrateError> {
        insert_record(&mut self.entries, record, force)
    }

    fn commit(&mut self) -> Result<(), MigrateError> {
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| MigrateError::Ledger(format!("failed to serialize ledger: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| MigrateError::Ledger(format!("failed to write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            MigrateError::Ledger(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        tracing::debug!(path = %self.path.display(), records = self.entries.len(), "ledger committed");
        Ok(())
    }
}
