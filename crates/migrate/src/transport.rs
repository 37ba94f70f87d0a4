//! Chain transport: deployment transaction submission and confirmation.

use std::sync::Mutex;
use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use url::Url;

use crate::{MigrateError, rpc};

/// Interval between receipt polls while waiting for confirmation.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Receipt data for a confirmed deployment transaction.
#[derive(Debug, Clone, Copy)]
pub struct Confirmation {
    pub address: Address,
    pub tx_hash: B256,
    pub block_number: u64,
}

/// Boundary to the signer and the chain.
///
/// Submits raw deployment transactions and tracks them to the requested
/// confirmation depth.
#[async_trait]
pub trait ChainTransport: Send + Sync {
    /// Submit a contract creation transaction, returning its hash.
    async fn submit(&self, init_code: Bytes) -> Result<B256, MigrateError>;

    /// Wait until the transaction is included with `confirmations` blocks of
    /// depth, or fail with [`MigrateError::ConfirmationTimeout`].
    async fn await_confirmation(
        &self,
        tx_hash: B256,
        confirmations: u64,
        timeout: Duration,
    ) -> Result<Confirmation, MigrateError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    contract_address: Option<Address>,
    transaction_hash: B256,
    #[serde(deserialize_with = "rpc::u64_from_hex")]
    block_number: u64,
    status: Option<String>,
}

/// JSON-RPC transport submitting from a node-managed sender account.
///
/// Deployment transactions go out via `eth_sendTransaction`, so the node (or
/// a wallet sitting in front of it) signs with the configured sender.
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    sender: Address,
}

impl HttpTransport {
    pub fn new(url: Url, sender: Address) -> Result<Self, MigrateError> {
        let client =
            rpc::create_client().map_err(|e| MigrateError::SubmissionFailed(format!("{e:#}")))?;
        Ok(Self {
            client,
            url,
            sender,
        })
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<RawReceipt>, anyhow::Error> {
        rpc::json_rpc_call(
            &self.client,
            self.url.as_str(),
            "eth_getTransactionReceipt",
            vec![serde_json::json!(tx_hash)],
        )
        .await
    }

    async fn block_number(&self) -> Result<u64, anyhow::Error> {
        let hex: String = rpc::json_rpc_call(
            &self.client,
            self.url.as_str(),
            "eth_blockNumber",
            vec![],
        )
        .await?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|e| anyhow::anyhow!("bad block number {hex}: {e}"))
    }
}

#[async_trait]
impl ChainTransport for HttpTransport {
    async fn submit(&self, init_code: Bytes) -> Result<B256, MigrateError> {
        let tx: String = rpc::json_rpc_call(
            &self.client,
            self.url.as_str(),
            "eth_sendTransaction",
            vec![serde_json::json!({
                "from": self.sender,
                "data": init_code,
            })],
        )
        .await
        .map_err(|e| MigrateError::SubmissionFailed(format!("{e:#}")))?;

        tx.parse::<B256>()
            .map_err(|e| MigrateError::SubmissionFailed(format!("bad transaction hash {tx}: {e}")))
    }

    async fn await_confirmation(
        &self,
        tx_hash: B256,
        confirmations: u64,
        timeout: Duration,
    ) -> Result<Confirmation, MigrateError> {
        let started = std::time::Instant::now();

        loop {
            if started.elapsed() > timeout {
                return Err(MigrateError::ConfirmationTimeout {
                    tx: tx_hash,
                    timeout_secs: timeout.as_secs(),
                });
            }

            // Poll errors are soft: a briefly unreachable node should not
            // abort a wait that the timeout already bounds.
            match self.receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    if receipt.status.as_deref() == Some("0x0") {
                        return Err(MigrateError::SubmissionFailed(format!(
                            "transaction {tx_hash} reverted in block {}",
                            receipt.block_number
                        )));
                    }

                    match self.block_number().await {
                        Ok(head) if head + 1 >= receipt.block_number + confirmations => {
                            let address = receipt.contract_address.ok_or_else(|| {
                                MigrateError::SubmissionFailed(format!(
                                    "receipt for {tx_hash} carries no contract address"
                                ))
                            })?;
                            return Ok(Confirmation {
                                address,
                                tx_hash: receipt.transaction_hash,
                                block_number: receipt.block_number,
                            });
                        }
                        Ok(head) => {
                            tracing::debug!(
                                tx = %tx_hash,
                                head,
                                included_in = receipt.block_number,
                                confirmations,
                                "waiting for confirmation depth"
                            );
                        }
                        Err(e) => tracing::warn!(error = %format!("{e:#}"), "head poll failed"),
                    }
                }
                Ok(None) => tracing::trace!(tx = %tx_hash, "receipt not yet available"),
                Err(e) => tracing::warn!(error = %format!("{e:#}"), "receipt poll failed"),
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Transport that never talks to a chain.
///
/// Addresses are derived deterministically from the submitted init code and
/// submission order. Backs `--dry-run` pipeline validation and tests.
#[derive(Debug, Default)]
pub struct OfflineTransport {
    submitted: Mutex<Vec<Bytes>>,
}

impl OfflineTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions submitted through this transport.
    pub fn submission_count(&self) -> usize {
        self.submitted.lock().expect("transport lock poisoned").len()
    }

    /// Init codes submitted so far, in submission order.
    pub fn submitted_init_codes(&self) -> Vec<Bytes> {
        self.submitted.lock().expect("transport lock poisoned").clone()
    }

    fn tx_hash_for(index: usize, init_code: &Bytes) -> B256 {
        let mut hasher = Sha256::new();
        hasher.update(index.to_be_bytes());
        hasher.update(init_code);
        B256::from_slice(&hasher.finalize())
    }
}

#[async_trait]
impl ChainTransport for OfflineTransport {
    async fn submit(&self, init_code: Bytes) -> Result<B256, MigrateError> {
        let mut submitted = self.submitted.lock().expect("transport lock poisoned");
        let tx_hash = Self::tx_hash_for(submitted.len(), &init_code);
        submitted.push(init_code);
        Ok(tx_hash)
    }

    async fn await_confirmation(
        &self,
        tx_hash: B256,
        _confirmations: u64,
        _timeout: Duration,
    ) -> Result<Confirmation, MigrateError> {
        let submitted = self.submitted.lock().expect("transport lock poisoned");
        let index = submitted
            .iter()
            .enumerate()
            .find(|(i, code)| Self::tx_hash_for(*i, code) == tx_hash)
            .map(|(i, _)| i)
            .ok_or_else(|| {
                MigrateError::SubmissionFailed(format!("unknown transaction {tx_hash}"))
            })?;

        // The address is the tail of a hash over the tx hash, so distinct
        // submissions get distinct, reproducible addresses.
        let digest = Sha256::digest(tx_hash);
        Ok(Confirmation {
            address: Address::from_slice(&digest[12..]),
            tx_hash,
            block_number: index as u64 + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_transport_is_deterministic() {
        let init_code = Bytes::from(vec![0x60, 0x80, 0x60, 0x40]);

        let first = OfflineTransport::new();
        let tx_a = first.submit(init_code.clone()).await.unwrap();
        let conf_a = first
            .await_confirmation(tx_a, 1, Duration::from_secs(1))
            .await
            .unwrap();

        let second = OfflineTransport::new();
        let tx_b = second.submit(init_code).await.unwrap();
        let conf_b = second
            .await_confirmation(tx_b, 1, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(tx_a, tx_b);
        assert_eq!(conf_a.address, conf_b.address);
        assert_ne!(conf_a.address, Address::ZERO);
    }

    #[tokio::test]
    async fn test_offline_transport_distinct_submissions_distinct_addresses() {
        let transport = OfflineTransport::new();
        let code = Bytes::from(vec![0xfe]);

        let tx_a = transport.submit(code.clone()).await.unwrap();
        let tx_b = transport.submit(code).await.unwrap();
        assert_ne!(tx_a, tx_b);

        let conf_a = transport
            .await_confirmation(tx_a, 1, Duration::from_secs(1))
            .await
            .unwrap();
        let conf_b = transport
            .await_confirmation(tx_b, 1, Duration::from_secs(1))
            .await
            .unwrap();
        assert_ne!(conf_a.address, conf_b.address);
        assert_eq!(transport.submission_count(), 2);
    }

    #[tokio::test]
    async fn test_offline_transport_rejects_unknown_tx() {
        let transport = OfflineTransport::new();
        let err = transport
            .await_confirmation(B256::repeat_byte(0xab), 1, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::SubmissionFailed(_)));
    }
}
