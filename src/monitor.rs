//! Tracks broadcast transactions until they mine, revert, or get evicted
//! by a competing transaction from the same signer and nonce.

use alloy_primitives::{Address, TxHash};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::time::Duration;
use url::Url;

use crate::types::{PendingTransaction, TransactionStatus};

/// A [`PendingTransaction`] paired with the status observed for it.
#[derive(Debug, Clone)]
pub struct ReceiptCheck {
    pub pending: PendingTransaction,
    pub status: TransactionStatus,
}

/// What the replacement engine and orchestrator need from a transaction
/// monitor. Pulled out as a trait (rather than the concrete
/// [`TransactionMonitor`]) so both can be driven by an in-memory fake in
/// tests, the same "interface over concretion" shape used for [`crate::signer::Signer`].
#[async_trait]
pub trait ReceiptObserver: Send + Sync {
    async fn wait_for_receipts(&self, pending: &[PendingTransaction]) -> Vec<ReceiptCheck>;

    async fn status(
        &self,
        hash: TxHash,
        signer_address: Option<Address>,
        nonce: Option<u64>,
    ) -> TransactionStatus;
}

/// Polls receipts and nonces for a set of in-flight transactions.
pub struct TransactionMonitor {
    provider: RootProvider,
    receipt_timeout: Duration,
}

impl TransactionMonitor {
    pub fn new(rpc_url: Url, receipt_timeout: Duration) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc_url);
        Self {
            provider,
            receipt_timeout,
        }
    }

    async fn check_one(&self, tx: &PendingTransaction) -> ReceiptCheck {
        let status = self.status(tx.hash, Some(tx.signer_address), Some(tx.nonce)).await;
        ReceiptCheck {
            pending: tx.clone(),
            status,
        }
    }

    async fn status_from_nonce(
        &self,
        signer_address: Option<Address>,
        nonce: Option<u64>,
    ) -> TransactionStatus {
        if let (Some(address), Some(nonce)) = (signer_address, nonce) {
            match self.provider.get_transaction_count(address).await {
                Ok(current) if current > nonce => return TransactionStatus::MinedByCompetitor,
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(%address, %err, "nonce query failed, treating as pending");
                }
            }
        }
        TransactionStatus::Pending
    }

    /// Drops everything mined (by us or a competitor); keeps reverted and
    /// still-pending transactions for the replacement engine.
    pub fn extract_unresolved(checks: Vec<ReceiptCheck>) -> Vec<PendingTransaction> {
        checks
            .into_iter()
            .filter_map(|check| match check.status {
                TransactionStatus::Mined { .. } | TransactionStatus::MinedByCompetitor => None,
                TransactionStatus::Reverted { .. } | TransactionStatus::Pending => {
                    Some(check.pending)
                }
            })
            .collect()
    }
}

#[async_trait]
impl ReceiptObserver for TransactionMonitor {
    /// Awaits a receipt for every pending transaction, concurrently,
    /// bounded by the configured receipt timeout. A timeout or transient
    /// error classifies as [`TransactionStatus::Pending`] rather than
    /// failing the whole check — the orchestrator's retry loop handles
    /// genuinely stuck transactions.
    async fn wait_for_receipts(&self, pending: &[PendingTransaction]) -> Vec<ReceiptCheck> {
        let checks = pending.iter().map(|tx| self.check_one(tx));
        join_all(checks).await
    }

    /// Point-in-time status query used during replacement.
    async fn status(
        &self,
        hash: TxHash,
        signer_address: Option<Address>,
        nonce: Option<u64>,
    ) -> TransactionStatus {
        let receipt = tokio::time::timeout(
            self.receipt_timeout,
            self.provider.get_transaction_receipt(hash),
        )
        .await;

        match receipt {
            Ok(Ok(Some(receipt))) => {
                if receipt.status() {
                    TransactionStatus::Mined {
                        receipt_block: receipt.block_number.unwrap_or_default(),
                    }
                } else {
                    TransactionStatus::Reverted {
                        receipt_block: receipt.block_number.unwrap_or_default(),
                    }
                }
            }
            Ok(Ok(None)) | Err(_) => self.status_from_nonce(signer_address, nonce).await,
            Ok(Err(err)) => {
                tracing::debug!(%hash, %err, "receipt query failed, treating as pending");
                self.status_from_nonce(signer_address, nonce).await
            }
        }
    }
}
