//! Reconciles a set of pending transactions against a new block: classifies
//! what mined, rebroadcasts what reverted, and fee-bumps what's still
//! pending. Phase order is load-bearing — see the module-level contract in
//! each phase below.

use futures_util::future::join_all;
use std::sync::Arc;
use tracing::instrument;

use crate::chain::NetworkFees;
use crate::errors::{ReplacementError, SignerError};
use crate::monitor::ReceiptObserver;
use crate::signer::{solo_context, Signer};
use crate::types::{PendingTransaction, ReplacementOutcome, TransactionIntent, TransactionStatus};

const FEE_BUMP_NUMERATOR: u128 = 112;
const FEE_BUMP_DENOMINATOR: u128 = 100;

pub struct ReplacementEngine {
    signer: Arc<dyn Signer>,
    monitor: Arc<dyn ReceiptObserver>,
}

impl ReplacementEngine {
    pub fn new(signer: Arc<dyn Signer>, monitor: Arc<dyn ReceiptObserver>) -> Self {
        Self { signer, monitor }
    }

    /// Runs all three phases against `pending`, returning the transactions
    /// that still need attention next block (fresh replacements and
    /// underpriced retries), tagged with `new_block_number`.
    #[instrument(skip_all, fields(new_block_number, outstanding = pending.len()))]
    pub async fn reconcile(
        &self,
        pending: Vec<PendingTransaction>,
        contract_fee: alloy_primitives::U256,
        new_block_number: u64,
        network_fees: NetworkFees,
    ) -> Vec<ReplacementOutcome> {
        let (reverted, still_pending) = self.classify(pending).await;

        let mut outcomes = self
            .rebroadcast_reverted(reverted, contract_fee, new_block_number)
            .await;

        outcomes.extend(
            self.replace_pending(still_pending, contract_fee, network_fees, new_block_number)
                .await,
        );

        outcomes
    }

    /// Phase 1: concurrently query status, partition into reverted and
    /// still-pending. Already-mined transactions are dropped here; the
    /// caller doesn't need to hear about them again.
    async fn classify(
        &self,
        pending: Vec<PendingTransaction>,
    ) -> (Vec<PendingTransaction>, Vec<PendingTransaction>) {
        let checks = join_all(pending.into_iter().map(|tx| async move {
            let status = self
                .monitor
                .status(tx.hash, Some(tx.signer_address), Some(tx.nonce))
                .await;
            (tx, status)
        }))
        .await;

        let mut reverted = Vec::new();
        let mut still_pending = Vec::new();
        for (tx, status) in checks {
            match status {
                TransactionStatus::Mined { .. } | TransactionStatus::MinedByCompetitor => {
                    tracing::debug!(hash = %tx.hash, "already mined, dropping from replacement set");
                }
                TransactionStatus::Reverted { .. } => reverted.push(tx),
                TransactionStatus::Pending => still_pending.push(tx),
            }
        }
        (reverted, still_pending)
    }

    /// Phase 2: reverted transactions consumed their nonce, so the only
    /// remedy is a fresh send. Strictly sequential, even for a
    /// parallel-capable signer, so a fresh nonce never collides with a
    /// Phase 3 replacement still targeting the old one.
    async fn rebroadcast_reverted(
        &self,
        reverted: Vec<PendingTransaction>,
        contract_fee: alloy_primitives::U256,
        new_block_number: u64,
    ) -> Vec<ReplacementOutcome> {
        let mut outcomes = Vec::with_capacity(reverted.len());
        for tx in reverted {
            let intent = TransactionIntent {
                to: tx.contract_address,
                data: tx.request_data.clone(),
                value: contract_fee,
                gas_limit: crate::types::REQUEST_GAS_LIMIT,
                max_fee_per_gas: None,
                max_priority_fee_per_gas: None,
            };
            let context = solo_context(tx.owning_pubkey);
            match self.signer.send(&intent, context).await {
                Ok(response) => outcomes.push(ReplacementOutcome::Success(PendingTransaction {
                    hash: response.hash,
                    nonce: response.nonce,
                    signer_address: tx.signer_address,
                    owning_pubkey: tx.owning_pubkey,
                    contract_address: tx.contract_address,
                    request_data: tx.request_data.clone(),
                    broadcast_block_number: new_block_number,
                    max_fee_per_gas: 0,
                    max_priority_fee_per_gas: 0,
                })),
                Err(error) => outcomes.push(ReplacementOutcome::Failed {
                    original: tx,
                    error: map_signer_error(error),
                }),
            }
        }
        outcomes
    }

    /// Phase 3: bump fees on everything still pending. Concurrent when the
    /// signer supports parallel signing, serial otherwise. Must not run
    /// until Phase 2 has fully drained, or a reverted tx's fresh nonce can
    /// collide with a replacement still targeting the stale one.
    async fn replace_pending(
        &self,
        still_pending: Vec<PendingTransaction>,
        contract_fee: alloy_primitives::U256,
        network_fees: NetworkFees,
        new_block_number: u64,
    ) -> Vec<ReplacementOutcome> {
        let bump = |tx: &PendingTransaction| -> (u128, u128) {
            let max_fee = bumped_fee(tx.max_fee_per_gas, network_fees.max_fee_per_gas);
            let max_priority_fee = bumped_fee(
                tx.max_priority_fee_per_gas,
                network_fees.max_priority_fee_per_gas,
            );
            (max_fee, max_priority_fee)
        };

        if self.signer.capabilities().supports_parallel_signing {
            let futures = still_pending.iter().map(|tx| {
                let (max_fee, max_priority_fee) = bump(tx);
                self.replace_one(tx, contract_fee, max_fee, max_priority_fee, new_block_number)
            });
            join_all(futures).await
        } else {
            let mut outcomes = Vec::with_capacity(still_pending.len());
            for tx in &still_pending {
                let (max_fee, max_priority_fee) = bump(tx);
                outcomes.push(
                    self.replace_one(tx, contract_fee, max_fee, max_priority_fee, new_block_number)
                        .await,
                );
            }
            outcomes
        }
    }

    async fn replace_one(
        &self,
        tx: &PendingTransaction,
        contract_fee: alloy_primitives::U256,
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
        new_block_number: u64,
    ) -> ReplacementOutcome {
        let intent = TransactionIntent {
            to: tx.contract_address,
            data: tx.request_data.clone(),
            value: contract_fee,
            gas_limit: crate::types::REQUEST_GAS_LIMIT,
            max_fee_per_gas: Some(max_fee_per_gas),
            max_priority_fee_per_gas: Some(max_priority_fee_per_gas),
        }
        .with_fees(max_fee_per_gas, max_priority_fee_per_gas);

        let context = solo_context(tx.owning_pubkey);
        match self
            .signer
            .send_with_nonce(&intent, tx.nonce, context)
            .await
        {
            Ok(response) => ReplacementOutcome::Success(PendingTransaction {
                hash: response.hash,
                nonce: response.nonce,
                signer_address: tx.signer_address,
                owning_pubkey: tx.owning_pubkey,
                contract_address: tx.contract_address,
                request_data: tx.request_data.clone(),
                broadcast_block_number: new_block_number,
                max_fee_per_gas,
                max_priority_fee_per_gas,
            }),
            Err(error) => match classify_replacement_error(&error) {
                ReplacementClassification::Underpriced => {
                    ReplacementOutcome::Underpriced(tx.clone())
                }
                ReplacementClassification::AlreadyMined => ReplacementOutcome::AlreadyMined {
                    owning_pubkey: tx.owning_pubkey,
                },
                ReplacementClassification::InsufficientFunds => ReplacementOutcome::Failed {
                    original: tx.clone(),
                    error: ReplacementError::InsufficientFunds,
                },
                ReplacementClassification::Unknown => ReplacementOutcome::Failed {
                    original: tx.clone(),
                    error: map_signer_error(error),
                },
            },
        }
    }
}

enum ReplacementClassification {
    Underpriced,
    AlreadyMined,
    InsufficientFunds,
    Unknown,
}

fn classify_replacement_error(error: &SignerError) -> ReplacementClassification {
    let message = match error {
        SignerError::InsufficientFunds(_) => return ReplacementClassification::InsufficientFunds,
        SignerError::Rejected(message) => message.to_lowercase(),
        SignerError::Transport(err) => err.to_string().to_lowercase(),
        _ => return ReplacementClassification::Unknown,
    };
    if message.contains("insufficient funds") {
        ReplacementClassification::InsufficientFunds
    } else if message.contains("replacement") && message.contains("underpriced") {
        ReplacementClassification::Underpriced
    } else if message.contains("nonce") && (message.contains("expired") || message.contains("already")) {
        ReplacementClassification::AlreadyMined
    } else {
        ReplacementClassification::Unknown
    }
}

fn map_signer_error(error: SignerError) -> ReplacementError {
    error.into()
}

/// Computes `max(original, network_fallback) * 112 / 100`, truncating.
fn bumped_fee(original: u128, network_fallback: u128) -> u128 {
    let base = original.max(network_fallback);
    base * FEE_BUMP_NUMERATOR / FEE_BUMP_DENOMINATOR
}
