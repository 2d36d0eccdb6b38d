//! Drives the whole pipeline: splits requests into batches, broadcasts each
//! batch, monitors for receipts, and repairs pending transactions across
//! block boundaries until every input pubkey is accounted for.
//!
//! The state machine per batch is `Broadcasting -> Monitoring -> [BlockChanged
//! -> Replacing -> Monitoring]* -> Done | RetryExhausted | Abort`. See the
//! phase-by-phase comments on [`BatchOrchestrator::run_batch`]; the abort
//! cause is threaded back as an [`AbortReason`] rather than a propagated
//! error type, since the orchestrator is the only caller that needs to act
//! on it — but the *cause* still has to survive the trip, or a fatal
//! `SystemContractInactive` partway through a run gets mislabeled as
//! `InsufficientFunds` for every batch it causes to be skipped.

use alloy_primitives::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::broadcast::{BroadcastItem, BroadcastStrategy};
use crate::chain::ChainStateReader;
use crate::errors::{BroadcastError, ChainError, ReplacementError};
use crate::monitor::ReceiptObserver;
use crate::replace::ReplacementEngine;
use crate::types::{
    BroadcastOutcome, OwningPubkey, PendingTransaction, Request, ReplacementOutcome,
    TransactionIntent, TransactionStatus,
};

/// Requests per batch is capped by the combined per-block request limit
/// across both system contracts.
pub const MAX_BATCH_SIZE: u16 = 220;

const MAX_RETRIES: u32 = 3;
const RETRY_POLL_DELAY: Duration = Duration::from_secs(1);

/// Why a batch halted in a way that aborts every batch after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbortReason {
    /// The signer ran out of funds broadcasting or replacing a transaction.
    InsufficientFunds,
    /// The system contract's excess slot read the inhibitor sentinel —
    /// fatal, per spec, no retries anywhere in the pipeline from here on.
    SystemContractInactive,
}

impl AbortReason {
    fn failure_reason(self) -> FailureReason {
        match self {
            AbortReason::InsufficientFunds => FailureReason::InsufficientFundsSkipped,
            AbortReason::SystemContractInactive => FailureReason::ChainStateError,
        }
    }
}

/// Why an owning pubkey didn't end up mined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The initial or a replacement broadcast was rejected outright.
    BroadcastFailed,
    /// Still pending (or reverted-and-retried-pending) when the batch's
    /// retry budget ran out.
    RetryExhausted,
    /// Skipped because the signer ran out of funds earlier in the run.
    InsufficientFundsSkipped,
    /// The batch number or contract fee couldn't be read for this batch.
    ChainStateError,
}

/// One pubkey that didn't mine, with the reason it was given up on.
#[derive(Debug, Clone, Copy)]
pub struct FailedRequest {
    pub owning_pubkey: OwningPubkey,
    pub reason: FailureReason,
}

/// The whole run's outcome: every input pubkey appears in exactly one of
/// `mined` or `failed`, never both, never neither.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub mined: Vec<OwningPubkey>,
    pub failed: Vec<FailedRequest>,
}

impl PipelineReport {
    /// The failed-pubkey list alone, suitable for re-supplying verbatim to
    /// the next invocation.
    pub fn failed_pubkeys(&self) -> Vec<OwningPubkey> {
        self.failed.iter().map(|f| f.owning_pubkey).collect()
    }

    fn push_failed(&mut self, owning_pubkey: OwningPubkey, reason: FailureReason) {
        self.failed.push(FailedRequest {
            owning_pubkey,
            reason,
        });
    }

    fn push_failed_many(&mut self, pubkeys: impl IntoIterator<Item = OwningPubkey>, reason: FailureReason) {
        for pubkey in pubkeys {
            self.push_failed(pubkey, reason);
        }
    }
}

/// Wires a chain-state reader, broadcast strategy, monitor and replacement
/// engine together and drives them to completion for a full request set.
pub struct BatchOrchestrator {
    contract_address: Address,
    chain: Arc<dyn ChainStateReader>,
    broadcast: Arc<dyn BroadcastStrategy>,
    monitor: Arc<dyn ReceiptObserver>,
    replace: ReplacementEngine,
}

impl BatchOrchestrator {
    pub fn new(
        contract_address: Address,
        chain: Arc<dyn ChainStateReader>,
        broadcast: Arc<dyn BroadcastStrategy>,
        monitor: Arc<dyn ReceiptObserver>,
        replace: ReplacementEngine,
    ) -> Self {
        Self {
            contract_address,
            chain,
            broadcast,
            monitor,
            replace,
        }
    }

    /// Splits `requests` into batches of at most `batch_size`, processes
    /// them strictly in order, and returns the accumulated report. Every
    /// input pubkey ends up mined or failed exactly once.
    pub async fn run(&self, requests: Vec<Request>, batch_size: u16) -> PipelineReport {
        let mut report = PipelineReport::default();
        if requests.is_empty() {
            return report;
        }

        let batch_size = (batch_size.max(1) as usize).min(MAX_BATCH_SIZE as usize);
        let batches: Vec<Vec<Request>> = requests
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        let mut abort: Option<AbortReason> = None;
        for (index, batch) in batches.into_iter().enumerate() {
            if let Some(reason) = abort {
                tracing::warn!(batch = index, ?reason, "skipping batch after abort");
                report.push_failed_many(
                    batch.iter().map(|r| r.owning_pubkey()),
                    reason.failure_reason(),
                );
                continue;
            }
            abort = self.run_batch(batch, index, &mut report).await;
        }

        report
    }

    /// Runs one batch end to end. Returns `Some(reason)` if this batch
    /// observed something that must abort every subsequent batch.
    #[instrument(skip_all, fields(batch = batch_index, size = batch.len()))]
    async fn run_batch(
        &self,
        batch: Vec<Request>,
        batch_index: usize,
        report: &mut PipelineReport,
    ) -> Option<AbortReason> {
        let owning_pubkeys: Vec<OwningPubkey> = batch.iter().map(|r| r.owning_pubkey()).collect();

        let block_number = match self.chain.fetch_block_number().await {
            Ok(n) => n,
            Err(ChainError::SystemContractInactive) => {
                tracing::error!(batch = batch_index, "system contract inactive, halting");
                report.push_failed_many(owning_pubkeys, FailureReason::ChainStateError);
                return Some(AbortReason::SystemContractInactive);
            }
            Err(err) => {
                tracing::warn!(batch = batch_index, %err, "block number unavailable, failing batch");
                report.push_failed_many(owning_pubkeys, FailureReason::ChainStateError);
                return None;
            }
        };

        let contract_fee = match self.chain.fetch_contract_fee(self.contract_address).await {
            Ok(fee) => fee,
            Err(ChainError::SystemContractInactive) => {
                tracing::error!(
                    batch = batch_index,
                    "system contract inactive (excess-inhibitor sentinel), halting pipeline"
                );
                report.push_failed_many(owning_pubkeys, FailureReason::ChainStateError);
                return Some(AbortReason::SystemContractInactive);
            }
            Err(err) => {
                tracing::warn!(batch = batch_index, %err, "contract fee unavailable, failing batch");
                report.push_failed_many(owning_pubkeys, FailureReason::ChainStateError);
                return None;
            }
        };

        tracing::info!(
            batch = batch_index,
            size = batch.len(),
            block_number,
            %contract_fee,
            "broadcasting batch"
        );

        let items: Vec<BroadcastItem> = batch
            .iter()
            .map(|request| BroadcastItem {
                intent: TransactionIntent::new(self.contract_address, request, contract_fee),
                owning_pubkey: request.owning_pubkey(),
            })
            .collect();

        let outcomes = self.broadcast.broadcast(items, block_number).await;

        let mut pending = Vec::with_capacity(outcomes.len());
        let mut abort: Option<AbortReason> = None;
        for outcome in outcomes {
            match outcome {
                BroadcastOutcome::Success(tx) => pending.push(tx),
                BroadcastOutcome::Failed {
                    owning_pubkey,
                    error,
                } => {
                    if is_insufficient_funds(&error) {
                        tracing::error!(
                            batch = batch_index,
                            %owning_pubkey,
                            "insufficient funds broadcasting, will abort remaining batches"
                        );
                        abort = Some(AbortReason::InsufficientFunds);
                    } else {
                        tracing::warn!(batch = batch_index, %owning_pubkey, %error, "broadcast failed");
                    }
                    report.push_failed(owning_pubkey, FailureReason::BroadcastFailed);
                }
            }
        }

        let retry_abort = self
            .drain_retry_loop(pending, block_number, batch_index, report)
            .await;

        abort.or(retry_abort)
    }

    /// Repeatedly waits for receipts and, on a block change, hands unresolved
    /// transactions to the replacement engine, until everything resolves or
    /// the retry budget (`MAX_RETRIES`) is exhausted. Returns `Some(reason)`
    /// if an `InsufficientFunds` replacement error, or a fatal
    /// `SystemContractInactive` mid-batch, was observed.
    #[instrument(skip_all, fields(batch = batch_index, outstanding = pending.len()))]
    async fn drain_retry_loop(
        &self,
        mut pending: Vec<PendingTransaction>,
        mut last_block: u64,
        batch_index: usize,
        report: &mut PipelineReport,
    ) -> Option<AbortReason> {
        let mut retries = 0u32;
        let mut abort: Option<AbortReason> = None;

        while retries < MAX_RETRIES {
            if pending.is_empty() {
                return abort;
            }

            let checks = self.monitor.wait_for_receipts(&pending).await;
            let mut still_unresolved = Vec::with_capacity(checks.len());
            for check in checks {
                match check.status {
                    TransactionStatus::Mined { .. } | TransactionStatus::MinedByCompetitor => {
                        report.mined.push(check.pending.owning_pubkey);
                    }
                    TransactionStatus::Reverted { .. } | TransactionStatus::Pending => {
                        still_unresolved.push(check.pending);
                    }
                }
            }
            pending = still_unresolved;
            if pending.is_empty() {
                return abort;
            }

            let new_block = match self.chain.fetch_block_number().await {
                Ok(n) => n,
                Err(err) => {
                    tracing::debug!(batch = batch_index, %err, "block number unavailable during retry, consuming retry");
                    retries += 1;
                    continue;
                }
            };

            if new_block == last_block {
                tracing::debug!(batch = batch_index, block_number = last_block, "block unchanged, waiting");
                tokio::time::sleep(RETRY_POLL_DELAY).await;
                continue;
            }

            let (contract_fee, network_fees) = match self.refresh_fees().await {
                Ok(fees) => fees,
                Err(ChainError::SystemContractInactive) => {
                    tracing::error!(
                        batch = batch_index,
                        "system contract inactive mid-batch, halting pipeline"
                    );
                    report.push_failed_many(
                        pending.into_iter().map(|tx| tx.owning_pubkey),
                        FailureReason::ChainStateError,
                    );
                    return Some(AbortReason::SystemContractInactive);
                }
                Err(err) => {
                    tracing::warn!(
                        batch = batch_index,
                        %err,
                        "fee refresh failed, consuming a retry and keeping pending set"
                    );
                    retries += 1;
                    continue;
                }
            };

            tracing::info!(
                batch = batch_index,
                from_block = last_block,
                to_block = new_block,
                outstanding = pending.len(),
                "block changed, reconciling pending transactions"
            );
            last_block = new_block;

            let outcomes = self
                .replace
                .reconcile(pending, contract_fee, new_block, network_fees)
                .await;

            pending = Vec::new();
            for outcome in outcomes {
                match outcome {
                    ReplacementOutcome::Success(tx) | ReplacementOutcome::Underpriced(tx) => {
                        pending.push(tx);
                    }
                    ReplacementOutcome::AlreadyMined { owning_pubkey } => {
                        report.mined.push(owning_pubkey);
                    }
                    ReplacementOutcome::Failed { original, error } => {
                        if matches!(error, ReplacementError::InsufficientFunds) {
                            tracing::error!(
                                batch = batch_index,
                                owning_pubkey = %original.owning_pubkey,
                                "insufficient funds replacing transaction, will abort remaining batches"
                            );
                            abort = Some(AbortReason::InsufficientFunds);
                        } else {
                            tracing::warn!(
                                batch = batch_index,
                                owning_pubkey = %original.owning_pubkey,
                                %error,
                                "replacement failed"
                            );
                        }
                        report.push_failed(original.owning_pubkey, FailureReason::BroadcastFailed);
                    }
                }
            }

            retries += 1;
        }

        if !pending.is_empty() {
            tracing::warn!(
                batch = batch_index,
                outstanding = pending.len(),
                "retry budget exhausted"
            );
            report.push_failed_many(
                pending.into_iter().map(|tx| tx.owning_pubkey),
                FailureReason::RetryExhausted,
            );
        }

        abort
    }

    async fn refresh_fees(&self) -> Result<(U256, crate::chain::NetworkFees), ChainError> {
        let contract_fee = self.chain.fetch_contract_fee(self.contract_address).await?;
        let network_fees = self.chain.fetch_max_network_fees().await?;
        Ok((contract_fee, network_fees))
    }
}

fn is_insufficient_funds(error: &BroadcastError) -> bool {
    matches!(
        error,
        BroadcastError::Signer(crate::errors::SignerError::InsufficientFunds(_))
    )
}
