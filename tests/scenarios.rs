//! End-to-end scenarios against real orchestrator/replacement/broadcast code
//! wired to the in-memory fakes in `support`. Each mirrors one of the
//! concrete walkthroughs the pipeline is expected to handle: a clean batch,
//! a block-boundary fee bump, a revert-then-retry, an underpriced
//! replacement that survives another block, a cross-batch insufficient-funds
//! abort, and a halted run against an inactive system contract.

mod support;

use std::sync::Arc;

use alloy_primitives::Address;

use execreq_pipeline::broadcast::parallel::ParallelBroadcastStrategy;
use execreq_pipeline::broadcast::BroadcastStrategy;
use execreq_pipeline::chain::ChainStateReader;
use execreq_pipeline::monitor::ReceiptObserver;
use execreq_pipeline::orchestrator::{BatchOrchestrator, FailureReason};
use execreq_pipeline::replace::ReplacementEngine;
use execreq_pipeline::signer::Signer;
use execreq_pipeline::types::TransactionStatus;

use support::{fake_hash, parallel_capabilities, withdrawal_request, FakeChain, FakeReceiptObserver, FakeSigner, ScriptedError};

fn contract_address() -> Address {
    Address::repeat_byte(0x11)
}

fn signer_address() -> Address {
    Address::repeat_byte(0x22)
}

/// S1 — happy path: three requests, a parallel-capable signer, every
/// broadcast mines on the first check. Nothing is ever replaced.
#[tokio::test]
async fn s1_happy_path_parallel_signer_mines_everything() {
    let chain = Arc::new(FakeChain::new([100], 1, 30, 2));
    let signer = Arc::new(FakeSigner::new(signer_address(), 5, parallel_capabilities()));
    let observer = Arc::new(FakeReceiptObserver::new(TransactionStatus::Mined {
        receipt_block: 101,
    }));

    let broadcast: Arc<dyn BroadcastStrategy> = Arc::new(ParallelBroadcastStrategy::new(signer.clone()));
    let replace = ReplacementEngine::new(
        signer.clone() as Arc<dyn Signer>,
        observer.clone() as Arc<dyn ReceiptObserver>,
    );
    let orchestrator = BatchOrchestrator::new(
        contract_address(),
        chain as Arc<dyn ChainStateReader>,
        broadcast,
        observer as Arc<dyn ReceiptObserver>,
        replace,
    );

    let requests: Vec<_> = (1..=3).map(withdrawal_request).collect();
    let pubkeys: Vec<_> = requests.iter().map(|r| r.owning_pubkey()).collect();

    let report = orchestrator.run(requests, 10).await;

    assert!(report.failed.is_empty(), "expected no failures: {:?}", report.failed);
    assert_eq!(report.mined.len(), 3);
    for pubkey in pubkeys {
        assert!(report.mined.contains(&pubkey));
    }
    assert_eq!(signer.sent_transactions().len(), 3);
}

/// S2 — block change, fee bump: the initial broadcast stays pending past
/// one block, the replacement engine bumps both fees above the network
/// fallback by at least 12%, and the bumped replacement mines.
#[tokio::test]
async fn s2_block_change_bumps_fees_and_mines() {
    let chain = Arc::new(FakeChain::new([100, 101], 1, 30, 2));
    let signer = Arc::new(FakeSigner::new(signer_address(), 12, parallel_capabilities()));
    let observer = Arc::new(FakeReceiptObserver::new(TransactionStatus::Mined {
        receipt_block: 102,
    }));
    // The initial broadcast (nonce 12, this signer's first ever call) stays
    // pending; anything else (the replacement) defaults to Mined above.
    observer.set_status(fake_hash(12, 0), TransactionStatus::Pending);

    let broadcast: Arc<dyn BroadcastStrategy> = Arc::new(ParallelBroadcastStrategy::new(signer.clone()));
    let replace = ReplacementEngine::new(
        signer.clone() as Arc<dyn Signer>,
        observer.clone() as Arc<dyn ReceiptObserver>,
    );
    let orchestrator = BatchOrchestrator::new(
        contract_address(),
        chain as Arc<dyn ChainStateReader>,
        broadcast,
        observer as Arc<dyn ReceiptObserver>,
        replace,
    );

    let request = withdrawal_request(9);
    let pubkey = request.owning_pubkey();

    let report = orchestrator.run(vec![request], 10).await;

    assert!(report.failed.is_empty(), "expected no failures: {:?}", report.failed);
    assert_eq!(report.mined, vec![pubkey]);

    let sent = signer.sent_transactions();
    assert_eq!(sent.len(), 2, "initial broadcast + one replacement");
    let initial = &sent[0];
    assert_eq!(initial.nonce, 12);
    assert_eq!(initial.max_fee_per_gas, None, "first broadcast leaves fees to the provider");

    let replacement = &sent[1];
    assert_eq!(replacement.nonce, 12, "replacement reuses the original nonce");
    // original (0, fee unset) vs. network fallback (30/2): fallback wins,
    // bumped by at least 12%.
    assert_eq!(replacement.max_fee_per_gas, Some(33));
    assert_eq!(replacement.max_priority_fee_per_gas, Some(2));
}

/// S3 — revert then fresh-nonce retry: the broadcast transaction reverts,
/// so Phase 2 resends with a brand new nonce rather than bumping the dead
/// one, and the fresh attempt mines.
#[tokio::test]
async fn s3_reverted_transaction_retried_at_fresh_nonce() {
    let chain = Arc::new(FakeChain::new([100, 101], 1, 30, 2));
    let signer = Arc::new(FakeSigner::new(signer_address(), 20, parallel_capabilities()));
    let observer = Arc::new(FakeReceiptObserver::new(TransactionStatus::Mined {
        receipt_block: 102,
    }));
    observer.set_status(
        fake_hash(20, 0),
        TransactionStatus::Reverted { receipt_block: 101 },
    );

    let broadcast: Arc<dyn BroadcastStrategy> = Arc::new(ParallelBroadcastStrategy::new(signer.clone()));
    let replace = ReplacementEngine::new(
        signer.clone() as Arc<dyn Signer>,
        observer.clone() as Arc<dyn ReceiptObserver>,
    );
    let orchestrator = BatchOrchestrator::new(
        contract_address(),
        chain as Arc<dyn ChainStateReader>,
        broadcast,
        observer as Arc<dyn ReceiptObserver>,
        replace,
    );

    let request = withdrawal_request(4);
    let pubkey = request.owning_pubkey();
    let report = orchestrator.run(vec![request], 10).await;

    assert!(report.failed.is_empty(), "expected no failures: {:?}", report.failed);
    assert_eq!(report.mined, vec![pubkey]);

    let sent = signer.sent_transactions();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].nonce, 20);
    assert_eq!(sent[1].nonce, 21, "reverted nonce is abandoned, not reused");
}

/// S4 — underpriced replacement survives to the next block: the first bump
/// attempt is rejected as underpriced and kept as-is, then on the next
/// block boundary a second bump attempt succeeds and mines.
#[tokio::test]
async fn s4_underpriced_replacement_retried_next_block() {
    let chain = Arc::new(FakeChain::new([100, 101, 102], 1, 30, 2));
    let signer = Arc::new(FakeSigner::new(signer_address(), 30, parallel_capabilities()));
    let observer = Arc::new(FakeReceiptObserver::new(TransactionStatus::Mined {
        receipt_block: 103,
    }));
    observer.set_status(fake_hash(30, 0), TransactionStatus::Pending);
    signer.fail_replacement(
        30,
        ScriptedError::Rejected("replacement transaction underpriced".to_string()),
    );

    let broadcast: Arc<dyn BroadcastStrategy> = Arc::new(ParallelBroadcastStrategy::new(signer.clone()));
    let replace = ReplacementEngine::new(
        signer.clone() as Arc<dyn Signer>,
        observer.clone() as Arc<dyn ReceiptObserver>,
    );
    let orchestrator = BatchOrchestrator::new(
        contract_address(),
        chain as Arc<dyn ChainStateReader>,
        broadcast,
        observer as Arc<dyn ReceiptObserver>,
        replace,
    );

    let request = withdrawal_request(6);
    let pubkey = request.owning_pubkey();
    let report = orchestrator.run(vec![request], 10).await;

    assert!(report.failed.is_empty(), "expected no failures: {:?}", report.failed);
    assert_eq!(report.mined, vec![pubkey]);

    let sent = signer.sent_transactions();
    assert_eq!(sent.len(), 2, "one rejected bump attempt, one that lands");
    assert_eq!(sent[0].nonce, 30);
    assert_eq!(sent[1].nonce, 30, "second bump reuses the same nonce");
}

/// S5 — insufficient funds aborts the tail: batch size 1 over three
/// requests. The first mines, the second fails broadcasting with
/// insufficient funds, and the third is skipped without ever broadcasting.
#[tokio::test]
async fn s5_insufficient_funds_aborts_remaining_batches() {
    let chain = Arc::new(FakeChain::new([100], 1, 30, 2));
    let signer = Arc::new(FakeSigner::new(signer_address(), 0, parallel_capabilities()));
    let observer = Arc::new(FakeReceiptObserver::new(TransactionStatus::Mined {
        receipt_block: 101,
    }));

    let requests: Vec<_> = (1..=3).map(withdrawal_request).collect();
    let pubkeys: Vec<_> = requests.iter().map(|r| r.owning_pubkey()).collect();
    signer.fail_send(pubkeys[1], ScriptedError::InsufficientFunds);

    let broadcast: Arc<dyn BroadcastStrategy> = Arc::new(ParallelBroadcastStrategy::new(signer.clone()));
    let replace = ReplacementEngine::new(
        signer.clone() as Arc<dyn Signer>,
        observer.clone() as Arc<dyn ReceiptObserver>,
    );
    let orchestrator = BatchOrchestrator::new(
        contract_address(),
        chain as Arc<dyn ChainStateReader>,
        broadcast,
        observer as Arc<dyn ReceiptObserver>,
        replace,
    );

    let report = orchestrator.run(requests, 1).await;

    assert_eq!(report.mined, vec![pubkeys[0]]);
    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.failed[0].owning_pubkey, pubkeys[1]);
    assert_eq!(report.failed[0].reason, FailureReason::BroadcastFailed);
    assert_eq!(report.failed[1].owning_pubkey, pubkeys[2]);
    assert_eq!(report.failed[1].reason, FailureReason::InsufficientFundsSkipped);

    // The third batch never reached the signer at all.
    assert_eq!(signer.sent_transactions().len(), 1);
}

/// S6 — system contract inactive: the excess slot reads the inhibitor
/// sentinel before anything is ever broadcast, and every input pubkey fails
/// with the same reason.
#[tokio::test]
async fn s6_system_contract_inactive_fails_everything_without_broadcasting() {
    let chain = Arc::new(FakeChain::new([100], 1, 30, 2));
    chain.mark_system_contract_inactive();
    let signer = Arc::new(FakeSigner::new(signer_address(), 0, parallel_capabilities()));
    let observer = Arc::new(FakeReceiptObserver::new(TransactionStatus::Pending));

    let requests: Vec<_> = (1..=3).map(withdrawal_request).collect();
    let pubkeys: Vec<_> = requests.iter().map(|r| r.owning_pubkey()).collect();

    let broadcast: Arc<dyn BroadcastStrategy> = Arc::new(ParallelBroadcastStrategy::new(signer.clone()));
    let replace = ReplacementEngine::new(
        signer.clone() as Arc<dyn Signer>,
        observer.clone() as Arc<dyn ReceiptObserver>,
    );
    let orchestrator = BatchOrchestrator::new(
        contract_address(),
        chain as Arc<dyn ChainStateReader>,
        broadcast,
        observer as Arc<dyn ReceiptObserver>,
        replace,
    );

    let report = orchestrator.run(requests, 10).await;

    assert!(report.mined.is_empty());
    assert_eq!(report.failed.len(), 3);
    for (failed, pubkey) in report.failed.iter().zip(pubkeys.iter()) {
        assert_eq!(failed.owning_pubkey, *pubkey);
        assert_eq!(failed.reason, FailureReason::ChainStateError);
    }
    assert!(signer.sent_transactions().is_empty(), "nothing should ever broadcast");
}
