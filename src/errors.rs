//! Error taxonomy for the validator-request pipeline.
//!
//! One enum per component boundary: callers below the orchestrator never
//! see a raw Alloy/transport error — everything is converted to one of
//! these before it crosses back up.

use alloy_primitives::Address;
use alloy_transport::TransportError;

/// Errors from the chain-state reader (block number, contract fee, network fees).
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Fatal: the system contract hasn't been activated for the current
    /// block (slot 0 reads back the excess-inhibitor sentinel). Halts the
    /// whole pipeline — no retries.
    #[error("system contract is not yet active (excess slot reads the inhibitor sentinel)")]
    SystemContractInactive,
    /// Block number or storage read failed. Retriable at batch scope.
    #[error("chain unavailable: {0}")]
    ChainUnavailable(#[from] TransportError),
    /// Fee-data endpoint didn't return both fields after the retry budget.
    #[error("network max/priority fee unavailable after retries")]
    NetworkFeesUnavailable,
}

/// Errors from a [`crate::signer::Signer`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// The node rejected the transaction outright (bad signature, chain id
    /// mismatch, etc).
    #[error("signer rejected transaction: {0}")]
    Rejected(String),
    /// The signing device or key material is unavailable (hardware
    /// disconnected, key not loaded).
    #[error("signer disconnected: {0}")]
    Disconnected(String),
    /// Node reports the sender lacks funds to cover `value + gas`.
    #[error("insufficient funds for signer {0}")]
    InsufficientFunds(Address),
    /// `send_with_nonce` was called on a signer that cannot honor an
    /// explicit nonce (contract violation, not a runtime condition).
    #[error("signer cannot accept an explicit nonce")]
    ExplicitNonceUnsupported,
    /// Transport-level failure underneath signing or broadcast.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors surfaced by a broadcast attempt for a single request.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Errors mapped from a replacement attempt against the node's mempool.
#[derive(Debug, thiserror::Error)]
pub enum ReplacementError {
    /// Mempool rejected the bump as not exceeding the replacement floor.
    /// Not a terminal error — callers map this to [`crate::types::ReplacementOutcome::Underpriced`]
    /// rather than constructing this variant directly in most paths.
    #[error("replacement underpriced")]
    Underpriced,
    /// Nonce already consumed by another transaction from this signer.
    #[error("nonce expired")]
    NonceExpired,
    /// Terminal at the orchestrator level: aborts remaining batches.
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("unknown broadcast error: {0}")]
    Unknown(String),
}

/// Errors the orchestrator itself can surface (as opposed to per-pubkey
/// failures, which it accumulates rather than propagates).
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The system contract is inactive; the whole run halts immediately.
    #[error(transparent)]
    Fatal(#[from] ChainError),
}
