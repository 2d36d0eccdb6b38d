//! Signer capability abstraction. A signer is the sole authority for nonce
//! allocation on a fresh send; `send_with_nonce` exists only for the
//! replacement engine, which owns the nonce itself.

pub mod hardware;
pub mod local;

use alloy_primitives::{Address, TxHash};
use async_trait::async_trait;

use crate::errors::SignerError;
use crate::types::{OwningPubkey, TransactionIntent};

/// What a signer send call returns: the hash it was given and the nonce
/// the signer assigned (or was told to use).
#[derive(Debug, Clone, Copy)]
pub struct SendResponse {
    pub hash: TxHash,
    pub nonce: u64,
}

/// What a signer can and can't do, used to pick a broadcast strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignerCapabilities {
    pub supports_parallel_signing: bool,
    pub requires_user_interaction: bool,
}

/// Context passed to an interactive signer purely for user-facing prompts.
/// A non-interactive signer ignores this entirely.
#[derive(Debug, Clone, Copy)]
pub struct SigningContext {
    pub current_index: usize,
    pub total_count: usize,
    pub owning_pubkey: OwningPubkey,
}

/// Capability + contract every signer implementation must satisfy.
#[async_trait]
pub trait Signer: Send + Sync {
    /// This signer's on-chain address.
    fn address(&self) -> Address;

    fn capabilities(&self) -> SignerCapabilities;

    /// Sends `intent`, assigning the next nonce internally. May suspend
    /// awaiting user confirmation on an interactive signer.
    async fn send(
        &self,
        intent: &TransactionIntent,
        context: SigningContext,
    ) -> Result<SendResponse, SignerError>;

    /// Sends `intent` at an explicit `nonce`, used exclusively by the
    /// replacement engine. Must not consult or advance any internal nonce
    /// counter — the caller owns `nonce` completely. Implementations that
    /// cannot honor an explicit nonce fail with
    /// [`SignerError::ExplicitNonceUnsupported`] rather than silently
    /// picking a different one.
    async fn send_with_nonce(
        &self,
        intent: &TransactionIntent,
        nonce: u64,
        context: SigningContext,
    ) -> Result<SendResponse, SignerError>;

    /// Releases any held resource (device handle, connection). Best-effort;
    /// implementations that hold nothing make this a no-op.
    async fn dispose(&self);
}

/// A [`SigningContext`] for a send that isn't part of a user-facing batch
/// (e.g. a single-item replacement).
pub fn solo_context(owning_pubkey: OwningPubkey) -> SigningContext {
    SigningContext {
        current_index: 0,
        total_count: 1,
        owning_pubkey,
    }
}
