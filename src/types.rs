//! Core data types flowing through the validator-request pipeline.
//!
//! These map directly onto the data model: [`Request`] is the opaque
//! per-validator payload, [`TransactionIntent`] is what a [`crate::signer::Signer`]
//! is asked to sign and broadcast, [`PendingTransaction`] is what a
//! successful broadcast produces, and [`TransactionStatus`] / [`BroadcastOutcome`]
//! / [`ReplacementOutcome`] are the tagged outcomes the rest of the pipeline
//! branches on.

use alloy_primitives::{Address, Bytes, TxHash, U256};
use std::fmt;

/// Fixed gas limit attached to every validator-request transaction.
pub const REQUEST_GAS_LIMIT: u64 = 200_000;

/// The leading bytes of every request payload are the owning validator's
/// BLS public key, used only for failure reporting. The pipeline never
/// inspects anything past this.
pub const OWNING_PUBKEY_LEN: usize = 48;

/// Which system contract a request targets.
///
/// The pipeline treats request bytes as opaque beyond the leading pubkey;
/// this discriminant exists only to pick the right contract address and to
/// sanity-check payload length, not to interpret the payload further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// EIP-7251 consolidation or credential switch (`source || target`, 96 bytes).
    Consolidation,
    /// EIP-7002 partial/full withdrawal or exit (`pubkey || amount`, 56 bytes).
    Withdrawal,
}

impl RequestKind {
    /// Expected payload length for this request kind.
    pub fn expected_len(self) -> usize {
        match self {
            RequestKind::Consolidation => 96,
            RequestKind::Withdrawal => 56,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Consolidation => write!(f, "consolidation"),
            RequestKind::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

/// A single pre-encoded validator request.
///
/// Opaque beyond its leading [`OWNING_PUBKEY_LEN`] bytes, which name the
/// validator this request is reported against on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    bytes: Bytes,
}

impl Request {
    /// Wrap pre-encoded request bytes. Does not validate length against a
    /// [`RequestKind`] — callers that need that check use [`Request::validated`].
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Wrap pre-encoded request bytes, checking the length matches `kind`.
    pub fn validated(bytes: impl Into<Bytes>, kind: RequestKind) -> Result<Self, InvalidRequest> {
        let bytes = bytes.into();
        if bytes.len() != kind.expected_len() {
            return Err(InvalidRequest {
                expected: kind.expected_len(),
                actual: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    /// The raw request bytes, as sent in the transaction's `data` field.
    pub fn data(&self) -> &Bytes {
        &self.bytes
    }

    /// The owning validator's public key: the leading [`OWNING_PUBKEY_LEN`] bytes.
    ///
    /// # Panics
    /// Panics if the payload is shorter than [`OWNING_PUBKEY_LEN`] — a
    /// violation of the wire format this pipeline was given, not a runtime
    /// condition it's expected to recover from.
    pub fn owning_pubkey(&self) -> OwningPubkey {
        assert!(
            self.bytes.len() >= OWNING_PUBKEY_LEN,
            "request payload shorter than a validator pubkey"
        );
        let mut pubkey = [0u8; OWNING_PUBKEY_LEN];
        pubkey.copy_from_slice(&self.bytes[..OWNING_PUBKEY_LEN]);
        OwningPubkey(pubkey)
    }
}

/// A request payload whose length didn't match the declared [`RequestKind`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("expected {expected}-byte request payload, got {actual}")]
pub struct InvalidRequest {
    expected: usize,
    actual: usize,
}

/// The 48-byte BLS public key of the validator a request belongs to.
///
/// Used as the unit of failure reporting: every input pubkey ends up either
/// mined or present exactly once in [`crate::orchestrator::PipelineReport::failed`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwningPubkey([u8; OWNING_PUBKEY_LEN]);

impl OwningPubkey {
    /// Raw 48-byte key.
    pub fn as_bytes(&self) -> &[u8; OWNING_PUBKEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for OwningPubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for OwningPubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// A fully specified EIP-1559 transaction the pipeline wants broadcast.
///
/// `value` is always the contract-fee snapshot of the block this intent was
/// built for; `max_fee_per_gas`/`max_priority_fee_per_gas` are
/// `None` on first broadcast (the provider's gas filler picks network
/// defaults) and `Some` once the replacement engine has bumped them.
#[derive(Debug, Clone)]
pub struct TransactionIntent {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: u64,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

impl TransactionIntent {
    /// Build an intent for a fresh broadcast: fixed gas limit, no fee
    /// override (the signer's provider fills network-default fees).
    pub fn new(to: Address, request: &Request, contract_fee: U256) -> Self {
        Self {
            to,
            data: request.data().clone(),
            value: contract_fee,
            gas_limit: REQUEST_GAS_LIMIT,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        }
    }

    /// Re-value this intent for a new block's contract fee, leaving
    /// everything else (including any fee overrides) untouched.
    pub fn revalued(mut self, contract_fee: U256) -> Self {
        self.value = contract_fee;
        self
    }

    /// Attach explicit fee-per-gas overrides (used by the replacement engine).
    pub fn with_fees(mut self, max_fee_per_gas: u128, max_priority_fee_per_gas: u128) -> Self {
        self.max_fee_per_gas = Some(max_fee_per_gas);
        self.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
        self
    }
}

/// A transaction a signer has successfully broadcast, tracked until it
/// mines, gets superseded, or the batch's retry budget is exhausted.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub hash: TxHash,
    pub nonce: u64,
    pub signer_address: Address,
    pub owning_pubkey: OwningPubkey,
    pub contract_address: Address,
    /// The request payload this transaction carries. Retained so a
    /// revert-retry or fee-bump replacement resends the same request
    /// instead of an empty no-op call.
    pub request_data: Bytes,
    pub broadcast_block_number: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Outcome of a point-in-time status query or receipt wait against one
/// [`PendingTransaction`].
#[derive(Debug, Clone)]
pub enum TransactionStatus {
    /// Receipt observed with a success status.
    Mined { receipt_block: u64 },
    /// Receipt observed with a revert status; the nonce is consumed and must
    /// be retried with a fresh one (see [`crate::replace::ReplacementEngine`]).
    Reverted { receipt_block: u64 },
    /// No receipt yet, and the signer's on-chain nonce hasn't passed this
    /// transaction's nonce.
    Pending,
    /// No receipt for this exact hash, but the signer's on-chain nonce has
    /// moved past this transaction's nonce — some transaction at this
    /// nonce landed, ours or a replacement's. Treated as "already mined"
    /// for accounting purposes (see the rationale in [`crate::monitor`]).
    MinedByCompetitor,
}

/// Result of one broadcast attempt for one [`Request`].
#[derive(Debug)]
pub enum BroadcastOutcome {
    Success(PendingTransaction),
    Failed {
        owning_pubkey: OwningPubkey,
        error: crate::errors::BroadcastError,
    },
}

/// Result of one replacement attempt for one [`PendingTransaction`].
#[derive(Debug)]
pub enum ReplacementOutcome {
    /// A new transaction was sent in its place.
    Success(PendingTransaction),
    /// The mempool rejected the bump as underpriced; keep the original and
    /// retry next block.
    Underpriced(PendingTransaction),
    /// The original (or a sibling) transaction already mined; nothing left
    /// to do for this pubkey.
    AlreadyMined { owning_pubkey: OwningPubkey },
    /// Replacement failed for a reason that terminates this pubkey's
    /// attempt (e.g. insufficient funds) or is simply unknown.
    Failed {
        original: PendingTransaction,
        error: crate::errors::ReplacementError,
    },
}
