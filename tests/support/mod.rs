//! Hand-written in-memory fakes for the three trait boundaries the
//! orchestrator and replacement engine talk to over the network:
//! `ChainStateReader`, `Signer`, and `ReceiptObserver`. Everything else
//! (`ParallelBroadcastStrategy`, `SequentialBroadcastStrategy`,
//! `ReplacementEngine`, `BatchOrchestrator`) runs for real against these.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use alloy_primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;

use execreq_pipeline::chain::{ChainStateReader, NetworkFees};
use execreq_pipeline::errors::{ChainError, SignerError};
use execreq_pipeline::monitor::{ReceiptCheck, ReceiptObserver};
use execreq_pipeline::signer::{SendResponse, Signer, SignerCapabilities, SigningContext};
use execreq_pipeline::types::{OwningPubkey, Request, RequestKind, TransactionIntent, TransactionStatus};

/// Builds a validated 56-byte withdrawal request whose owning pubkey is
/// `byte` repeated 48 times.
pub fn withdrawal_request(byte: u8) -> Request {
    let mut bytes = vec![byte; 48];
    bytes.extend_from_slice(&[0u8; 8]);
    Request::validated(Bytes::from(bytes), RequestKind::Withdrawal).unwrap()
}

/// Deterministic fake transaction hash, matching what [`FakeSigner`] assigns:
/// the nonce in the first 8 bytes, the signer's call-order generation in the
/// next 8. Exposed so tests can pre-arm [`FakeReceiptObserver`] for a hash
/// they know a scripted call will produce.
pub fn fake_hash(nonce: u64, generation: u64) -> TxHash {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&nonce.to_be_bytes());
    bytes[8..16].copy_from_slice(&generation.to_be_bytes());
    TxHash::from(bytes)
}

/// A [`ChainStateReader`] driven by a scripted sequence of block numbers
/// (repeating the last entry once exhausted) plus a mutable contract fee
/// and fixed network fees.
pub struct FakeChain {
    blocks: Mutex<VecDeque<u64>>,
    contract_fee: AtomicU64,
    max_fee_per_gas: AtomicU64,
    max_priority_fee_per_gas: AtomicU64,
    system_contract_inactive: AtomicBool,
}

impl FakeChain {
    pub fn new(
        blocks: impl IntoIterator<Item = u64>,
        contract_fee: u64,
        max_fee_per_gas: u64,
        max_priority_fee_per_gas: u64,
    ) -> Self {
        let blocks: VecDeque<u64> = blocks.into_iter().collect();
        assert!(!blocks.is_empty(), "block script must not be empty");
        Self {
            blocks: Mutex::new(blocks),
            contract_fee: AtomicU64::new(contract_fee),
            max_fee_per_gas: AtomicU64::new(max_fee_per_gas),
            max_priority_fee_per_gas: AtomicU64::new(max_priority_fee_per_gas),
            system_contract_inactive: AtomicBool::new(false),
        }
    }

    pub fn mark_system_contract_inactive(&self) {
        self.system_contract_inactive.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainStateReader for FakeChain {
    async fn fetch_block_number(&self) -> Result<u64, ChainError> {
        let mut blocks = self.blocks.lock().unwrap();
        if blocks.len() > 1 {
            Ok(blocks.pop_front().unwrap())
        } else {
            Ok(*blocks.front().unwrap())
        }
    }

    async fn fetch_contract_fee(&self, _contract_address: Address) -> Result<U256, ChainError> {
        if self.system_contract_inactive.load(Ordering::SeqCst) {
            return Err(ChainError::SystemContractInactive);
        }
        Ok(U256::from(self.contract_fee.load(Ordering::SeqCst)))
    }

    async fn fetch_max_network_fees(&self) -> Result<NetworkFees, ChainError> {
        Ok(NetworkFees {
            max_fee_per_gas: self.max_fee_per_gas.load(Ordering::SeqCst) as u128,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas.load(Ordering::SeqCst) as u128,
        })
    }
}

/// What a scripted [`FakeSigner`] call should fail with. Constructed fresh
/// per call since [`SignerError`] isn't `Clone`.
#[derive(Clone)]
pub enum ScriptedError {
    Rejected(String),
    InsufficientFunds,
}

fn build_error(address: Address, scripted: &ScriptedError) -> SignerError {
    match scripted {
        ScriptedError::Rejected(message) => SignerError::Rejected(message.clone()),
        ScriptedError::InsufficientFunds => SignerError::InsufficientFunds(address),
    }
}

/// One transaction a [`FakeSigner`] was asked to send, recorded for
/// assertions.
#[derive(Debug, Clone)]
pub struct SentTx {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub nonce: u64,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

/// A [`Signer`] that assigns nonces from an internal counter, records every
/// intent it was asked to sign, and can be scripted to fail a specific
/// pubkey's initial send or a specific nonce's replacement send exactly
/// once.
pub struct FakeSigner {
    address: Address,
    capabilities: SignerCapabilities,
    next_nonce: AtomicU64,
    generation: AtomicU64,
    send_errors: Mutex<HashMap<[u8; 48], ScriptedError>>,
    replace_errors: Mutex<HashMap<u64, ScriptedError>>,
    sent: Mutex<Vec<SentTx>>,
}

impl FakeSigner {
    pub fn new(address: Address, starting_nonce: u64, capabilities: SignerCapabilities) -> Self {
        Self {
            address,
            capabilities,
            next_nonce: AtomicU64::new(starting_nonce),
            generation: AtomicU64::new(0),
            send_errors: Mutex::new(HashMap::new()),
            replace_errors: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_send(&self, owning_pubkey: OwningPubkey, error: ScriptedError) {
        self.send_errors
            .lock()
            .unwrap()
            .insert(*owning_pubkey.as_bytes(), error);
    }

    pub fn fail_replacement(&self, nonce: u64, error: ScriptedError) {
        self.replace_errors.lock().unwrap().insert(nonce, error);
    }

    pub fn sent_transactions(&self) -> Vec<SentTx> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, intent: &TransactionIntent, nonce: u64) -> TxHash {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(SentTx {
            to: intent.to,
            data: intent.data.clone(),
            value: intent.value,
            nonce,
            max_fee_per_gas: intent.max_fee_per_gas,
            max_priority_fee_per_gas: intent.max_priority_fee_per_gas,
        });
        fake_hash(nonce, generation)
    }
}

#[async_trait]
impl Signer for FakeSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn capabilities(&self) -> SignerCapabilities {
        self.capabilities
    }

    async fn send(
        &self,
        intent: &TransactionIntent,
        context: SigningContext,
    ) -> Result<SendResponse, SignerError> {
        let scripted = self
            .send_errors
            .lock()
            .unwrap()
            .remove(context.owning_pubkey.as_bytes());
        if let Some(error) = scripted {
            return Err(build_error(self.address, &error));
        }
        let nonce = self.next_nonce.fetch_add(1, Ordering::SeqCst);
        let hash = self.record(intent, nonce);
        Ok(SendResponse { hash, nonce })
    }

    async fn send_with_nonce(
        &self,
        intent: &TransactionIntent,
        nonce: u64,
        _context: SigningContext,
    ) -> Result<SendResponse, SignerError> {
        let scripted = self.replace_errors.lock().unwrap().remove(&nonce);
        if let Some(error) = scripted {
            return Err(build_error(self.address, &error));
        }
        let hash = self.record(intent, nonce);
        Ok(SendResponse { hash, nonce })
    }

    async fn dispose(&self) {}
}

/// A [`ReceiptObserver`] with a default status for any hash it hasn't been
/// told about, plus explicit per-hash overrides. Letting unscripted hashes
/// fall back to a default (rather than requiring every generated hash be
/// pre-registered) is what makes it practical to script a replacement's
/// outcome without predicting the exact hash the replacement will get.
pub struct FakeReceiptObserver {
    default: TransactionStatus,
    overrides: Mutex<HashMap<TxHash, TransactionStatus>>,
}

impl FakeReceiptObserver {
    pub fn new(default: TransactionStatus) -> Self {
        Self {
            default,
            overrides: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_status(&self, hash: TxHash, status: TransactionStatus) {
        self.overrides.lock().unwrap().insert(hash, status);
    }

    fn status_for(&self, hash: TxHash) -> TransactionStatus {
        self.overrides
            .lock()
            .unwrap()
            .get(&hash)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

#[async_trait]
impl ReceiptObserver for FakeReceiptObserver {
    async fn wait_for_receipts(
        &self,
        pending: &[execreq_pipeline::types::PendingTransaction],
    ) -> Vec<ReceiptCheck> {
        pending
            .iter()
            .map(|tx| ReceiptCheck {
                pending: tx.clone(),
                status: self.status_for(tx.hash),
            })
            .collect()
    }

    async fn status(
        &self,
        hash: TxHash,
        _signer_address: Option<Address>,
        _nonce: Option<u64>,
    ) -> TransactionStatus {
        self.status_for(hash)
    }
}

pub fn parallel_capabilities() -> SignerCapabilities {
    SignerCapabilities {
        supports_parallel_signing: true,
        requires_user_interaction: false,
    }
}
