//! Local private-key signer: supports parallel signing, holds its nonce
//! counter in memory, never prompts a user.

use alloy_network::EthereumWallet;
use alloy_primitives::Address;
use alloy_provider::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceManager, WalletFiller,
};
use alloy_provider::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::TransportResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

use crate::errors::SignerError;
use crate::signer::{SendResponse, Signer, SignerCapabilities, SigningContext};
use crate::types::TransactionIntent;

type InnerFiller = JoinFill<GasFiller, JoinFill<BlobGasFiller, ChainIdFiller>>;

type InnerProvider =
    FillProvider<JoinFill<JoinFill<Identity, InnerFiller>, WalletFiller<EthereumWallet>>, RootProvider>;

/// A nonce manager that caches nonces locally and bootstraps from
/// `.pending()` so a restart with transactions still in the mempool
/// doesn't produce a "nonce too low" error.
#[derive(Clone, Debug, Default)]
struct PendingNonceManager {
    nonces: Arc<DashMap<Address, Arc<Mutex<u64>>>>,
}

const NONE: u64 = u64::MAX;

#[async_trait]
impl NonceManager for PendingNonceManager {
    async fn get_next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: alloy_network::Network,
    {
        let nonce = {
            let entry = self
                .nonces
                .entry(address)
                .or_insert_with(|| Arc::new(Mutex::new(NONE)));
            Arc::clone(entry.value())
        };
        let mut nonce = nonce.lock().await;
        let new_nonce = if *nonce == NONE {
            tracing::trace!(%address, "fetching initial nonce");
            provider.get_transaction_count(address).pending().await?
        } else {
            *nonce + 1
        };
        *nonce = new_nonce;
        Ok(new_nonce)
    }
}

impl PendingNonceManager {
    async fn reset(&self, address: Address) {
        if let Some(lock) = self.nonces.get(&address) {
            let mut nonce = lock.lock().await;
            *nonce = NONE;
            tracing::debug!(%address, "reset nonce cache after failed send");
        }
    }
}

/// Signs and broadcasts with a single in-process private key.
pub struct LocalKeySigner {
    address: Address,
    inner: InnerProvider,
    nonce_manager: PendingNonceManager,
}

impl LocalKeySigner {
    pub fn new(private_key: PrivateKeySigner, rpc_url: Url) -> Self {
        let address = private_key.address();
        let wallet = EthereumWallet::from(private_key);
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(BlobGasFiller::default(), ChainIdFiller::default()),
        );
        let inner: InnerProvider = ProviderBuilder::new()
            .filler(filler)
            .wallet(wallet)
            .connect_http(rpc_url);
        Self {
            address,
            inner,
            nonce_manager: PendingNonceManager::default(),
        }
    }

    fn build_request(&self, intent: &TransactionIntent, nonce: u64) -> TransactionRequest {
        let mut txr = TransactionRequest::default()
            .with_from(self.address)
            .with_to(intent.to)
            .with_input(intent.data.clone())
            .with_value(intent.value)
            .with_gas_limit(intent.gas_limit)
            .with_nonce(nonce);
        if let (Some(max_fee), Some(max_priority_fee)) =
            (intent.max_fee_per_gas, intent.max_priority_fee_per_gas)
        {
            txr = txr
                .max_fee_per_gas(max_fee)
                .max_priority_fee_per_gas(max_priority_fee);
        }
        txr
    }

    fn classify_send_error(&self, err: alloy_transport::TransportError) -> SignerError {
        let message = err.to_string();
        if message.to_lowercase().contains("insufficient funds") {
            return SignerError::InsufficientFunds(self.address);
        }
        SignerError::Transport(err)
    }
}

#[async_trait]
impl Signer for LocalKeySigner {
    fn address(&self) -> Address {
        self.address
    }

    fn capabilities(&self) -> SignerCapabilities {
        SignerCapabilities {
            supports_parallel_signing: true,
            requires_user_interaction: false,
        }
    }

    async fn send(
        &self,
        intent: &TransactionIntent,
        _context: SigningContext,
    ) -> Result<SendResponse, SignerError> {
        let nonce = NonceManager::get_next_nonce(&self.nonce_manager, &self.inner, self.address)
            .await
            .map_err(SignerError::Transport)?;
        let txr = self.build_request(intent, nonce);
        match self.inner.send_transaction(txr).await {
            Ok(pending) => Ok(SendResponse {
                hash: *pending.tx_hash(),
                nonce,
            }),
            Err(err) => {
                self.nonce_manager.reset(self.address).await;
                Err(self.classify_send_error(err))
            }
        }
    }

    async fn send_with_nonce(
        &self,
        intent: &TransactionIntent,
        nonce: u64,
        _context: SigningContext,
    ) -> Result<SendResponse, SignerError> {
        let txr = self.build_request(intent, nonce);
        let pending = self
            .inner
            .send_transaction(txr)
            .await
            .map_err(|err| self.classify_send_error(err))?;
        Ok(SendResponse {
            hash: *pending.tx_hash(),
            nonce,
        })
    }

    async fn dispose(&self) {}
}
