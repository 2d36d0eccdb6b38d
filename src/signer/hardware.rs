//! Hardware signer: a serial device that requires user interaction per
//! transaction and cannot sign concurrently. A single mutex serializes every
//! send so concurrent callers queue behind one device instead of racing it.
//!
//! The device transport itself is out of scope here — see the open
//! question recorded in `DESIGN.md`. [`HardwareSigner`] implements the
//! serialization and nonce discipline a real device integration needs;
//! callers swap in their own transport behind the same [`Signer`] trait.

use alloy_network::EthereumWallet;
use alloy_primitives::Address;
use alloy_provider::fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, WalletFiller};
use alloy_provider::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::TransportError;
use async_trait::async_trait;
use tokio::sync::Mutex;
use url::Url;

use crate::errors::SignerError;
use crate::signer::{SendResponse, Signer, SignerCapabilities, SigningContext};
use crate::types::TransactionIntent;

type InnerFiller = JoinFill<GasFiller, JoinFill<BlobGasFiller, ChainIdFiller>>;

type InnerProvider =
    FillProvider<JoinFill<JoinFill<Identity, InnerFiller>, WalletFiller<EthereumWallet>>, RootProvider>;

pub struct HardwareSigner {
    address: Address,
    inner: InnerProvider,
    /// Next nonce to use on a fresh `send`. Only advanced after a send
    /// the device actually broadcast; `send_with_nonce` never touches it.
    next_nonce: Mutex<u64>,
}

impl HardwareSigner {
    /// Fetches the device's current on-chain nonce and builds a signer
    /// around it. `device` stands in for a private key in this
    /// implementation; see the module doc comment.
    pub async fn connect(device: PrivateKeySigner, rpc_url: Url) -> Result<Self, SignerError> {
        let address = device.address();
        let wallet = EthereumWallet::from(device);
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(BlobGasFiller::default(), ChainIdFiller::default()),
        );
        let inner: InnerProvider = ProviderBuilder::new()
            .filler(filler)
            .wallet(wallet)
            .connect_http(rpc_url);
        let initial_nonce = inner
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(SignerError::Transport)?;
        Ok(Self {
            address,
            inner,
            next_nonce: Mutex::new(initial_nonce),
        })
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

    fn classify_send_error(&self, err: TransportError) -> SignerError {
        let message = err.to_string();
        if message.to_lowercase().contains("insufficient funds") {
            return SignerError::InsufficientFunds(self.address);
        }
        SignerError::Transport(err)
    }

    fn prompt(context: SigningContext) {
        tracing::info!(
            index = context.current_index,
            total = context.total_count,
            owning_pubkey = %context.owning_pubkey,
            "confirm on device to sign this request"
        );
    }
}

#[async_trait]
impl Signer for HardwareSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn capabilities(&self) -> SignerCapabilities {
        SignerCapabilities {
            supports_parallel_signing: false,
            requires_user_interaction: true,
        }
    }

    async fn send(
        &self,
        intent: &TransactionIntent,
        context: SigningContext,
    ) -> Result<SendResponse, SignerError> {
        Self::prompt(context);
        let mut next_nonce = self.next_nonce.lock().await;
        let nonce = *next_nonce;
        let txr = self.build_request(intent, nonce);
        let pending = self
            .inner
            .send_transaction(txr)
            .await
            .map_err(|err| self.classify_send_error(err))?;
        *next_nonce = nonce + 1;
        Ok(SendResponse {
            hash: *pending.tx_hash(),
            nonce,
        })
    }

    async fn send_with_nonce(
        &self,
        intent: &TransactionIntent,
        nonce: u64,
        context: SigningContext,
    ) -> Result<SendResponse, SignerError> {
        Self::prompt(context);
        // Serializes against concurrent `send`/`send_with_nonce` calls
        // without touching the counter the caller explicitly bypassed.
        let _guard = self.next_nonce.lock().await;
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

    async fn dispose(&self) {
        tracing::debug!(address = %self.address, "releasing hardware device handle");
    }
}
