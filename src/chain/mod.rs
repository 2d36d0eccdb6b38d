//! Reading chain state: current block, the system contract's dynamic fee,
//! and prevailing network gas fees.

pub mod slot_clock;

use alloy_primitives::{Address, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::BlockId;
use alloy_transport::TransportError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::instrument;
use url::Url;

use crate::errors::ChainError;

/// The excess-inhibitor sentinel: storage slot 0 reads this when the
/// system contract has not yet been activated for the current block.
pub const EXCESS_INHIBITOR: U256 = U256::MAX;

const MIN_FEE: u128 = 1;
const FEE_UPDATE_FRACTION: u128 = 17;

const NETWORK_FEE_RETRIES: u32 = 5;
const NETWORK_FEE_RETRY_SPACING: Duration = Duration::from_millis(100);

/// Current max and priority fee-per-gas the network is charging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkFees {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Reads the pieces of chain state the pipeline needs each batch: the
/// current block number, the system contract's required fee, and
/// prevailing network gas fees.
#[async_trait]
pub trait ChainStateReader: Send + Sync {
    async fn fetch_block_number(&self) -> Result<u64, ChainError>;

    /// Computes the required `value` for a transaction against
    /// `contract_address`, per the EIP-7251 excess-fee recurrence.
    async fn fetch_contract_fee(&self, contract_address: Address) -> Result<U256, ChainError>;

    async fn fetch_max_network_fees(&self) -> Result<NetworkFees, ChainError>;
}

/// Computes the fee owed from the system contract's raw excess value.
///
/// `fee = (sum of t_i) / U` where `t_0 = MIN_FEE * U`, `t_{i+1} = t_i * q /
/// (U * (i+1))`, summed until a term truncates to zero. Mirrors the
/// `fake_exponential` shape used for EIP-4844 blob fees, parameterized for
/// the system contract's excess-queue constants.
pub fn fee_for_excess(excess: U256) -> U256 {
    if excess == EXCESS_INHIBITOR {
        // Callers must check for the inhibitor sentinel before calling this;
        // treated here as excess=0 only as a defensive fallback.
        return U256::from(MIN_FEE);
    }
    let q: u128 = excess.try_into().unwrap_or(u128::MAX);
    let mut total: u128 = 0;
    let mut t: u128 = MIN_FEE * FEE_UPDATE_FRACTION;
    let mut i: u128 = 1;
    loop {
        total = total.saturating_add(t);
        t = t.saturating_mul(q) / (FEE_UPDATE_FRACTION * i);
        if t == 0 {
            break;
        }
        i += 1;
    }
    U256::from(total / FEE_UPDATE_FRACTION)
}

/// A [`ChainStateReader`] backed by a single JSON-RPC HTTP endpoint.
pub struct JsonRpcChainStateReader {
    provider: RootProvider,
}

impl JsonRpcChainStateReader {
    pub fn new(rpc_url: Url) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc_url);
        Self { provider }
    }
}

#[async_trait]
impl ChainStateReader for JsonRpcChainStateReader {
    #[instrument(skip_all, err)]
    async fn fetch_block_number(&self) -> Result<u64, ChainError> {
        self.provider
            .get_block_number()
            .await
            .map_err(ChainError::ChainUnavailable)
    }

    #[instrument(skip_all, err, fields(%contract_address))]
    async fn fetch_contract_fee(&self, contract_address: Address) -> Result<U256, ChainError> {
        let excess = self
            .provider
            .get_storage_at(contract_address, U256::ZERO)
            .block_id(BlockId::latest())
            .await
            .map_err(ChainError::ChainUnavailable)?;
        if excess == EXCESS_INHIBITOR {
            return Err(ChainError::SystemContractInactive);
        }
        Ok(fee_for_excess(excess))
    }

    #[instrument(skip_all, err)]
    async fn fetch_max_network_fees(&self) -> Result<NetworkFees, ChainError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result: Result<_, TransportError> = self.provider.estimate_eip1559_fees().await;
            match result {
                Ok(estimate) => {
                    return Ok(NetworkFees {
                        max_fee_per_gas: estimate.max_fee_per_gas,
                        max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
                    });
                }
                Err(err) if attempt >= NETWORK_FEE_RETRIES => {
                    tracing::warn!(
                        %err,
                        attempt,
                        "network fee estimate unavailable after retry budget"
                    );
                    return Err(ChainError::NetworkFeesUnavailable);
                }
                Err(err) => {
                    tracing::debug!(%err, attempt, "network fee estimate failed, retrying");
                    tokio::time::sleep(NETWORK_FEE_RETRY_SPACING).await;
                }
            }
        }
    }
}
