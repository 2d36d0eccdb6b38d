//! Broadcasting a batch's transaction intents: fire concurrently (parallel
//! signer) or one at a time with fresh fee snapshots (interactive signer).

pub mod parallel;
pub mod sequential;

use async_trait::async_trait;

use crate::types::{BroadcastOutcome, OwningPubkey, TransactionIntent};

/// One request's intent, paired with the pubkey it's reported against on
/// failure.
#[derive(Debug, Clone)]
pub struct BroadcastItem {
    pub intent: TransactionIntent,
    pub owning_pubkey: OwningPubkey,
}

/// Broadcasts a batch of intents and returns exactly one outcome per input
/// item, in no particular order.
#[async_trait]
pub trait BroadcastStrategy: Send + Sync {
    async fn broadcast(
        &self,
        items: Vec<BroadcastItem>,
        block_number: u64,
    ) -> Vec<BroadcastOutcome>;
}

pub(crate) fn pending_from_response(
    item: &BroadcastItem,
    response: crate::signer::SendResponse,
    signer_address: alloy_primitives::Address,
    block_number: u64,
) -> crate::types::PendingTransaction {
    crate::types::PendingTransaction {
        hash: response.hash,
        nonce: response.nonce,
        signer_address,
        owning_pubkey: item.owning_pubkey,
        contract_address: item.intent.to,
        request_data: item.intent.data.clone(),
        broadcast_block_number: block_number,
        max_fee_per_gas: item.intent.max_fee_per_gas.unwrap_or(0),
        max_priority_fee_per_gas: item.intent.max_priority_fee_per_gas.unwrap_or(0),
    }
}
