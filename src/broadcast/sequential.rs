//! Broadcasts one intent at a time, re-fetching the contract fee and
//! blocking on the slot clock's optimal window before each send. Used for
//! interactive (hardware) signers, where a human confirmation can take
//! long enough for the contract fee to go stale.

use async_trait::async_trait;
use std::sync::Arc;

use crate::broadcast::{pending_from_response, BroadcastItem, BroadcastStrategy};
use crate::chain::slot_clock::SlotClock;
use crate::chain::ChainStateReader;
use crate::signer::{Signer, SigningContext};
use crate::types::BroadcastOutcome;

pub struct SequentialBroadcastStrategy {
    signer: Arc<dyn Signer>,
    chain: Arc<dyn ChainStateReader>,
    slot_clock: Arc<SlotClock>,
    contract_address: alloy_primitives::Address,
}

impl SequentialBroadcastStrategy {
    pub fn new(
        signer: Arc<dyn Signer>,
        chain: Arc<dyn ChainStateReader>,
        slot_clock: Arc<SlotClock>,
        contract_address: alloy_primitives::Address,
    ) -> Self {
        Self {
            signer,
            chain,
            slot_clock,
            contract_address,
        }
    }
}

#[async_trait]
impl BroadcastStrategy for SequentialBroadcastStrategy {
    async fn broadcast(
        &self,
        items: Vec<BroadcastItem>,
        block_number: u64,
    ) -> Vec<BroadcastOutcome> {
        let total_count = items.len();
        let mut outcomes = Vec::with_capacity(total_count);
        for (index, mut item) in items.into_iter().enumerate() {
            self.slot_clock.wait_for_optimal_window().await;

            match self.chain.fetch_contract_fee(self.contract_address).await {
                Ok(fee) => item.intent = item.intent.revalued(fee),
                Err(error) => {
                    outcomes.push(BroadcastOutcome::Failed {
                        owning_pubkey: item.owning_pubkey,
                        error: error.into(),
                    });
                    continue;
                }
            }

            let context = SigningContext {
                current_index: index,
                total_count,
                owning_pubkey: item.owning_pubkey,
            };
            match self.signer.send(&item.intent, context).await {
                Ok(response) => outcomes.push(BroadcastOutcome::Success(pending_from_response(
                    &item,
                    response,
                    self.signer.address(),
                    block_number,
                ))),
                Err(error) => outcomes.push(BroadcastOutcome::Failed {
                    owning_pubkey: item.owning_pubkey,
                    error: error.into(),
                }),
            }
        }
        outcomes
    }
}
