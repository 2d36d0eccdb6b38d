//! Fires every intent in a batch concurrently at a single fee snapshot.

use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;

use crate::broadcast::{pending_from_response, BroadcastItem, BroadcastStrategy};
use crate::signer::{Signer, SigningContext};
use crate::types::BroadcastOutcome;

pub struct ParallelBroadcastStrategy {
    signer: Arc<dyn Signer>,
}

impl ParallelBroadcastStrategy {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl BroadcastStrategy for ParallelBroadcastStrategy {
    async fn broadcast(
        &self,
        items: Vec<BroadcastItem>,
        block_number: u64,
    ) -> Vec<BroadcastOutcome> {
        let total_count = items.len();
        let futures = items.iter().enumerate().map(|(index, item)| {
            let context: SigningContext = SigningContext {
                current_index: index,
                total_count,
                owning_pubkey: item.owning_pubkey,
            };
            async move {
                match self.signer.send(&item.intent, context).await {
                    Ok(response) => BroadcastOutcome::Success(pending_from_response(
                        item,
                        response,
                        self.signer.address(),
                        block_number,
                    )),
                    Err(error) => BroadcastOutcome::Failed {
                        owning_pubkey: item.owning_pubkey,
                        error: error.into(),
                    },
                }
            }
        });
        join_all(futures).await
    }
}
