//! Beacon-chain slot timing, used by the sequential broadcast strategy to
//! avoid sending a transaction that straddles a slot boundary (and with it,
//! a possible fee-regime change).

use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

const SECONDS_PER_SLOT: u64 = 12;
const OPTIMAL_WINDOW_THRESHOLD_SECS: u64 = 10;
const BOUNDARY_CROSS_BUFFER: Duration = Duration::from_millis(500);

/// Where we are within the current 12-second slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPosition {
    pub current_slot: u64,
    pub second_in_slot: u64,
    pub seconds_until_next_slot: u64,
}

/// Tracks beacon-chain slot boundaries from genesis time.
pub struct SlotClock {
    genesis_unix_time: u64,
}

impl SlotClock {
    /// Fetches the beacon genesis time once and builds a clock from it.
    pub async fn fetch(beacon_url: &Url, http: &reqwest::Client) -> Result<Self, SlotClockError> {
        let endpoint = beacon_url
            .join("eth/v1/beacon/genesis")
            .map_err(|e| SlotClockError::InvalidUrl(e.to_string()))?;
        let response = http
            .get(endpoint)
            .send()
            .await
            .map_err(|e| SlotClockError::Fetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| SlotClockError::Fetch(e.to_string()))?;
        let body: GenesisResponse = response
            .json()
            .await
            .map_err(|e| SlotClockError::Fetch(e.to_string()))?;
        let genesis_unix_time = body
            .data
            .genesis_time
            .parse()
            .map_err(|_| SlotClockError::Fetch("non-numeric genesis_time".into()))?;
        Ok(Self { genesis_unix_time })
    }

    /// Builds a clock directly from a known genesis time, skipping the HTTP
    /// round-trip (used in tests).
    pub fn from_genesis_time(genesis_unix_time: u64) -> Self {
        Self { genesis_unix_time }
    }

    /// Current position within the slot, computed from wall-clock time.
    pub fn position(&self) -> SlotPosition {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is after the unix epoch")
            .as_secs();
        self.position_at(now)
    }

    fn position_at(&self, now_unix_time: u64) -> SlotPosition {
        let elapsed = now_unix_time.saturating_sub(self.genesis_unix_time);
        let current_slot = elapsed / SECONDS_PER_SLOT;
        let second_in_slot = elapsed % SECONDS_PER_SLOT;
        let seconds_until_next_slot = SECONDS_PER_SLOT - second_in_slot;
        SlotPosition {
            current_slot,
            second_in_slot,
            seconds_until_next_slot,
        }
    }

    /// If we're in the last two seconds of a slot, sleeps past the boundary
    /// plus a small buffer before returning. Otherwise returns immediately.
    pub async fn wait_for_optimal_window(&self) {
        let position = self.position();
        if position.second_in_slot >= OPTIMAL_WINDOW_THRESHOLD_SECS {
            let sleep_duration = Duration::from_millis(position.seconds_until_next_slot * 1000)
                + BOUNDARY_CROSS_BUFFER;
            tracing::debug!(
                second_in_slot = position.second_in_slot,
                sleep_ms = sleep_duration.as_millis() as u64,
                "near slot boundary, sleeping past it"
            );
            tokio::time::sleep(sleep_duration).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenesisResponse {
    data: GenesisData,
}

#[derive(Debug, Deserialize)]
struct GenesisData {
    genesis_time: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SlotClockError {
    #[error("invalid beacon URL: {0}")]
    InvalidUrl(String),
    #[error("failed to fetch beacon genesis: {0}")]
    Fetch(String),
}
