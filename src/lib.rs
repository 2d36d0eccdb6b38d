//! Batches, broadcasts, and repairs EIP-7002 (withdrawal/exit) and EIP-7251
//! (consolidation/switch) execution-layer validator requests.
//!
//! The entrypoint is [`orchestrator::BatchOrchestrator::run`]: hand it a set
//! of pre-encoded [`types::Request`] payloads and a batch size, and it drives
//! broadcast, receipt monitoring, and fee-bumped replacement to completion,
//! returning a [`orchestrator::PipelineReport`] in which every input pubkey
//! is either mined or failed with a reason — never both, never neither.
//!
//! Everything upstream of this (CLI parsing, per-command request encoding,
//! beacon pre-flight validation, hardware-wallet prompting UI) is treated as
//! an external collaborator the pipeline never touches directly.

pub mod broadcast;
pub mod chain;
pub mod config;
pub mod errors;
pub mod monitor;
pub mod orchestrator;
pub mod replace;
pub mod signer;
pub mod telemetry;
pub mod types;
