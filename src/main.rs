//! Demonstration CLI entrypoint.
//!
//! This binary is a thin harness around the pipeline library: it loads
//! config, reads a file of newline-separated hex request payloads, wires up
//! a signer and chain reader, and runs the batch orchestrator to completion.
//! A real operator CLI (pubkey selection, per-command request encoding,
//! hardware-wallet prompting) lives outside this crate.

use alloy_primitives::Bytes;
use alloy_signer_local::PrivateKeySigner;
use clap::Parser;
use std::process;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use execreq_pipeline::broadcast::parallel::ParallelBroadcastStrategy;
use execreq_pipeline::broadcast::sequential::SequentialBroadcastStrategy;
use execreq_pipeline::broadcast::BroadcastStrategy;
use execreq_pipeline::chain::slot_clock::SlotClock;
use execreq_pipeline::chain::{ChainStateReader, JsonRpcChainStateReader};
use execreq_pipeline::config::{CliArgs, Config, SignerConfig};
use execreq_pipeline::monitor::{ReceiptObserver, TransactionMonitor};
use execreq_pipeline::orchestrator::BatchOrchestrator;
use execreq_pipeline::replace::ReplacementEngine;
use execreq_pipeline::signer::hardware::HardwareSigner;
use execreq_pipeline::signer::local::LocalKeySigner;
use execreq_pipeline::signer::Signer;
use execreq_pipeline::types::Request;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    execreq_pipeline::telemetry::init();

    if let Err(err) = run().await {
        tracing::error!(%err, "pipeline run failed");
        eprintln!("{err}");
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config = Config::load(&args.config)?;
    let requests = load_requests(&args.requests, config.request_kind)?;

    let rpc_url = config.rpc_url.clone().into_inner();
    let contract_address = config.contract_address();
    let receipt_timeout = Duration::from_secs(config.receipt_poll_timeout_secs);

    let chain: Arc<dyn ChainStateReader> =
        Arc::new(JsonRpcChainStateReader::new(rpc_url.clone()));
    let monitor: Arc<dyn ReceiptObserver> =
        Arc::new(TransactionMonitor::new(rpc_url.clone(), receipt_timeout));

    let signer: Arc<dyn Signer> = build_signer(&config, rpc_url.clone()).await?;

    let broadcast: Arc<dyn BroadcastStrategy> = if signer.capabilities().supports_parallel_signing
    {
        Arc::new(ParallelBroadcastStrategy::new(signer.clone()))
    } else {
        let beacon_url = config
            .beacon_url
            .clone()
            .ok_or("beacon_url is required for an interactive (sequential) signer")?
            .into_inner();
        let http = reqwest::Client::new();
        let slot_clock = Arc::new(SlotClock::fetch(&beacon_url, &http).await?);
        Arc::new(SequentialBroadcastStrategy::new(
            signer.clone(),
            chain.clone(),
            slot_clock,
            contract_address,
        ))
    };

    let replace = ReplacementEngine::new(signer.clone(), monitor.clone());
    let orchestrator = BatchOrchestrator::new(contract_address, chain, broadcast, monitor, replace);

    tracing::info!(count = requests.len(), batch_size = config.batch_size, "starting run");
    let report = orchestrator.run(requests, config.batch_size).await;
    signer.dispose().await;

    tracing::info!(
        mined = report.mined.len(),
        failed = report.failed.len(),
        "run complete"
    );
    for failed in &report.failed {
        println!("{} {:?}", failed.owning_pubkey, failed.reason);
    }

    Ok(())
}

async fn build_signer(
    config: &Config,
    rpc_url: url::Url,
) -> Result<Arc<dyn Signer>, Box<dyn std::error::Error>> {
    match &config.signer {
        SignerConfig::LocalKey { private_key_env } => {
            let raw = std::env::var(private_key_env)
                .map_err(|_| format!("{private_key_env} is not set"))?;
            let key = PrivateKeySigner::from_str(&raw)?;
            Ok(Arc::new(LocalKeySigner::new(key, rpc_url)))
        }
        SignerConfig::Hardware { device } => {
            // The device transport itself is out of scope here; this
            // stands in with a plain key, per the open question in DESIGN.md.
            let key = PrivateKeySigner::from_str(device)?;
            let signer = HardwareSigner::connect(key, rpc_url).await?;
            Ok(Arc::new(signer))
        }
    }
}

/// Parses a file of newline-separated hex request payloads (optional `0x`
/// prefix, blank lines skipped) into validated [`Request`]s.
fn load_requests(
    path: &std::path::Path,
    kind: execreq_pipeline::types::RequestKind,
) -> Result<Vec<Request>, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let mut requests = Vec::new();
    for (line_number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let hex_str = line.strip_prefix("0x").unwrap_or(line);
        let bytes = hex::decode(hex_str)
            .map_err(|e| format!("line {}: invalid hex: {e}", line_number + 1))?;
        let request = Request::validated(Bytes::from(bytes), kind)
            .map_err(|e| format!("line {}: {e}", line_number + 1))?;
        requests.push(request);
    }
    Ok(requests)
}
