//! Configuration loading: CLI args layered over a JSON config file, with
//! `$VAR`/`${VAR}` environment-variable indirection for secret-bearing
//! fields. A small `clap::Parser` struct locates the file, `serde`
//! deserializes it, defaults fill in anything fixed rather than exposed
//! (batch size bounds, retry knobs are *not* here — those are
//! crate-internal constants, see [`crate::orchestrator`]).

use alloy_primitives::Address;
use clap::Parser;
use serde::Deserialize;
use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

use crate::types::RequestKind;

/// CLI arguments: just enough to locate the config file. Encoding requests
/// from validator pubkeys and a command intent is an operator-side
/// concern — this crate's own binary is a thin demonstration harness, not
/// the operator-facing CLI.
#[derive(Parser, Debug)]
#[command(name = "execreq-pipeline")]
#[command(about = "Batches and broadcasts EIP-7002/EIP-7251 validator requests")]
pub struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Path to a file of newline-separated hex-encoded request payloads.
    /// This flag exists only so the demonstration binary has something to
    /// feed the pipeline.
    #[arg(long, short)]
    pub requests: PathBuf,
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Execution-layer JSON-RPC endpoint.
    pub rpc_url: LiteralOrEnv<Url>,
    /// Beacon-chain HTTP endpoint. Required only by the sequential
    /// broadcast strategy (interactive signers).
    #[serde(default)]
    pub beacon_url: Option<LiteralOrEnv<Url>>,
    /// Which system contract these requests target. Selects the fixed
    /// mainnet address unless `contract_address` overrides it.
    pub request_kind: RequestKind,
    /// Override for the system-contract address (testnets with
    /// non-canonical deployments). Defaults to the fixed mainnet address
    /// for `request_kind`.
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// Requests per batch; must be in 1..=220.
    pub batch_size: u16,
    /// Receipt poll timeout, in seconds. Must exceed one block time.
    #[serde(default = "config_defaults::default_receipt_poll_timeout_secs")]
    pub receipt_poll_timeout_secs: u64,
    /// Signer configuration.
    pub signer: SignerConfig,
}

impl Config {
    /// Resolved system-contract address for this config.
    pub fn contract_address(&self) -> Address {
        self.contract_address
            .unwrap_or_else(|| fixed_contract_address(self.request_kind))
    }

    /// Load from a JSON file at `path`.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e.to_string()))?;
        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        if !(1..=220).contains(&config.batch_size) {
            return Err(ConfigError::InvalidBatchSize(config.batch_size));
        }
        Ok(config)
    }
}

/// The fixed mainnet system-contract addresses for each request kind.
pub fn fixed_contract_address(kind: RequestKind) -> Address {
    match kind {
        RequestKind::Consolidation => {
            address_from_str("0x0000BBdDc7CE488642fb579F8B00f3a590007251")
        }
        RequestKind::Withdrawal => address_from_str("0x00000961Ef480Eb55e80D19ad83579A64c007002"),
    }
}

fn address_from_str(s: &str) -> Address {
    Address::from_str(s).expect("fixed contract address literal is well-formed")
}

mod config_defaults {
    /// 30s comfortably exceeds one 12s slot on every supported network.
    pub fn default_receipt_poll_timeout_secs() -> u64 {
        30
    }
}

/// How the pipeline should sign and broadcast transactions.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignerConfig {
    /// A local private key, read from the named environment variable.
    /// Supports parallel signing.
    LocalKey { private_key_env: String },
    /// A serial hardware device. Requires user interaction and signs one
    /// transaction at a time.
    Hardware { device: String },
}

/// A transparent wrapper that resolves `$VAR`/`${VAR}` environment-variable
/// syntax during deserialization, so secrets never have to live in the
/// config file itself. Literal values (no `$` prefix) pass through as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn into_inner(self) -> T {
        self.0
    }

    fn parse_env_var_syntax(s: &str) -> Option<&str> {
        if let Some(inner) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
            Some(inner)
        } else if let Some(inner) = s.strip_prefix('$') {
            if !inner.is_empty() && inner.chars().all(|c| c.is_alphanumeric() || c == '_') {
                Some(inner)
            } else {
                None
            }
        } else {
            None
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let resolved = match Self::parse_env_var_syntax(&raw) {
            Some(var_name) => std::env::var(var_name).map_err(|_| {
                serde::de::Error::custom(format!("environment variable {var_name} is not set"))
            })?,
            None => raw,
        };
        let value = T::from_str(&resolved).map_err(serde::de::Error::custom)?;
        Ok(Self(value))
    }
}

/// Errors loading or validating a [`Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0:?}: {1}")]
    Read(PathBuf, String),
    #[error("failed to parse config file {0:?}: {1}")]
    Parse(PathBuf, String),
    #[error("batch_size must be in 1..=220, got {0}")]
    InvalidBatchSize(u16),
}

impl<'de> Deserialize<'de> for RequestKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "consolidation" => Ok(RequestKind::Consolidation),
            "withdrawal" => Ok(RequestKind::Withdrawal),
            other => Err(serde::de::Error::custom(format!(
                "unknown request_kind {other:?}, expected \"consolidation\" or \"withdrawal\""
            ))),
        }
    }
}
