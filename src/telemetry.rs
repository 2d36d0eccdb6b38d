//! Logging bootstrap. A one-shot batch run has no collector worth shipping
//! spans to, so this keeps only a local-logging path: a `fmt` layer plus
//! an `EnvFilter` read from `RUST_LOG`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global `tracing` subscriber. Call once, near the top of `main`.
///
/// Defaults to `info` level when `RUST_LOG` is unset.
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();
}
