// ── Telemetry ──────────────────────────────────────────────────────────────
//
// Optional console subscriber for hosts that do not install their own.
// `RUST_LOG` wins over the default directive; `log` records are bridged
// into the same subscriber.

use crate::atoms::error::{EngineError, EngineResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a fmt subscriber filtered by `RUST_LOG` (or `default_directive`).
///
/// Errors if a global subscriber is already set.
pub fn init_tracing(default_directive: &str) -> EngineResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| EngineError::Config(format!("tracing subscriber: {}", e)))?;

    tracing::info!(filter = %default_directive, "context engine tracing initialized");
    Ok(())
}
