#![forbid(unsafe_code)]

//! JSON log output for production deployments (feature `tracing-json`).

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install a global subscriber writing one JSON object per event to stdout.
///
/// `RUST_LOG` wins over `filter` when set.
///
/// # Errors
///
/// A global subscriber is already installed.
pub fn init_json_logging(filter: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_current_span(true).with_target(true))
        .try_init()
}
