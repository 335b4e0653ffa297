//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - Resolve the log level from `RUST_LOG`, falling back to config

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter for a configured level: our crate at `level`, dependencies quieter.
pub fn default_filter(level: &str) -> String {
    let level = level.to_ascii_lowercase();
    format!("metrics_collector={level},metrics_server={level},tower_http=warn,warn")
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level).into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
