//! Metrics ingestion server.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────┐
//!                        │                   METRICS SERVER                     │
//!                        │                                                      │
//!   POST /update/...     │  ┌────────────┐   ┌────────────┐   ┌─────────────┐  │
//!   ─────────────────────┼─▶│ decompress │──▶│  compress  │──▶│   logger    │  │
//!                        │  └────────────┘   └────────────┘   └──────┬──────┘  │
//!                        │                                           │         │
//!                        │                                           ▼         │
//!   GET /value/...       │                                    ┌─────────────┐  │
//!   ◀────────────────────┼────────────────────────────────────│  handlers   │  │
//!                        │                                    └──────┬──────┘  │
//!                        │                                           ▼         │
//!                        │                          ┌──────────────────────┐   │
//!                        │                          │  Storage (trait)     │   │
//!                        │                          │  memory │ file       │   │
//!                        │                          └──────────────────────┘   │
//!                        └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;

use metrics_collector::config::ServerArgs;
use metrics_collector::lifecycle;
use metrics_collector::observability::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ServerArgs::parse();
    let config = args.resolve()?;

    logging::init_tracing(&config.observability.log_level)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "metrics-server starting");

    if let Err(e) = lifecycle::run(config).await {
        tracing::error!(error = %e, "Server terminated with an error");
        return Err(e.into());
    }
    Ok(())
}
