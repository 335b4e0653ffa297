//! Startup orchestration.
//!
//! # Responsibilities
//! - Start the optional metrics exporter
//! - Open the storage backend (restoring a snapshot if configured)
//! - Bind the listener and serve until a stop signal
//! - Drain, then close storage for a final flush
//!
//! Logging is initialized by the caller before this runs so that startup
//! failures are reported through the same subscriber.

use std::future::Future;
use std::net::{AddrParseError, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{ConfigError, ServerConfig};
use crate::http::HttpServer;
use crate::lifecycle::signals::shutdown_signal;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::storage::{self, StorageError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid metrics address: {0}")]
    MetricsAddress(#[from] AddrParseError),
    #[error("cannot start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Run the server until SIGINT/SIGTERM.
pub async fn run(config: ServerConfig) -> Result<(), StartupError> {
    run_until(config, shutdown_signal()).await
}

/// Run the server until `signal` resolves.
pub async fn run_until<F>(config: ServerConfig, signal: F) -> Result<(), StartupError>
where
    F: Future<Output = ()>,
{
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    let storage = storage::open(&config.storage, &shutdown).await?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        backend = ?config.storage.backend,
        max_body_size = config.limits.max_body_size,
        request_timeout_secs = config.limits.request_timeout_secs,
        "Listening for connections"
    );

    let server = HttpServer::new(config, storage.clone());
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let served = tokio::select! {
        res = &mut server_task => Some(res),
        _ = signal => None,
    };
    shutdown.trigger();
    let result = match served {
        Some(res) => res,
        None => server_task.await,
    };

    // Flush even if the server failed, then report the first error.
    let closed = storage.close().await;
    result??;
    closed?;

    tracing::info!("Shutdown complete");
    Ok(())
}
