//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up the middleware pipeline (compression, access log)
//! - Apply listener-level limits (body size, request timeout)
//! - Serve until the shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

use crate::config::ServerConfig;
use crate::http::handlers;
use crate::http::pipeline::Pipeline;
use crate::storage::Storage;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

/// Metric routes without any middleware.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/ping", get(handlers::ping))
        .route("/update/", post(handlers::update_metric_json))
        .route("/updates/", post(handlers::update_metrics_batch))
        .route("/update/{kind}/{name}/{value}", post(handlers::update_metric))
        .route("/value/", post(handlers::get_metric_json))
        .route("/value/{kind}/{name}", get(handlers::get_metric))
        .fallback(handlers::fallback)
        .with_state(state)
}

/// HTTP server for the metrics API.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    /// Create a new HTTP server over the given storage backend.
    pub fn new(config: ServerConfig, storage: Arc<dyn Storage>) -> Self {
        let router = Self::build_router(&config, AppState::new(storage));
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Pipeline::standard(config.limits.max_body_size)
            .apply(routes(state))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.limits.request_timeout_secs,
            )))
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_size))
    }

    /// The fully layered router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
