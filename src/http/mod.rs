//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, limits, graceful shutdown)
//!     → pipeline.rs (ordered middleware stages)
//!         → middleware/compress.rs (gunzip request, gzip response)
//!         → middleware/logger.rs (access log after completion)
//!     → handlers.rs (validate, call storage, format response)
//!     → error.rs (failures → status codes)
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod server;

pub use error::ApiError;
pub use pipeline::{Pipeline, Stage};
pub use server::{AppState, HttpServer};
