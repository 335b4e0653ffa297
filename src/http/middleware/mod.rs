//! Request/response middleware.
//!
//! - compress.rs: gzip request decompression and response compression
//! - logger.rs: one access log record per request

pub mod compress;
pub mod logger;

pub use compress::{compress_response, decompress_request, GzipBody};
pub use logger::{request_logger, LoggedBody, RequestRecord};
