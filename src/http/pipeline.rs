//! Middleware pipeline composition.
//!
//! A pipeline is an ordered list of stages applied once at startup. The
//! first stage is the outermost: it sees the request first and the
//! response last.
//!
//! The standard order is compress → logger → decompress → router. The
//! logger sits inside compression, so it reports the uncompressed bytes
//! produced by the router, and outside decompression, so a body that fails
//! to decompress is still logged with its 500.

use axum::{middleware, Router};

use crate::http::middleware::{compress_response, decompress_request, request_logger};

/// A single middleware stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Gunzip eligible request bodies, refusing output above `max_body_size`.
    Decompress { max_body_size: usize },
    /// Gzip responses for clients that accept it.
    Compress,
    /// Access log.
    Logger,
}

impl Stage {
    fn wrap(self, router: Router) -> Router {
        match self {
            Stage::Decompress { max_body_size } => {
                router.layer(middleware::from_fn_with_state(max_body_size, decompress_request))
            }
            Stage::Compress => router.layer(middleware::from_fn(compress_response)),
            Stage::Logger => router.layer(middleware::from_fn(request_logger)),
        }
    }
}

/// Ordered list of stages, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Compress → logger → decompress.
    pub fn standard(max_body_size: usize) -> Self {
        Self::new(vec![
            Stage::Compress,
            Stage::Logger,
            Stage::Decompress { max_body_size },
        ])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Wrap `router` so that `stages[0]` ends up outermost.
    pub fn apply(&self, router: Router) -> Router {
        // `Router::layer` wraps what is already there, so apply innermost first.
        self.stages
            .iter()
            .rev()
            .fold(router, |router, stage| stage.wrap(router))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;

    #[test]
    fn test_standard_order() {
        assert_eq!(
            Pipeline::standard(10).stages(),
            &[
                Stage::Compress,
                Stage::Logger,
                Stage::Decompress { max_body_size: 10 },
            ]
        );
    }

    #[tokio::test]
    async fn test_stages_wrap_router() {
        let router = Router::new().route("/", get(|| async { "payload" }));
        let app = Pipeline::new(vec![Stage::Compress, Stage::Logger]).apply(router);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::ACCEPT_ENCODING, "gzip")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_identity() {
        let router = Router::new().route("/", get(|| async { "plain" }));
        let response = Pipeline::new(Vec::new())
            .apply(router)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::ACCEPT_ENCODING, "gzip")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"plain");
    }
}
