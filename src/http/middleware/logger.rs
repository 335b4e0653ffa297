//! Per-request access log.
//!
//! One `INFO` event per request with uri, method, duration, bytes and status.
//! The record travels with the response body and is emitted when that body
//! is dropped: after the last frame, after a client disconnect, or, if the
//! handler never produced a response, when the middleware future is dropped
//! (status 0).

use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::Method,
    middleware::Next,
    response::Response,
};
use http_body::{Body as _, Frame, SizeHint};

use crate::observability::metrics;

/// Middleware: wrap the response body so the request is logged once it is done.
pub async fn request_logger(request: Request, next: Next) -> Response {
    let mut record = RequestRecord::new(request.uri().to_string(), request.method().clone());

    let response = next.run(request).await;
    record.status = response.status().as_u16();

    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(LoggedBody::new(body, record)))
}

/// What gets logged about a request.
#[derive(Debug)]
pub struct RequestRecord {
    uri: String,
    method: Method,
    start: Instant,
    status: u16,
    bytes: u64,
}

impl RequestRecord {
    pub fn new(uri: String, method: Method) -> Self {
        Self {
            uri,
            method,
            start: Instant::now(),
            status: 0,
            bytes: 0,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for RequestRecord {
    fn drop(&mut self) {
        let duration = self.elapsed();
        tracing::info!(
            uri = %self.uri,
            method = %self.method,
            duration = ?duration,
            bytes = self.bytes,
            status = self.status,
            "request completed"
        );
        metrics::record_request(self.method.as_str(), self.status, duration);
    }
}

/// Response body that counts the data bytes passing through it.
pub struct LoggedBody {
    inner: Body,
    record: RequestRecord,
}

impl LoggedBody {
    pub fn new(inner: Body, record: RequestRecord) -> Self {
        Self { inner, record }
    }

    pub fn record(&self) -> &RequestRecord {
        &self.record
    }
}

impl http_body::Body for LoggedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));
        if let Some(Ok(frame)) = &frame {
            if let Some(data) = frame.data_ref() {
                this.record.bytes += data.len() as u64;
            }
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
