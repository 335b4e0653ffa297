//! Gzip content negotiation.
//!
//! # Responsibilities
//! - Decompress gzip request bodies of text-like content types
//! - Compress response bodies for clients that accept gzip
//!
//! # Design Decisions
//! - Binary or unknown content types are never decompressed
//! - Headers are only inspected, never trusted to be well formed: a value
//!   that is not valid ASCII simply does not match
//! - The encoder belongs to exactly one response body and is finished once,
//!   when the inner body ends

use std::io::{Read, Write};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, FromRequest, Request, State},
    http::{
        header::{self, HeaderMap, HeaderValue},
        Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use http_body::{Body as _, Frame};
use thiserror::Error;

/// The only supported content coding.
pub const GZIP: &str = "gzip";

/// Request content types eligible for decompression.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/javascript",
    "application/json",
    "text/css",
    "text/html",
    "text/plain",
    "text/xml",
];

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cannot read request body: {0}")]
    Body(#[from] BytesRejection),
    #[error("invalid gzip stream: {0}")]
    Gzip(#[from] std::io::Error),
    #[error("decompressed body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Middleware: gunzip request bodies declared as gzip.
///
/// The state is the maximum body size, applied to the decompressed output.
pub async fn decompress_request(
    State(max_body_size): State<usize>,
    request: Request,
    next: Next,
) -> Response {
    if !matches_content_type(request.headers()) {
        tracing::trace!("Content-Type not eligible for decompression");
        return next.run(request).await;
    }
    if !lists_token(request.headers(), header::CONTENT_ENCODING, GZIP) {
        tracing::trace!("Request body not gzip encoded");
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let decoded = match read_gzip_body(body, max_body_size).await {
        Ok(decoded) => decoded,
        Err(CodecError::Body(rejection)) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            tracing::warn!(uri = %parts.uri, "Compressed request body over the size limit");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, uri = %parts.uri, "Failed to decompress request body");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to decompress data").into_response();
        }
    };

    parts.headers.remove(header::CONTENT_ENCODING);
    parts.headers.remove(header::CONTENT_LENGTH);
    next.run(Request::from_parts(parts, Body::from(decoded))).await
}

/// Middleware: gzip the response body when the client accepts it.
pub async fn compress_response(request: Request, next: Next) -> Response {
    if !accepts_gzip(request.headers()) {
        return next.run(request).await;
    }
    let is_head = request.method() == Method::HEAD;

    let response = next.run(request).await;
    if is_head
        || matches!(
            response.status(),
            StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED
        )
        || response.headers().contains_key(header::CONTENT_ENCODING)
    {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    parts
        .headers
        .insert(header::CONTENT_ENCODING, HeaderValue::from_static(GZIP));
    parts.headers.remove(header::CONTENT_LENGTH);
    parts
        .headers
        .append(header::VARY, HeaderValue::from_static("accept-encoding"));
    Response::from_parts(parts, Body::new(GzipBody::new(body)))
}

/// A body cut short by an outer length limit surfaces as a 413 rejection.
async fn read_gzip_body(body: Body, limit: usize) -> Result<Vec<u8>, CodecError> {
    let compressed = Bytes::from_request(Request::new(body), &()).await?;
    gunzip(&compressed, limit)
}

/// Decode a complete gzip payload, refusing output larger than `limit`.
pub fn gunzip(data: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
    let mut decoded = Vec::new();
    GzDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut decoded)?;
    if decoded.len() > limit {
        return Err(CodecError::TooLarge { limit });
    }
    Ok(decoded)
}

/// Whether any `Content-Type` value is in the allow-list. Parameters such
/// as `charset` are ignored.
fn matches_content_type(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::CONTENT_TYPE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| {
            let essence = v.split(';').next().unwrap_or_default().trim();
            ALLOWED_CONTENT_TYPES
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(essence))
        })
}

/// Whether a comma-separated header lists `token`, ignoring parameters.
fn lists_token(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|item| {
            let coding = item.split(';').next().unwrap_or_default().trim();
            coding.eq_ignore_ascii_case(token)
        })
}

/// `Accept-Encoding` lists gzip without refusing it via `q=0`.
fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|item| {
            let mut params = item.split(';');
            let coding = params.next().unwrap_or_default().trim();
            if !coding.eq_ignore_ascii_case(GZIP) {
                return false;
            }
            params
                .filter_map(|p| p.trim().strip_prefix("q="))
                .all(|q| q.trim().parse::<f32>().map(|q| q > 0.0).unwrap_or(false))
        })
}

/// Response body that gzips every frame of the wrapped body.
pub struct GzipBody {
    inner: Body,
    /// `None` once the stream has been finished or failed.
    encoder: Option<GzEncoder<Vec<u8>>>,
    trailers: Option<HeaderMap>,
}

impl GzipBody {
    pub fn new(inner: Body) -> Self {
        Self {
            inner,
            encoder: Some(GzEncoder::new(Vec::new(), Compression::best())),
            trailers: None,
        }
    }

    fn finish(&mut self) -> Result<Frame<Bytes>, axum::Error> {
        match self.encoder.take() {
            Some(encoder) => encoder
                .finish()
                .map(|tail| Frame::data(Bytes::from(tail)))
                .map_err(axum::Error::new),
            None => Ok(Frame::data(Bytes::new())),
        }
    }
}

impl http_body::Body for GzipBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        loop {
            let Some(encoder) = this.encoder.as_mut() else {
                return Poll::Ready(this.trailers.take().map(|t| Ok(Frame::trailers(t))));
            };

            match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => {
                        if let Err(e) = encoder.write_all(&data) {
                            this.encoder = None;
                            return Poll::Ready(Some(Err(axum::Error::new(e))));
                        }
                        let chunk = std::mem::take(encoder.get_mut());
                        if !chunk.is_empty() {
                            return Poll::Ready(Some(Ok(Frame::data(Bytes::from(chunk)))));
                        }
                    }
                    Err(frame) => {
                        if let Ok(trailers) = frame.into_trailers() {
                            this.trailers = Some(trailers);
                        }
                        return Poll::Ready(Some(this.finish()));
                    }
                },
                Some(Err(e)) => {
                    this.encoder = None;
                    return Poll::Ready(Some(Err(e)));
                }
                None => return Poll::Ready(Some(this.finish())),
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.encoder.is_none() && self.trailers.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_content_type_allow_list() {
        assert!(matches_content_type(&headers(&[(
            header::CONTENT_TYPE,
            "application/json"
        )])));
        assert!(matches_content_type(&headers(&[(
            header::CONTENT_TYPE,
            "text/html; charset=utf-8"
        )])));
        assert!(!matches_content_type(&headers(&[(
            header::CONTENT_TYPE,
            "application/octet-stream"
        )])));
        assert!(!matches_content_type(&HeaderMap::new()));
    }

    #[test]
    fn test_content_encoding_tokens() {
        let h = headers(&[(header::CONTENT_ENCODING, "gzip")]);
        assert!(lists_token(&h, header::CONTENT_ENCODING, GZIP));
        let h = headers(&[(header::CONTENT_ENCODING, "br")]);
        assert!(!lists_token(&h, header::CONTENT_ENCODING, GZIP));
        assert!(!lists_token(&HeaderMap::new(), header::CONTENT_ENCODING, GZIP));
    }

    #[test]
    fn test_accept_encoding_negotiation() {
        let accepts = |v: &str| accepts_gzip(&headers(&[(header::ACCEPT_ENCODING, v)]));
        assert!(accepts("gzip"));
        assert!(accepts("deflate, gzip;q=0.5, br"));
        assert!(accepts("GZIP"));
        assert!(!accepts("gzip;q=0"));
        assert!(!accepts("br, deflate"));
        assert!(!accepts(""));
        assert!(!accepts_gzip(&HeaderMap::new()));
    }

    #[test]
    fn test_gunzip_round_trip_and_limit() {
        let payload: Vec<u8> = (0..10_000u32).flat_map(|i| i.to_le_bytes()).collect();
        assert_eq!(gunzip(&gzip(&payload), payload.len()).unwrap(), payload);
        assert!(matches!(
            gunzip(&gzip(&payload), payload.len() - 1),
            Err(CodecError::TooLarge { .. })
        ));
        assert!(matches!(
            gunzip(b"definitely not gzip", 1024),
            Err(CodecError::Gzip(_))
        ));
    }

    #[tokio::test]
    async fn test_gzip_body_streams_valid_gzip() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"hello, ")),
            Ok(Bytes::from_static(b"")),
            Ok(Bytes::from_static(b"world")),
        ];
        let inner = Body::from_stream(futures_util::stream::iter(chunks));
        let body = Body::new(GzipBody::new(inner));

        let compressed = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(gunzip(&compressed, 1024).unwrap(), b"hello, world");
    }

    #[tokio::test]
    async fn test_gzip_body_of_empty_body_is_valid_gzip() {
        let body = Body::new(GzipBody::new(Body::empty()));
        let compressed = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert!(!compressed.is_empty());
        assert!(gunzip(&compressed, 16).unwrap().is_empty());
    }
}
