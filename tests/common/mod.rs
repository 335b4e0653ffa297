//! Shared utilities for integration tests.

use std::io::{Read, Write};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use tower::ServiceExt;

use metrics_collector::model::Metric;
use metrics_collector::storage::{Storage, StorageError, StorageResult};
use metrics_collector::{HttpServer, MemoryStorage, ServerConfig};

/// Fully layered application over an in-memory store.
#[allow(dead_code)]
pub fn memory_app() -> (Router, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    (app(storage.clone()), storage)
}

/// Fully layered application over any backend.
#[allow(dead_code)]
pub fn app(storage: Arc<dyn Storage>) -> Router {
    HttpServer::new(ServerConfig::default(), storage).router()
}

/// Drive one request through the router and collect the response.
#[allow(dead_code)]
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}

#[allow(dead_code)]
pub fn post(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[allow(dead_code)]
pub fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

/// Backend whose every operation fails as if the database were down.
#[allow(dead_code)]
pub struct UnreachableStorage;

fn down() -> StorageError {
    StorageError::Unavailable("connection refused".into())
}

#[async_trait]
impl Storage for UnreachableStorage {
    async fn insert_gauge(&self, _name: &str, _value: f64) -> StorageResult<()> {
        Err(down())
    }

    async fn insert_counter(&self, _name: &str, _delta: i64) -> StorageResult<()> {
        Err(down())
    }

    async fn select_gauge(&self, _name: &str) -> StorageResult<f64> {
        Err(down())
    }

    async fn select_counter(&self, _name: &str) -> StorageResult<i64> {
        Err(down())
    }

    async fn ping(&self) -> StorageResult<()> {
        Err(down())
    }

    async fn snapshot(&self) -> StorageResult<Vec<Metric>> {
        Err(down())
    }
}
