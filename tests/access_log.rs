//! Access records produced by the fully layered router.

mod common;

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use common::{get, gzip, memory_app, post, send};

#[derive(Debug, Default, Clone)]
struct AccessRecord {
    message: String,
    uri: String,
    bytes: u64,
    status: u64,
}

impl Visit for AccessRecord {
    fn record_u64(&mut self, field: &Field, value: u64) {
        match field.name() {
            "bytes" => self.bytes = value,
            "status" => self.status = value,
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            "uri" => self.uri = format!("{:?}", value),
            _ => {}
        }
    }
}

#[derive(Clone, Default)]
struct AccessLog {
    records: Arc<Mutex<Vec<AccessRecord>>>,
}

impl AccessLog {
    fn take(&self) -> Vec<AccessRecord> {
        std::mem::take(&mut *self.records.lock().unwrap())
    }
}

impl<S: tracing::Subscriber> Layer<S> for AccessLog {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut record = AccessRecord::default();
        event.record(&mut record);
        if record.message == "request completed" {
            self.records.lock().unwrap().push(record);
        }
    }
}

fn capture() -> (AccessLog, tracing::subscriber::DefaultGuard) {
    let log = AccessLog::default();
    let guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(log.clone()));
    (log, guard)
}

#[tokio::test]
async fn test_success_is_logged_once_with_body_size() {
    let (log, _guard) = capture();
    let (app, _) = memory_app();

    send(&app, post("/update/gauge/x/123.45")).await;
    log.take();

    let (status, _, _) = send(&app, get("/value/gauge/x")).await;
    assert_eq!(status, StatusCode::OK);

    let records = log.take();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].uri, "/value/gauge/x");
    assert_eq!(records[0].status, 200);
    assert_eq!(records[0].bytes, 6);
}

#[tokio::test]
async fn test_logged_bytes_are_uncompressed() {
    let (log, _guard) = capture();
    let (app, _) = memory_app();
    send(&app, post("/update/gauge/x/123.45")).await;
    log.take();

    let request = Request::get("/value/gauge/x")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = send(&app, request).await;
    assert_eq!(headers[header::CONTENT_ENCODING], "gzip");

    let records = log.take();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].bytes, 6);
}

#[tokio::test]
async fn test_errors_are_logged_once() {
    let (log, _guard) = capture();
    let (app, _) = memory_app();

    let (status, _, _) = send(&app, get("/value/counter/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(&app, post("/update/counter/x/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let records = log.take();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, 404);
    assert_eq!(records[1].status, 400);
}

#[tokio::test]
async fn test_corrupt_gzip_is_logged() {
    let (log, _guard) = capture();
    let (app, _) = memory_app();

    let request = Request::post("/update/")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from("definitely not gzip"))
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let records = log.take();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].uri, "/update/");
    assert_eq!(records[0].status, 500);
    assert_eq!(records[0].bytes, body.len() as u64);
}

#[tokio::test]
async fn test_valid_gzip_request_is_logged_once() {
    let (log, _guard) = capture();
    let (app, storage) = memory_app();

    let request = Request::post("/update/")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(gzip(br#"{"id":"c","type":"counter","delta":2}"#)))
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(storage.counter("c").unwrap(), 2);

    let records = log.take();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, 200);
}
