//! Metric endpoints.
//!
//! # Responsibilities
//! - Parse metric operations from path segments and JSON bodies
//! - Validate kind, name and value before touching storage
//! - Translate storage outcomes into status codes and bodies

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::model::{parse_value, Metric, MetricKind, MetricPayload, MetricValue, ValidationError};
use crate::storage;

/// `POST /update/{type}/{name}/{value}`
pub async fn update_metric(
    State(state): State<AppState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let kind: MetricKind = kind.parse()?;
    if name.is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    let metric = match parse_value(kind, &value)? {
        MetricValue::Gauge(v) => Metric::gauge(name, v)?,
        MetricValue::Counter(d) => Metric::counter(name, d)?,
    };

    storage::apply(state.storage.as_ref(), &metric).await?;
    tracing::debug!(kind = %kind, name = %metric.name, value = %metric.value, "Metric updated");
    Ok(StatusCode::OK)
}

/// `GET /value/{type}/{name}`, rendered as plain text.
pub async fn get_metric(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let kind: MetricKind = kind.parse()?;
    let value = storage::select(state.storage.as_ref(), kind, &name).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        value.to_string(),
    )
        .into_response())
}

/// `GET /ping`
pub async fn ping(State(state): State<AppState>) -> StatusCode {
    match state.storage.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::error!(error = %e, "Storage ping failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// `POST /update/` with a single JSON metric. Responds with the stored state.
pub async fn update_metric_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MetricPayload>, ApiError> {
    let payload: MetricPayload = serde_json::from_slice(&body)?;
    let metric = Metric::try_from(payload)?;

    storage::apply(state.storage.as_ref(), &metric).await?;
    let value = storage::select(state.storage.as_ref(), metric.kind(), &metric.name).await?;

    Ok(Json(MetricPayload::from(&Metric {
        name: metric.name,
        value,
    })))
}

/// `POST /updates/` with a JSON array. Nothing is stored if any entry is invalid.
pub async fn update_metrics_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let payloads: Vec<MetricPayload> = serde_json::from_slice(&body)?;
    let metrics = payloads
        .into_iter()
        .map(Metric::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    state.storage.insert_batch(&metrics).await?;
    tracing::debug!(count = metrics.len(), "Metric batch applied");
    Ok(Json(json!({})))
}

/// `POST /value/` with `{"id", "type"}`.
pub async fn get_metric_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MetricPayload>, ApiError> {
    let payload: MetricPayload = serde_json::from_slice(&body)?;
    let (kind, name) = payload.key()?;
    let value = storage::select(state.storage.as_ref(), kind, name).await?;

    Ok(Json(MetricPayload::from(&Metric {
        name: name.to_string(),
        value,
    })))
}

/// `GET /`: every stored metric as an HTML table.
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let metrics = state.storage.snapshot().await?;

    let mut page = String::from(
        "<!DOCTYPE html>\n<html>\n<head><title>Metrics</title></head>\n<body>\n\
         <table>\n<tr><th>Type</th><th>Name</th><th>Value</th></tr>\n",
    );
    for metric in &metrics {
        page.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            metric.kind(),
            escape_html(&metric.name),
            metric.value
        ));
    }
    page.push_str("</table>\n</body>\n</html>\n");
    Ok(Html(page))
}

/// Unmatched routes. Anything under `/update/` is a malformed update.
pub async fn fallback(uri: Uri) -> Response {
    if uri.path().starts_with("/update/") {
        ApiError::from(ValidationError::MalformedPath).into_response()
    } else {
        (StatusCode::NOT_FOUND, "not found").into_response()
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
