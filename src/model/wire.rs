//! JSON representation used by the `/update/`, `/updates/` and `/value/` endpoints.

use serde::{Deserialize, Serialize};

use crate::model::types::{Metric, MetricKind, MetricValue, ValidationError};

/// Metric as it travels in JSON bodies.
///
/// `type` is kept as a raw string so that an unknown kind is reported as a
/// validation error rather than a deserialization failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricPayload {
    /// Validate the name and kind without looking at the value fields.
    pub fn key(&self) -> Result<(MetricKind, &str), ValidationError> {
        let kind: MetricKind = self.kind.parse()?;
        if self.id.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok((kind, &self.id))
    }
}

impl TryFrom<MetricPayload> for Metric {
    type Error = ValidationError;

    fn try_from(payload: MetricPayload) -> Result<Self, Self::Error> {
        let (kind, _) = payload.key()?;
        match kind {
            MetricKind::Gauge => {
                let value = payload.value.ok_or(ValidationError::MissingField {
                    kind,
                    field: "value",
                })?;
                Metric::gauge(payload.id, value)
            }
            MetricKind::Counter => {
                let delta = payload.delta.ok_or(ValidationError::MissingField {
                    kind,
                    field: "delta",
                })?;
                Metric::counter(payload.id, delta)
            }
        }
    }
}

impl From<&Metric> for MetricPayload {
    fn from(metric: &Metric) -> Self {
        let (delta, value) = match metric.value {
            MetricValue::Gauge(v) => (None, Some(v)),
            MetricValue::Counter(d) => (Some(d), None),
        };
        Self {
            id: metric.name.clone(),
            kind: metric.kind().to_string(),
            delta,
            value,
        }
    }
}
