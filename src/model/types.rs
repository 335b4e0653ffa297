//! Core metric types and value parsing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two supported metric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Last value wins.
    Gauge,
    /// Deltas accumulate.
    Counter,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// A typed metric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Replacement value.
    Gauge(f64),
    /// Delta to add.
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }
}

impl fmt::Display for MetricValue {
    /// Canonical text form: shortest round-trip decimal for gauges, plain
    /// integer for counters.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{}", v),
            MetricValue::Counter(v) => write!(f, "{}", v),
        }
    }
}

/// A validated metric update or stored metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
}

impl Metric {
    /// Build a gauge, rejecting empty names and non-finite values.
    pub fn gauge(name: impl Into<String>, value: f64) -> Result<Self, ValidationError> {
        let name = validate_name(name.into())?;
        if !value.is_finite() {
            return Err(ValidationError::NonFinite(value));
        }
        Ok(Self {
            name,
            value: MetricValue::Gauge(value),
        })
    }

    /// Build a counter delta, rejecting empty names.
    pub fn counter(name: impl Into<String>, delta: i64) -> Result<Self, ValidationError> {
        let name = validate_name(name.into())?;
        Ok(Self {
            name,
            value: MetricValue::Counter(delta),
        })
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

/// Rejected metric input. Always maps to 400 Bad Request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unknown metric type: {0:?}")]
    UnknownKind(String),
    #[error("metric name must not be empty")]
    EmptyName,
    #[error("invalid {kind} value: {raw:?}")]
    InvalidValue { kind: MetricKind, raw: String },
    #[error("gauge value must be finite, got {0}")]
    NonFinite(f64),
    #[error("{kind} metric is missing its {field} field")]
    MissingField { kind: MetricKind, field: &'static str },
    #[error("malformed metric path")]
    MalformedPath,
}

fn validate_name(name: String) -> Result<String, ValidationError> {
    if name.is_empty() {
        Err(ValidationError::EmptyName)
    } else {
        Ok(name)
    }
}

/// Parse a raw textual value according to the metric kind.
///
/// Gauges accept any float literal `f64::from_str` accepts, except the
/// non-finite ones. Counters accept decimal `i64` literals only.
pub fn parse_value(kind: MetricKind, raw: &str) -> Result<MetricValue, ValidationError> {
    let invalid = || ValidationError::InvalidValue {
        kind,
        raw: raw.to_string(),
    };

    match kind {
        MetricKind::Gauge => {
            let v: f64 = raw.parse().map_err(|_| invalid())?;
            if !v.is_finite() {
                return Err(ValidationError::NonFinite(v));
            }
            Ok(MetricValue::Gauge(v))
        }
        MetricKind::Counter => raw.parse().map(MetricValue::Counter).map_err(|_| invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("gauge".parse::<MetricKind>().unwrap(), MetricKind::Gauge);
        assert_eq!("counter".parse::<MetricKind>().unwrap(), MetricKind::Counter);
        assert!(matches!(
            "Gauge".parse::<MetricKind>(),
            Err(ValidationError::UnknownKind(_))
        ));
        assert!("histogram".parse::<MetricKind>().is_err());
    }

    #[test]
    fn test_parse_gauge_values() {
        assert_eq!(
            parse_value(MetricKind::Gauge, "123.45").unwrap(),
            MetricValue::Gauge(123.45)
        );
        assert_eq!(
            parse_value(MetricKind::Gauge, "-7").unwrap(),
            MetricValue::Gauge(-7.0)
        );
        assert!(parse_value(MetricKind::Gauge, "abc").is_err());
        assert!(parse_value(MetricKind::Gauge, "").is_err());
    }

    #[test]
    fn test_non_finite_gauge_rejected() {
        for raw in ["NaN", "inf", "-inf", "infinity"] {
            let err = parse_value(MetricKind::Gauge, raw).unwrap_err();
            assert!(matches!(err, ValidationError::NonFinite(_)), "{raw}");
        }
        assert!(Metric::gauge("g", f64::NAN).is_err());
    }

    #[test]
    fn test_parse_counter_values() {
        assert_eq!(
            parse_value(MetricKind::Counter, "42").unwrap(),
            MetricValue::Counter(42)
        );
        assert_eq!(
            parse_value(MetricKind::Counter, "-3").unwrap(),
            MetricValue::Counter(-3)
        );
        assert!(parse_value(MetricKind::Counter, "1.5").is_err());
        assert!(parse_value(MetricKind::Counter, "abc").is_err());
        assert!(parse_value(MetricKind::Counter, "9223372036854775808").is_err());
    }

    #[test]
    fn test_canonical_rendering() {
        assert_eq!(MetricValue::Gauge(123.45).to_string(), "123.45");
        assert_eq!(MetricValue::Gauge(1.0).to_string(), "1");
        assert_eq!(MetricValue::Gauge(0.1 + 0.2).to_string(), "0.30000000000000004");
        assert_eq!(MetricValue::Counter(1982).to_string(), "1982");
    }

    #[test]
    fn test_empty_name_rejected() {
        assert_eq!(Metric::counter("", 1).unwrap_err(), ValidationError::EmptyName);
        assert_eq!(Metric::gauge("", 1.0).unwrap_err(), ValidationError::EmptyName);
    }
}
