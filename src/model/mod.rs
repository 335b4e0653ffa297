//! Metric data model.
//!
//! # Data Flow
//! ```text
//! URL segments / JSON body
//!     → types.rs (MetricKind, parse_value → MetricValue)
//!     → wire.rs (JSON payload ⇄ Metric)
//!     → Metric (validated, handed to storage)
//! ```
//!
//! # Design Decisions
//! - A `Metric` can only be built from validated input
//! - Gauge values must be finite; counters are exact `i64` deltas

pub mod types;
pub mod wire;

pub use types::{parse_value, Metric, MetricKind, MetricValue, ValidationError};
pub use wire::MetricPayload;
