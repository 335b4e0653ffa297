//! Metric storage subsystem.
//!
//! # Data Flow
//! ```text
//! handlers (validated Metric)
//!     → Arc<dyn Storage> (contract)
//!         → memory.rs (DashMap-backed, default)
//!         → file.rs (memory + JSON snapshot on disk)
//! ```
//!
//! # Design Decisions
//! - The HTTP layer depends only on the `Storage` trait
//! - Backends serialize conflicting writes themselves; callers never lock
//! - Gauge writes overwrite, counter writes accumulate
//! - Concurrent gauge writes: whichever map insert runs last wins

pub mod file;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{StorageBackend, StorageConfig};
use crate::lifecycle::Shutdown;
use crate::model::{Metric, MetricKind, MetricValue};

pub use file::FileStorage;
pub use memory::{MemoryStorage, Snapshot};

/// Errors reported by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{kind} metric {name:?} not found")]
    NotFound { kind: MetricKind, name: String },
    #[error("counter {name:?} would overflow")]
    CounterOverflow { name: String },
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn not_found(kind: MetricKind, name: &str) -> Self {
        StorageError::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Contract every metric backend satisfies.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Overwrite the current gauge value.
    async fn insert_gauge(&self, name: &str, value: f64) -> StorageResult<()>;

    /// Add `delta` to the counter, creating it at `delta` if absent.
    async fn insert_counter(&self, name: &str, delta: i64) -> StorageResult<()>;

    /// Current gauge value, `NotFound` if never set as a gauge.
    async fn select_gauge(&self, name: &str) -> StorageResult<f64>;

    /// Current counter value, `NotFound` if never set as a counter.
    async fn select_counter(&self, name: &str) -> StorageResult<i64>;

    /// Liveness probe.
    async fn ping(&self) -> StorageResult<()>;

    /// Apply a list of updates.
    ///
    /// The default applies them one by one and stops at the first failure.
    /// Backends that can do better apply the batch atomically.
    async fn insert_batch(&self, metrics: &[Metric]) -> StorageResult<()> {
        for metric in metrics {
            apply(self, metric).await?;
        }
        Ok(())
    }

    /// Every stored metric, ordered by kind then name.
    async fn snapshot(&self) -> StorageResult<Vec<Metric>>;

    /// Flush and release resources.
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Route a single validated metric to the matching insert operation.
pub async fn apply<S: Storage + ?Sized>(storage: &S, metric: &Metric) -> StorageResult<()> {
    match metric.value {
        MetricValue::Gauge(v) => storage.insert_gauge(&metric.name, v).await,
        MetricValue::Counter(d) => storage.insert_counter(&metric.name, d).await,
    }
}

/// Read back the stored value for `(kind, name)`.
pub async fn select<S: Storage + ?Sized>(
    storage: &S,
    kind: MetricKind,
    name: &str,
) -> StorageResult<MetricValue> {
    match kind {
        MetricKind::Gauge => storage.select_gauge(name).await.map(MetricValue::Gauge),
        MetricKind::Counter => storage.select_counter(name).await.map(MetricValue::Counter),
    }
}

/// Open the configured backend.
///
/// For the file backend with a non-zero store interval this also spawns the
/// periodic flusher, which stops when `shutdown` fires.
pub async fn open(config: &StorageConfig, shutdown: &Shutdown) -> StorageResult<Arc<dyn Storage>> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory storage");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageBackend::File => {
            let sync_writes = config.store_interval_secs == 0;
            let storage =
                Arc::new(FileStorage::open(&config.file_path, config.restore, sync_writes).await?);
            tracing::info!(
                path = %config.file_path,
                store_interval_secs = config.store_interval_secs,
                restore = config.restore,
                "Using file-backed storage"
            );
            if !sync_writes {
                storage.spawn_flusher(
                    Duration::from_secs(config.store_interval_secs),
                    shutdown.subscribe(),
                );
            }
            Ok(storage)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend relying on every default method of the trait.
    #[derive(Default)]
    struct Plain {
        inner: MemoryStorage,
    }

    #[async_trait]
    impl Storage for Plain {
        async fn insert_gauge(&self, name: &str, value: f64) -> StorageResult<()> {
            self.inner.set_gauge(name, value);
            Ok(())
        }
        async fn insert_counter(&self, name: &str, delta: i64) -> StorageResult<()> {
            self.inner.add_counter(name, delta)
        }
        async fn select_gauge(&self, name: &str) -> StorageResult<f64> {
            self.inner.gauge(name)
        }
        async fn select_counter(&self, name: &str) -> StorageResult<i64> {
            self.inner.counter(name)
        }
        async fn ping(&self) -> StorageResult<()> {
            Ok(())
        }
        async fn snapshot(&self) -> StorageResult<Vec<Metric>> {
            Ok(self.inner.metrics())
        }
    }

    #[tokio::test]
    async fn test_default_batch_applies_in_order() {
        let storage = Plain::default();
        let batch = vec![
            Metric::gauge("g", 1.0).unwrap(),
            Metric::counter("c", 2).unwrap(),
            Metric::gauge("g", 3.5).unwrap(),
            Metric::counter("c", 5).unwrap(),
        ];
        storage.insert_batch(&batch).await.unwrap();

        assert_eq!(storage.select_gauge("g").await.unwrap(), 3.5);
        assert_eq!(storage.select_counter("c").await.unwrap(), 7);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_select_dispatches_by_kind() {
        let storage = Plain::default();
        storage.insert_counter("x", 4).await.unwrap();

        let value = select(&storage, MetricKind::Counter, "x").await.unwrap();
        assert_eq!(value, MetricValue::Counter(4));

        let err = select(&storage, MetricKind::Gauge, "x").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
