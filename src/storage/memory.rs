//! In-memory metric storage.
//!
//! # Responsibilities
//! - Hold gauges and counters in concurrent maps
//! - Accumulate counters without losing concurrent increments
//! - Apply batches atomically with respect to other writers
//! - Produce and restore serializable snapshots

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::{Metric, MetricKind, MetricValue};
use crate::storage::{Storage, StorageError, StorageResult};

/// Serializable view of all stored metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub gauges: BTreeMap<String, f64>,
    pub counters: BTreeMap<String, i64>,
}

/// Thread-safe in-memory backend.
///
/// Single updates take the batch lock shared and rely on per-key locking in
/// `DashMap`; batches take it exclusively so they are never interleaved
/// with other writes.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    gauges: DashMap<String, f64>,
    counters: DashMap<String, i64>,
    batch_lock: RwLock<()>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated from a snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let storage = Self::new();
        for (name, value) in snapshot.gauges {
            storage.gauges.insert(name, value);
        }
        for (name, value) in snapshot.counters {
            storage.counters.insert(name, value);
        }
        storage
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        let _shared = self.batch_lock.read();
        self.gauges.insert(name.to_string(), value);
    }

    pub fn add_counter(&self, name: &str, delta: i64) -> StorageResult<()> {
        let _shared = self.batch_lock.read();
        match self.counters.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                let next = entry
                    .get()
                    .checked_add(delta)
                    .ok_or_else(|| StorageError::CounterOverflow {
                        name: name.to_string(),
                    })?;
                *entry.get_mut() = next;
            }
            Entry::Vacant(entry) => {
                entry.insert(delta);
            }
        }
        Ok(())
    }

    pub fn gauge(&self, name: &str) -> StorageResult<f64> {
        self.gauges
            .get(name)
            .map(|r| *r.value())
            .ok_or_else(|| StorageError::not_found(MetricKind::Gauge, name))
    }

    pub fn counter(&self, name: &str) -> StorageResult<i64> {
        self.counters
            .get(name)
            .map(|r| *r.value())
            .ok_or_else(|| StorageError::not_found(MetricKind::Counter, name))
    }

    /// Apply every update or none of them.
    pub fn apply_batch(&self, metrics: &[Metric]) -> StorageResult<()> {
        let _exclusive = self.batch_lock.write();

        // Resolve final counter values first so an overflow leaves the store untouched.
        let mut counters: HashMap<&str, i64> = HashMap::new();
        for metric in metrics {
            if let MetricValue::Counter(delta) = metric.value {
                let current = match counters.get(metric.name.as_str()) {
                    Some(v) => *v,
                    None => self.counters.get(&metric.name).map(|r| *r.value()).unwrap_or(0),
                };
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| StorageError::CounterOverflow {
                        name: metric.name.clone(),
                    })?;
                counters.insert(&metric.name, next);
            }
        }

        for metric in metrics {
            if let MetricValue::Gauge(v) = metric.value {
                self.gauges.insert(metric.name.clone(), v);
            }
        }
        for (name, value) in counters {
            self.counters.insert(name.to_string(), value);
        }
        Ok(())
    }

    /// All metrics ordered by kind, then name.
    pub fn metrics(&self) -> Vec<Metric> {
        let snapshot = self.to_snapshot();
        let gauges = snapshot.gauges.into_iter().map(|(name, v)| Metric {
            name,
            value: MetricValue::Gauge(v),
        });
        let counters = snapshot.counters.into_iter().map(|(name, d)| Metric {
            name,
            value: MetricValue::Counter(d),
        });
        gauges.chain(counters).collect()
    }

    /// Consistent copy of the current state.
    pub fn to_snapshot(&self) -> Snapshot {
        let _exclusive = self.batch_lock.write();
        Snapshot {
            gauges: self
                .gauges
                .iter()
                .map(|r| (r.key().clone(), *r.value()))
                .collect(),
            counters: self
                .counters
                .iter()
                .map(|r| (r.key().clone(), *r.value()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn insert_gauge(&self, name: &str, value: f64) -> StorageResult<()> {
        self.set_gauge(name, value);
        Ok(())
    }

    async fn insert_counter(&self, name: &str, delta: i64) -> StorageResult<()> {
        self.add_counter(name, delta)
    }

    async fn select_gauge(&self, name: &str) -> StorageResult<f64> {
        self.gauge(name)
    }

    async fn select_counter(&self, name: &str) -> StorageResult<i64> {
        self.counter(name)
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn insert_batch(&self, metrics: &[Metric]) -> StorageResult<()> {
        self.apply_batch(metrics)
    }

    async fn snapshot(&self) -> StorageResult<Vec<Metric>> {
        Ok(self.metrics())
    }
}
