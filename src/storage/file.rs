//! File-backed metric storage.
//!
//! # Responsibilities
//! - Serve reads and writes from an in-memory store
//! - Restore the store from a JSON snapshot at startup
//! - Persist the snapshot after each write (sync mode) or periodically
//! - Flush one last time on close
//!
//! Snapshots are written to a sibling temp file and renamed into place, so
//! a crash mid-write never leaves a truncated snapshot behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::model::Metric;
use crate::storage::memory::{MemoryStorage, Snapshot};
use crate::storage::{Storage, StorageError, StorageResult};

/// Memory store persisted to a JSON file.
#[derive(Debug)]
pub struct FileStorage {
    memory: MemoryStorage,
    path: PathBuf,
    sync_writes: bool,
    /// Serializes snapshot writes so temp files never collide.
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Open the store at `path`, restoring previous contents when `restore` is set.
    ///
    /// A missing or empty snapshot file yields an empty store.
    pub async fn open(
        path: impl AsRef<Path>,
        restore: bool,
        sync_writes: bool,
    ) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let memory = if restore {
            match read_snapshot(&path).await? {
                Some(snapshot) => {
                    let memory = MemoryStorage::from_snapshot(snapshot);
                    tracing::info!(path = ?path, metrics = memory.len(), "Restored metrics snapshot");
                    memory
                }
                None => MemoryStorage::new(),
            }
        } else {
            MemoryStorage::new()
        };

        Ok(Self {
            memory,
            path,
            sync_writes,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current state to disk.
    pub async fn flush(&self) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write_snapshot(&self.memory.to_snapshot()).await
    }

    /// Callers hold `write_lock`.
    async fn write_snapshot(&self, snapshot: &Snapshot) -> StorageResult<()> {
        let data = serde_json::to_vec(snapshot)?;

        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = ?self.path, bytes = data.len(), "Metrics snapshot saved");
        Ok(())
    }

    /// Flush every `interval` until `shutdown` fires.
    pub fn spawn_flusher(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let storage = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = storage.flush().await {
                            tracing::error!(error = %e, path = ?storage.path, "Periodic snapshot failed");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Snapshot flusher stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Apply `update` to the store.
    ///
    /// With synchronous writes the update is first applied to a staged copy
    /// and persisted; memory only changes once the snapshot is on disk, so a
    /// failed write leaves nothing applied.
    async fn write_through<F>(&self, update: F) -> StorageResult<()>
    where
        F: Fn(&MemoryStorage) -> StorageResult<()> + Send + Sync,
    {
        if !self.sync_writes {
            return update(&self.memory);
        }

        let _guard = self.write_lock.lock().await;
        let staged = MemoryStorage::from_snapshot(self.memory.to_snapshot());
        update(&staged)?;
        self.write_snapshot(&staged.to_snapshot()).await?;
        update(&self.memory)
    }
}

async fn read_snapshot(path: &Path) -> StorageResult<Option<Snapshot>> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::Io(e)),
    };
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&data)?))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl Storage for FileStorage {
    async fn insert_gauge(&self, name: &str, value: f64) -> StorageResult<()> {
        self.write_through(|memory| {
            memory.set_gauge(name, value);
            Ok(())
        })
        .await
    }

    async fn insert_counter(&self, name: &str, delta: i64) -> StorageResult<()> {
        self.write_through(|memory| memory.add_counter(name, delta))
            .await
    }

    async fn select_gauge(&self, name: &str) -> StorageResult<f64> {
        self.memory.gauge(name)
    }

    async fn select_counter(&self, name: &str) -> StorageResult<i64> {
        self.memory.counter(name)
    }

    async fn ping(&self) -> StorageResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let meta = tokio::fs::metadata(&dir)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", dir.display(), e)))?;
        if !meta.is_dir() {
            return Err(StorageError::Unavailable(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        Ok(())
    }

    async fn insert_batch(&self, metrics: &[Metric]) -> StorageResult<()> {
        self.write_through(|memory| memory.apply_batch(metrics))
            .await
    }

    async fn snapshot(&self) -> StorageResult<Vec<Metric>> {
        Ok(self.memory.metrics())
    }

    async fn close(&self) -> StorageResult<()> {
        self.flush().await?;
        tracing::info!(path = ?self.path, "Metrics snapshot flushed on close");
        Ok(())
    }
}
