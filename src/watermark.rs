// src/watermark.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Persisted high-water mark: the id of the most recently fully announced
/// item. Monotonically non-decreasing; the relay engine is the only writer.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn read(&self) -> Result<u64>;
    async fn write(&self, id: u64) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WatermarkRecord {
    last_announced_id: u64,
    updated_at: DateTime<Utc>,
}

/// Single-record JSON file store. Writes go through a temp file and a rename
/// so a crash mid-write never leaves a torn record behind.
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn read(&self) -> Result<u64> {
        match fs::read_to_string(&self.path).await {
            Ok(s) => {
                let rec: WatermarkRecord = serde_json::from_str(&s)
                    .with_context(|| format!("corrupt watermark file {}", self.path.display()))?;
                Ok(rec.last_announced_id)
            }
            // First run: nothing recorded yet, everything is news.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e).with_context(|| {
                format!("reading watermark file {}", self.path.display())
            }),
        }
    }

    async fn write(&self, id: u64) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("creating watermark dir {}", dir.display()))?;
            }
        }

        let rec = WatermarkRecord {
            last_announced_id: id,
            updated_at: Utc::now(),
        };
        let body = serde_json::to_vec_pretty(&rec).context("serializing watermark record")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &body)
            .await
            .with_context(|| format!("writing watermark temp file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("committing watermark file {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory store for tests and embedding without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    value: std::sync::Mutex<u64>,
}

impl MemoryWatermarkStore {
    pub fn new(initial: u64) -> Self {
        Self {
            value: std::sync::Mutex::new(initial),
        }
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn read(&self) -> Result<u64> {
        Ok(*self.value.lock().expect("watermark mutex poisoned"))
    }

    async fn write(&self, id: u64) -> Result<()> {
        *self.value.lock().expect("watermark mutex poisoned") = id;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("watermark.json"));
        assert_eq!(store.read().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("state/watermark.json"));
        store.write(7781).await.unwrap();
        assert_eq!(store.read().await.unwrap(), 7781);
        assert!(store.path().exists());

        // overwrite with a larger id, as the engine would
        store.write(7790).await.unwrap();
        assert_eq!(store.read().await.unwrap(), 7790);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermark.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        let store = FileWatermarkStore::new(&path);
        assert!(store.read().await.is_err());
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("watermark.json"));
        store.write(42).await.unwrap();
        assert!(!dir.path().join("watermark.json.tmp").exists());
    }
}
