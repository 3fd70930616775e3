//! Persistence backends for the request tracker
//!
//! The tracker needs three operations on durable state: append to the
//! request log, read it back in full, and overwrite a snapshot (stats,
//! policy, or a compacted log). Failures are reported as
//! [`PersistenceError`]; deciding to fail open is the caller's job.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::types::{RateLimitPolicy, RequestLogEntry, RequestStats};

const LOG_FILE: &str = "requests.jsonl";
const STATS_FILE: &str = "stats.json";
const POLICY_FILE: &str = "limits.json";

/// Storage I/O failure
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt data in {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize tracker state: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Durable storage for request history, stats snapshot and policy
#[async_trait]
pub trait TrackerStore: Send + Sync {
    async fn append_entry(&self, entry: &RequestLogEntry) -> PersistenceResult<()>;

    /// Full log in append order
    async fn read_entries(&self) -> PersistenceResult<Vec<RequestLogEntry>>;

    async fn overwrite_entries(&self, entries: &[RequestLogEntry]) -> PersistenceResult<()>;

    /// `Ok(None)` when no snapshot was ever written
    async fn read_stats(&self) -> PersistenceResult<Option<RequestStats>>;

    async fn write_stats(&self, stats: &RequestStats) -> PersistenceResult<()>;

    /// `Ok(None)` when no policy was ever written
    async fn read_policy(&self) -> PersistenceResult<Option<RateLimitPolicy>>;

    async fn write_policy(&self, policy: &RateLimitPolicy) -> PersistenceResult<()>;
}

// =============================================================================
// JSON files
// =============================================================================

/// File-backed store: a JSON-lines request log plus two JSON snapshots
///
/// Snapshots are replaced atomically (write to a sibling temp file, then
/// rename). Log lines that fail to parse are skipped on read so one torn
/// write does not hide the rest of the history.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at `dir` (created on first write)
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    async fn ensure_dir(&self) -> PersistenceResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| PersistenceError::Io {
                path: self.dir.clone(),
                source,
            })
    }

    async fn read_optional(&self, name: &str) -> PersistenceResult<Option<String>> {
        let path = self.path(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io { path, source }),
        }
    }

    async fn read_snapshot<T: DeserializeOwned>(&self, name: &str) -> PersistenceResult<Option<T>> {
        let Some(contents) = self.read_optional(name).await? else {
            return Ok(None);
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| PersistenceError::Corrupt {
                path: self.path(name),
                source,
            })
    }

    async fn replace_file(&self, name: &str, contents: Vec<u8>) -> PersistenceResult<()> {
        self.ensure_dir().await?;
        let path = self.path(name);
        let tmp = self.path(&format!("{name}.tmp"));

        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|source| PersistenceError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| PersistenceError::Io { path, source })
    }

    async fn write_snapshot<T: Serialize>(&self, name: &str, value: &T) -> PersistenceResult<()> {
        let json = serde_json::to_vec_pretty(value)?;
        self.replace_file(name, json).await
    }
}

#[async_trait]
impl TrackerStore for JsonFileStore {
    async fn append_entry(&self, entry: &RequestLogEntry) -> PersistenceResult<()> {
        self.ensure_dir().await?;
        let path = self.path(LOG_FILE);

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| PersistenceError::Io {
                path: path.clone(),
                source,
            })?;
        file.write_all(&line)
            .await
            .map_err(|source| PersistenceError::Io {
                path: path.clone(),
                source,
            })?;
        file.flush()
            .await
            .map_err(|source| PersistenceError::Io { path, source })
    }

    async fn read_entries(&self) -> PersistenceResult<Vec<RequestLogEntry>> {
        let Some(contents) = self.read_optional(LOG_FILE).await? else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RequestLogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!("Skipping corrupt request log line {}: {}", lineno + 1, e),
            }
        }
        Ok(entries)
    }

    async fn overwrite_entries(&self, entries: &[RequestLogEntry]) -> PersistenceResult<()> {
        let mut buf = Vec::with_capacity(entries.len() * 160);
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }
        self.replace_file(LOG_FILE, buf).await
    }

    async fn read_stats(&self) -> PersistenceResult<Option<RequestStats>> {
        self.read_snapshot(STATS_FILE).await
    }

    async fn write_stats(&self, stats: &RequestStats) -> PersistenceResult<()> {
        self.write_snapshot(STATS_FILE, stats).await
    }

    async fn read_policy(&self) -> PersistenceResult<Option<RateLimitPolicy>> {
        self.read_snapshot(POLICY_FILE).await
    }

    async fn write_policy(&self, policy: &RateLimitPolicy) -> PersistenceResult<()> {
        self.write_snapshot(POLICY_FILE, policy).await
    }
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    entries: Vec<RequestLogEntry>,
    stats: Option<RequestStats>,
    policy: Option<RateLimitPolicy>,
}

/// Process-local store; state is lost on drop
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackerStore for MemoryStore {
    async fn append_entry(&self, entry: &RequestLogEntry) -> PersistenceResult<()> {
        self.state.lock().entries.push(entry.clone());
        Ok(())
    }

    async fn read_entries(&self) -> PersistenceResult<Vec<RequestLogEntry>> {
        Ok(self.state.lock().entries.clone())
    }

    async fn overwrite_entries(&self, entries: &[RequestLogEntry]) -> PersistenceResult<()> {
        self.state.lock().entries = entries.to_vec();
        Ok(())
    }

    async fn read_stats(&self) -> PersistenceResult<Option<RequestStats>> {
        Ok(self.state.lock().stats.clone())
    }

    async fn write_stats(&self, stats: &RequestStats) -> PersistenceResult<()> {
        self.state.lock().stats = Some(stats.clone());
        Ok(())
    }

    async fn read_policy(&self) -> PersistenceResult<Option<RateLimitPolicy>> {
        Ok(self.state.lock().policy)
    }

    async fn write_policy(&self, policy: &RateLimitPolicy) -> PersistenceResult<()> {
        self.state.lock().policy = Some(*policy);
        Ok(())
    }
}
