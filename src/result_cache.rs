//! TTL cache for completed search results
//!
//! Entries are keyed by the canonical form of the search filters plus a
//! scope string, so logically equal searches share an entry whatever their
//! key order. Staleness is decided on read; removal only happens in
//! [`ResultCache::sweep`], which runs on a timer and whenever an insert
//! pushes the map past its soft capacity.

use dashmap::DashMap;
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::crawl_engine::Filters;
use crate::utils::{DEFAULT_CACHE_SOFT_CAPACITY, DEFAULT_CACHE_SWEEP_INTERVAL, DEFAULT_CACHE_TTL};

/// Cache tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultCacheConfig {
    /// Maximum age at which an entry is still served (default: 10 minutes)
    #[serde(rename = "ttl_ms", with = "crate::utils::serde_millis")]
    pub ttl: Duration,
    /// Entry count past which an insert triggers a sweep (default: 50)
    pub soft_capacity: usize,
    /// Period of the background sweep (default: 5 minutes)
    #[serde(rename = "sweep_interval_ms", with = "crate::utils::serde_millis")]
    pub sweep_interval: Duration,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            soft_capacity: DEFAULT_CACHE_SOFT_CAPACITY,
            sweep_interval: DEFAULT_CACHE_SWEEP_INTERVAL,
        }
    }
}

struct CacheEntry<V> {
    payload: V,
    stored_at: Instant,
}

/// Build the cache key for `filters` within `scope`
///
/// Object keys are sorted at every nesting level; array order is kept.
#[must_use]
pub fn cache_key(filters: &Filters, scope: &str) -> String {
    let mut key = String::with_capacity(64);
    write_canonical_object(filters, &mut key);
    key.push('|');
    key.push_str(scope);
    key
}

fn write_canonical_object(map: &Filters, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_json_string(key, out);
        out.push(':');
        if let Some(value) = map.get(key) {
            write_canonical(value, out);
        }
    }
    out.push('}');
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_json_string(s, out),
        Value::Null | Value::Bool(_) | Value::Number(_) => {
            let _ = write!(out, "{value}");
        }
    }
}

fn write_json_string(s: &str, out: &mut String) {
    // Display of a string Value is its quoted, escaped JSON form
    let _ = write!(out, "{}", Value::String(s.to_string()));
}

/// Concurrent TTL map of search results
pub struct ResultCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    config: ResultCacheConfig,
    cleanup_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<V: Clone + Send + Sync + 'static> ResultCache<V> {
    #[must_use]
    pub fn new(config: ResultCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            cleanup_handle: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ResultCacheConfig {
        &self.config
    }

    /// Cached payload for `filters`/`scope`, if stored no longer than `ttl` ago
    ///
    /// A stale entry reads as a miss but stays in the map until swept.
    #[must_use]
    pub fn get(&self, filters: &Filters, scope: &str) -> Option<V> {
        self.get_by_key(&cache_key(filters, scope))
    }

    #[must_use]
    pub fn get_by_key(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        let age = entry.stored_at.elapsed();
        if age > self.config.ttl {
            debug!("Cache entry stale ({:?} old): {}", age, key);
            return None;
        }
        debug!("Cache hit: {}", key);
        Some(entry.payload.clone())
    }

    /// Store `payload` with a fresh timestamp, replacing any previous entry
    pub fn set(&self, filters: &Filters, scope: &str, payload: V) {
        let key = cache_key(filters, scope);
        self.entries.insert(
            key,
            CacheEntry {
                payload,
                stored_at: Instant::now(),
            },
        );

        if self.entries.len() > self.config.soft_capacity {
            debug!(
                "Cache above soft capacity ({} > {}), sweeping",
                self.entries.len(),
                self.config.soft_capacity
            );
            self.sweep();
        }
    }

    /// Remove every entry older than `ttl`; returns how many were removed
    pub fn sweep(&self) -> usize {
        let ttl = self.config.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.stored_at.elapsed() <= ttl);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(
                "Swept {} stale cache entries ({} remain)",
                removed,
                self.entries.len()
            );
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Start the periodic background sweep (call once after wrapping in `Arc`)
    pub fn start_cleanup_task(self: &Arc<Self>) {
        let cache = Arc::clone(self);
        let period = self.config.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                cache.sweep();
            }
        });
        if let Some(previous) = self.cleanup_handle.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the background sweep and drop all entries
    pub fn shutdown(&self) {
        if let Some(handle) = self.cleanup_handle.lock().take() {
            handle.abort();
        }
        let count = self.entries.len();
        self.entries.clear();
        info!("Result cache shutdown complete: {} entries released", count);
    }
}
