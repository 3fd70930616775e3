//! Chrome profile directory management
//!
//! Every pooled browser gets its own UUID-named profile directory so
//! concurrent instances never contend on Chrome's SingletonLock.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// RAII wrapper for a Chrome profile directory
///
/// Removes the directory on drop unless ownership is handed off with
/// [`BrowserProfile::into_path`].
#[derive(Debug)]
pub struct BrowserProfile {
    path: PathBuf,
    cleanup_on_drop: bool,
}

impl BrowserProfile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            cleanup_on_drop: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume the profile and return the path, disabling auto-cleanup
    ///
    /// Used once the directory is owned by a live `BrowserSession`.
    pub fn into_path(mut self) -> PathBuf {
        self.cleanup_on_drop = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for BrowserProfile {
    fn drop(&mut self) {
        if self.cleanup_on_drop && self.path.exists() {
            debug!("BrowserProfile cleanup: removing {}", self.path.display());
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!("Failed to cleanup profile directory {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Create a unique profile directory under the system temp dir
///
/// `create_dir` (not `create_dir_all`) makes creation fail on a UUID collision
/// instead of silently sharing a directory.
pub fn create_unique_profile_with_prefix(prefix: &str) -> Result<BrowserProfile> {
    let path = std::env::temp_dir().join(format!("{}_{}", prefix, Uuid::new_v4()));

    std::fs::create_dir(&path)
        .with_context(|| format!("Failed to create profile directory: {}", path.display()))?;

    info!("Created Chrome profile directory: {}", path.display());
    Ok(BrowserProfile::new(path))
}
