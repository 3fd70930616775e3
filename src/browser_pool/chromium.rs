//! Chromium session backend
//!
//! Primary deployments use the system Chrome ([`BrowserSource::System`]);
//! the managed download ([`BrowserSource::Managed`]) is the fallback the
//! pool tries when the system browser cannot be launched.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::SessionBackend;
use crate::browser_profile::create_unique_profile_with_prefix;
use crate::browser_setup::{download_managed_browser, find_browser_executable, launch_browser};

const PROFILE_PREFIX: &str = "listingscrape_chrome_pool";

/// Where the Chrome executable comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserSource {
    /// Installed Chrome/Chromium (or `CHROMIUM_PATH`)
    System,
    /// Chromium downloaded by the chromiumoxide fetcher
    Managed,
}

/// A launched browser together with its CDP handler task and profile dir
#[derive(Debug)]
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserSession {
    fn new(browser: Browser, handler: JoinHandle<()>, user_data_dir: PathBuf) -> Self {
        Self {
            browser,
            handler,
            user_data_dir: Some(user_data_dir),
        }
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Remove the profile directory (blocking; Chrome must have exited)
    fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            info!("Cleaning up pool browser temp directory: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "Failed to clean up temp directory {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
        if self.user_data_dir.is_some() {
            self.cleanup_temp_dir();
        }
    }
}

/// Launches headless Chrome instances for the pool
#[derive(Debug, Clone)]
pub struct ChromiumBackend {
    source: BrowserSource,
    headless: bool,
    name: &'static str,
}

impl ChromiumBackend {
    #[must_use]
    pub fn new(source: BrowserSource, headless: bool) -> Self {
        let name = match source {
            BrowserSource::System => "chromium-system",
            BrowserSource::Managed => "chromium-managed",
        };
        Self {
            source,
            headless,
            name,
        }
    }

    async fn executable(&self) -> Result<PathBuf> {
        match self.source {
            BrowserSource::System => find_browser_executable().await,
            BrowserSource::Managed => download_managed_browser().await,
        }
    }
}

#[async_trait]
impl SessionBackend for ChromiumBackend {
    type Handle = BrowserSession;

    fn name(&self) -> &str {
        self.name
    }

    async fn create(&self) -> Result<BrowserSession> {
        let executable = self.executable().await?;

        // Dropping the profile on a failed launch removes the directory
        let profile = create_unique_profile_with_prefix(PROFILE_PREFIX)
            .context("Failed to create unique pool browser profile")?;

        let (browser, handler) = launch_browser(executable, self.headless, profile.path())
            .await
            .context("Failed to launch browser for pool")?;

        Ok(BrowserSession::new(browser, handler, profile.into_path()))
    }

    async fn destroy(&self, handle: Arc<BrowserSession>) -> Result<()> {
        match Arc::try_unwrap(handle) {
            Ok(mut session) => {
                let closed = session.browser.close().await;
                if let Err(e) = session.browser.wait().await {
                    warn!("Failed to wait for browser exit: {}", e);
                }
                session.cleanup_temp_dir();
                closed.context("Failed to close browser")?;
                Ok(())
            }
            Err(_) => {
                // Drop of the last clone aborts the handler and removes the profile
                warn!("Browser session has outstanding references, skipping graceful close");
                Ok(())
            }
        }
    }
}
