//! Core configuration types for the listing scraper
//!
//! `ScrapeConfig` gathers the per-component settings (tracker policy, crawl
//! pacing, session pool, result cache, listing source) plus the paths and
//! addresses the binary needs.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::browser_pool::BrowserPoolConfig;
use crate::crawl_engine::CrawlSettings;
use crate::page_extractor::SelectorSourceConfig;
use crate::request_tracker::RateLimitPolicy;
use crate::result_cache::ResultCacheConfig;
use crate::utils::{
    CHROME_USER_AGENT, DEFAULT_FETCH_TIMEOUT, DEFAULT_LISTEN_ADDR, DEFAULT_MAX_LOG_ENTRIES,
    DEFAULT_MAX_PAGES, DEFAULT_MAX_RESULTS,
};

/// How listing pages are retrieved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Plain HTTP GET
    #[default]
    Http,
    /// Render in a pooled headless browser
    Browser,
}

/// Main configuration struct for the scraper service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Directory holding the request log, stats and policy files.
    ///
    /// **INVARIANT:** Always an absolute path (normalized on build/load).
    pub(crate) storage_dir: PathBuf,
    /// Policy used until one is persisted through the admin endpoint
    pub(crate) rate_limits: RateLimitPolicy,
    pub(crate) max_log_entries: usize,
    pub(crate) crawl: CrawlSettings,
    /// Cap applied when a search does not name one
    pub(crate) default_max_results: usize,
    pub(crate) default_max_pages: u32,
    #[serde(rename = "fetch_timeout_ms", with = "crate::utils::serde_millis")]
    pub(crate) fetch_timeout: Duration,
    pub(crate) user_agent: String,
    pub(crate) fetch_mode: FetchMode,
    pub(crate) pool: BrowserPoolConfig,
    pub(crate) cache: ResultCacheConfig,
    pub(crate) source: SelectorSourceConfig,
    pub(crate) listen_addr: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            rate_limits: RateLimitPolicy::default(),
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
            crawl: CrawlSettings::default(),
            default_max_results: DEFAULT_MAX_RESULTS,
            default_max_pages: DEFAULT_MAX_PAGES,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            user_agent: CHROME_USER_AGENT.to_string(),
            fetch_mode: FetchMode::default(),
            pool: BrowserPoolConfig::default(),
            cache: ResultCacheConfig::default(),
            source: SelectorSourceConfig::default(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

/// `<data_local_dir>/listingscrape`, or `./listingscrape` when the platform has none
#[must_use]
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("listingscrape")
}

impl ScrapeConfig {
    /// Load a full configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.storage_dir = absolute_path(&config.storage_dir)?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.pool.max_pool_size == 0 {
            bail!("pool.max_pool_size must be at least 1");
        }
        if self.crawl.max_page_ceiling == 0 {
            bail!("crawl.max_page_ceiling must be at least 1");
        }
        if self.default_max_pages == 0 {
            bail!("default_max_pages must be at least 1");
        }
        url::Url::parse(&self.source.base_url)
            .with_context(|| format!("Invalid source.base_url '{}'", self.source.base_url))?;
        Ok(())
    }

    // Getters

    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    #[must_use]
    pub fn rate_limits(&self) -> RateLimitPolicy {
        self.rate_limits
    }

    #[must_use]
    pub fn max_log_entries(&self) -> usize {
        self.max_log_entries
    }

    #[must_use]
    pub fn crawl(&self) -> &CrawlSettings {
        &self.crawl
    }

    #[must_use]
    pub fn default_max_results(&self) -> usize {
        self.default_max_results
    }

    #[must_use]
    pub fn default_max_pages(&self) -> u32 {
        self.default_max_pages
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    #[must_use]
    pub fn pool(&self) -> &BrowserPoolConfig {
        &self.pool
    }

    #[must_use]
    pub fn cache(&self) -> &ResultCacheConfig {
        &self.cache
    }

    #[must_use]
    pub fn source(&self) -> &SelectorSourceConfig {
        &self.source
    }

    #[must_use]
    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }
}

pub(crate) fn absolute_path(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("Failed to resolve storage dir {}", path.display()))
}
