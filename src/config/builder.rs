//! Type-safe builder for `ScrapeConfig` using the typestate pattern
//!
//! `build()` only exists once the storage directory has been given.

use anyhow::{Result, anyhow};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::time::Duration;

use super::types::{FetchMode, ScrapeConfig, absolute_path};
use crate::browser_pool::BrowserPoolConfig;
use crate::crawl_engine::CrawlSettings;
use crate::page_extractor::SelectorSourceConfig;
use crate::request_tracker::RateLimitPolicy;
use crate::result_cache::ResultCacheConfig;

// Type states for the builder
pub struct WithStorageDir;

pub struct ScrapeConfigBuilder<State = ()> {
    pub(crate) storage_dir: Option<PathBuf>,
    pub(crate) config: ScrapeConfig,
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for ScrapeConfigBuilder<()> {
    fn default() -> Self {
        Self {
            storage_dir: None,
            config: ScrapeConfig::default(),
            _phantom: PhantomData,
        }
    }
}

impl ScrapeConfig {
    /// Create a builder for configuring a `ScrapeConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> ScrapeConfigBuilder<()> {
        ScrapeConfigBuilder::default()
    }
}

impl ScrapeConfigBuilder<()> {
    pub fn storage_dir(self, dir: impl Into<PathBuf>) -> ScrapeConfigBuilder<WithStorageDir> {
        ScrapeConfigBuilder {
            storage_dir: Some(dir.into()),
            config: self.config,
            _phantom: PhantomData,
        }
    }
}

// Build method only available when all required fields are set
impl ScrapeConfigBuilder<WithStorageDir> {
    pub fn build(self) -> Result<ScrapeConfig> {
        let storage_dir = self
            .storage_dir
            .ok_or_else(|| anyhow!("storage_dir is required"))?;

        // Enforce headless mode in release builds for production safety
        #[cfg(not(debug_assertions))]
        let headless = {
            if !self.config.pool.headless {
                tracing::warn!(
                    "Forcing headless mode in release build. \
                    Headed mode is only available in debug builds for development."
                );
            }
            true
        };

        #[cfg(debug_assertions)]
        let headless = self.config.pool.headless;

        let config = ScrapeConfig {
            storage_dir: absolute_path(&storage_dir)?,
            pool: BrowserPoolConfig {
                headless,
                ..self.config.pool
            },
            ..self.config
        };
        config.validate()?;
        Ok(config)
    }
}

// Builder methods available at any state
impl<State> ScrapeConfigBuilder<State> {
    /// Default admission policy (see [`RateLimitPolicy::high_volume`] and
    /// [`RateLimitPolicy::conservative`])
    #[must_use]
    pub fn rate_limits(mut self, policy: RateLimitPolicy) -> Self {
        self.config.rate_limits = policy;
        self
    }

    #[must_use]
    pub fn max_log_entries(mut self, max: usize) -> Self {
        self.config.max_log_entries = max;
        self
    }

    #[must_use]
    pub fn inter_page_delay(mut self, delay: Duration) -> Self {
        self.config.crawl.inter_page_delay = delay;
        self
    }

    #[must_use]
    pub fn max_page_ceiling(mut self, pages: u32) -> Self {
        self.config.crawl.max_page_ceiling = pages;
        self
    }

    #[must_use]
    pub fn crawl(mut self, settings: CrawlSettings) -> Self {
        self.config.crawl = settings;
        self
    }

    #[must_use]
    pub fn default_max_results(mut self, max: usize) -> Self {
        self.config.default_max_results = max;
        self
    }

    #[must_use]
    pub fn default_max_pages(mut self, max: u32) -> Self {
        self.config.default_max_pages = max;
        self
    }

    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn fetch_mode(mut self, mode: FetchMode) -> Self {
        self.config.fetch_mode = mode;
        self
    }

    #[must_use]
    pub fn pool(mut self, pool: BrowserPoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.pool.headless = headless;
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: ResultCacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    #[must_use]
    pub fn source(mut self, source: SelectorSourceConfig) -> Self {
        self.config.source = source;
        self
    }

    #[must_use]
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }
}
