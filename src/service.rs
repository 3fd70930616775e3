//! Listing scraper service: cached searches over the crawler, plus the
//! status and policy operations behind the admin endpoints
//!
//! One `ListingScraper` owns the tracker, cache and (in browser mode) the
//! session pool for the lifetime of the process. Call [`ListingScraper::start`]
//! once after construction and [`ListingScraper::shutdown`] before exit.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser_pool::{
    BrowserPool, BrowserSession, BrowserSource, ChromiumBackend, PoolStatus, ResourcePool,
    SessionBackend,
};
use crate::config::{FetchMode, ScrapeConfig};
use crate::crawl_engine::{
    BrowserFetcher, CrawlOutcome, Filters, HttpFetcher, ListingSource, PageCrawler, PageFetcher,
    Termination,
};
use crate::page_extractor::SelectorSource;
use crate::request_tracker::{
    DenialReason, JsonFileStore, RateLimitPolicy, RateLimitUpdate, RequestLogEntry,
    RequestStats, RequestTracker,
};
use crate::result_cache::{ResultCache, ResultCacheConfig};

/// Caller-facing failures of a search
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Request refused: {reason}; retry after {retry_after_secs}s")]
    AdmissionDenied {
        reason: DenialReason,
        retry_after_secs: u64,
    },

    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("Listing page could not be parsed: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// A search submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRequest {
    pub filters: Filters,
    /// Falls back to the configured default when absent
    pub max_results: Option<usize>,
    pub max_pages: Option<u32>,
}

/// Items and pagination state returned for a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse<T> {
    pub items: Vec<T>,
    pub total_found: usize,
    pub total_pages: u32,
    pub current_page: u32,
    pub has_next_page: bool,
    pub termination: Termination,
    /// Crawl ended early; `items` are what was collected before the stop
    pub partial: bool,
    /// Served from the result cache
    pub cached: bool,
}

impl<T> SearchResponse<T> {
    fn from_outcome(outcome: CrawlOutcome<T>, cached: bool) -> Self {
        Self {
            partial: outcome.termination.is_early(),
            items: outcome.items,
            total_found: outcome.total_found,
            total_pages: outcome.total_pages,
            current_page: outcome.current_page,
            has_next_page: outcome.has_next_page,
            termination: outcome.termination,
            cached,
        }
    }
}

/// Administrative snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub stats: RequestStats,
    pub limits: RateLimitPolicy,
    pub uptime_secs: u64,
    pub cache_entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStatus>,
}

pub struct ListingScraper<S: ListingSource> {
    crawler: PageCrawler<S>,
    tracker: Arc<RequestTracker>,
    cache: Arc<ResultCache<CrawlOutcome<S::Item>>>,
    pool: Option<Arc<BrowserPool>>,
    default_max_results: usize,
    default_max_pages: u32,
    started_at: Instant,
}

impl<S: ListingSource> ListingScraper<S> {
    pub fn new(
        crawler: PageCrawler<S>,
        tracker: Arc<RequestTracker>,
        cache_config: ResultCacheConfig,
    ) -> Self {
        Self {
            crawler,
            tracker,
            cache: Arc::new(ResultCache::new(cache_config)),
            pool: None,
            default_max_results: crate::utils::DEFAULT_MAX_RESULTS,
            default_max_pages: crate::utils::DEFAULT_MAX_PAGES,
            started_at: Instant::now(),
        }
    }

    /// Own `pool`: report it in status, start and shut it down with the service
    #[must_use]
    pub fn with_pool(mut self, pool: Arc<BrowserPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Caps applied when a request leaves them unset
    #[must_use]
    pub fn with_defaults(mut self, max_results: usize, max_pages: u32) -> Self {
        self.default_max_results = max_results;
        self.default_max_pages = max_pages.max(1);
        self
    }

    pub fn tracker(&self) -> &Arc<RequestTracker> {
        &self.tracker
    }

    /// Start background sweepers (result cache, session pool)
    pub fn start(&self) {
        self.cache.start_cleanup_task();
        if let Some(pool) = &self.pool {
            pool.start();
        }
        info!("Listing scraper started for source {}", self.crawler.source().name());
    }

    pub async fn shutdown(&self) {
        info!("Shutting down listing scraper");
        self.cache.shutdown();
        if let Some(pool) = &self.pool {
            pool.shutdown().await;
        }
    }

    /// Run a search, serving it from cache when a fresh result exists
    ///
    /// A crawl that stops early with nothing collected is an error; one that
    /// stops early after collecting items returns them flagged `partial` and
    /// is not cached.
    pub async fn search(
        &self,
        request: SearchRequest,
    ) -> Result<SearchResponse<S::Item>, ScrapeError> {
        let max_results = request.max_results.unwrap_or(self.default_max_results);
        let max_pages = request.max_pages.unwrap_or(self.default_max_pages).max(1);
        let scope = format!("{max_results}:{max_pages}");

        if let Some(outcome) = self.cache.get(&request.filters, &scope) {
            debug!("Serving search from cache (scope {})", scope);
            return Ok(SearchResponse::from_outcome(outcome, true));
        }

        let outcome = self
            .crawler
            .crawl(&request.filters, max_results, max_pages)
            .await;

        if outcome.items.is_empty() {
            match &outcome.termination {
                Termination::RateLimited {
                    reason,
                    retry_after_ms,
                } => {
                    return Err(ScrapeError::AdmissionDenied {
                        reason: *reason,
                        retry_after_secs: retry_after_ms.div_ceil(1000),
                    });
                }
                Termination::FetchFailed { message } => {
                    return Err(ScrapeError::UpstreamFetch(message.clone()));
                }
                Termination::ParseFailed { message } => {
                    return Err(ScrapeError::Parse(message.clone()));
                }
                _ => {}
            }
        }

        if outcome.termination.is_early() {
            warn!(
                "Search ended early with {} item(s): {:?}",
                outcome.items.len(),
                outcome.termination
            );
        } else {
            self.cache.set(&request.filters, &scope, outcome.clone());
        }

        Ok(SearchResponse::from_outcome(outcome, false))
    }

    pub async fn status(&self) -> StatusReport {
        StatusReport {
            stats: self.tracker.stats().await,
            limits: self.tracker.rate_limits().await,
            uptime_secs: self.started_at.elapsed().as_secs(),
            cache_entries: self.cache.len(),
            pool: self.pool.as_ref().map(|pool| pool.status()),
        }
    }

    /// Merge `update` into the persisted rate-limit policy
    pub async fn configure(&self, update: RateLimitUpdate) -> RateLimitPolicy {
        self.tracker.set_rate_limits(update).await
    }

    /// Newest request log entries first
    pub async fn recent_requests(&self, limit: usize) -> Vec<RequestLogEntry> {
        self.tracker.recent_requests(limit).await
    }

    pub async fn reset_stats(&self) {
        self.tracker.reset_stats().await;
    }
}

impl ListingScraper<SelectorSource> {
    /// Wire up tracker, fetcher, source and (in browser mode) the session pool
    pub fn from_config(config: &ScrapeConfig) -> Result<Self, ScrapeError> {
        let store = Arc::new(JsonFileStore::new(config.storage_dir()));
        let tracker = Arc::new(
            RequestTracker::new(store, config.rate_limits())
                .with_max_log_entries(config.max_log_entries()),
        );

        let source = SelectorSource::new(config.source().clone())
            .map_err(|e| ScrapeError::Config(e.to_string()))?;

        let (fetcher, pool): (Arc<dyn PageFetcher>, Option<Arc<BrowserPool>>) =
            match config.fetch_mode() {
                FetchMode::Http => {
                    let fetcher = HttpFetcher::new(config.fetch_timeout(), config.user_agent())
                        .map_err(|e| ScrapeError::Config(e.to_string()))?;
                    (Arc::new(fetcher), None)
                }
                FetchMode::Browser => {
                    let headless = config.pool().headless;
                    let primary: Arc<dyn SessionBackend<Handle = BrowserSession>> =
                        Arc::new(ChromiumBackend::new(BrowserSource::System, headless));
                    let fallback: Arc<dyn SessionBackend<Handle = BrowserSession>> =
                        Arc::new(ChromiumBackend::new(BrowserSource::Managed, headless));
                    let pool = ResourcePool::new(config.pool().clone(), primary, Some(fallback));
                    let fetcher = BrowserFetcher::new(Arc::clone(&pool), config.fetch_timeout());
                    (Arc::new(fetcher), Some(pool))
                }
            };

        let crawler = PageCrawler::new(
            Arc::new(source),
            fetcher,
            Arc::clone(&tracker),
            *config.crawl(),
        );

        let scraper = Self::new(crawler, tracker, *config.cache())
            .with_defaults(config.default_max_results(), config.default_max_pages());
        Ok(match pool {
            Some(pool) => scraper.with_pool(pool),
            None => scraper,
        })
    }
}
