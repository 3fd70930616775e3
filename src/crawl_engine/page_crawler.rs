//! Sequential multi-page crawl for one search
//!
//! Pages are fetched strictly in order with a fixed delay between them.
//! Every fetch is admitted by the [`RequestTracker`] first and logged to it
//! afterwards, success or failure. A failure part-way through ends the crawl
//! but keeps whatever earlier pages produced.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::crawl_types::{CrawlOutcome, CrawlRequest, Filters, Termination};
use super::fetcher::{FetchError, PageFetcher};
use super::source::ListingSource;
use crate::request_tracker::{DenialReason, RateLimitCheck, RequestLogEntry, RequestTracker};
use crate::utils::{DEFAULT_INTER_PAGE_DELAY, MAX_PAGE_CEILING};

/// Pacing and hard bounds applied to every crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    /// Pause between consecutive page fetches (default: 500ms)
    #[serde(rename = "inter_page_delay_ms", with = "crate::utils::serde_millis")]
    pub inter_page_delay: Duration,
    /// Pages never fetched past this index, whatever pagination says (default: 50)
    pub max_page_ceiling: u32,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            inter_page_delay: DEFAULT_INTER_PAGE_DELAY,
            max_page_ceiling: MAX_PAGE_CEILING,
        }
    }
}

/// Crawls one [`ListingSource`] through a [`PageFetcher`]
pub struct PageCrawler<S: ListingSource> {
    source: Arc<S>,
    fetcher: Arc<dyn PageFetcher>,
    tracker: Arc<RequestTracker>,
    settings: CrawlSettings,
}

impl<S: ListingSource> PageCrawler<S> {
    pub fn new(
        source: Arc<S>,
        fetcher: Arc<dyn PageFetcher>,
        tracker: Arc<RequestTracker>,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            source,
            fetcher,
            tracker,
            settings,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Collect up to `max_results` complete items across at most `max_pages` pages
    ///
    /// Never fails: the outcome's [`Termination`] says why it stopped, and
    /// items gathered before an early stop are kept.
    pub async fn crawl(
        &self,
        filters: &Filters,
        max_results: usize,
        max_pages: u32,
    ) -> CrawlOutcome<S::Item> {
        if max_results == 0 {
            return CrawlOutcome::empty(Termination::Capped);
        }

        let headers = self.source.headers();
        let mut outcome = CrawlOutcome::empty(Termination::LastPage);
        let mut page = 1u32;

        info!(
            "Starting {} crawl (max_results={}, max_pages={})",
            self.source.name(),
            max_results,
            max_pages
        );

        outcome.termination = loop {
            if let Err(denied) = self.admit(page).await {
                break denied;
            }

            let request = CrawlRequest {
                filters: filters.clone(),
                page,
                max_results,
                max_pages,
            };
            let url = self.source.page_url(&request);

            let body = match self.fetch_logged(&url, &headers).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Page {} fetch failed: {}", page, e);
                    break Termination::FetchFailed {
                        message: e.to_string(),
                    };
                }
            };

            let parsed = match self.source.parse(&body) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Page {} could not be parsed: {}", page, e);
                    break Termination::ParseFailed {
                        message: e.to_string(),
                    };
                }
            };

            outcome.current_page = page;
            outcome.has_next_page = parsed.pagination.has_next_page;
            if page == 1 {
                outcome.total_pages = parsed.pagination.total_pages.max(1);
            }

            let found = parsed.items.len();
            let complete: Vec<S::Item> = parsed
                .items
                .into_iter()
                .filter(|item| self.source.is_complete(item))
                .collect();
            if complete.len() < found {
                debug!(
                    "Page {}: dropped {} incomplete item(s)",
                    page,
                    found - complete.len()
                );
            }

            if page == 1 && complete.is_empty() {
                info!("First page returned no results, ending crawl");
                break Termination::NoResults;
            }

            let room = max_results - outcome.items.len();
            outcome.items.extend(complete.into_iter().take(room));
            debug!(
                "Page {}/{}: {} item(s) collected so far",
                page,
                outcome.total_pages,
                outcome.items.len()
            );

            if outcome.items.len() >= max_results {
                break Termination::Capped;
            }
            if page >= outcome.total_pages {
                break Termination::LastPage;
            }
            if page >= max_pages {
                break Termination::MaxPages;
            }
            if page >= self.settings.max_page_ceiling {
                break Termination::PageCeiling;
            }

            tokio::time::sleep(self.settings.inter_page_delay).await;
            page += 1;
        };

        outcome.total_found = outcome.items.len();
        info!(
            "Crawl finished after page {}: {} item(s), {:?}",
            outcome.current_page, outcome.total_found, outcome.termination
        );
        outcome
    }

    /// Ask the tracker whether page `page` may be fetched now
    ///
    /// Past page 1 a minimum-delay denial is waited out once, since the
    /// inter-page delay can be shorter than the policy's spacing.
    async fn admit(&self, page: u32) -> Result<(), Termination> {
        let mut check = self.tracker.check_rate_limits().await;
        if page > 1 && check.reason == Some(DenialReason::MinDelay) {
            debug!("Waiting {}ms for minimum request spacing", check.wait_time_ms);
            tokio::time::sleep(Duration::from_millis(check.wait_time_ms)).await;
            check = self.tracker.check_rate_limits().await;
        }
        denial(check).map_or(Ok(()), Err)
    }

    /// Fetch one page and record the attempt in the tracker
    async fn fetch_logged(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<String, FetchError> {
        let started = Instant::now();
        let result = self.fetcher.fetch(url, headers).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = result.and_then(|page| {
            if page.is_success() {
                Ok(page)
            } else {
                Err(FetchError::Status {
                    status: page.status,
                    url: url.to_string(),
                })
            }
        });

        match result {
            Ok(page) => {
                self.tracker
                    .log_request(RequestLogEntry::success(url, page.status, elapsed_ms))
                    .await;
                Ok(page.body)
            }
            Err(e) => {
                let response_time = matches!(e, FetchError::Status { .. }).then_some(elapsed_ms);
                self.tracker
                    .log_request(RequestLogEntry::failure(
                        url,
                        e.status_code(),
                        e.to_string(),
                        response_time,
                    ))
                    .await;
                Err(e)
            }
        }
    }
}

fn denial(check: RateLimitCheck) -> Option<Termination> {
    if check.can_proceed {
        return None;
    }
    let reason = check.reason?;
    info!("Crawl stopped by rate limit: {} (retry in {}ms)", reason, check.wait_time_ms);
    Some(Termination::RateLimited {
        reason,
        retry_after_ms: check.wait_time_ms,
    })
}
