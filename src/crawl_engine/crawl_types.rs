//! Core types for multi-page listing crawls.
//!
//! A crawl is one logical retrieval for a single search: pages are fetched
//! strictly in order and the result carries why the crawl stopped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request_tracker::DenialReason;

/// Search filters as submitted by the caller (city, rooms, price range, ...)
///
/// Key order carries no meaning; see `result_cache::cache_key`.
pub type Filters = serde_json::Map<String, serde_json::Value>;

/// Parameters of one page fetch within a crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequest {
    pub filters: Filters,
    pub page: u32,
    pub max_results: usize,
    pub max_pages: u32,
}

/// Page content could not be turned into items
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("Invalid CSS selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Invalid listing URL '{url}': {message}")]
    Url { url: String, message: String },

    #[error("Unparseable page content: {0}")]
    Malformed(String),
}

/// Why a crawl stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// `max_results` items collected
    Capped,
    /// Last discovered page fetched
    LastPage,
    /// First page had no complete items
    NoResults,
    /// Caller's `max_pages` reached
    MaxPages,
    /// Hard page ceiling reached regardless of pagination
    PageCeiling,
    /// Admission control refused the next request
    RateLimited {
        reason: DenialReason,
        retry_after_ms: u64,
    },
    /// Non-2xx status or network failure
    FetchFailed { message: String },
    /// Page content unparseable
    ParseFailed { message: String },
}

impl Termination {
    /// True when the crawl ended before reaching a natural limit
    #[must_use]
    pub fn is_early(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::FetchFailed { .. } | Self::ParseFailed { .. }
        )
    }
}

/// Accumulated result of one crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlOutcome<T> {
    /// Items in page order, never more than the requested cap
    pub items: Vec<T>,
    pub total_found: usize,
    /// Upper page bound discovered on page 1 (at least 1)
    pub total_pages: u32,
    /// Last page successfully fetched (0 when none was)
    pub current_page: u32,
    /// Next-page affordance on the last fetched page
    pub has_next_page: bool,
    pub termination: Termination,
}

impl<T> CrawlOutcome<T> {
    pub(crate) fn empty(termination: Termination) -> Self {
        Self {
            items: Vec::new(),
            total_found: 0,
            total_pages: 1,
            current_page: 0,
            has_next_page: false,
            termination,
        }
    }
}
