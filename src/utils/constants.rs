//! Shared configuration constants for listingscrape
//!
//! This module contains default values and configuration constants used
//! throughout the codebase to ensure consistency and avoid magic numbers.

use std::time::Duration;

/// Delay between consecutive page fetches of one crawl: 500ms
///
/// Pages of a single search are always fetched sequentially; this pause is
/// inserted before every page after the first.
pub const DEFAULT_INTER_PAGE_DELAY: Duration = Duration::from_millis(500);

/// Hard ceiling on pages per crawl, independent of discovered pagination
pub const MAX_PAGE_CEILING: u32 = 50;

/// Default cap on collected items when a caller does not pass one
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// Default cap on requested pages when a caller does not pass one
pub const DEFAULT_MAX_PAGES: u32 = 10;

/// Per-page fetch timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum browser sessions held by the pool
pub const DEFAULT_MAX_POOL_SIZE: usize = 3;

/// Free sessions idle longer than this are destroyed by the sweeper: 5 minutes
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How often the pool sweeper runs
pub const DEFAULT_POOL_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Re-check interval for callers waiting on a full pool
pub const DEFAULT_POOL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result cache time-to-live: 10 minutes
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Entry count above which an insert triggers a synchronous sweep
pub const DEFAULT_CACHE_SOFT_CAPACITY: usize = 50;

/// Background cache sweep period: 5 minutes
pub const DEFAULT_CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Request log entries kept on disk before the oldest are compacted away
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 10_000;

/// Default listen address for the HTTP surface
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:30446";

/// Chrome user agent string, shared by the HTTP fetcher and launched browsers
///
/// Updated: 2025-01-29 to Chrome 132 (current stable)
///
/// Listing sites serve a reduced page (or a bot wall) to unknown agents, so
/// both fetch paths present the same desktop Chrome identity.
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";
