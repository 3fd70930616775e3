pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod config;
pub mod crawl_engine;
pub mod page_extractor;
pub mod request_tracker;
pub mod result_cache;
pub mod server;
pub mod service;
pub mod utils;

pub use browser_pool::{BrowserPool, BrowserPoolConfig, PoolError, PooledSession, ResourcePool};
pub use config::{FetchMode, ScrapeConfig};
pub use crawl_engine::{
    CrawlOutcome, CrawlRequest, Filters, ListingSource, PageCrawler, PageFetcher, Termination,
};
pub use page_extractor::{ListingItem, SelectorSource, SelectorSourceConfig};
pub use request_tracker::{
    RateLimitCheck, RateLimitPolicy, RateLimitUpdate, RequestLogEntry, RequestStats,
    RequestTracker,
};
pub use result_cache::{ResultCache, ResultCacheConfig, cache_key};
pub use service::{ListingScraper, ScrapeError, SearchRequest, SearchResponse, StatusReport};
