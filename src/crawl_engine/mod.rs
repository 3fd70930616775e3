//! Crawl Engine Module
//!
//! Multi-page listing crawls: page fetchers, the listing-source seam,
//! pagination discovery, and the sequential crawl loop that ties them to
//! the request tracker.

// Sub-modules
pub mod crawl_types;
pub mod fetcher;
pub mod page_crawler;
pub mod pagination;
pub mod source;

// Re-export crawl types
pub use crawl_types::{CrawlOutcome, CrawlRequest, Filters, ParseError, Termination};

// Re-export fetchers
pub use fetcher::{BrowserFetcher, FetchError, FetchedPage, HttpFetcher, PageFetcher};

pub use page_crawler::{CrawlSettings, PageCrawler};
pub use pagination::{PaginationMeta, PaginationSelectors};
pub use source::{ListingSource, ParsedPage};
