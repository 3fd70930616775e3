//! Listing source: where a search's pages live and how to read them

use serde::Serialize;

use super::crawl_types::{CrawlRequest, ParseError};
use super::pagination::PaginationMeta;

/// Items and pagination read from one page
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage<T> {
    pub items: Vec<T>,
    pub pagination: PaginationMeta,
}

/// A listing site as seen by the crawler
///
/// Parsing internals are opaque to the crawl loop; it only needs URLs,
/// parsed pages, and a completeness check to drop half-extracted items.
pub trait ListingSource: Send + Sync {
    type Item: Clone + Send + Sync + Serialize + 'static;

    fn name(&self) -> &str;

    /// URL of the page described by `request`
    fn page_url(&self, request: &CrawlRequest) -> String;

    /// Extra request headers sent with every page fetch
    fn headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn parse(&self, body: &str) -> Result<ParsedPage<Self::Item>, ParseError>;

    /// Required-field validation; items failing it are dropped
    fn is_complete(&self, _item: &Self::Item) -> bool {
        true
    }
}
