//! Test utilities shared by the crawler, service and server suites

use async_trait::async_trait;
use kodegen_tools_listingscrape::crawl_engine::{
    CrawlRequest, CrawlSettings, FetchError, FetchedPage, ListingSource, PageCrawler,
    PageFetcher, PaginationMeta, ParseError, ParsedPage,
};
use kodegen_tools_listingscrape::request_tracker::{
    MemoryStore, RateLimitPolicy, RequestTracker,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const BASE: &str = "https://listings.example/search";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub title: String,
    pub price: String,
}

/// Listing source whose pages are JSON documents:
/// `{"items": [...], "totalPages": n, "hasNext": bool}`
pub struct JsonPageSource;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageScript {
    items: Vec<Card>,
    total_pages: u32,
    has_next: bool,
}

impl ListingSource for JsonPageSource {
    type Item = Card;

    fn name(&self) -> &str {
        "json-test"
    }

    fn page_url(&self, request: &CrawlRequest) -> String {
        format!("{BASE}?page={}", request.page)
    }

    fn parse(&self, body: &str) -> Result<ParsedPage<Card>, ParseError> {
        let page: PageScript =
            serde_json::from_str(body).map_err(|e| ParseError::Malformed(e.to_string()))?;
        Ok(ParsedPage {
            items: page.items,
            pagination: PaginationMeta::new(page.total_pages, page.has_next),
        })
    }

    fn is_complete(&self, item: &Card) -> bool {
        !item.title.is_empty() && !item.price.is_empty()
    }
}

pub fn page_url(page: u32) -> String {
    format!("{BASE}?page={page}")
}

/// Body with `count` complete cards titled `p{page}-{i}`
#[allow(dead_code)]
pub fn page_body(page: u32, count: usize, total_pages: u32, has_next: bool) -> String {
    let items: Vec<Card> = (0..count)
        .map(|i| Card {
            title: format!("p{page}-{i}"),
            price: format!("{} ₸", 20_000_000 + i * 1_000_000),
        })
        .collect();
    json!({ "items": items, "totalPages": total_pages, "hasNext": has_next }).to_string()
}

enum Scripted {
    Page(u16, String),
    Network,
}

/// Fetcher answering from a URL → response table; unknown URLs get 404
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, page: u32, body: String) -> Self {
        self.status(page, 200, body)
    }

    pub fn status(self, page: u32, status: u16, body: String) -> Self {
        self.pages
            .lock()
            .insert(page_url(page), Scripted::Page(status, body));
        self
    }

    pub fn network_error(self, page: u32) -> Self {
        self.pages.lock().insert(page_url(page), Scripted::Network);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        url: &str,
        _headers: &[(String, String)],
    ) -> Result<FetchedPage, FetchError> {
        self.calls.lock().push(url.to_string());
        match self.pages.lock().get(url) {
            Some(Scripted::Page(status, body)) => Ok(FetchedPage {
                status: *status,
                body: body.clone(),
            }),
            Some(Scripted::Network) => Err(FetchError::Network {
                url: url.to_string(),
                message: "connection reset by peer".to_string(),
            }),
            None => Ok(FetchedPage {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

/// Limits generous enough never to interfere
#[allow(dead_code)]
pub fn open_policy() -> RateLimitPolicy {
    RateLimitPolicy {
        daily_limit: 10_000,
        hourly_limit: 10_000,
        min_delay_ms: 0,
    }
}

#[allow(dead_code)]
pub fn settings() -> CrawlSettings {
    CrawlSettings {
        inter_page_delay: Duration::from_millis(500),
        max_page_ceiling: 50,
    }
}

#[allow(dead_code)]
pub fn tracker(policy: RateLimitPolicy) -> Arc<RequestTracker> {
    Arc::new(RequestTracker::new(Arc::new(MemoryStore::new()), policy))
}

#[allow(dead_code)]
pub fn crawler(
    fetcher: &Arc<ScriptedFetcher>,
    tracker: &Arc<RequestTracker>,
    settings: CrawlSettings,
) -> PageCrawler<JsonPageSource> {
    let fetcher: Arc<dyn PageFetcher> = fetcher.clone();
    PageCrawler::new(
        Arc::new(JsonPageSource),
        fetcher,
        Arc::clone(tracker),
        settings,
    )
}
