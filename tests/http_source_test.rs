// HTTP fetcher and selector-driven source against a mock listing site
use kodegen_tools_listingscrape::crawl_engine::{
    CrawlSettings, FetchError, Filters, HttpFetcher, PageCrawler, PageFetcher, Termination,
};
use kodegen_tools_listingscrape::page_extractor::{SelectorSource, SelectorSourceConfig};
use kodegen_tools_listingscrape::request_tracker::{
    MemoryStore, RateLimitPolicy, RequestTracker,
};
use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const PAGE_ONE: &str = r#"
<html><body>
  <div class="listing-card">
    <a href="/listing/101"><h3 class="listing-title">2-room flat, Medeu</h3></a>
    <span class="listing-price">41 000 000 ₸</span>
    <span class="listing-address">Dostyk ave 12</span>
  </div>
  <div class="listing-card">
    <a href="/listing/102"><h3 class="listing-title">Studio near Esentai</h3></a>
    <span class="listing-price">27 500 000 ₸</span>
  </div>
  <div class="listing-card">
    <h3 class="listing-title">Price on request</h3>
  </div>
  <nav class="pagination">
    <a href="?city=almaty&page=2">2</a>
    <a rel="next" href="?city=almaty&page=2">Next</a>
  </nav>
</body></html>
"#;

const PAGE_TWO: &str = r#"
<html><body>
  <div class="listing-card">
    <a href="/listing/201"><h3 class="listing-title">3-room flat, Bostandyq</h3></a>
    <span class="listing-price">58 000 000 ₸</span>
  </div>
  <nav class="pagination"><a href="?city=almaty&page=1">1</a></nav>
</body></html>
"#;

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(Duration::from_secs(5), "listingscrape-test/1.0").expect("client builds")
}

#[tokio::test]
async fn test_http_fetcher_returns_status_and_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/search")
        .match_header("accept-language", "ru-RU")
        .match_header("user-agent", "listingscrape-test/1.0")
        .with_status(200)
        .with_body("<html>ok</html>")
        .create_async()
        .await;

    let page = fetcher()
        .fetch(
            &format!("{}/search", server.url()),
            &[("Accept-Language".to_string(), "ru-RU".to_string())],
        )
        .await
        .expect("fetch succeeds");

    assert_eq!(page.status, 200);
    assert!(page.is_success());
    assert_eq!(page.body, "<html>ok</html>");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_http_fetcher_passes_error_statuses_through() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/search")
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let page = fetcher()
        .fetch(&format!("{}/search", server.url()), &[])
        .await
        .expect("a response is not a transport error");

    assert_eq!(page.status, 503);
    assert!(!page.is_success());
}

#[tokio::test]
async fn test_http_fetcher_connection_refused_is_network_error() {
    let result = fetcher().fetch("http://127.0.0.1:1/search", &[]).await;

    match result {
        Err(e @ FetchError::Network { .. }) => assert_eq!(e.status_code(), 0),
        other => panic!("expected network error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_selector_source_crawl_over_http() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("GET", "/search")
        .match_query(Matcher::Exact("city=almaty".to_string()))
        .match_header("accept-language", Matcher::Any)
        .with_status(200)
        .with_body(PAGE_ONE)
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/search")
        .match_query(Matcher::Exact("city=almaty&page=2".to_string()))
        .with_status(200)
        .with_body(PAGE_TWO)
        .expect(1)
        .create_async()
        .await;

    let source = SelectorSource::new(SelectorSourceConfig {
        base_url: format!("{}/search", server.url()),
        ..SelectorSourceConfig::default()
    })
    .expect("valid source");
    let tracker = Arc::new(RequestTracker::new(
        Arc::new(MemoryStore::new()),
        RateLimitPolicy {
            daily_limit: 100,
            hourly_limit: 100,
            min_delay_ms: 0,
        },
    ));
    let http: Arc<dyn PageFetcher> = Arc::new(fetcher());
    let crawler = PageCrawler::new(
        Arc::new(source),
        http,
        Arc::clone(&tracker),
        CrawlSettings {
            inter_page_delay: Duration::ZERO,
            max_page_ceiling: 50,
        },
    );

    let filters: Filters = json!({"city": "almaty"})
        .as_object()
        .cloned()
        .unwrap_or_default();
    let outcome = crawler.crawl(&filters, 10, 5).await;

    assert_eq!(outcome.termination, Termination::LastPage);
    assert_eq!(outcome.total_pages, 2);
    assert_eq!(outcome.current_page, 2);
    assert!(!outcome.has_next_page);

    let titles: Vec<&str> = outcome.items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "2-room flat, Medeu",
            "Studio near Esentai",
            "3-room flat, Bostandyq"
        ]
    );
    assert_eq!(
        outcome.items[0].url.as_deref(),
        Some(format!("{}/listing/101", server.url()).as_str())
    );
    assert_eq!(outcome.items[0].address.as_deref(), Some("Dostyk ave 12"));

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(tracker.stats().await.successful_requests, 2);
}
