//! Tests for the type-safe configuration builder and JSON loading

use kodegen_tools_listingscrape::browser_pool::BrowserPoolConfig;
use kodegen_tools_listingscrape::config::{FetchMode, ScrapeConfig};
use kodegen_tools_listingscrape::page_extractor::SelectorSourceConfig;
use kodegen_tools_listingscrape::request_tracker::RateLimitPolicy;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_builder_requires_storage_dir() {
    // Does not compile without a storage directory:
    // let config = ScrapeConfig::builder().build();

    let temp_dir = TempDir::new().unwrap();
    let config = ScrapeConfig::builder()
        .storage_dir(temp_dir.path().to_path_buf())
        .build()
        .unwrap();

    assert_eq!(config.storage_dir(), temp_dir.path());
}

#[test]
fn test_builder_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = ScrapeConfig::builder()
        .storage_dir(temp_dir.path())
        .build()
        .unwrap();

    assert_eq!(config.rate_limits(), RateLimitPolicy::high_volume());
    assert_eq!(config.crawl().inter_page_delay, Duration::from_millis(500));
    assert_eq!(config.crawl().max_page_ceiling, 50);
    assert_eq!(config.cache().ttl, Duration::from_secs(600));
    assert_eq!(config.cache().soft_capacity, 50);
    assert_eq!(config.pool().max_pool_size, 3);
    assert_eq!(config.pool().idle_timeout, Duration::from_secs(300));
    assert_eq!(config.fetch_mode(), FetchMode::Http);
}

#[test]
fn test_builder_with_optional_fields() {
    let temp_dir = TempDir::new().unwrap();
    let config = ScrapeConfig::builder()
        .rate_limits(RateLimitPolicy::conservative())
        .storage_dir(temp_dir.path())
        .inter_page_delay(Duration::from_secs(2))
        .max_page_ceiling(10)
        .default_max_results(40)
        .default_max_pages(4)
        .fetch_mode(FetchMode::Browser)
        .user_agent("listingscrape/1.0")
        .listen_addr("127.0.0.1:9000")
        .build()
        .unwrap();

    assert_eq!(config.rate_limits(), RateLimitPolicy::conservative());
    assert_eq!(config.crawl().inter_page_delay, Duration::from_secs(2));
    assert_eq!(config.crawl().max_page_ceiling, 10);
    assert_eq!(config.default_max_results(), 40);
    assert_eq!(config.default_max_pages(), 4);
    assert_eq!(config.fetch_mode(), FetchMode::Browser);
    assert_eq!(config.user_agent(), "listingscrape/1.0");
    assert_eq!(config.listen_addr(), "127.0.0.1:9000");
}

#[test]
fn test_relative_storage_dir_is_made_absolute() {
    let config = ScrapeConfig::builder()
        .storage_dir("listing-data/tracker")
        .build()
        .unwrap();

    assert!(config.storage_dir().is_absolute());
    assert!(config.storage_dir().ends_with("listing-data/tracker"));
}

#[test]
fn test_build_rejects_invalid_values() {
    let temp_dir = TempDir::new().unwrap();

    let zero_ceiling = ScrapeConfig::builder()
        .storage_dir(temp_dir.path())
        .max_page_ceiling(0)
        .build();
    assert!(zero_ceiling.is_err());

    let empty_pool = ScrapeConfig::builder()
        .storage_dir(temp_dir.path())
        .pool(BrowserPoolConfig {
            max_pool_size: 0,
            ..BrowserPoolConfig::default()
        })
        .build();
    assert!(empty_pool.is_err());

    let bad_source = ScrapeConfig::builder()
        .storage_dir(temp_dir.path())
        .source(SelectorSourceConfig {
            base_url: "listings without scheme".to_string(),
            ..SelectorSourceConfig::default()
        })
        .build();
    let message = format!("{:#}", bad_source.unwrap_err());
    assert!(message.contains("source.base_url"), "got: {message}");
}

#[test]
fn test_from_json_file_fills_missing_fields() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("listingscrape.json");
    std::fs::write(
        &path,
        r#"{
            "storage_dir": "state",
            "default_max_results": 25,
            "fetch_mode": "browser",
            "rate_limits": {"dailyLimit": 300, "hourlyLimit": 40, "minDelayMs": 5000},
            "source": {
                "name": "krisha",
                "base_url": "https://listings.example/prodazha/kvartiry/"
            }
        }"#,
    )
    .unwrap();

    let config = ScrapeConfig::from_json_file(&path).unwrap();

    assert!(config.storage_dir().is_absolute());
    assert!(config.storage_dir().ends_with("state"));
    assert_eq!(config.default_max_results(), 25);
    assert_eq!(config.fetch_mode(), FetchMode::Browser);
    assert_eq!(config.rate_limits().hourly_limit, 40);
    assert_eq!(config.source().name, "krisha");
    // Selectors were not given and fall back to defaults
    assert_eq!(config.source().items, SelectorSourceConfig::default().items);
    assert_eq!(config.default_max_pages(), 10);
}

#[test]
fn test_from_json_file_reports_parse_errors() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.json");
    std::fs::write(&path, "{ \"default_max_results\": ").unwrap();

    let err = ScrapeConfig::from_json_file(&path).unwrap_err();
    assert!(format!("{err}").contains("Failed to parse config file"));

    let missing = ScrapeConfig::from_json_file(temp_dir.path().join("absent.json"));
    assert!(missing.is_err());
}

#[test]
fn test_from_json_file_reads_durations_as_milliseconds() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("timings.json");
    std::fs::write(
        &path,
        r#"{
            "storage_dir": "state",
            "fetch_timeout_ms": 8000,
            "crawl": {"inter_page_delay_ms": 750},
            "pool": {"idle_timeout_ms": 60000, "acquire_timeout_ms": 2500},
            "cache": {"ttl_ms": 120000}
        }"#,
    )
    .unwrap();

    let config = ScrapeConfig::from_json_file(&path).unwrap();

    assert_eq!(config.fetch_timeout(), Duration::from_secs(8));
    assert_eq!(config.crawl().inter_page_delay, Duration::from_millis(750));
    assert_eq!(config.crawl().max_page_ceiling, 50);
    assert_eq!(config.pool().idle_timeout, Duration::from_secs(60));
    assert_eq!(config.pool().acquire_timeout, Some(Duration::from_millis(2500)));
    assert_eq!(config.pool().poll_interval, BrowserPoolConfig::default().poll_interval);
    assert_eq!(config.cache().ttl, Duration::from_secs(120));
    assert_eq!(config.cache().soft_capacity, 50);
}
