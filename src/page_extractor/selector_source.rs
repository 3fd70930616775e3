//! A listing site described entirely by configuration

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::listing::{ItemSelectors, ListingItem, SelectorListingParser};
use crate::crawl_engine::pagination::parse_selector;
use crate::crawl_engine::{
    CrawlRequest, ListingSource, PaginationMeta, PaginationSelectors, ParseError, ParsedPage,
};

/// Search URL, headers and selectors for one listing site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSourceConfig {
    pub name: String,
    /// Search results URL; filters are appended as query parameters
    pub base_url: String,
    pub headers: Vec<(String, String)>,
    pub items: ItemSelectors,
    pub pagination: PaginationSelectors,
}

impl Default for SelectorSourceConfig {
    fn default() -> Self {
        Self {
            name: "listings".to_string(),
            base_url: "http://localhost:8080/search".to_string(),
            headers: vec![(
                "Accept-Language".to_string(),
                "ru-RU,ru;q=0.9,en;q=0.8".to_string(),
            )],
            items: ItemSelectors::default(),
            pagination: PaginationSelectors::default(),
        }
    }
}

/// [`ListingSource`] over [`SelectorListingParser`] and [`PaginationMeta::from_html`]
#[derive(Debug, Clone)]
pub struct SelectorSource {
    config: SelectorSourceConfig,
    base_url: Url,
    parser: SelectorListingParser,
}

impl SelectorSource {
    pub fn new(config: SelectorSourceConfig) -> Result<Self, ParseError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| ParseError::Url {
            url: config.base_url.clone(),
            message: e.to_string(),
        })?;
        let parser = SelectorListingParser::new(&config.items)?.with_base_url(base_url.clone());
        // Fail at construction rather than on the first page
        parse_selector(&config.pagination.link_selector)?;
        parse_selector(&config.pagination.next_selector)?;

        Ok(Self {
            config,
            base_url,
            parser,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SelectorSourceConfig {
        &self.config
    }
}

impl ListingSource for SelectorSource {
    type Item = ListingItem;

    fn name(&self) -> &str {
        &self.config.name
    }

    fn page_url(&self, request: &CrawlRequest) -> String {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        for (key, value) in &request.filters {
            match value {
                Value::Array(values) => {
                    pairs.extend(values.iter().filter_map(query_value).map(|v| (key.as_str(), v)));
                }
                other => pairs.extend(query_value(other).map(|v| (key.as_str(), v))),
            }
        }
        if request.page > 1 {
            pairs.push((self.config.pagination.page_param.as_str(), request.page.to_string()));
        }

        let mut url = self.base_url.clone();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        url.into()
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.config.headers.clone()
    }

    fn parse(&self, body: &str) -> Result<ParsedPage<ListingItem>, ParseError> {
        let pagination = PaginationMeta::from_html(body, &self.config.pagination)?;
        Ok(ParsedPage {
            items: self.parser.parse_items(body),
            pagination,
        })
    }

    fn is_complete(&self, item: &ListingItem) -> bool {
        item.is_complete()
    }
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
