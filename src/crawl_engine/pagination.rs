//! Pagination discovery from rendered listing pages
//!
//! The page count is the largest page index found in same-page links
//! (`?page=N` or `/page/N`); the next-page affordance is the presence of an
//! element matching the "next" selector.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use super::crawl_types::ParseError;

/// Upper page bound and next-page affordance read from one page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    /// Largest page index discovered, never below 1
    pub total_pages: u32,
    pub has_next_page: bool,
}

impl Default for PaginationMeta {
    fn default() -> Self {
        Self {
            total_pages: 1,
            has_next_page: false,
        }
    }
}

impl PaginationMeta {
    #[must_use]
    pub fn new(total_pages: u32, has_next_page: bool) -> Self {
        Self {
            total_pages: total_pages.max(1),
            has_next_page,
        }
    }

    /// Read pagination from a listing page's HTML
    pub fn from_html(html: &str, selectors: &PaginationSelectors) -> Result<Self, ParseError> {
        let links = parse_selector(&selectors.link_selector)?;
        let next = parse_selector(&selectors.next_selector)?;
        let document = Html::parse_document(html);

        let mut highest = 1u32;
        let mut has_next_page = false;

        for element in document.select(&next) {
            has_next_page = true;
            if let Some(page) = element
                .value()
                .attr("href")
                .and_then(|href| page_from_href(href, &selectors.page_param))
            {
                highest = highest.max(page);
            }
        }

        for element in document.select(&links) {
            if let Some(page) = element
                .value()
                .attr("href")
                .and_then(|href| page_from_href(href, &selectors.page_param))
            {
                highest = highest.max(page);
            }
        }

        Ok(Self::new(highest, has_next_page))
    }
}

/// CSS selectors locating pagination links on a listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationSelectors {
    /// Links that may carry a page index
    pub link_selector: String,
    /// The "next page" control
    pub next_selector: String,
    /// Query parameter holding the page index
    pub page_param: String,
}

impl Default for PaginationSelectors {
    fn default() -> Self {
        Self {
            link_selector: ".pagination a[href], nav a[href]".to_string(),
            next_selector: "a[rel~='next'], .pagination .next a, a.next".to_string(),
            page_param: "page".to_string(),
        }
    }
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector).map_err(|e| ParseError::Selector {
        selector: selector.to_string(),
        message: format!("{e:?}"),
    })
}

/// Page index encoded in a (possibly relative) link
fn page_from_href(href: &str, page_param: &str) -> Option<u32> {
    let base = Url::parse("http://listing.invalid/").ok()?;
    let url = base.join(href).ok()?;

    if let Some(page) = url
        .query_pairs()
        .find(|(key, _)| key == page_param)
        .and_then(|(_, value)| value.parse::<u32>().ok())
    {
        return Some(page);
    }

    let segments: Vec<&str> = url.path_segments()?.collect();
    segments
        .windows(2)
        .find(|pair| pair[0] == page_param)
        .and_then(|pair| pair[1].parse::<u32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_highest_page_and_next_link() {
        let html = r#"
            <div class="pagination">
                <a href="?city=almati&page=1">1</a>
                <a href="?city=almati&page=2">2</a>
                <a href="?city=almati&page=7">7</a>
                <a class="next" rel="next" href="?city=almati&page=2">Next</a>
            </div>
        "#;
        let meta = PaginationMeta::from_html(html, &PaginationSelectors::default())
            .expect("default selectors parse");
        assert_eq!(meta.total_pages, 7);
        assert!(meta.has_next_page);
    }

    #[test]
    fn single_page_without_links() {
        let meta = PaginationMeta::from_html("<ul><li>only</li></ul>", &PaginationSelectors::default())
            .expect("default selectors parse");
        assert_eq!(meta, PaginationMeta::default());
    }

    #[test]
    fn path_style_page_links() {
        assert_eq!(page_from_href("/search/page/4", "page"), Some(4));
        assert_eq!(page_from_href("/search?page=abc", "page"), None);
        assert_eq!(page_from_href("https://example.com/list?p=3", "p"), Some(3));
    }

    #[test]
    fn invalid_selector_is_reported() {
        let selectors = PaginationSelectors {
            link_selector: "a[".to_string(),
            ..PaginationSelectors::default()
        };
        assert!(matches!(
            PaginationMeta::from_html("<a></a>", &selectors),
            Err(ParseError::Selector { .. })
        ));
    }
}
