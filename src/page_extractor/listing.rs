//! Card-based listing extraction driven by CSS selectors

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::crawl_engine::ParseError;
use crate::crawl_engine::pagination::parse_selector;

/// One property listing as shown on a search results page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingItem {
    pub title: String,
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ListingItem {
    /// Title and price are both present
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && !self.price.trim().is_empty()
    }
}

/// Selector set for one site's result cards
///
/// Field selectors are evaluated inside each card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemSelectors {
    pub card: String,
    pub title: String,
    pub price: String,
    /// Link to the listing; the card's own `href` is used when unset
    pub link: Option<String>,
    pub image: Option<String>,
    pub address: Option<String>,
}

impl Default for ItemSelectors {
    fn default() -> Self {
        Self {
            card: ".listing-card, [data-listing-id]".to_string(),
            title: ".listing-title, .title".to_string(),
            price: ".listing-price, .price".to_string(),
            link: Some("a[href]".to_string()),
            image: Some("img".to_string()),
            address: Some(".listing-address, .address".to_string()),
        }
    }
}

/// Compiled [`ItemSelectors`]
#[derive(Debug, Clone)]
pub struct SelectorListingParser {
    card: Selector,
    title: Selector,
    price: Selector,
    link: Option<Selector>,
    image: Option<Selector>,
    address: Option<Selector>,
    base_url: Option<Url>,
}

impl SelectorListingParser {
    pub fn new(selectors: &ItemSelectors) -> Result<Self, ParseError> {
        let optional = |s: &Option<String>| s.as_deref().map(parse_selector).transpose();
        Ok(Self {
            card: parse_selector(&selectors.card)?,
            title: parse_selector(&selectors.title)?,
            price: parse_selector(&selectors.price)?,
            link: optional(&selectors.link)?,
            image: optional(&selectors.image)?,
            address: optional(&selectors.address)?,
            base_url: None,
        })
    }

    /// Resolve relative link and image URLs against `base`
    #[must_use]
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    /// Extract every card on the page, complete or not
    #[must_use]
    pub fn parse_items(&self, html: &str) -> Vec<ListingItem> {
        let document = Html::parse_document(html);
        document
            .select(&self.card)
            .map(|card| self.parse_card(card))
            .collect()
    }

    fn parse_card(&self, card: ElementRef<'_>) -> ListingItem {
        let url = match &self.link {
            Some(link) => card
                .select(link)
                .next()
                .and_then(|el| el.value().attr("href")),
            None => card.value().attr("href"),
        }
        .or_else(|| card.value().attr("href"))
        .map(|href| self.resolve(href));

        let image = self
            .image
            .as_ref()
            .and_then(|sel| card.select(sel).next())
            .and_then(|img| {
                img.value()
                    .attr("src")
                    .or_else(|| img.value().attr("data-src"))
            })
            .map(|src| self.resolve(src));

        ListingItem {
            title: first_text(card, &self.title).unwrap_or_default(),
            price: first_text(card, &self.price).unwrap_or_default(),
            url,
            image,
            address: self.address.as_ref().and_then(|sel| first_text(card, sel)),
        }
    }

    fn resolve(&self, href: &str) -> String {
        self.base_url
            .as_ref()
            .and_then(|base| base.join(href).ok())
            .map_or_else(|| href.to_string(), String::from)
    }
}

/// Whitespace-collapsed text of the first match, `None` when absent or blank
fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let element = scope.select(selector).next()?;
    let text = element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <div class="results">
          <div class="listing-card">
            <a href="/a/show/101"><span class="title">2-room flat,
               54 m²</span></a>
            <div class="price">31 500 000 ₸</div>
            <div class="address">Almaty, Bostandyq</div>
            <img data-src="/img/101.jpg">
          </div>
          <div class="listing-card">
            <a href="/a/show/102"><span class="title">Studio</span></a>
          </div>
        </div>
    "#;

    #[test]
    fn extracts_fields_and_resolves_urls() {
        let base = Url::parse("https://listings.example/search/").expect("valid url");
        let parser = SelectorListingParser::new(&ItemSelectors::default())
            .expect("default selectors compile")
            .with_base_url(base);

        let items = parser.parse_items(PAGE);
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title, "2-room flat, 54 m²");
        assert_eq!(first.price, "31 500 000 ₸");
        assert_eq!(first.url.as_deref(), Some("https://listings.example/a/show/101"));
        assert_eq!(first.image.as_deref(), Some("https://listings.example/img/101.jpg"));
        assert_eq!(first.address.as_deref(), Some("Almaty, Bostandyq"));
        assert!(first.is_complete());

        assert!(!items[1].is_complete());
        assert_eq!(items[1].price, "");
    }

    #[test]
    fn bad_card_selector_is_rejected() {
        let selectors = ItemSelectors {
            card: "div[".to_string(),
            ..ItemSelectors::default()
        };
        assert!(SelectorListingParser::new(&selectors).is_err());
    }
}
