//! Page fetchers: URL + headers in, status + body out
//!
//! [`HttpFetcher`] issues plain GETs through reqwest. [`BrowserFetcher`]
//! renders the page in a pooled headless Chrome session, for sites that
//! build their listings client-side.

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::browser_pool::{BrowserPool, PoolError};

/// Raw result of one successful round-trip (any status)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("Timed out after {timeout:?} fetching {url}")]
    Timeout { url: String, timeout: Duration },

    #[error("Browser error fetching {url}: {message}")]
    Browser { url: String, message: String },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    /// Status code to record for this failure (0 when none was received)
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Status { status, .. } => *status,
            _ => 0,
        }
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, headers: &[(String, String)])
    -> Result<FetchedPage, FetchError>;
}

// =============================================================================
// HTTP
// =============================================================================

/// Plain HTTP GET fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    fn classify(&self, url: &str, error: &reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<FetchedPage, FetchError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| self.classify(url, &e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.classify(url, &e))?;

        debug!("Fetched {} ({} bytes, HTTP {})", url, body.len(), status);
        Ok(FetchedPage { status, body })
    }
}

// =============================================================================
// Headless browser
// =============================================================================

/// Renders pages in a pooled Chrome session
///
/// The reported status is the main document's, read from the CDP
/// `Network.responseReceived` events seen during navigation. Navigation
/// failures become [`FetchError::Browser`].
pub struct BrowserFetcher {
    pool: Arc<BrowserPool>,
    navigation_timeout: Duration,
}

impl BrowserFetcher {
    #[must_use]
    pub fn new(pool: Arc<BrowserPool>, navigation_timeout: Duration) -> Self {
        Self {
            pool,
            navigation_timeout,
        }
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<FetchedPage, FetchError> {
        use chromiumoxide::cdp::browser_protocol::network::{
            EventResponseReceived, Headers, ResourceType, SetExtraHttpHeadersParams,
        };

        let browser_error = |e: chromiumoxide::error::CdpError| FetchError::Browser {
            url: url.to_string(),
            message: e.to_string(),
        };

        let session = self.pool.acquire().await?;
        let page = session
            .handle()
            .browser()
            .new_page("about:blank")
            .await
            .map_err(browser_error)?;

        if !headers.is_empty() {
            let map: serde_json::Map<String, serde_json::Value> = headers
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(
                serde_json::Value::Object(map),
            )))
            .await
            .map_err(browser_error)?;
        }

        // Subscribe before navigating so the document response is not missed
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(browser_error)?;

        let rendered = tokio::time::timeout(self.navigation_timeout, async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            page.content().await
        })
        .await;

        let mut observed = Vec::new();
        while let Some(Some(event)) = responses.next().now_or_never() {
            observed.push(ObservedResponse {
                url: event.response.url.clone(),
                is_document: event.r#type == ResourceType::Document,
                status: event.response.status,
            });
        }

        if let Err(e) = page.close().await {
            warn!("Failed to close page for {}: {}", url, e);
        }

        match rendered {
            Ok(Ok(body)) => {
                let status = document_status(&observed, url).unwrap_or_else(|| {
                    debug!("No document response seen for {}, assuming 200", url);
                    200
                });
                debug!(
                    "Rendered {} in session {} ({} bytes, HTTP {})",
                    url,
                    session.id(),
                    body.len(),
                    status
                );
                Ok(FetchedPage { status, body })
            }
            Ok(Err(e)) => Err(browser_error(e)),
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout: self.navigation_timeout,
            }),
        }
    }
}

/// One `Network.responseReceived` event, reduced to what status selection needs
#[derive(Debug, Clone, PartialEq, Eq)]
struct ObservedResponse {
    url: String,
    is_document: bool,
    status: i64,
}

/// Status of the main document loaded for `url`
///
/// Prefers a document response for exactly `url`; otherwise takes the first
/// document response (the main frame after a redirect, ahead of any iframes).
fn document_status(responses: &[ObservedResponse], url: &str) -> Option<u16> {
    let documents = || responses.iter().filter(|r| r.is_document);
    documents()
        .find(|r| r.url == url)
        .or_else(|| documents().next())
        .and_then(|r| u16::try_from(r.status).ok())
}
