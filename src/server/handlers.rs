//! Route handlers over a shared [`ListingScraper`]

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::crawl_engine::ListingSource;
use crate::request_tracker::RateLimitUpdate;
use crate::service::{ListingScraper, ScrapeError, SearchRequest};

const DEFAULT_RECENT_LIMIT: usize = 50;
const MAX_RECENT_LIMIT: usize = 1_000;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn status<S: ListingSource + 'static>(
    State(scraper): State<Arc<ListingScraper<S>>>,
) -> impl IntoResponse {
    Json(scraper.status().await)
}

pub async fn set_rate_limits<S: ListingSource + 'static>(
    State(scraper): State<Arc<ListingScraper<S>>>,
    Json(update): Json<RateLimitUpdate>,
) -> impl IntoResponse {
    Json(scraper.configure(update).await)
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    limit: Option<usize>,
}

pub async fn recent_requests<S: ListingSource + 'static>(
    State(scraper): State<Arc<ListingScraper<S>>>,
    Query(query): Query<RecentQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .min(MAX_RECENT_LIMIT);
    Json(scraper.recent_requests(limit).await)
}

pub async fn reset_stats<S: ListingSource + 'static>(
    State(scraper): State<Arc<ListingScraper<S>>>,
) -> impl IntoResponse {
    scraper.reset_stats().await;
    Json(json!({ "reset": true }))
}

pub async fn search<S: ListingSource + 'static>(
    State(scraper): State<Arc<ListingScraper<S>>>,
    Json(request): Json<SearchRequest>,
) -> Result<impl IntoResponse, ScrapeError> {
    let response = scraper.search(request).await?;
    Ok(Json(response))
}
