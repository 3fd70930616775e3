//! HTTP surface: search endpoint plus the admin status/policy endpoints

pub mod errors;
pub mod handlers;

use axum::{
    Router,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::crawl_engine::ListingSource;
use crate::service::ListingScraper;

/// Build the application routes over `scraper`
pub fn router<S: ListingSource + 'static>(scraper: Arc<ListingScraper<S>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/status", get(handlers::status::<S>))
        .route("/api/rate-limits", post(handlers::set_rate_limits::<S>))
        .route("/api/requests", get(handlers::recent_requests::<S>))
        .route("/api/stats/reset", post(handlers::reset_stats::<S>))
        .route("/api/search", post(handlers::search::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(scraper)
}

/// Serve `scraper` on `listener` until `shutdown` resolves
pub async fn serve<S, F>(
    listener: TcpListener,
    scraper: Arc<ListingScraper<S>>,
    shutdown: F,
) -> std::io::Result<()>
where
    S: ListingSource + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }
    axum::serve(listener, router(scraper))
        .with_graceful_shutdown(shutdown)
        .await
}
