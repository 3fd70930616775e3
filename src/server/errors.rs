//! HTTP mapping of search failures

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::service::ScrapeError;

impl IntoResponse for ScrapeError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            Self::AdmissionDenied {
                reason,
                retry_after_secs,
            } => {
                let body = Json(json!({
                    "error": message,
                    "reason": reason,
                    "retryAfterSecs": retry_after_secs,
                }));
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            Self::UpstreamFetch(_) | Self::Parse(_) => {
                (StatusCode::BAD_GATEWAY, Json(json!({ "error": message }))).into_response()
            }
            Self::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response(),
        }
    }
}
