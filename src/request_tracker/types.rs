//! Data types for request tracking and admission control
//!
//! Log entries are immutable once written. `RequestStats` is the derived
//! aggregate, mutated once per logged request.

use chrono::{DateTime, Local, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One outbound request, as recorded in the append-only log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogEntry {
    pub timestamp: DateTime<Local>,
    pub target_url: String,
    pub success: bool,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl RequestLogEntry {
    /// Entry for a request that completed with a 2xx response
    #[must_use]
    pub fn success(target_url: impl Into<String>, status_code: u16, response_time_ms: u64) -> Self {
        Self {
            timestamp: Local::now(),
            target_url: target_url.into(),
            success: true,
            status_code,
            error_message: None,
            response_time_ms: Some(response_time_ms),
        }
    }

    /// Entry for a request that failed, either with a status or before one arrived
    ///
    /// `status_code` is 0 when the failure happened below HTTP (DNS, connect, timeout).
    #[must_use]
    pub fn failure(
        target_url: impl Into<String>,
        status_code: u16,
        error_message: impl Into<String>,
        response_time_ms: Option<u64>,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            target_url: target_url.into(),
            success: false,
            status_code,
            error_message: Some(error_message.into()),
            response_time_ms,
        }
    }

    /// Override the timestamp (replaying history, tests)
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Aggregate counters derived from the request log
///
/// `requests_today` and `requests_this_hour` are reset-on-boundary counters,
/// not sliding windows: they restart at 1 when a request lands on a different
/// calendar day (or clock hour) than the previous one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub requests_today: u32,
    pub requests_this_hour: u32,
    pub last_request_at: Option<DateTime<Local>>,
    pub average_response_time_ms: f64,
    /// Number of entries that contributed to `average_response_time_ms`
    pub response_time_samples: u64,
}

impl RequestStats {
    /// Fold one log entry into the aggregate
    pub fn record(&mut self, entry: &RequestLogEntry) {
        self.total_requests += 1;
        if entry.success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        let ts = entry.timestamp;
        match self.last_request_at {
            Some(prev) if same_day(prev, ts) => {
                self.requests_today = self.requests_today.saturating_add(1);
                if same_hour(prev, ts) {
                    self.requests_this_hour = self.requests_this_hour.saturating_add(1);
                } else {
                    self.requests_this_hour = 1;
                }
            }
            _ => {
                self.requests_today = 1;
                self.requests_this_hour = 1;
            }
        }
        self.last_request_at = Some(ts);

        if let Some(sample) = entry.response_time_ms {
            self.response_time_samples += 1;
            let n = self.response_time_samples as f64;
            self.average_response_time_ms =
                (self.average_response_time_ms * (n - 1.0) + sample as f64) / n;
        }
    }

    /// Requests counted against today's cap as seen at `now`
    ///
    /// A counter last touched on another calendar day has already rolled over.
    #[must_use]
    pub fn requests_today_at(&self, now: DateTime<Local>) -> u32 {
        match self.last_request_at {
            Some(last) if same_day(last, now) => self.requests_today,
            _ => 0,
        }
    }

    /// Requests counted against this hour's cap as seen at `now`
    #[must_use]
    pub fn requests_this_hour_at(&self, now: DateTime<Local>) -> u32 {
        match self.last_request_at {
            Some(last) if same_hour(last, now) => self.requests_this_hour,
            _ => 0,
        }
    }
}

pub(crate) fn same_day(a: DateTime<Local>, b: DateTime<Local>) -> bool {
    a.date_naive() == b.date_naive()
}

pub(crate) fn same_hour(a: DateTime<Local>, b: DateTime<Local>) -> bool {
    same_day(a, b) && a.hour() == b.hour()
}

/// Admission limits for outbound requests
///
/// Values are deployment policy. The two named profiles below are both in
/// production use with different sites; pick per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub daily_limit: u32,
    pub hourly_limit: u32,
    pub min_delay_ms: u64,
}

impl RateLimitPolicy {
    /// 10000/day, 500/hour, 1s between requests
    #[must_use]
    pub const fn high_volume() -> Self {
        Self {
            daily_limit: 10_000,
            hourly_limit: 500,
            min_delay_ms: 1_000,
        }
    }

    /// 200/day, 50/hour, 10s between requests
    #[must_use]
    pub const fn conservative() -> Self {
        Self {
            daily_limit: 200,
            hourly_limit: 50,
            min_delay_ms: 10_000,
        }
    }

    /// Merge a partial update; fields left `None` keep their current value
    #[must_use]
    pub fn merged(self, update: &RateLimitUpdate) -> Self {
        Self {
            daily_limit: update.daily_limit.unwrap_or(self.daily_limit),
            hourly_limit: update.hourly_limit.unwrap_or(self.hourly_limit),
            min_delay_ms: update.min_delay_ms.unwrap_or(self.min_delay_ms),
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::high_volume()
    }
}

/// Partial policy update accepted by the configuration endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitUpdate {
    pub daily_limit: Option<u32>,
    pub hourly_limit: Option<u32>,
    pub min_delay_ms: Option<u64>,
}

/// Which admission rule rejected a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    DailyLimit,
    HourlyLimit,
    MinDelay,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DailyLimit => write!(f, "daily request limit reached"),
            Self::HourlyLimit => write!(f, "hourly request limit reached"),
            Self::MinDelay => write!(f, "minimum delay between requests not elapsed"),
        }
    }
}

/// Admission decision returned by `RequestTracker::check_rate_limits`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitCheck {
    pub can_proceed: bool,
    pub reason: Option<DenialReason>,
    /// Milliseconds until the violated rule stops applying (0 when allowed)
    pub wait_time_ms: u64,
}

impl RateLimitCheck {
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            can_proceed: true,
            reason: None,
            wait_time_ms: 0,
        }
    }

    #[must_use]
    pub const fn deny(reason: DenialReason, wait_time_ms: u64) -> Self {
        Self {
            can_proceed: false,
            reason: Some(reason),
            wait_time_ms,
        }
    }
}
