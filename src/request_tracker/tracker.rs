//! Request tracker and admission control
//!
//! Records every outbound page request and answers "may the next request go
//! out now?" against the configured [`RateLimitPolicy`]. Rules are checked
//! in a fixed order (daily cap, hourly cap, minimum delay) and the first
//! violated rule decides.
//!
//! Tracking never aborts the operation it instruments: persistence errors
//! are logged and dropped here, and reads of missing or corrupt state fall
//! back to zero-valued stats and the default policy.

use chrono::{DateTime, Duration as ChronoDuration, Local, LocalResult, NaiveDateTime, TimeZone, Timelike};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::store::TrackerStore;
use super::types::{
    DenialReason, RateLimitCheck, RateLimitPolicy, RateLimitUpdate, RequestLogEntry, RequestStats,
};
use crate::utils::DEFAULT_MAX_LOG_ENTRIES;

#[derive(Debug, Default)]
struct WriterState {
    /// Known log length; `None` until first counted
    log_len: Option<usize>,
}

/// Persisted request log, stats and rate-limit policy
///
/// All writes go through one async mutex, so concurrent crawls cannot lose
/// each other's stats updates.
pub struct RequestTracker {
    store: Arc<dyn TrackerStore>,
    defaults: RateLimitPolicy,
    max_log_entries: usize,
    writer: Mutex<WriterState>,
}

impl RequestTracker {
    /// Create a tracker over `store`, using `defaults` until a policy is persisted
    #[must_use]
    pub fn new(store: Arc<dyn TrackerStore>, defaults: RateLimitPolicy) -> Self {
        Self {
            store,
            defaults,
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
            writer: Mutex::new(WriterState::default()),
        }
    }

    /// Trim the persisted log to the newest `max` entries
    ///
    /// The log may grow to `max + max / 4` entries before it is rewritten,
    /// so one compaction covers many appends.
    #[must_use]
    pub fn with_max_log_entries(mut self, max: usize) -> Self {
        self.max_log_entries = max.max(1);
        self
    }

    /// Append `entry` to the log and fold it into the stats snapshot
    pub async fn log_request(&self, entry: RequestLogEntry) {
        let mut writer = self.writer.lock().await;

        if let Err(e) = self.store.append_entry(&entry).await {
            warn!("Failed to append request log entry for {}: {}", entry.target_url, e);
        } else if let Some(len) = writer.log_len.as_mut() {
            *len += 1;
        }

        let mut stats = self.stats_snapshot().await;
        stats.record(&entry);
        if let Err(e) = self.store.write_stats(&stats).await {
            warn!("Failed to persist request stats: {}", e);
        }

        debug!(
            "Logged request to {} (success={}, status={}, today={}, hour={})",
            entry.target_url,
            entry.success,
            entry.status_code,
            stats.requests_today,
            stats.requests_this_hour
        );

        self.compact_log(&mut writer).await;
    }

    /// Current aggregate stats; zero-valued when missing or unreadable
    pub async fn stats(&self) -> RequestStats {
        self.stats_snapshot().await
    }

    async fn stats_snapshot(&self) -> RequestStats {
        match self.store.read_stats().await {
            Ok(Some(stats)) => stats,
            Ok(None) => RequestStats::default(),
            Err(e) => {
                warn!("Request stats unreadable, using empty snapshot: {}", e);
                RequestStats::default()
            }
        }
    }

    /// Effective policy: persisted value, else the configured defaults
    pub async fn rate_limits(&self) -> RateLimitPolicy {
        match self.store.read_policy().await {
            Ok(Some(policy)) => policy,
            Ok(None) => self.defaults,
            Err(e) => {
                warn!("Rate limit policy unreadable, using defaults: {}", e);
                self.defaults
            }
        }
    }

    /// Merge `update` into the persisted policy and return the result
    pub async fn set_rate_limits(&self, update: RateLimitUpdate) -> RateLimitPolicy {
        let _writer = self.writer.lock().await;
        let merged = self.rate_limits().await.merged(&update);
        if let Err(e) = self.store.write_policy(&merged).await {
            warn!("Failed to persist rate limit policy: {}", e);
        }
        info!(
            "Rate limits updated: {}/day, {}/hour, {}ms min delay",
            merged.daily_limit, merged.hourly_limit, merged.min_delay_ms
        );
        merged
    }

    /// Admission decision for a request issued now
    ///
    /// The check reserves nothing: a request counts against the limits only
    /// once it is logged. Crawls that check concurrently can each be admitted
    /// and together overshoot the daily or hourly cap, or the minimum delay,
    /// by up to one request per crawl.
    pub async fn check_rate_limits(&self) -> RateLimitCheck {
        self.check_rate_limits_at(Local::now()).await
    }

    /// Admission decision for a request issued at `now`
    pub async fn check_rate_limits_at(&self, now: DateTime<Local>) -> RateLimitCheck {
        let stats = self.stats_snapshot().await;
        let policy = self.rate_limits().await;
        let check = evaluate(&stats, &policy, now);
        if let Some(reason) = check.reason {
            info!("Request denied: {} (retry in {}ms)", reason, check.wait_time_ms);
        }
        check
    }

    /// Newest `limit` log entries, newest first
    pub async fn recent_requests(&self, limit: usize) -> Vec<RequestLogEntry> {
        match self.store.read_entries().await {
            Ok(entries) => entries.into_iter().rev().take(limit).collect(),
            Err(e) => {
                warn!("Request log unreadable: {}", e);
                Vec::new()
            }
        }
    }

    /// Zero the aggregate stats; the request log is left intact
    pub async fn reset_stats(&self) {
        let _writer = self.writer.lock().await;
        if let Err(e) = self.store.write_stats(&RequestStats::default()).await {
            warn!("Failed to reset request stats: {}", e);
        }
    }

    async fn compact_log(&self, writer: &mut WriterState) {
        let len = match writer.log_len {
            Some(len) => len,
            None => match self.store.read_entries().await {
                Ok(entries) => {
                    writer.log_len = Some(entries.len());
                    entries.len()
                }
                Err(e) => {
                    warn!("Request log unreadable, skipping compaction: {}", e);
                    return;
                }
            },
        };

        // Let the log run a quarter past the limit before rewriting it
        let slack = (self.max_log_entries / 4).max(1);
        if len <= self.max_log_entries + slack {
            return;
        }

        let entries = match self.store.read_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Request log unreadable, skipping compaction: {}", e);
                return;
            }
        };
        let keep_from = entries.len().saturating_sub(self.max_log_entries);
        let kept = &entries[keep_from..];
        match self.store.overwrite_entries(kept).await {
            Ok(()) => {
                debug!("Compacted request log: dropped {} oldest entries", keep_from);
                writer.log_len = Some(kept.len());
            }
            Err(e) => warn!("Failed to compact request log: {}", e),
        }
    }
}

/// Apply `policy` to `stats` at `now`; first violated rule wins
fn evaluate(stats: &RequestStats, policy: &RateLimitPolicy, now: DateTime<Local>) -> RateLimitCheck {
    if stats.requests_today_at(now) >= policy.daily_limit {
        return RateLimitCheck::deny(DenialReason::DailyLimit, millis_until_midnight(now));
    }

    if stats.requests_this_hour_at(now) >= policy.hourly_limit {
        return RateLimitCheck::deny(DenialReason::HourlyLimit, millis_until_next_hour(now));
    }

    if let Some(last) = stats.last_request_at {
        let elapsed = now.signed_duration_since(last).num_milliseconds().max(0) as u64;
        if elapsed < policy.min_delay_ms {
            return RateLimitCheck::deny(DenialReason::MinDelay, policy.min_delay_ms - elapsed);
        }
    }

    RateLimitCheck::allow()
}

fn millis_until(now: DateTime<Local>, boundary: NaiveDateTime, fallback: ChronoDuration) -> u64 {
    let target = match Local.from_local_datetime(&boundary) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // Boundary falls in a DST gap
        LocalResult::None => now + fallback,
    };
    target
        .signed_duration_since(now)
        .num_milliseconds()
        .max(0) as u64
}

fn millis_until_midnight(now: DateTime<Local>) -> u64 {
    let midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0));
    match midnight {
        Some(boundary) => millis_until(now, boundary, ChronoDuration::hours(24)),
        None => 0,
    }
}

fn millis_until_next_hour(now: DateTime<Local>) -> u64 {
    let hour_start = now.date_naive().and_hms_opt(now.hour(), 0, 0);
    match hour_start {
        Some(start) => millis_until(now, start + ChronoDuration::hours(1), ChronoDuration::hours(1)),
        None => 0,
    }
}
