//! Request tracking and admission control
//!
//! Persists a log of outbound page requests, keeps derived stats, and
//! decides whether the next request may go out under the configured
//! daily/hourly/minimum-delay policy.

pub mod store;
pub mod tracker;
pub mod types;

pub use store::{JsonFileStore, MemoryStore, PersistenceError, PersistenceResult, TrackerStore};
pub use tracker::RequestTracker;
pub use types::{
    DenialReason, RateLimitCheck, RateLimitPolicy, RateLimitUpdate, RequestLogEntry, RequestStats,
};
