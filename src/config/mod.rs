//! Configuration module for the listing scraper
//!
//! This module provides the `ScrapeConfig` struct and its type-safe builder
//! for configuring tracking, crawling, pooling and caching with validation
//! and sensible defaults.

// Sub-modules
pub mod builder;
pub mod types;

// Re-exports for public API
pub use builder::{ScrapeConfigBuilder, WithStorageDir};
pub use types::{FetchMode, ScrapeConfig, default_storage_dir};
