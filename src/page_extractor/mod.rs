//! Listing extraction from search result pages.
//!
//! Site differences live in configuration: [`ItemSelectors`] describes the
//! result cards and [`SelectorSourceConfig`] the search URL around them.

// Sub-modules
pub mod listing;
pub mod selector_source;

// Re-exports for public API
pub use listing::{ItemSelectors, ListingItem, SelectorListingParser};
pub use selector_source::{SelectorSource, SelectorSourceConfig};
