// src/crawl/mod.rs
// =============================================================================
// This module drives the mirror.
//
// Features:
// - Fixed-size worker pool over a single shared job queue
// - Each URL fetched at most once, however many playlists reference it
// - Include/exclude filtering by extension (nested playlists always followed)
// - Playlists written only after everything they reference
// - Fail-fast: the first error cancels the rest of the crawl
// =============================================================================

mod filter;
mod queue;
mod stats;

pub use queue::Crawler;
pub use stats::{format_bytes, CrawlStats, CrawlSummary};
