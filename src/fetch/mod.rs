// src/fetch/mod.rs
// =============================================================================
// Getting bytes for a URL.
//
// The crawler only sees the Fetcher trait. HttpFetcher is the real
// implementation; tests plug in in-memory fetchers instead.
//
// Submodules:
// - http: reqwest-backed fetcher
// - retry: backoff policy and retry loop
// =============================================================================

mod http;
mod retry;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::MirrorError;

pub use http::HttpFetcher;
pub use retry::RetryPolicy;

/// Something that can download a URL.
///
/// Implementations own their retry behaviour and must eventually return
/// either the body or a terminal error. `token` is the crawl's cancellation
/// token; it may be checked between attempts.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, token: &CancellationToken, url: &str) -> Result<Bytes, MirrorError>;
}
