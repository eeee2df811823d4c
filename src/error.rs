// src/error.rs
// =============================================================================
// Error types shared by the mirroring modules.
//
// Two families:
// - MirrorError: anything that stops a crawl (fetch, parse, write failures)
// - PathError: a URL could not be mapped to a local path. The rewriter
//   recovers from these line by line, so they never end a crawl.
//
// main.rs converts whatever reaches it into anyhow::Error for reporting.
// =============================================================================

use std::path::PathBuf;
use thiserror::Error;

/// Fatal crawl errors. Each variant names the URL that caused it.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Network or HTTP failure after the fetcher gave up retrying
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The playlist bytes could not be scanned (a line too long to read)
    #[error("failed to parse playlist {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing the file (or its parent directories) failed
    #[error("failed to write {url} to {}: {source}", .path.display())]
    Sink {
        url: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The URL could not be given a place in the mirror
    #[error("cannot map {url} to a local path: {source}")]
    Path {
        url: String,
        #[source]
        source: PathError,
    },

    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The crawl was cancelled before this task could run
    #[error("crawl cancelled while processing {url}")]
    Cancelled { url: String },
}

impl MirrorError {
    /// The URL this error is about.
    pub fn url(&self) -> &str {
        match self {
            MirrorError::Fetch { url, .. }
            | MirrorError::Parse { url, .. }
            | MirrorError::Sink { url, .. }
            | MirrorError::Path { url, .. }
            | MirrorError::InvalidUrl { url, .. }
            | MirrorError::Cancelled { url } => url,
        }
    }
}

/// Failure to map a URL onto the local mirror.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("cannot map '{0}' to a local path: not an absolute URL")]
    InvalidUrl(String),

    /// Lookup-only callers (the rewriter) hit a URL the crawl never claimed
    #[error("no local path has been assigned to {0}")]
    Unmapped(String),

    /// The two paths share no common root, so no relative path exists
    #[error("no relative path from {from} to {to}")]
    Unrelated { from: String, to: String },
}
