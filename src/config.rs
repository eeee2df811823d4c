// src/config.rs
// =============================================================================
// Plain configuration for one mirror run.
//
// The CLI (src/cli.rs) builds a MirrorConfig; the rest of the program only
// ever sees this struct.
// =============================================================================

use std::path::PathBuf;

use crate::fetch::RetryPolicy;
use crate::storage::Layout;

pub const DEFAULT_CONCURRENCY: usize = 5;

/// Everything the crawl needs to know besides the start URL.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub output_dir: PathBuf,
    pub flatten: bool,
    /// Rewrite playlist references to local relative paths
    pub rewrite: bool,
    /// Number of parallel workers, at least 1
    pub concurrency: usize,
    /// Extensions to keep (empty = keep everything), e.g. ".ts"
    pub include: Vec<String>,
    /// Extensions to drop, checked before `include`
    pub exclude: Vec<String>,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        MirrorConfig {
            output_dir: PathBuf::from("."),
            flatten: false,
            rewrite: true,
            concurrency: DEFAULT_CONCURRENCY,
            include: Vec::new(),
            exclude: Vec::new(),
            user_agent: format!("m3u8-mirror/{}", env!("CARGO_PKG_VERSION")),
            retry: RetryPolicy::default(),
        }
    }
}

impl MirrorConfig {
    pub fn layout(&self) -> Layout {
        if self.flatten {
            Layout::Flattened
        } else {
            Layout::Hierarchical
        }
    }
}

/// Normalizes extension filters: trimmed, lower case, leading '.'.
/// Empty entries are dropped.
///
/// Example: [" ts", ".VTT", ""] -> [".ts", ".vtt"]
pub fn normalize_extensions(exts: &[String]) -> Vec<String> {
    exts.iter()
        .map(|ext| ext.trim().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{}", ext)
            }
        })
        .collect()
}
