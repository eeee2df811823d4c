// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// One command, one positional URL, and flags that map onto MirrorConfig.
// Extension lists accept commas: --include .m3u8,.ts
// =============================================================================

use anyhow::{bail, Result};
use clap::builder::TypedValueParser as _;
use clap::Parser;
use std::path::PathBuf;

use crate::config::{normalize_extensions, MirrorConfig, DEFAULT_CONCURRENCY};

#[derive(Parser, Debug)]
#[command(
    name = "m3u8-mirror",
    version,
    about = "Download an HLS playlist and everything it references",
    long_about = "m3u8-mirror downloads an M3U8 playlist and, recursively, every resource it \
                  references: nested playlists, segments, encryption keys, init sections and \
                  subtitles. Playlists are rewritten to point at the local copies so the mirror \
                  plays without network access.",
    after_help = "Examples:\n  \
                  m3u8-mirror https://example.com/playlist.m3u8\n  \
                  m3u8-mirror -o ./downloads --flatten https://example.com/playlist.m3u8\n  \
                  m3u8-mirror --exclude .vtt,.srt https://example.com/playlist.m3u8"
)]
pub struct Cli {
    /// Playlist URL to mirror (http:// or https://)
    pub url: String,

    /// Output directory for downloaded files
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Keep the original URLs in downloaded playlists
    #[arg(long)]
    pub no_rewrite: bool,

    /// Put every file directly in the output directory
    #[arg(long)]
    pub flatten: bool,

    /// Only download these extensions (e.g. .m3u8,.ts)
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// Never download these extensions (e.g. .vtt,.srt)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Number of concurrent downloads
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY,
          value_parser = clap::value_parser!(u16).range(1..).map(usize::from))]
    pub concurrency: usize,

    /// Custom User-Agent header
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the final summary as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Validates the arguments and turns them into a MirrorConfig.
    pub fn to_config(&self) -> Result<MirrorConfig> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            bail!("URL must start with http:// or https://");
        }

        let defaults = MirrorConfig::default();
        Ok(MirrorConfig {
            output_dir: self.output.clone(),
            flatten: self.flatten,
            rewrite: !self.no_rewrite,
            concurrency: self.concurrency,
            include: normalize_extensions(&self.include),
            exclude: normalize_extensions(&self.exclude),
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            retry: defaults.retry,
        })
    }
}
