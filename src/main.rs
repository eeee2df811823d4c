// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging, the HTTP fetcher and the crawler
// 3. Run the crawl, with a progress line on stderr and Ctrl-C cancelling it
// 4. Print a summary (table or JSON)
// 5. Exit with proper code (0 = mirrored, 1 = crawl failed, 2 = usage/internal error)
//
// Rust concepts:
// - #[tokio::main]: turns async main into a normal main running a tokio runtime
// - Arc: the crawler, the progress task and the fetcher share ownership
// - anyhow::Context: adds a human-readable line to setup errors
// =============================================================================

mod cli;
mod config;
mod crawl;
mod error;
mod fetch;
mod logging;
mod playlist;
mod storage;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use cli::Cli;
use crawl::{format_bytes, CrawlStats, CrawlSummary, Crawler};
use fetch::HttpFetcher;

#[tokio::main]
async fn main() {
    // Run the app and get the exit code
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // {:#} prints the whole context chain on one line
            eprintln!("Error: {:#}", e);
            2
        }
    };

    // Exit with the code (0, 1, or 2)
    std::process::exit(exit_code);
}

// Returns:
//   Ok(0) = everything mirrored
//   Ok(1) = the crawl stopped on an error
//   Err   = bad arguments or setup failure
async fn run() -> Result<i32> {
    // Parse command-line arguments; clap exits on --help and bad flags
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    // Validate before touching the network
    let config = cli.to_config()?;

    // One HTTP client for the whole crawl (connection pooling)
    let fetcher = HttpFetcher::new(&config.user_agent, config.retry.clone())
        .context("failed to build HTTP client")?;
    let crawler = Crawler::new(&config, Arc::new(fetcher));

    // Human-readable banner, unless stdout is reserved for JSON
    if !cli.json {
        eprintln!("Mirroring {}", cli.url);
        eprintln!("Output directory: {}", config.output_dir.display());
    }

    // Ctrl-C cancels the crawl instead of killing the process, so
    // in-flight writes finish and an error is still reported
    let token = CancellationToken::new();
    let ctrl_c = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, stopping...");
                token.cancel();
            }
        })
    };

    // Progress line on stderr while the crawl runs
    let progress = (!cli.json).then(|| spawn_progress(crawler.stats()));

    // The actual work
    let result = crawler.run(&cli.url, &token).await;

    // Stop the background tasks and finish the progress line
    if let Some(progress) = progress {
        progress.abort();
        eprintln!();
    }
    ctrl_c.abort();

    match result {
        Ok(summary) => {
            print_summary(&summary, cli.json)?;
            Ok(0)
        }
        Err(e) => {
            // The error names the URL that stopped the crawl
            eprintln!("Mirror failed: {}", e);
            // JSON consumers still get the partial counts
            if cli.json {
                print_summary(&crawler.stats().summary(), true)?;
            }
            Ok(1)
        }
    }
}

// Redraws a one-line progress report on stderr every half second
fn spawn_progress(stats: Arc<CrawlStats>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        loop {
            ticker.tick().await;
            let summary = stats.summary();
            eprint!(
                "\rProgress: {} files | {} downloaded | {}/s | {:.0}s elapsed   ",
                summary.written(),
                format_bytes(summary.bytes),
                format_bytes(summary.rate() as u64),
                summary.elapsed.as_secs_f64()
            );
            let _ = std::io::stderr().flush();
        }
    })
}

// Prints the final counts, either as a table or as JSON on stdout
fn print_summary(summary: &CrawlSummary, json: bool) -> Result<()> {
    if json {
        let json_output = serde_json::to_string_pretty(summary)?;
        println!("{}", json_output);
        return Ok(());
    }

    // Table output
    println!("Summary:");
    println!("   Playlists: {}", summary.playlists);
    println!("   Files:     {}", summary.files);
    println!("   Skipped:   {}", summary.skipped);
    println!("   Size:      {}", format_bytes(summary.bytes));
    println!("   Elapsed:   {:.1}s", summary.elapsed.as_secs_f64());
    Ok(())
}
