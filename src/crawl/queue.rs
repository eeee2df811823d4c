// src/crawl/queue.rs
// =============================================================================
// The crawl itself: mirrors a playlist and everything reachable from it.
//
// How it works:
// 1. The start URL is claimed and queued as a playlist fetch
// 2. A fixed pool of workers pulls jobs off one shared queue
// 3. Fetching a plain resource writes it to the sink
// 4. Fetching a playlist parses it, claims every new reference that passes
//    the filter (fixing its local path at the same time) and queues them
// 5. When the last claimed child of a playlist is done, a Finish job for
//    that playlist is queued: rewrite it and write it
// 6. When no job is queued or running, the queue closes and workers exit
//
// Nested playlists go back onto the same queue, so the worker count is the
// concurrency limit for the whole crawl, however deep the playlist tree is.
// A playlist never blocks a worker while its children run.
//
// Shared state:
// - VisitedSet: URLs already claimed. Check-and-insert is one locked step,
//   so exactly one worker ever fetches a given URL.
// - PathMapper: URL -> local path, see storage/paths.rs
// Neither lock is held across an await.
//
// Failure is fail-fast: the first error is kept, the token is cancelled, and
// workers drop the remaining jobs without running them. A fetch already in
// progress is allowed to finish.
//
// Rust concepts:
// - Arc<Shared>: every worker task owns a handle to the same crawl state
// - AtomicUsize: lock-free counters for outstanding jobs and pending children
// - mpsc channel: the job queue; dropping the last sender closes it
// - CancellationToken: one flag every worker and every retry loop watches
// =============================================================================

use bytes::Bytes;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

use super::filter::ExtensionFilter;
use super::stats::{CrawlStats, CrawlSummary};
use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::fetch::Fetcher;
use crate::playlist::{rewrite, Playlist};
use crate::storage::{FileSink, PathMapper, Sink};

/// A URL waiting to be fetched.
#[derive(Debug)]
struct CrawlTask {
    url: String,
    is_playlist: bool,
    /// The playlist that claimed this URL (None for the start URL)
    parent: Option<Arc<PendingPlaylist>>,
}

/// A fetched playlist whose children are still in flight.
#[derive(Debug)]
struct PendingPlaylist {
    /// Key the playlist was claimed and assigned under
    url: String,
    /// Parsed form of `url`, what references are resolved against
    base: Url,
    body: Bytes,
    /// Claimed children not yet written
    remaining: AtomicUsize,
    parent: Option<Arc<PendingPlaylist>>,
}

#[derive(Debug)]
enum Job {
    Fetch(CrawlTask),
    /// All children are done: rewrite and write the playlist
    Finish(Arc<PendingPlaylist>),
}

/// URLs claimed so far in this crawl.
#[derive(Debug, Default)]
struct VisitedSet {
    urls: Mutex<HashSet<String>>,
}

impl VisitedSet {
    /// Marks `url` as visited. True only for the first caller.
    fn claim(&self, url: &str) -> bool {
        let mut urls = self.urls.lock();
        if urls.contains(url) {
            return false;
        }
        urls.insert(url.to_string())
    }
}

/// Shared job queue that closes itself once nothing is queued or running.
struct JobQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>,
    /// Jobs pushed but not yet finished
    outstanding: AtomicUsize,
}

impl JobQueue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        JobQueue {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            outstanding: AtomicUsize::new(0),
        }
    }

    fn push(&self, job: Job) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if let Some(sender) = self.sender.lock().as_ref() {
            // The receiver lives as long as the queue, so this cannot fail
            let _ = sender.send(job);
        }
    }

    async fn pop(&self) -> Option<Job> {
        self.receiver.lock().await.recv().await
    }

    /// Called once per popped job, after any follow-up jobs were pushed.
    fn done(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Dropping the only sender wakes every idle worker with None
            self.sender.lock().take();
        }
    }
}

/// Marks a job finished even if processing it panics.
struct JobGuard<'a> {
    queue: &'a JobQueue,
    token: &'a CancellationToken,
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.token.cancel();
        }
        self.queue.done();
    }
}

/// State shared by all workers of one crawl.
struct Shared {
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn Sink>,
    paths: Arc<PathMapper>,
    filter: ExtensionFilter,
    rewrite: bool,
    stats: Arc<CrawlStats>,
    visited: VisitedSet,
    queue: JobQueue,
    token: CancellationToken,
    first_error: Mutex<Option<MirrorError>>,
}

/// Mirrors playlists. One Crawler is good for one crawl.
pub struct Crawler {
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn Sink>,
    paths: Arc<PathMapper>,
    filter: ExtensionFilter,
    rewrite: bool,
    concurrency: usize,
    stats: Arc<CrawlStats>,
}

impl Crawler {
    /// Builds a crawler writing files under `config.output_dir`.
    pub fn new(config: &MirrorConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let paths = Arc::new(PathMapper::new(&config.output_dir, config.layout()));
        let sink: Arc<dyn Sink> = Arc::new(FileSink::new(Arc::clone(&paths)));

        Crawler {
            fetcher,
            sink,
            paths,
            filter: ExtensionFilter::new(config.include.clone(), config.exclude.clone()),
            rewrite: config.rewrite,
            concurrency: config.concurrency.max(1),
            stats: Arc::new(CrawlStats::new()),
        }
    }

    /// Replaces the sink. It must place files where `paths()` says.
    #[cfg(test)]
    fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = sink;
        self
    }

    #[cfg(test)]
    fn paths(&self) -> &Arc<PathMapper> {
        &self.paths
    }

    pub fn stats(&self) -> Arc<CrawlStats> {
        Arc::clone(&self.stats)
    }

    /// Mirrors `start_url` and everything it references.
    ///
    /// Returns the first fatal error, if any. Cancelling `token` stops the
    /// crawl as soon as the workers notice.
    pub async fn run(
        &self,
        start_url: &str,
        token: &CancellationToken,
    ) -> Result<CrawlSummary, MirrorError> {
        // Reject a bad start URL before any worker is spawned
        Url::parse(start_url).map_err(|source| MirrorError::InvalidUrl {
            url: start_url.to_string(),
            source,
        })?;

        // Everything the workers need, behind one Arc
        let shared = Arc::new(Shared {
            fetcher: Arc::clone(&self.fetcher),
            sink: Arc::clone(&self.sink),
            paths: Arc::clone(&self.paths),
            filter: self.filter.clone(),
            rewrite: self.rewrite,
            stats: Arc::clone(&self.stats),
            visited: VisitedSet::default(),
            queue: JobQueue::new(),
            // Our own failures cancel this child, never the caller's token
            token: token.child_token(),
            first_error: Mutex::new(None),
        });

        // The start URL goes through the same claim-then-assign steps as
        // every reference found later
        shared.visited.claim(start_url);
        shared
            .paths
            .assign(start_url)
            .map_err(|source| MirrorError::Path {
                url: start_url.to_string(),
                source,
            })?;
        shared.queue.push(Job::Fetch(CrawlTask {
            url: start_url.to_string(),
            is_playlist: true,
            parent: None,
        }));

        info!(url = start_url, workers = self.concurrency, "starting crawl");

        // Spawn the pool; each worker runs until the queue closes
        let workers: Vec<_> = (0..self.concurrency)
            .map(|id| tokio::spawn(worker(Arc::clone(&shared), id)))
            .collect();

        // Wait for all of them. A panicking worker already cancelled the
        // crawl from its JobGuard; re-raise the panic here
        for result in join_all(workers).await {
            if let Err(e) = result {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }

        // A recorded error wins over plain cancellation
        if let Some(err) = shared.first_error.lock().take() {
            return Err(err);
        }
        // Cancelled from outside (Ctrl-C) without any error of our own
        if shared.token.is_cancelled() {
            return Err(MirrorError::Cancelled {
                url: start_url.to_string(),
            });
        }

        let summary = self.stats.summary();
        info!(
            playlists = summary.playlists,
            files = summary.files,
            skipped = summary.skipped,
            bytes = summary.bytes,
            mapped = self.paths.len(),
            "crawl finished"
        );
        Ok(summary)
    }
}

async fn worker(shared: Arc<Shared>, id: usize) {
    // None means the queue closed: nothing queued, nothing running
    while let Some(job) = shared.queue.pop().await {
        // Dropped at the end of this iteration, marking the job done
        let _guard = JobGuard {
            queue: &shared.queue,
            token: &shared.token,
        };

        // Cooperative cancellation: checked at task start only
        if shared.token.is_cancelled() {
            continue;
        }

        // Any error stops the whole crawl
        if let Err(e) = shared.process(job, id).await {
            shared.fail(e);
        }
    }
    debug!(worker = id, "worker exiting");
}

impl Shared {
    async fn process(&self, job: Job, worker: usize) -> Result<(), MirrorError> {
        match job {
            Job::Fetch(task) => {
                debug!(worker, url = %task.url, playlist = task.is_playlist, "fetching");
                let body = self.fetcher.fetch(&self.token, &task.url).await?;

                if task.is_playlist {
                    // Playlists are written later, once their children are
                    self.expand(task, body)
                } else {
                    // Plain resources are written straight away
                    self.sink.write(&task.url, &body).await?;
                    self.stats.record_file(body.len());
                    self.child_finished(task.parent);
                    Ok(())
                }
            }
            Job::Finish(playlist) => self.finish(playlist).await,
        }
    }

    /// Parses a fetched playlist and queues its new references.
    fn expand(&self, task: CrawlTask, body: Bytes) -> Result<(), MirrorError> {
        let base = Url::parse(&task.url).map_err(|source| MirrorError::InvalidUrl {
            url: task.url.clone(),
            source,
        })?;
        let playlist = Playlist::parse(body, base)?;
        let master = playlist.is_master();

        // Keep only the references this playlist is responsible for
        let mut claimed = Vec::new();
        for reference in playlist.references {
            // Filtered references are never fetched or assigned a path
            if !self.filter.allows(&reference) {
                debug!(url = %reference.url, "filtered out");
                self.stats.record_skipped();
                continue;
            }
            // Someone else (or an earlier line of this playlist) has it
            if !self.visited.claim(&reference.url) {
                continue;
            }
            // Fix the path now; the rewriter only ever looks paths up
            self.paths
                .assign(&reference.url)
                .map_err(|source| MirrorError::Path {
                    url: reference.url.clone(),
                    source,
                })?;
            claimed.push(reference);
        }

        debug!(url = %task.url, master, children = claimed.len(), "parsed playlist");

        // The countdown the children report back to
        let pending = Arc::new(PendingPlaylist {
            url: task.url,
            base: playlist.base,
            body: playlist.body,
            remaining: AtomicUsize::new(claimed.len()),
            parent: task.parent,
        });

        // Nothing to wait for: the playlist can be written right away
        if claimed.is_empty() {
            self.queue.push(Job::Finish(pending));
            return Ok(());
        }

        for reference in claimed {
            self.queue.push(Job::Fetch(CrawlTask {
                url: reference.url,
                is_playlist: reference.is_playlist,
                parent: Some(Arc::clone(&pending)),
            }));
        }
        Ok(())
    }

    /// Rewrites (if enabled) and writes a playlist whose children are done.
    async fn finish(&self, playlist: Arc<PendingPlaylist>) -> Result<(), MirrorError> {
        // Every reference this playlist claimed has a path by now, so the
        // rewrite only has to look them up
        let body = if self.rewrite {
            Bytes::from(rewrite(
                &playlist.body,
                &playlist.base,
                &playlist.url,
                &self.paths,
            ))
        } else {
            playlist.body.clone()
        };

        self.sink.write(&playlist.url, &body).await?;
        self.stats.record_playlist(body.len());
        debug!(url = %playlist.url, "playlist written");

        // This playlist is itself a child of the playlist that claimed it
        self.child_finished(playlist.parent.clone());
        Ok(())
    }

    /// Counts down the parent's outstanding children; the last one queues
    /// the parent's Finish job.
    fn child_finished(&self, parent: Option<Arc<PendingPlaylist>>) {
        if let Some(parent) = parent {
            if parent.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.queue.push(Job::Finish(parent));
            }
        }
    }

    /// Records the first error and cancels the crawl.
    fn fail(&self, err: MirrorError) {
        let mut first = self.first_error.lock();
        if first.is_none() {
            error!(url = err.url(), error = %err, "crawl failed");
            *first = Some(err);
        } else {
            debug!(error = %err, "additional failure after cancellation");
        }
        drop(first);
        self.token.cancel();
    }
}
