// src/crawl/stats.rs
// =============================================================================
// Counters updated by the workers while a crawl runs.
//
// Workers bump atomics; anyone can take a CrawlSummary snapshot at any time
// (the progress ticker does, and the final report does).
// =============================================================================

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct CrawlStats {
    playlists: AtomicU64,
    files: AtomicU64,
    skipped: AtomicU64,
    bytes: AtomicU64,
    started: Instant,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlSummary {
    /// Playlists written
    pub playlists: u64,
    /// Non-playlist resources written
    pub files: u64,
    /// References dropped by the extension filter
    pub skipped: u64,
    pub bytes: u64,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl CrawlStats {
    pub fn new() -> Self {
        CrawlStats {
            playlists: AtomicU64::new(0),
            files: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record_playlist(&self, bytes: usize) {
        self.playlists.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_file(&self, bytes: usize) {
        self.files.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> CrawlSummary {
        CrawlSummary {
            playlists: self.playlists.load(Ordering::Relaxed),
            files: self.files.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

impl Default for CrawlStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlSummary {
    pub fn written(&self) -> u64 {
        self.playlists + self.files
    }

    /// Average bytes per second over the whole run.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }
}

/// Human-readable byte count, e.g. 1536 -> "1.5 KiB".
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

// Durations go out as fractional seconds in JSON
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = CrawlStats::new();
        stats.record_playlist(100);
        stats.record_file(1000);
        stats.record_file(24);
        stats.record_skipped();

        let summary = stats.summary();
        assert_eq!(summary.playlists, 1);
        assert_eq!(summary.files, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.bytes, 1124);
        assert_eq!(summary.written(), 3);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_summary_json_shape() {
        let summary = CrawlSummary {
            playlists: 2,
            files: 10,
            skipped: 1,
            bytes: 2048,
            elapsed: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["playlists"], 2);
        assert_eq!(json["elapsed"], 1.5);
    }
}
