// src/storage/paths.rs
// =============================================================================
// Decides where each mirrored URL lives on disk.
//
// Two layouts:
// - Hierarchical: <root>/<url path>, mirroring the server's directory tree
// - Flattened:    <root>/<basename>, everything in one directory
//
// The first assignment for a URL wins and is cached; later calls return the
// same path. Two different URLs never share a path: a clash gets an 8-char
// hash suffix ("seg.ts" -> "seg_1a2b3c4d.ts"), and a counter on top of that
// in the unlikely case the suffixed name is also taken.
//
// Files and directories share one namespace on disk. In the hierarchical
// layout "https://h/stream" and "https://h/stream/seg.ts" would want
// <root>/stream as a file and as a directory at once. The mapper keeps the
// set of directories its files live in, and:
// - a file whose path is already a directory takes the collision suffix
// - a file under a directory that is already a file moves into the sibling
//   directory "<dir>_<hash8>", hashed from the directory path so every file
//   of that directory lands in the same place
//
// The map and both sets sit behind one mutex. The lock is only ever held for
// in-memory work.
// =============================================================================

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use url::Url;

use crate::error::PathError;

/// How URLs are laid out under the output root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Hierarchical,
    Flattened,
}

#[derive(Debug, Default)]
struct Assignments {
    by_url: HashMap<String, PathBuf>,
    /// Paths handed out as files
    files: HashSet<PathBuf>,
    /// Every ancestor directory of a path in `files`
    dirs: HashSet<PathBuf>,
}

impl Assignments {
    /// True if `path` cannot be used as a file.
    fn is_taken(&self, path: &Path) -> bool {
        self.files.contains(path) || self.dirs.contains(path)
    }

    fn record(&mut self, url: &str, path: PathBuf) {
        for dir in path.ancestors().skip(1) {
            // Ancestors of a known directory are known too
            if !self.dirs.insert(dir.to_path_buf()) {
                break;
            }
        }
        self.files.insert(path.clone());
        self.by_url.insert(url.to_string(), path);
    }

    /// Moves `path` out from under any ancestor that is already a file.
    fn clear_of_files(&self, mut path: PathBuf) -> PathBuf {
        // ancestors() walks upward, so the last hit is the topmost one.
        // Renaming it can only leave conflicts further down.
        loop {
            let blocked = path
                .ancestors()
                .skip(1)
                .filter(|dir| self.files.contains(*dir))
                .last()
                .map(Path::to_path_buf);
            let Some(blocked) = blocked else {
                break;
            };

            let renamed = self.free_directory(&blocked);
            let rest = path.strip_prefix(&blocked).map(Path::to_path_buf).unwrap_or_default();
            path = renamed.join(rest);
        }
        path
    }

    /// "<dir>_<hash8>", then "<dir>_<hash8>_<n>", skipping names used as files.
    fn free_directory(&self, dir: &Path) -> PathBuf {
        let hash = url_hash(&dir.to_string_lossy());
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut candidate = dir.with_file_name(format!("{}_{}", name, &hash[..8]));
        let mut counter = 1u32;
        while self.files.contains(&candidate) {
            candidate = dir.with_file_name(format!("{}_{}_{}", name, &hash[..8], counter));
            counter += 1;
        }
        candidate
    }
}

/// URL -> local path assignments for one crawl.
#[derive(Debug)]
pub struct PathMapper {
    root: PathBuf,
    layout: Layout,
    assignments: Mutex<Assignments>,
}

impl PathMapper {
    pub fn new(root: impl Into<PathBuf>, layout: Layout) -> Self {
        PathMapper {
            root: root.into(),
            layout,
            assignments: Mutex::new(Assignments::default()),
        }
    }

    /// Returns the local path for `url`, assigning one on first use.
    pub fn assign(&self, url: &str) -> Result<PathBuf, PathError> {
        // Cheap lookups first, so the common repeat case never hashes
        if let Some(existing) = self.lookup(url) {
            return Ok(existing);
        }

        let candidate = self.candidate_path(url)?;

        let mut assignments = self.assignments.lock();
        // Another caller may have assigned it between the two lock scopes
        if let Some(existing) = assignments.by_url.get(url) {
            return Ok(existing.clone());
        }

        let candidate = assignments.clear_of_files(candidate);
        let path = if assignments.is_taken(&candidate) {
            resolve_collision(&candidate, url, &assignments)
        } else {
            candidate
        };

        assignments.record(url, path.clone());
        Ok(path)
    }

    /// Returns the already-assigned path for `url`, if any. Never assigns.
    pub fn lookup(&self, url: &str) -> Option<PathBuf> {
        self.assignments.lock().by_url.get(url).cloned()
    }

    /// Relative path from the directory holding `from_url`'s file to
    /// `to_url`'s file, always with '/' separators.
    ///
    /// Both URLs must already be assigned; this never creates assignments.
    pub fn relative_path(&self, from_url: &str, to_url: &str) -> Result<String, PathError> {
        let from = self
            .lookup(from_url)
            .ok_or_else(|| PathError::Unmapped(from_url.to_string()))?;
        let to = self
            .lookup(to_url)
            .ok_or_else(|| PathError::Unmapped(to_url.to_string()))?;

        let from_dir = from.parent().unwrap_or_else(|| Path::new(""));
        relative_between(from_dir, &to).ok_or_else(|| PathError::Unrelated {
            from: from_url.to_string(),
            to: to_url.to_string(),
        })
    }

    /// Number of URLs with an assigned path.
    pub fn len(&self) -> usize {
        self.assignments.lock().by_url.len()
    }

    /// The path `url` would get if nothing else claimed it first.
    fn candidate_path(&self, url: &str) -> Result<PathBuf, PathError> {
        let parsed = Url::parse(url).map_err(|_| PathError::InvalidUrl(url.to_string()))?;

        let mut segments: Vec<String> = parsed
            .path_segments()
            .map(|parts| parts.map(decode_segment).collect())
            .unwrap_or_default();

        // A path ending in '/' has no file name; make one up from the URL
        let file_name = match segments.pop() {
            Some(name) if !name.is_empty() && name != "." && name != ".." => name,
            _ => synthesized_name(url),
        };

        let mut path = self.root.clone();
        if self.layout == Layout::Hierarchical {
            for dir in segments
                .iter()
                .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            {
                path.push(dir);
            }
        }
        path.push(file_name);

        Ok(path)
    }
}

/// Percent-decodes one path segment into a file-system-safe name.
fn decode_segment(segment: &str) -> String {
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    decoded.replace(['/', '\\'], "_")
}

/// Hex SHA-256 of a URL string.
pub fn url_hash(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// File name for URLs whose path has no basename.
fn synthesized_name(url: &str) -> String {
    format!("{}.bin", &url_hash(url)[..16])
}

/// Finds a free variant of `taken` for `url`: "<stem>_<hash8><.ext>", then
/// "<stem>_<hash8>_<n><.ext>" with n counting up from 1.
fn resolve_collision(taken: &Path, url: &str, assignments: &Assignments) -> PathBuf {
    let hash = url_hash(url);
    let short = &hash[..8];

    let stem = taken
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = taken
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut path = taken.with_file_name(format!("{}_{}{}", stem, short, ext));
    let mut counter = 1u32;
    while assignments.is_taken(&path) {
        path = taken.with_file_name(format!("{}_{}_{}{}", stem, short, counter, ext));
        counter += 1;
    }
    path
}

/// Relative path from directory `from_dir` to file `to`, joined with '/'.
/// Returns None if the two paths cannot be related lexically.
fn relative_between(from_dir: &Path, to: &Path) -> Option<String> {
    if from_dir.is_absolute() != to.is_absolute() {
        return None;
    }

    let from: Vec<Component> = from_dir
        .components()
        .filter(|c| *c != Component::CurDir)
        .collect();
    let to: Vec<Component> = to
        .components()
        .filter(|c| *c != Component::CurDir)
        .collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    // Climbing out of a ".." would need to know what it points at
    if from[common..].iter().any(|c| *c == Component::ParentDir) {
        return None;
    }

    let mut parts: Vec<String> = vec!["..".to_string(); from.len() - common];
    parts.extend(
        to[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );

    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
