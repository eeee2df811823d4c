// src/storage/sink.rs
// =============================================================================
// Persists fetched bytes to the local mirror.
//
// FileSink asks the PathMapper where a URL belongs, creates the parent
// directories and writes through a temporary file that is renamed into place,
// so nobody ever sees a half-written file.
// =============================================================================

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::paths::PathMapper;
use crate::error::MirrorError;

/// Destination for mirrored resources.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Stores `body` as the content of `url`, returning where it landed.
    async fn write(&self, url: &str, body: &[u8]) -> Result<PathBuf, MirrorError>;
}

/// Writes files under the mapper's output root.
pub struct FileSink {
    paths: Arc<PathMapper>,
}

impl FileSink {
    pub fn new(paths: Arc<PathMapper>) -> Self {
        FileSink { paths }
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn write(&self, url: &str, body: &[u8]) -> Result<PathBuf, MirrorError> {
        let path = self.paths.assign(url).map_err(|source| MirrorError::Path {
            url: url.to_string(),
            source,
        })?;

        let sink_err = |source: std::io::Error, path: &PathBuf| MirrorError::Sink {
            url: url.to_string(),
            path: path.clone(),
            source,
        };

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| sink_err(e, &path))?;
        }

        let mut tmp_name = path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, body)
            .await
            .map_err(|e| sink_err(e, &tmp_path))?;

        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(sink_err(e, &path));
        }

        debug!(url, path = %path.display(), bytes = body.len(), "wrote file");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Layout;

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Arc::new(PathMapper::new(dir.path(), Layout::Hierarchical));
        let sink = FileSink::new(Arc::clone(&paths));

        let written = sink
            .write("https://example.com/a/b/seg.ts", b"segment bytes")
            .await
            .unwrap();

        assert_eq!(written, dir.path().join("a").join("b").join("seg.ts"));
        assert_eq!(std::fs::read(&written).unwrap(), b"segment bytes");
        assert!(!dir.path().join("a/b/seg.ts.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(Arc::new(PathMapper::new(dir.path(), Layout::Flattened)));

        sink.write("https://example.com/p.m3u8", b"old").await.unwrap();
        let written = sink.write("https://example.com/p.m3u8", b"new").await.unwrap();

        assert_eq!(std::fs::read(written).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_write_failure_names_url() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where a directory is needed
        std::fs::write(dir.path().join("blocked"), b"x").unwrap();
        let sink = FileSink::new(Arc::new(PathMapper::new(dir.path(), Layout::Hierarchical)));

        let err = sink
            .write("https://example.com/blocked/seg.ts", b"data")
            .await
            .unwrap_err();

        assert!(matches!(err, MirrorError::Sink { .. }));
        assert_eq!(err.url(), "https://example.com/blocked/seg.ts");
    }
}
