//! Thumbnail cache manager.
//!
//! A cache entry is a file named `<key>.jpg` in the cache directory; its
//! existence is the only record that a preview is ready. Misses are turned
//! into interactive render jobs and awaited, so callers see a synchronous
//! `get` while the actual decode happens on the render workers.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{PreviewError, Result};
use crate::paths::{CacheKey, SourceRoot};
use crate::queue::{JobHandle, JobOutcome, RenderJob, RenderQueue};
use crate::render::is_temp_artifact;

/// Keys found in the cache directory.
#[derive(Debug, Default)]
pub struct CachedKeys {
    /// Decoded source-relative paths with a published entry.
    pub paths: HashSet<String>,
    /// Files that are not `<key>.jpg` for a canonical key.
    pub unrecognized: usize,
}

/// Cache manager over one cache directory. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ThumbnailCache {
    root: SourceRoot,
    cache_dir: PathBuf,
    queue: RenderQueue,
}

impl ThumbnailCache {
    /// Create the cache directory if needed and clear temp files left by an
    /// interrupted publish.
    pub async fn open(
        root: SourceRoot,
        cache_dir: impl AsRef<Path>,
        queue: RenderQueue,
    ) -> Result<Self> {
        let cache_dir = cache_dir.as_ref();
        tokio::fs::create_dir_all(cache_dir).await?;
        let cache_dir = tokio::fs::canonicalize(cache_dir).await?;

        let swept = sweep_temp_artifacts(&cache_dir).await?;
        if swept > 0 {
            info!(cache_dir = %cache_dir.display(), swept, "removed interrupted preview writes");
        }

        Ok(Self {
            root,
            cache_dir,
            queue,
        })
    }

    /// Canonical cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Queue that renders this cache's misses.
    pub fn queue(&self) -> &RenderQueue {
        &self.queue
    }

    /// Absolute path of the entry for `key`, whether or not it exists.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.file_name())
    }

    /// Cache entry path for a client-supplied relative path.
    pub fn entry_path_for(&self, relative: &str) -> Result<PathBuf> {
        let normalized = SourceRoot::normalize(relative)?;
        Ok(self.entry_path(&CacheKey::encode(&normalized)))
    }

    /// Path to the preview for `relative`, rendering it first on a miss.
    ///
    /// A hit does no work at all. A miss checks that the source exists, then
    /// enqueues an interactive job (attaching to one already running for the
    /// same destination) and waits for it.
    pub async fn get(&self, relative: &str) -> Result<PathBuf> {
        let normalized = SourceRoot::normalize(relative)?;
        if normalized.is_empty() {
            return Err(PreviewError::InvalidPath(relative.to_string()));
        }
        let destination = self.entry_path(&CacheKey::encode(&normalized));

        if tokio::fs::try_exists(&destination).await.unwrap_or(false) {
            debug!(path = %normalized, "thumbnail cache hit");
            return Ok(destination);
        }

        let (normalized, source) = self.root.resolve_file(&normalized).await?;
        let handle = self
            .queue
            .enqueue(RenderJob::interactive(source, destination.clone()))?;

        match handle.wait().await {
            JobOutcome::Rendered => Ok(destination),
            JobOutcome::Failed(reason) => Err(PreviewError::GenerationFailed {
                path: normalized,
                reason,
            }),
            JobOutcome::Discarded => Err(PreviewError::ShuttingDown),
        }
    }

    /// Queue a background render for `relative` without waiting on it.
    pub async fn prefetch(&self, relative: &str) -> Result<JobHandle> {
        let (normalized, source) = self.root.resolve_file(relative).await?;
        let destination = self.entry_path(&CacheKey::encode(&normalized));
        self.queue
            .enqueue(RenderJob::background(source, destination))
    }

    /// Enqueue a background job for a path already known to exist in the
    /// source tree, skipping the existence check `prefetch` performs.
    pub(crate) fn schedule_background(&self, normalized: &str) -> Result<JobHandle> {
        let source = self.root.join(normalized);
        let destination = self.entry_path(&CacheKey::encode(normalized));
        self.queue
            .enqueue(RenderJob::background(source, destination))
    }

    /// Decode every cache filename into the relative path it stands for.
    /// Anything that does not decode is counted and otherwise ignored.
    pub async fn cached_keys(&self) -> Result<CachedKeys> {
        let mut keys = CachedKeys::default();
        let mut reader = tokio::fs::read_dir(&self.cache_dir).await?;

        while let Some(entry) = reader.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                keys.unrecognized += 1;
                continue;
            };
            if is_temp_artifact(name) {
                continue;
            }

            match CacheKey::from_file_name(name).and_then(|key| key.decode()) {
                Ok(path) => {
                    keys.paths.insert(path);
                }
                Err(err) => {
                    warn!(file = %name, error = %err, "ignoring unrecognized cache file");
                    keys.unrecognized += 1;
                }
            }
        }

        Ok(keys)
    }
}

async fn sweep_temp_artifacts(cache_dir: &Path) -> Result<usize> {
    let mut swept = 0;
    let mut reader = tokio::fs::read_dir(cache_dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        let is_temp = entry.file_name().to_str().is_some_and(is_temp_artifact);
        if !is_temp {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => swept += 1,
            Err(err) => warn!(path = %entry.path().display(), error = %err, "failed to remove temp file"),
        }
    }
    Ok(swept)
}
