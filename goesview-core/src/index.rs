//! One-level directory listing over the source tree, plus the depth-first
//! image walk the reconciliation scanner builds on.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{PreviewError, Result};
use crate::paths::SourceRoot;

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceEntry {
    /// Final path component.
    pub filename: String,
    /// Whether the entry is a directory (symlinks are not followed).
    pub is_directory: bool,
    /// Source-relative path, slash separated.
    pub path: String,
}

/// Case-insensitive set of file extensions, stored without the leading dot.
#[derive(Clone, Debug, Default)]
pub struct ExtensionSet {
    extensions: HashSet<String>,
}

impl ExtensionSet {
    /// Build from extensions with or without a leading dot.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    /// True when `file_name` ends in one of the extensions, ignoring case.
    pub fn matches(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
    }
}

/// Lists source-tree directories under a [`SourceRoot`].
#[derive(Clone, Debug)]
pub struct DirectoryIndexer {
    root: SourceRoot,
    images: ExtensionSet,
}

impl DirectoryIndexer {
    /// Indexer over `root` treating `images` as previewable.
    pub fn new(root: SourceRoot, images: ExtensionSet) -> Self {
        Self { root, images }
    }

    /// Sandbox every listing resolves against.
    pub fn root(&self) -> &SourceRoot {
        &self.root
    }

    /// Extensions used by [`list_images`](Self::list_images).
    pub fn image_extensions(&self) -> &ExtensionSet {
        &self.images
    }

    /// Read one directory level. Directories are always included so callers
    /// can recurse; files only when `filter` is absent or matches. Order is
    /// whatever the filesystem returns.
    pub async fn list(
        &self,
        relative: &str,
        filter: Option<&ExtensionSet>,
    ) -> Result<Vec<SourceEntry>> {
        let (normalized, dir) = self.root.resolve_dir(relative).await?;
        debug!(path = %dir.display(), "listing directory");

        let unavailable = |source| PreviewError::DirectoryUnavailable {
            path: dir.clone(),
            source,
        };
        let mut reader = tokio::fs::read_dir(&dir).await.map_err(unavailable)?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(unavailable)? {
            let Ok(filename) = entry.file_name().into_string() else {
                warn!(path = %entry.path().display(), "skipping non UTF-8 file name");
                continue;
            };
            let is_directory = match entry.file_type().await {
                Ok(file_type) => file_type.is_dir(),
                Err(err) => {
                    warn!(path = %entry.path().display(), error = %err, "cannot stat entry");
                    continue;
                }
            };

            if !is_directory && filter.is_some_and(|set| !set.matches(&filename)) {
                continue;
            }

            let path = if normalized.is_empty() {
                filename.clone()
            } else {
                format!("{normalized}/{filename}")
            };
            entries.push(SourceEntry {
                filename,
                is_directory,
                path,
            });
        }

        Ok(entries)
    }

    /// Listing filtered by the recognized image extensions.
    pub async fn list_images(&self, relative: &str) -> Result<Vec<SourceEntry>> {
        self.list(relative, Some(&self.images)).await
    }

    /// Depth-first collection of every image file under `relative`.
    ///
    /// The starting directory must be readable; unreadable subdirectories are
    /// logged and skipped so one bad folder does not sink a whole scan.
    pub async fn walk_images(&self, relative: &str) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut stack = Vec::new();

        for entry in self.list_images(relative).await? {
            push_entry(entry, &mut files, &mut stack);
        }

        while let Some(dir) = stack.pop() {
            match self.list_images(&dir).await {
                Ok(entries) => {
                    for entry in entries {
                        push_entry(entry, &mut files, &mut stack);
                    }
                }
                Err(err) => warn!(path = %dir, error = %err, "skipping unreadable directory"),
            }
        }

        Ok(files)
    }
}

fn push_entry(entry: SourceEntry, files: &mut Vec<String>, stack: &mut Vec<String>) {
    if entry.is_directory {
        stack.push(entry.path);
    } else {
        files.push(entry.path);
    }
}
