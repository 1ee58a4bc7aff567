//! Source-root sandbox: normalizes client paths and keeps resolution inside the root.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{PreviewError, Result};

/// The configured source tree. Every relative path handed to the core is
/// resolved against this directory and must stay inside it.
#[derive(Clone, Debug)]
pub struct SourceRoot {
    root: PathBuf,
}

impl SourceRoot {
    /// Canonicalize `root` so prefix checks compare like with like.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = std::fs::canonicalize(root).map_err(|source| {
            PreviewError::DirectoryUnavailable {
                path: root.to_path_buf(),
                source,
            }
        })?;
        Ok(Self { root: canonical })
    }

    /// Canonical root directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Normalize a client-supplied relative path into the slash-joined form
    /// used for cache keys. Empty and `.` segments are dropped; absolute
    /// paths, `..` segments and NUL bytes are rejected before any filesystem
    /// access.
    pub fn normalize(relative: &str) -> Result<String> {
        if relative.starts_with('/') || relative.contains('\0') {
            return Err(PreviewError::InvalidPath(relative.to_string()));
        }

        let mut segments = Vec::new();
        for segment in relative.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(PreviewError::InvalidPath(relative.to_string())),
                other => segments.push(other),
            }
        }
        Ok(segments.join("/"))
    }

    /// Lexical join of an already-normalized relative path.
    pub fn join(&self, normalized: &str) -> PathBuf {
        if normalized.is_empty() {
            self.root.clone()
        } else {
            self.root.join(normalized)
        }
    }

    /// Resolve a directory for listing. Missing or unreadable directories map
    /// to `DirectoryUnavailable`; symlinks leading outside the root to `InvalidPath`.
    pub async fn resolve_dir(&self, relative: &str) -> Result<(String, PathBuf)> {
        let normalized = Self::normalize(relative)?;
        let joined = self.join(&normalized);
        let canonical = tokio::fs::canonicalize(&joined).await.map_err(|source| {
            PreviewError::DirectoryUnavailable {
                path: joined.clone(),
                source,
            }
        })?;
        self.ensure_contained(relative, &canonical)?;
        Ok((normalized, canonical))
    }

    /// Resolve an existing regular file. Returns the normalized relative path
    /// alongside the canonical absolute path.
    pub async fn resolve_file(&self, relative: &str) -> Result<(String, PathBuf)> {
        let normalized = Self::normalize(relative)?;
        if normalized.is_empty() {
            return Err(PreviewError::InvalidPath(relative.to_string()));
        }

        let joined = self.join(&normalized);
        let canonical = match tokio::fs::canonicalize(&joined).await {
            Ok(path) => path,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(PreviewError::SourceNotFound(normalized));
            }
            Err(err) => return Err(PreviewError::Io(err)),
        };
        self.ensure_contained(relative, &canonical)?;

        let metadata = tokio::fs::metadata(&canonical).await?;
        if !metadata.is_file() {
            return Err(PreviewError::SourceNotFound(normalized));
        }
        Ok((normalized, canonical))
    }

    fn ensure_contained(&self, relative: &str, canonical: &Path) -> Result<()> {
        if canonical.starts_with(&self.root) {
            Ok(())
        } else {
            Err(PreviewError::InvalidPath(relative.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn normalize_collapses_redundant_segments() {
        assert_eq!(SourceRoot::normalize("").unwrap(), "");
        assert_eq!(SourceRoot::normalize("a//b/./c.jpg").unwrap(), "a/b/c.jpg");
        assert_eq!(SourceRoot::normalize("a/b/").unwrap(), "a/b");
    }

    #[test]
    fn normalize_rejects_escapes() {
        for raw in ["/etc/passwd", "../secret", "a/../../b", "a/\0b"] {
            assert!(
                matches!(SourceRoot::normalize(raw), Err(PreviewError::InvalidPath(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn resolve_file_distinguishes_missing_and_directories() {
        let tmp = tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("dir")).unwrap();
        std::fs::write(tmp.path().join("dir/a.jpg"), b"x").unwrap();
        let root = SourceRoot::new(tmp.path()).unwrap();

        let (normalized, path) = root.resolve_file("dir//a.jpg").await.unwrap();
        assert_eq!(normalized, "dir/a.jpg");
        assert!(path.ends_with("dir/a.jpg"));

        assert!(matches!(
            root.resolve_file("dir/missing.jpg").await,
            Err(PreviewError::SourceNotFound(_))
        ));
        assert!(matches!(
            root.resolve_file("dir").await,
            Err(PreviewError::SourceNotFound(_))
        ));
        assert!(matches!(
            root.resolve_file("").await,
            Err(PreviewError::InvalidPath(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_out_of_the_root_are_rejected() {
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("secret.jpg"), b"x").unwrap();

        let tmp = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("link")).unwrap();
        let root = SourceRoot::new(tmp.path()).unwrap();

        assert!(matches!(
            root.resolve_file("link/secret.jpg").await,
            Err(PreviewError::InvalidPath(_))
        ));
        assert!(matches!(
            root.resolve_dir("link").await,
            Err(PreviewError::InvalidPath(_))
        ));
    }
}
