//! Error type shared by every core component.

use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the preview core to its callers.
#[derive(Error, Debug)]
pub enum PreviewError {
    /// A source directory is missing or unreadable (mount absent or misconfigured).
    #[error("Directory unavailable: {}: {source}", path.display())]
    DirectoryUnavailable {
        /// Absolute directory that could not be read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The requested source file does not exist.
    #[error("Source file not found: {0}")]
    SourceNotFound(String),

    /// Decoding or encoding failed inside a render worker.
    #[error("Thumbnail generation failed for {path}: {reason}")]
    GenerationFailed {
        /// Source-relative path of the image.
        path: String,
        /// Worker-reported reason.
        reason: String,
    },

    /// A cache filename that does not decode back to a relative path.
    #[error("Malformed cache key: {0}")]
    MalformedKey(String),

    /// A relative path that is absolute, contains `..`, or escapes the source root.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The render queue no longer accepts or runs work.
    #[error("Render queue is shutting down")]
    ShuttingDown,

    /// The channel table file could not be read or parsed.
    #[error("Channel table error: {0}")]
    ChannelTable(String),

    /// Filesystem failure outside the cases above.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PreviewError>;
