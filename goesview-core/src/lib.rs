//! # GOES Viewer Core
//!
//! Thumbnail derivation and cache core for browsing a large, read-only tree of
//! satellite images.
//!
//! ## Overview
//!
//! - **Path codec**: reversible mapping from source-relative paths to flat cache filenames
//! - **Directory indexer**: one-level listings and the depth-first image walk
//! - **Render workers**: decode, resize to a fixed width and publish JPEG previews atomically
//! - **Render queue**: rate-limited, deduplicating, two-priority dispatch onto the workers
//! - **Thumbnail cache**: `get` a preview path, rendering it on a miss
//! - **Reconciliation**: periodic scan that schedules previews for images that lack one
//! - **Channel table**: reloadable channel metadata lookups
//!
//! ## Architecture
//!
//! - [`paths`]: [`CacheKey`] and the [`SourceRoot`] sandbox
//! - [`index`]: [`DirectoryIndexer`]
//! - [`render`]: [`Renderer`], [`ImageRenderer`], [`RenderWorkers`]
//! - [`queue`]: [`RenderQueue`] and [`DispatchLimiter`]
//! - [`cache`]: [`ThumbnailCache`]
//! - [`scan`]: [`Reconciler`] and [`ScanProgress`]
//! - [`channels`]: [`ChannelTable`]

pub mod cache;
pub mod channels;
pub mod config;
pub mod error;
pub mod index;
pub mod paths;
pub mod queue;
pub mod render;
pub mod scan;

pub use cache::{CachedKeys, ThumbnailCache};
pub use channels::{ChannelRecord, ChannelTable};
pub use config::{DEFAULT_IMAGE_EXTENSIONS, DispatchConfig, PreviewConfig};
pub use error::{PreviewError, Result};
pub use index::{DirectoryIndexer, ExtensionSet, SourceEntry};
pub use paths::{CacheKey, SourceRoot};
pub use queue::{
    DispatchLimiter, JobHandle, JobOutcome, JobPriority, QueueStats, RenderJob, RenderQueue,
};
pub use render::{ImageRenderer, RenderOutcome, RenderWorkers, Renderer};
pub use scan::{NoopScanObserver, Reconciler, ScanObserver, ScanProgress, ScanReport, ScanSnapshot};

use std::sync::Arc;

/// Build the render queue described by `config` around `renderer`.
///
/// Must be called from within a tokio runtime; the dispatcher task is
/// spawned immediately.
pub fn start_queue(config: &PreviewConfig, renderer: Arc<dyn Renderer>) -> Result<RenderQueue> {
    let workers = RenderWorkers::new(config.workers, renderer)?;
    Ok(RenderQueue::start(
        workers,
        DispatchLimiter::from_config(&config.dispatch),
    ))
}
