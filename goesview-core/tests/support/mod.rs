//! Shared harness for core integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use goesview_core::{
    DEFAULT_IMAGE_EXTENSIONS, DirectoryIndexer, DispatchLimiter, ExtensionSet, ImageRenderer,
    Reconciler, RenderOutcome, RenderQueue, RenderWorkers, Renderer, SourceRoot, ThumbnailCache,
};
use image::{Rgb, RgbImage};
use tempfile::TempDir;

/// Delegates to the real image renderer and counts invocations.
#[derive(Debug)]
pub struct CountingRenderer {
    inner: ImageRenderer,
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingRenderer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Renderer for CountingRenderer {
    fn render(&self, source: &Path, destination: &Path) -> RenderOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.render(source, destination)
    }
}

/// Source tree, cache directory and a running queue over both.
pub struct Harness {
    pub source: TempDir,
    pub cache_dir: TempDir,
    pub renderer: Arc<CountingRenderer>,
    pub cache: ThumbnailCache,
    pub indexer: DirectoryIndexer,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_limits(4, DispatchLimiter::new(100, Duration::from_millis(10)), Duration::ZERO).await
    }

    pub async fn with_limits(workers: usize, limiter: DispatchLimiter, delay: Duration) -> Self {
        let source = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(CountingRenderer {
            inner: ImageRenderer::new(200, 85, 256),
            calls: AtomicUsize::new(0),
            delay,
        });

        let workers = RenderWorkers::new(workers, Arc::clone(&renderer) as Arc<dyn Renderer>).unwrap();
        let queue = RenderQueue::start(workers, limiter);
        let root = SourceRoot::new(source.path()).unwrap();
        let cache = ThumbnailCache::open(root.clone(), cache_dir.path(), queue)
            .await
            .unwrap();
        let indexer = DirectoryIndexer::new(root, ExtensionSet::new(DEFAULT_IMAGE_EXTENSIONS));

        Self {
            source,
            cache_dir,
            renderer,
            cache,
            indexer,
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.indexer.clone(), self.cache.clone())
    }

    pub fn queue(&self) -> &RenderQueue {
        self.cache.queue()
    }

    /// Write a small valid image at `relative` inside the source tree.
    pub fn write_image(&self, relative: &str) -> PathBuf {
        let path = self.source.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let format = image::ImageFormat::from_path(&path).unwrap();
        let img = RgbImage::from_fn(400, 300, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        img.save_with_format(&path, format).unwrap();
        path
    }

    pub fn write_bytes(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.source.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// Sorted names of the published entries in the cache directory.
    pub fn cache_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.cache_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }
}
