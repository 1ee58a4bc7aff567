//! Reconciliation scanner.
//!
//! Compares the set of published cache entries ("have") with the set of
//! image files in the source tree ("want") and schedules background renders
//! for `want - have`. The scan only reads the source tree and never removes
//! cache entries, so previews outlive their sources.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ThumbnailCache;
use crate::error::Result;
use crate::index::DirectoryIndexer;
use crate::queue::JobHandle;

/// Summary of one reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Image files found in the source tree.
    pub discovered: usize,
    /// Of those, how many already had a cache entry.
    pub cached: usize,
    /// Background jobs handed to the queue (attachments included).
    pub enqueued: usize,
    /// Cache files that did not decode to a relative path.
    pub unrecognized: usize,
    /// Wall time of the pass.
    pub elapsed_ms: u64,
}

/// Hooks for work that should follow a scan. Callers chain reloads onto
/// scans without the scanner knowing about them.
pub trait ScanObserver: Send + Sync {
    /// Called before a pass reads anything.
    fn scan_started(&self) {}
    /// Called after a pass scheduled its work.
    fn scan_finished(&self, _report: &ScanReport) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default)]
pub struct NoopScanObserver;

impl ScanObserver for NoopScanObserver {}

/// Live counters for the current (or most recent) scan.
#[derive(Debug, Default)]
pub struct ScanProgress {
    running: AtomicBool,
    discovered: AtomicU64,
    enqueued: AtomicU64,
    /// Replaced at the start of every pass. Trackers from an earlier pass
    /// stop counting once their counter is detached.
    processed: Mutex<Arc<AtomicU64>>,
    scans_completed: AtomicU64,
    last_finished: Mutex<Option<DateTime<Utc>>>,
}

/// Serializable view of [`ScanProgress`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScanSnapshot {
    /// A pass is in progress.
    pub running: bool,
    /// Images found by the current or last pass.
    pub discovered: u64,
    /// Jobs handed to the queue by that pass.
    pub enqueued: u64,
    /// Of those, how many have finished.
    pub processed: u64,
    /// Passes finished since startup.
    pub scans_completed: u64,
    /// When the last pass finished.
    pub last_finished: Option<DateTime<Utc>>,
}

impl ScanProgress {
    /// Copy the counters out.
    pub fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            running: self.running.load(Ordering::Relaxed),
            discovered: self.discovered.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            processed: self.processed.lock().load(Ordering::Relaxed),
            scans_completed: self.scans_completed.load(Ordering::Relaxed),
            last_finished: *self.last_finished.lock(),
        }
    }

    fn begin(&self) -> (RunningGuard<'_>, Arc<AtomicU64>) {
        self.running.store(true, Ordering::Relaxed);
        self.discovered.store(0, Ordering::Relaxed);
        self.enqueued.store(0, Ordering::Relaxed);
        let processed = Arc::new(AtomicU64::new(0));
        *self.processed.lock() = Arc::clone(&processed);
        (RunningGuard { progress: self }, processed)
    }
}

/// Clears `running` however the scan ends.
struct RunningGuard<'a> {
    progress: &'a ScanProgress,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.progress.running.store(false, Ordering::Relaxed);
    }
}

/// Schedules previews for images that have no cache entry.
pub struct Reconciler {
    indexer: DirectoryIndexer,
    cache: ThumbnailCache,
    progress: Arc<ScanProgress>,
    observer: Arc<dyn ScanObserver>,
    // Serializes passes when the periodic loop and a manual trigger overlap.
    pass: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("indexer", &self.indexer)
            .field("cache_dir", &self.cache.cache_dir())
            .field("progress", &self.progress.snapshot())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Reconciler over `indexer`, filling `cache`.
    pub fn new(indexer: DirectoryIndexer, cache: ThumbnailCache) -> Self {
        Self {
            indexer,
            cache,
            progress: Arc::new(ScanProgress::default()),
            observer: Arc::new(NoopScanObserver),
            pass: tokio::sync::Mutex::new(()),
        }
    }

    /// Notify `observer` around every pass.
    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Shared progress counters.
    pub fn progress(&self) -> Arc<ScanProgress> {
        Arc::clone(&self.progress)
    }

    /// Run one full reconciliation pass.
    ///
    /// Returns once every missing preview has been handed to the queue; the
    /// renders themselves complete later and are tallied in
    /// [`ScanProgress`]'s `processed` counter.
    pub async fn scan_once(&self) -> Result<ScanReport> {
        let _pass = self.pass.lock().await;
        let (_running, processed) = self.progress.begin();
        self.observer.scan_started();
        let started = Instant::now();

        let have = self.cache.cached_keys().await?;
        let want = self.indexer.walk_images("").await?;
        self.progress
            .discovered
            .store(want.len() as u64, Ordering::Relaxed);

        let mut report = ScanReport {
            discovered: want.len(),
            unrecognized: have.unrecognized,
            ..ScanReport::default()
        };

        let mut handles = Vec::new();
        for relative in &want {
            if have.paths.contains(relative) {
                report.cached += 1;
                continue;
            }
            match self.cache.schedule_background(relative) {
                Ok(handle) => {
                    report.enqueued += 1;
                    self.progress.enqueued.fetch_add(1, Ordering::Relaxed);
                    handles.push(handle);
                }
                Err(err) => {
                    warn!(path = %relative, error = %err, "stopping scan, queue refused job");
                    break;
                }
            }
        }

        track_processed(handles, processed);

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        self.progress.scans_completed.fetch_add(1, Ordering::Relaxed);
        *self.progress.last_finished.lock() = Some(Utc::now());
        info!(
            discovered = report.discovered,
            cached = report.cached,
            enqueued = report.enqueued,
            unrecognized = report.unrecognized,
            elapsed_ms = report.elapsed_ms,
            "reconciliation scan finished"
        );
        self.observer.scan_finished(&report);
        Ok(report)
    }

    /// Scan immediately, then every `interval`, until `cancel` fires. A
    /// failed pass is logged and retried on the next tick.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.scan_once() => {
                    if let Err(err) = result {
                        warn!(error = %err, "reconciliation scan failed");
                    }
                }
            }
        }
        debug!("reconciliation loop stopped");
    }
}

/// Count completions of this pass's jobs into the pass's own counter.
fn track_processed(handles: Vec<JobHandle>, processed: Arc<AtomicU64>) {
    if handles.is_empty() {
        return;
    }
    tokio::spawn(async move {
        for handle in handles {
            handle.wait().await;
            // Once a newer pass has begun nobody reads this counter.
            if Arc::strong_count(&processed) == 1 {
                return;
            }
            processed.fetch_add(1, Ordering::Relaxed);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use tempfile::tempdir;

    use crate::config::DEFAULT_IMAGE_EXTENSIONS;
    use crate::index::ExtensionSet;
    use crate::paths::SourceRoot;
    use crate::queue::{DispatchLimiter, RenderQueue};
    use crate::render::{RenderOutcome, RenderWorkers, Renderer};

    struct TouchRenderer;

    impl Renderer for TouchRenderer {
        fn render(&self, _source: &Path, destination: &Path) -> RenderOutcome {
            match std::fs::write(destination, b"jpeg") {
                Ok(()) => RenderOutcome::Rendered,
                Err(err) => RenderOutcome::Failed(err.to_string()),
            }
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        finished: Mutex<Vec<ScanReport>>,
    }

    impl ScanObserver for RecordingObserver {
        fn scan_finished(&self, report: &ScanReport) {
            self.finished.lock().push(report.clone());
        }
    }

    /// Blocks every render until the gate is dropped.
    struct GatedRenderer {
        gate: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl Renderer for GatedRenderer {
        fn render(&self, source: &Path, destination: &Path) -> RenderOutcome {
            let _ = self.gate.lock().recv();
            TouchRenderer.render(source, destination)
        }
    }

    async fn reconciler(source: &Path, cache_dir: &Path) -> Reconciler {
        reconciler_with(source, cache_dir, Arc::new(TouchRenderer)).await
    }

    async fn reconciler_with(
        source: &Path,
        cache_dir: &Path,
        renderer: Arc<dyn Renderer>,
    ) -> Reconciler {
        let root = SourceRoot::new(source).unwrap();
        let workers = RenderWorkers::new(2, renderer).unwrap();
        let queue = RenderQueue::start(workers, DispatchLimiter::new(100, Duration::from_millis(10)));
        let cache = ThumbnailCache::open(root.clone(), cache_dir, queue).await.unwrap();
        let indexer = DirectoryIndexer::new(root, ExtensionSet::new(DEFAULT_IMAGE_EXTENSIONS));
        Reconciler::new(indexer, cache)
    }

    #[tokio::test]
    async fn second_scan_finds_nothing_to_do() {
        let source = tempdir().unwrap();
        let cache_dir = tempdir().unwrap();
        std::fs::write(source.path().join("a.jpg"), b"x").unwrap();
        std::fs::write(source.path().join("readme.txt"), b"x").unwrap();

        let observer = Arc::new(RecordingObserver::default());
        let scanner = reconciler(source.path(), cache_dir.path())
            .await
            .with_observer(Arc::clone(&observer) as Arc<dyn ScanObserver>);

        let first = scanner.scan_once().await.unwrap();
        assert_eq!(first.discovered, 1);
        assert_eq!(first.enqueued, 1);
        scanner.cache.queue().wait_idle().await;

        let second = scanner.scan_once().await.unwrap();
        assert_eq!(second.cached, 1);
        assert_eq!(second.enqueued, 0);

        let snapshot = scanner.progress().snapshot();
        assert!(!snapshot.running);
        assert_eq!(snapshot.scans_completed, 2);
        assert!(snapshot.last_finished.is_some());
        assert_eq!(observer.finished.lock().len(), 2);
    }

    #[tokio::test]
    async fn processed_counts_only_the_current_pass() {
        let source = tempdir().unwrap();
        let cache_dir = tempdir().unwrap();
        std::fs::write(source.path().join("a.jpg"), b"x").unwrap();
        std::fs::write(source.path().join("b.jpg"), b"x").unwrap();

        let (release, gate) = std::sync::mpsc::channel();
        let renderer = Arc::new(GatedRenderer {
            gate: Mutex::new(gate),
        });
        let scanner = reconciler_with(source.path(), cache_dir.path(), renderer).await;

        // The first pass's backlog is still rendering when the second starts;
        // the second attaches to the same two jobs.
        assert_eq!(scanner.scan_once().await.unwrap().enqueued, 2);
        assert_eq!(scanner.scan_once().await.unwrap().enqueued, 2);

        drop(release);
        scanner.cache.queue().wait_idle().await;
        while scanner.progress().snapshot().processed < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Give stale trackers a chance to run before checking for overcounting.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snapshot = scanner.progress().snapshot();
        assert_eq!(snapshot.enqueued, 2);
        assert_eq!(snapshot.processed, 2);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let source = tempdir().unwrap();
        let cache_dir = tempdir().unwrap();
        let scanner = Arc::new(reconciler(source.path(), cache_dir.path()).await);
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let scanner = Arc::clone(&scanner);
            let cancel = cancel.clone();
            async move { scanner.run(Duration::from_secs(3600), cancel).await }
        });

        while scanner.progress().snapshot().scans_completed == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        task.await.unwrap();
    }
}
