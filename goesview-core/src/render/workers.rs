//! Long-lived worker threads that run renders off the async runtime.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::error;

use super::{RenderOutcome, Renderer};
use crate::error::{PreviewError, Result};

/// Fixed-size pool of long-lived render threads.
///
/// Each submitted job runs under `catch_unwind`, so a decoder panic on a
/// malformed image turns into [`RenderOutcome::Failed`] for that job only and
/// the thread stays available for the next one.
pub struct RenderWorkers {
    pool: rayon::ThreadPool,
    renderer: Arc<dyn Renderer>,
}

impl fmt::Debug for RenderWorkers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderWorkers")
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl RenderWorkers {
    /// Start `threads` workers (at least one) running `renderer`.
    pub fn new(threads: usize, renderer: Arc<dyn Renderer>) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|idx| format!("render-worker-{idx}"))
            .build()
            .map_err(|err| PreviewError::Io(std::io::Error::other(err)))?;
        Ok(Self { pool, renderer })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Hand one job to the pool. The receiver resolves once a worker reports.
    pub fn submit(&self, source: PathBuf, destination: PathBuf) -> oneshot::Receiver<RenderOutcome> {
        let (tx, rx) = oneshot::channel();
        let renderer = Arc::clone(&self.renderer);
        self.pool.spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| renderer.render(&source, &destination)))
                .unwrap_or_else(|panic| {
                    let reason = panic_message(panic.as_ref());
                    error!(source = %source.display(), %reason, "render worker panicked");
                    RenderOutcome::Failed(format!("render panicked: {reason}"))
                });
            // Receiver gone means the queue shut down; nothing to report to.
            let _ = tx.send(outcome);
        });
        rx
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct PanicsOnBad;

    impl Renderer for PanicsOnBad {
        fn render(&self, source: &Path, _destination: &Path) -> RenderOutcome {
            if source.ends_with("bad.png") {
                panic!("decoder exploded");
            }
            RenderOutcome::Rendered
        }
    }

    #[tokio::test]
    async fn panic_is_contained_to_its_job() {
        let workers = RenderWorkers::new(1, Arc::new(PanicsOnBad)).unwrap();

        let bad = workers.submit("bad.png".into(), "bad.jpg".into());
        let good = workers.submit("good.png".into(), "good.jpg".into());

        match bad.await.unwrap() {
            RenderOutcome::Failed(reason) => assert!(reason.contains("decoder exploded")),
            other => panic!("expected failure, got {other:?}"),
        }
        // The single worker thread survived and served the next job.
        assert_eq!(good.await.unwrap(), RenderOutcome::Rendered);
    }
}
