//! Dispatcher task and the public [`RenderQueue`] handle.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Notify, Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::job::{JobHandle, JobOutcome, JobPriority, RenderJob};
use super::limiter::DispatchLimiter;
use crate::error::{PreviewError, Result};
use crate::render::{RenderOutcome, RenderWorkers};

/// Point-in-time counters for operational visibility.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Jobs accepted as new work.
    pub enqueued: u64,
    /// Enqueues absorbed by an existing job or an existing entry.
    pub deduplicated: u64,
    /// Jobs that published an entry.
    pub completed: u64,
    /// Jobs whose render failed.
    pub failed: u64,
    /// Pending jobs dropped by shutdown.
    pub discarded: u64,
    /// Interactive jobs waiting for a worker.
    pub pending_interactive: usize,
    /// Background jobs waiting for a worker.
    pub pending_background: usize,
    /// Jobs currently on a worker.
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct QueueCounters {
    enqueued: AtomicU64,
    deduplicated: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TrackedStatus {
    Pending,
    InFlight,
}

#[derive(Debug)]
struct TrackedJob {
    job: RenderJob,
    status: TrackedStatus,
    outcome: watch::Sender<Option<JobOutcome>>,
}

/// Pending and in-flight jobs keyed by destination. Both deques may hold
/// stale destinations (promoted or discarded jobs); `take_next` skips them.
#[derive(Debug, Default)]
struct QueueState {
    jobs: HashMap<PathBuf, TrackedJob>,
    interactive: VecDeque<PathBuf>,
    background: VecDeque<PathBuf>,
    closed: bool,
}

impl QueueState {
    fn has_pending(&self) -> bool {
        self.jobs
            .values()
            .any(|tracked| tracked.status == TrackedStatus::Pending)
    }

    fn pending_in(&self, priority: JobPriority) -> usize {
        self.jobs
            .values()
            .filter(|tracked| {
                tracked.status == TrackedStatus::Pending && tracked.job.priority == priority
            })
            .count()
    }

    fn take_next(&mut self) -> Option<RenderJob> {
        for priority in [JobPriority::Interactive, JobPriority::Background] {
            loop {
                let deque = match priority {
                    JobPriority::Interactive => &mut self.interactive,
                    JobPriority::Background => &mut self.background,
                };
                let Some(destination) = deque.pop_front() else {
                    break;
                };
                if let Some(tracked) = self.jobs.get_mut(&destination)
                    && tracked.status == TrackedStatus::Pending
                    && tracked.job.priority == priority
                {
                    tracked.status = TrackedStatus::InFlight;
                    return Some(tracked.job.clone());
                }
            }
        }
        None
    }
}

struct Inner {
    state: Mutex<QueueState>,
    wakeup: Notify,
    limiter: DispatchLimiter,
    slots: Arc<Semaphore>,
    workers: RenderWorkers,
    counters: QueueCounters,
    outstanding: watch::Sender<usize>,
    shutdown: CancellationToken,
}

/// Rate-limited, deduplicating, two-class job queue in front of the render
/// workers.
///
/// `enqueue` never waits on rendering. A dispatcher task takes one worker
/// slot and one limiter token per job start, then hands the most urgent
/// pending job to the worker pool. All job-set mutation happens under a
/// single lock so concurrent enqueues from request handlers and the scanner
/// keep at most one active job per destination.
#[derive(Clone)]
pub struct RenderQueue {
    inner: Arc<Inner>,
}

impl fmt::Debug for RenderQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderQueue")
            .field("workers", &self.inner.workers)
            .field("limiter", &self.inner.limiter)
            .field("stats", &self.stats())
            .finish()
    }
}

impl RenderQueue {
    /// Build the queue and spawn its dispatcher on the current tokio runtime.
    pub fn start(workers: RenderWorkers, limiter: DispatchLimiter) -> Self {
        let slots = Arc::new(Semaphore::new(workers.threads()));
        let (outstanding, _) = watch::channel(0);
        let inner = Arc::new(Inner {
            state: Mutex::new(QueueState::default()),
            wakeup: Notify::new(),
            limiter,
            slots,
            workers,
            counters: QueueCounters::default(),
            outstanding,
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(run_dispatcher(Arc::clone(&inner)));
        Self { inner }
    }

    /// Submit a job and return immediately.
    ///
    /// A job already pending or in flight for the same destination absorbs
    /// this request and the returned handle attaches to it; an interactive
    /// request promotes a pending background job. A destination that already
    /// exists on disk yields a handle that is already complete.
    pub fn enqueue(&self, job: RenderJob) -> Result<JobHandle> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(PreviewError::ShuttingDown);
        }

        if let Some(tracked) = state.jobs.get_mut(&job.destination) {
            let handle = JobHandle::new(job.destination.clone(), true, tracked.outcome.subscribe());
            let promoted = tracked.status == TrackedStatus::Pending
                && tracked.job.priority.elevate(job.priority) != tracked.job.priority;
            if promoted {
                tracked.job.priority = JobPriority::Interactive;
                state.interactive.push_back(job.destination.clone());
                debug!(destination = %job.destination.display(), "promoted pending job to interactive");
            }
            drop(guard);

            self.inner.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
            if promoted {
                self.inner.wakeup.notify_one();
            }
            return Ok(handle);
        }

        // Checked under the lock: a completion removes its entry only after
        // the rename, so a missing entry plus an existing file means done.
        if job.destination.exists() {
            drop(guard);
            self.inner.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
            return Ok(JobHandle::ready(job.destination));
        }

        let (tx, rx) = watch::channel(None);
        let handle = JobHandle::new(job.destination.clone(), false, rx);
        match job.priority {
            JobPriority::Interactive => state.interactive.push_back(job.destination.clone()),
            JobPriority::Background => state.background.push_back(job.destination.clone()),
        }
        state.jobs.insert(
            job.destination.clone(),
            TrackedJob {
                job,
                status: TrackedStatus::Pending,
                outcome: tx,
            },
        );
        self.inner.outstanding.send_replace(state.jobs.len());
        drop(guard);

        self.inner.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        self.inner.wakeup.notify_one();
        Ok(handle)
    }

    /// Resolves once nothing is pending or in flight.
    pub async fn wait_idle(&self) {
        let mut outstanding = self.inner.outstanding.subscribe();
        let _ = outstanding.wait_for(|count| *count == 0).await;
    }

    /// Stop dispatching. Pending jobs are discarded and their waiters see
    /// [`JobOutcome::Discarded`]; jobs already on a worker may still finish.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let discarded: Vec<TrackedJob> = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.interactive.clear();
            state.background.clear();
            let pending: Vec<PathBuf> = state
                .jobs
                .iter()
                .filter(|(_, tracked)| tracked.status == TrackedStatus::Pending)
                .map(|(destination, _)| destination.clone())
                .collect();
            let discarded = pending
                .iter()
                .filter_map(|destination| state.jobs.remove(destination))
                .collect();
            self.inner.outstanding.send_replace(state.jobs.len());
            discarded
        };

        self.inner
            .counters
            .discarded
            .fetch_add(discarded.len() as u64, Ordering::Relaxed);
        for tracked in &discarded {
            tracked.outcome.send_replace(Some(JobOutcome::Discarded));
        }
        info!(discarded = discarded.len(), "render queue shut down");
    }

    /// True once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Current counters and queue depths.
    pub fn stats(&self) -> QueueStats {
        let (pending_interactive, pending_background, in_flight) = {
            let state = self.inner.state.lock();
            let interactive = state.pending_in(JobPriority::Interactive);
            let background = state.pending_in(JobPriority::Background);
            (interactive, background, state.jobs.len() - interactive - background)
        };
        let counters = &self.inner.counters;
        QueueStats {
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            deduplicated: counters.deduplicated.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
            pending_interactive,
            pending_background,
            in_flight,
        }
    }
}

impl Inner {
    fn complete(&self, job: &RenderJob, outcome: RenderOutcome) {
        let tracked = {
            let mut state = self.state.lock();
            let tracked = state.jobs.remove(&job.destination);
            self.outstanding.send_replace(state.jobs.len());
            tracked
        };

        let outcome = match outcome {
            RenderOutcome::Rendered => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                debug!(source = %job.source.display(), "processed thumbnail");
                JobOutcome::Rendered
            }
            RenderOutcome::Failed(reason) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                // Background failures stop here; interactive ones reach the caller.
                match job.priority {
                    JobPriority::Background => warn!(
                        source = %job.source.display(),
                        %reason,
                        "background thumbnail generation failed"
                    ),
                    JobPriority::Interactive => debug!(
                        source = %job.source.display(),
                        %reason,
                        "interactive thumbnail generation failed"
                    ),
                }
                JobOutcome::Failed(reason)
            }
        };

        if let Some(tracked) = tracked {
            tracked.outcome.send_replace(Some(outcome));
        }
    }
}

async fn run_dispatcher(inner: Arc<Inner>) {
    let shutdown = inner.shutdown.clone();
    loop {
        let has_pending = inner.state.lock().has_pending();
        if !has_pending {
            tokio::select! {
                _ = inner.wakeup.notified() => continue,
                _ = shutdown.cancelled() => break,
            }
        }

        let permit = tokio::select! {
            permit = Arc::clone(&inner.slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = shutdown.cancelled() => break,
        };
        tokio::select! {
            _ = inner.limiter.acquire() => {}
            _ = shutdown.cancelled() => break,
        }

        // Picked only after the wait so work enqueued meanwhile competes on priority.
        let Some(job) = inner.state.lock().take_next() else {
            continue;
        };

        let rendered = inner
            .workers
            .submit(job.source.clone(), job.destination.clone());
        let inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let outcome = rendered.await.unwrap_or_else(|_| {
                RenderOutcome::Failed("render worker dropped the job".to_string())
            });
            inner.complete(&job, outcome);
            drop(permit);
        });
    }
    debug!("render dispatcher stopped");
}
