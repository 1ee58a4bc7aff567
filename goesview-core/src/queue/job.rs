//! Render job descriptions and completion handles.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::watch;

/// Priority classes. Interactive work is always dispatched before background
/// work when both are pending.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum JobPriority {
    /// A caller is waiting on this preview.
    Interactive = 0,
    /// Reconciliation fill.
    Background = 1,
}

impl JobPriority {
    /// Raise to `target` when it is the more urgent class.
    pub fn elevate(self, target: JobPriority) -> JobPriority {
        if target <= self { target } else { self }
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPriority::Interactive => write!(f, "interactive"),
            JobPriority::Background => write!(f, "background"),
        }
    }
}

/// A request to render `source` into `destination`. Identity is the
/// destination path: two jobs with the same destination are one unit of work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderJob {
    /// Absolute source image path.
    pub source: PathBuf,
    /// Absolute cache entry path; the job identity.
    pub destination: PathBuf,
    /// Dispatch class.
    pub priority: JobPriority,
}

impl RenderJob {
    /// Job with an explicit priority.
    pub fn new(source: PathBuf, destination: PathBuf, priority: JobPriority) -> Self {
        Self {
            source,
            destination,
            priority,
        }
    }

    /// Job for a caller that waits on the result.
    pub fn interactive(source: PathBuf, destination: PathBuf) -> Self {
        Self::new(source, destination, JobPriority::Interactive)
    }

    /// Job for reconciliation fill.
    pub fn background(source: PathBuf, destination: PathBuf) -> Self {
        Self::new(source, destination, JobPriority::Background)
    }
}

/// Final state of a job as seen by everyone attached to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// The entry was published.
    Rendered,
    /// The render failed; carries the reason.
    Failed(String),
    /// Dropped before it ran because the queue shut down.
    Discarded,
}

/// Completion handle returned by `enqueue`. Cloneable; every clone observes
/// the same outcome.
#[derive(Clone, Debug)]
pub struct JobHandle {
    destination: PathBuf,
    attached: bool,
    outcome: watch::Receiver<Option<JobOutcome>>,
}

impl JobHandle {
    pub(crate) fn new(
        destination: PathBuf,
        attached: bool,
        outcome: watch::Receiver<Option<JobOutcome>>,
    ) -> Self {
        Self {
            destination,
            attached,
            outcome,
        }
    }

    /// A handle for work that is already done (the destination exists).
    pub(crate) fn ready(destination: PathBuf) -> Self {
        let (_tx, rx) = watch::channel(Some(JobOutcome::Rendered));
        Self::new(destination, true, rx)
    }

    /// Cache entry path the job writes.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// True when this enqueue merged into existing work instead of creating a job.
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Outcome if the job has already finished.
    pub fn try_outcome(&self) -> Option<JobOutcome> {
        self.outcome.borrow().clone()
    }

    /// Suspend the calling task until the job reports.
    pub async fn wait(mut self) -> JobOutcome {
        if let Ok(outcome) = self.outcome.wait_for(Option::is_some).await {
            return outcome.clone().unwrap_or(JobOutcome::Discarded);
        }
        // The sender only disappears without a value if the queue was torn down.
        self.outcome
            .borrow()
            .clone()
            .unwrap_or(JobOutcome::Discarded)
    }
}
