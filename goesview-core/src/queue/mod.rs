//! Worker pool and job queue.
//!
//! Jobs are identified by their destination path. The queue keeps at most one
//! pending or in-flight job per destination, dispatches interactive work ahead
//! of background work and never starts more jobs per window than the
//! [`DispatchLimiter`] allows.

pub mod dispatcher;
pub mod job;
pub mod limiter;

pub use dispatcher::{QueueStats, RenderQueue};
pub use job::{JobHandle, JobOutcome, JobPriority, RenderJob};
pub use limiter::DispatchLimiter;
