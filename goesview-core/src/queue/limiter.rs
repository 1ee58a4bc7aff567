//! Start-rate limiter for the dispatcher.

use std::fmt;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

use crate::config::DispatchConfig;

/// Fixed-window token bucket: at most `max_starts` acquisitions per `window`.
///
/// Waiting for a token suspends only the dispatcher, never the tasks that
/// merely enqueued work.
pub struct DispatchLimiter {
    max_starts: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

#[derive(Debug)]
struct WindowState {
    opened_at: Instant,
    started: u32,
}

impl fmt::Debug for DispatchLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("DispatchLimiter");
        debug
            .field("max_starts", &self.max_starts)
            .field("window", &self.window);
        match self.state.try_lock() {
            Ok(state) => debug.field("started_in_window", &state.started),
            Err(_) => debug.field("state", &"<locked>"),
        };
        debug.finish()
    }
}

impl DispatchLimiter {
    /// Allow `max_starts` starts per `window` (at least one).
    pub fn new(max_starts: u32, window: Duration) -> Self {
        Self {
            max_starts: max_starts.max(1),
            window,
            state: Mutex::new(WindowState {
                opened_at: Instant::now(),
                started: 0,
            }),
        }
    }

    /// Limiter described by `config`.
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.max_starts, config.window())
    }

    /// Take one start token, sleeping until the next window when the current
    /// one is exhausted.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        loop {
            let now = Instant::now();
            if now.duration_since(state.opened_at) >= self.window {
                state.opened_at = now;
                state.started = 0;
            }
            if state.started < self.max_starts {
                state.started += 1;
                return;
            }
            sleep_until(state.opened_at + self.window).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn exhausted_window_waits_for_the_next_one() {
        let limiter = DispatchLimiter::new(2, Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn three_windows_for_three_times_the_budget() {
        let limiter = DispatchLimiter::new(4, Duration::from_millis(500));
        let start = Instant::now();
        for _ in 0..12 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert!(start.elapsed() < Duration::from_millis(1500));
    }
}
