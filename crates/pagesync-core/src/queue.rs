//! Fixed-window admission queue bounding outbound document API calls.
//!
//! Every API call acquires a permit before executing. A window admits a
//! fixed number of calls; once exhausted, callers suspend until the window
//! rolls over, which gives the pipeline natural backpressure against the
//! API's rate limit without any client-side coordination.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Rate-limiting gate: N permits per fixed time window.
pub struct AdmissionQueue {
    permits: usize,
    window: Duration,
    state: Mutex<WindowState>,
}

struct WindowState {
    window_start: Instant,
    used: usize,
}

impl AdmissionQueue {
    /// Creates a queue admitting `permits` calls per `window`.
    #[must_use]
    pub fn new(permits: usize, window: Duration) -> Self {
        Self {
            permits,
            window,
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Waits until the current window has a free permit, then takes it.
    ///
    /// Admission order among waiters follows the mutex's fairness; the only
    /// guarantee is that no more than `permits` acquisitions complete within
    /// any one window.
    pub async fn acquire(&self) {
        loop {
            let wake_at = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                if now.duration_since(state.window_start) >= self.window {
                    state.window_start = now;
                    state.used = 0;
                }
                if state.used < self.permits {
                    state.used += 1;
                    return;
                }
                state.window_start + self.window
            };
            tokio::time::sleep_until(wake_at).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_permits_without_waiting() {
        let queue = AdmissionQueue::new(3, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..3 {
            queue.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn fourth_call_waits_for_next_window() {
        let queue = AdmissionQueue::new(3, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..4 {
            queue.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn window_rolls_over_and_refills() {
        let queue = AdmissionQueue::new(2, Duration::from_secs(1));
        queue.acquire().await;
        queue.acquire().await;

        tokio::time::advance(Duration::from_secs(1)).await;

        let start = Instant::now();
        queue.acquire().await;
        queue.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
