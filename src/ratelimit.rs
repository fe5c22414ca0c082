//! Sliding-window admission control for external model calls.
//!
//! Timestamps older than the window are evicted lazily on each admission
//! check; the retained count never exceeds `max_calls` at any observation
//! point.

use crate::config::RateLimitConfig;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Longest single sleep while waiting for the window to open, so a
/// blocked caller stays responsive to cancellation.
const MAX_WAIT_SLICE: Duration = Duration::from_secs(5);

/// Sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `max_calls` per `window_secs` seconds.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_calls: config.max_calls.max(1),
            window: Duration::from_secs(config.window_secs.max(1)),
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Try to admit a call without waiting.
    ///
    /// On admission the call's timestamp is recorded.
    #[must_use]
    pub fn try_admit(&self) -> bool {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        Self::evict(&mut calls, now, self.window);
        if calls.len() < self.max_calls {
            calls.push_back(now);
            true
        } else {
            false
        }
    }

    /// Admit a call, waiting for the window to open if necessary.
    ///
    /// Returns `false` only if `cancel` fires while waiting.
    pub async fn admit(&self, cancel: &CancellationToken) -> bool {
        loop {
            let wait = {
                let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();
                Self::evict(&mut calls, now, self.window);
                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return true;
                }
                // Time until the oldest entry ages out.
                calls
                    .front()
                    .map_or(Duration::ZERO, |oldest| {
                        self.window.saturating_sub(now.duration_since(*oldest))
                    })
                    .min(MAX_WAIT_SLICE)
            };
            debug!("rate limiter full, waiting {}ms", wait.as_millis());
            tokio::select! {
                () = cancel.cancelled() => return false,
                () = tokio::time::sleep(wait.max(Duration::from_millis(10))) => {}
            }
        }
    }

    /// Number of timestamps currently retained.
    #[must_use]
    pub fn retained(&self) -> usize {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        Self::evict(&mut calls, Instant::now(), self.window);
        calls.len()
    }

    fn evict(calls: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&front) = calls.front() {
            if now.duration_since(front) >= window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }
}
