//! Per-source rate limiting and retry serialization.
//!
//! Every platform collector owns one [`RateLimiter`]; distinct platforms
//! throttle independently. All calls to one limiter serialize through a
//! single FIFO queue so that concurrently-issued requests are correctly
//! accounted against the configured rate.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

struct State {
    last_dispatch: Option<Instant>,
}

/// Throttles and retries calls to one external source.
///
/// [`RateLimiter::execute`] guarantees:
/// - at most `requests_per_second` dispatch attempts per second, retries
///   included — the last-dispatch instant is updated unconditionally on every
///   attempt, so a retrying operation cannot burst past the throttle;
/// - strict FIFO dispatch relative to submission order (the internal
///   `tokio::sync::Mutex` queues waiters fairly);
/// - up to `max_attempts` total attempts per logical operation with a fixed
///   `retry_delay` between attempts, surfacing the final error verbatim.
///
/// Retries are local to one logical operation: a retrying operation holds its
/// place in the queue, and later operations dispatch afterwards under the
/// same throttle.
pub struct RateLimiter {
    min_interval: Duration,
    max_attempts: u32,
    retry_delay: Duration,
    state: Mutex<State>,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_second` dispatches, retrying
    /// each operation up to `max_attempts` total attempts.
    ///
    /// `requests_per_second` of 0 is treated as 1. `max_attempts` of 0 is
    /// treated as 1 — an operation is always attempted at least once.
    #[must_use]
    pub fn new(requests_per_second: u32, max_attempts: u32, retry_delay: Duration) -> Self {
        let rps = u64::from(requests_per_second.max(1));
        RateLimiter {
            min_interval: Duration::from_millis(1000 / rps.max(1)),
            max_attempts: max_attempts.max(1),
            retry_delay,
            state: Mutex::new(State {
                last_dispatch: None,
            }),
        }
    }

    /// Runs `operation` under the throttle, retrying on failure.
    ///
    /// Waits for its turn in the dispatch queue, paces the dispatch so that
    /// at least `1/requests_per_second` elapses since the previous dispatch,
    /// then attempts the operation. On failure it sleeps `retry_delay` and
    /// tries again, up to `max_attempts` total attempts; the last error is
    /// returned to the caller. No error is swallowed.
    ///
    /// # Errors
    ///
    /// Returns the final attempt's error once all attempts are exhausted.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        // Held across all attempts: retries keep their place in the queue.
        let mut state = self.state.lock().await;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if let Some(last) = state.last_dispatch {
                let since = last.elapsed();
                if since < self.min_interval {
                    tokio::time::sleep(self.min_interval - since).await;
                }
            }
            // Updated before the attempt resolves, success or not.
            state.last_dispatch = Some(Instant::now());

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "throttled operation failed, retrying after delay"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}
