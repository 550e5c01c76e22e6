//! Fixed-window pacing for vision model calls.
//!
//! The limiter admits up to `max_requests` calls, then makes the next caller
//! wait until the window that started with the first of them has elapsed.
//! The counter is never decayed: once the cap is hit it is reset in one step,
//! which gives bursty-then-stall behaviour rather than a rolling rate.
//!
//! Time is read and waited on through a [`Clock`], so tests can drive the
//! limiter with a simulated clock instead of real sleeps.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
#[cfg(test)]
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::RateLimitConfig;

/// Source of "now" and of waits for the limiter.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer (honours `tokio::time::pause`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Simulated clock: `sleep` returns immediately after advancing time and
/// recording the requested duration.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed += by;
    }

    /// Every wait requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        self.advance(duration);
    }
}

#[derive(Debug)]
struct LimiterState {
    request_count: u32,
    window_start: Instant,
}

pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    // Held across the wait so concurrent callers queue behind the sleeper.
    state: tokio::sync::Mutex<LimiterState>,
    // Mirror of `state.request_count`, readable while a caller is sleeping.
    count: AtomicU32,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_clock(
            config.max_requests_per_window,
            Duration::from_secs(config.window_secs),
            Arc::new(TokioClock),
        )
    }

    /// A `max_requests` of zero is treated as one.
    pub fn with_clock(max_requests: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        let window_start = clock.now();
        Self {
            max_requests: max_requests.max(1),
            window,
            clock,
            state: tokio::sync::Mutex::new(LimiterState {
                request_count: 0,
                window_start,
            }),
            count: AtomicU32::new(0),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Take one slot, waiting for the window to elapse when the quota is spent.
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self) -> Duration {
        let mut state = self.state.lock().await;
        let mut waited = Duration::ZERO;

        if state.request_count >= self.max_requests {
            let elapsed = self.clock.now().saturating_duration_since(state.window_start);
            if elapsed < self.window {
                waited = self.window - elapsed;
                info!(
                    wait_secs = waited.as_secs_f64(),
                    max_requests = self.max_requests,
                    "Rate limit reached, sleeping"
                );
                self.clock.sleep(waited).await;
            }
            state.request_count = 0;
            state.window_start = self.clock.now();
        }

        state.request_count += 1;
        self.count.store(state.request_count, Ordering::Release);
        debug!(
            request_count = state.request_count,
            max_requests = self.max_requests,
            "Rate limiter slot acquired"
        );
        waited
    }

    /// Calls admitted in the current window. Does not wait on the limiter
    /// lock, so it stays responsive while a caller is held back.
    pub fn request_count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(max, Duration::from_secs(60), clock.clone());
        (limiter, clock)
    }

    #[tokio::test]
    async fn test_calls_within_quota_never_wait() {
        let (limiter, clock) = limiter(10);

        for expected in 1..=10 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
            assert_eq!(limiter.request_count(), expected);
        }
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_call_over_quota_waits_for_remaining_window() {
        let (limiter, clock) = limiter(3);

        for _ in 0..3 {
            limiter.acquire().await;
        }
        clock.advance(Duration::from_secs(20));

        let waited = limiter.acquire().await;
        assert_eq!(waited, Duration::from_secs(40));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(40)]);
        assert_eq!(limiter.request_count(), 1);
    }

    #[tokio::test]
    async fn test_window_already_elapsed_resets_without_waiting() {
        let (limiter, clock) = limiter(2);

        limiter.acquire().await;
        limiter.acquire().await;
        clock.advance(Duration::from_secs(75));

        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert!(clock.sleeps().is_empty());
        assert_eq!(limiter.request_count(), 1);
    }

    #[tokio::test]
    async fn test_window_restarts_after_wait() {
        let (limiter, clock) = limiter(2);

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await; // waits 60s, opens a new window

        clock.advance(Duration::from_secs(10));
        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.acquire().await, Duration::from_secs(50));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(60), Duration::from_secs(50)]
        );
    }

    #[tokio::test]
    async fn test_counter_is_not_decayed_over_time() {
        let (limiter, clock) = limiter(2);

        limiter.acquire().await;
        clock.advance(Duration::from_secs(300));
        limiter.acquire().await;

        assert_eq!(limiter.request_count(), 2);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_zero_quota_admits_one_call_per_window() {
        let (limiter, clock) = limiter(0);
        assert_eq!(limiter.max_requests(), 1);

        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.acquire().await, Duration::from_secs(60));
        assert_eq!(clock.sleeps().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_sleeps_on_paused_runtime() {
        let config = RateLimitConfig {
            max_requests_per_window: 1,
            window_secs: 60,
        };
        let limiter = RateLimiter::new(&config);
        let started = tokio::time::Instant::now();

        limiter.acquire().await;
        let waited = limiter.acquire().await;

        assert_eq!(waited, Duration::from_secs(60));
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_concurrent_callers_never_exceed_quota() {
        let (limiter, clock) = limiter(4);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(clock.sleeps(), vec![Duration::from_secs(60)]);
        assert_eq!(limiter.request_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_count_readable_while_caller_waits() {
        let limiter = Arc::new(RateLimiter::with_clock(
            1,
            Duration::from_secs(60),
            Arc::new(TokioClock),
        ));
        limiter.acquire().await;

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        let started = tokio::time::Instant::now();
        assert_eq!(limiter.request_count(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);

        assert_eq!(waiter.await.unwrap(), Duration::from_secs(60));
        assert_eq!(limiter.request_count(), 1);
    }
}
