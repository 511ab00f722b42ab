//! Fixed-window rate limiting keyed by arbitrary strings
//!
//! Each key owns a counter and the instant its window opened. A request is
//! admitted while the counter is below the maximum; once the window length has
//! elapsed the next request opens a fresh window. Bursts straddling a window
//! boundary can admit up to twice the maximum. That is accepted: the limiter
//! exists to shed floods, not to meter precisely.
//!
//! Mutations take the write lock; [`FixedWindowRateLimiter::stats`] only takes
//! the read lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::RwLock;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::time::{Clock, SystemClock};

/// Invalid limiter configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimiterError {
    #[error("window length must be greater than zero")]
    ZeroWindow,
}

/// Configuration for a fixed-window limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindowConfig {
    /// Requests admitted per window. Zero admits nothing.
    pub max_requests: u32,
    /// Window length
    pub window: Duration,
}

impl FixedWindowConfig {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RateLimiterError> {
        if self.window.is_zero() {
            return Err(RateLimiterError::ZeroWindow);
        }
        Ok(())
    }

    /// Age after which an idle key is evicted by the sweep.
    pub fn retention(&self) -> Duration {
        self.window.saturating_mul(2)
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    window_start: Instant,
    started_at: SystemTime,
}

/// Snapshot of one key's current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStats {
    pub count: u32,
    pub window_start: SystemTime,
}

/// Fixed-window counter limiter
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use kindred_common::resilience::FixedWindowRateLimiter;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = FixedWindowRateLimiter::new(10, Duration::from_secs(60))?;
/// assert!(limiter.allow("connection-1"));
/// # Ok(())
/// # }
/// ```
pub struct FixedWindowRateLimiter<C: Clock = SystemClock> {
    config: FixedWindowConfig,
    entries: RwLock<HashMap<String, WindowEntry>>,
    clock: C,
}

impl FixedWindowRateLimiter<SystemClock> {
    /// Create a limiter backed by the system clock
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, RateLimiterError> {
        Self::with_clock(FixedWindowConfig::new(max_requests, window), SystemClock)
    }
}

impl<C: Clock> FixedWindowRateLimiter<C> {
    /// Create a limiter with a custom clock
    pub fn with_clock(config: FixedWindowConfig, clock: C) -> Result<Self, RateLimiterError> {
        config.validate()?;
        Ok(Self { config, entries: RwLock::new(HashMap::new()), clock })
    }

    pub const fn config(&self) -> FixedWindowConfig {
        self.config
    }

    /// Record a request for `key` and report whether it is admitted.
    pub fn allow(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries.write();

        if let Some(entry) = entries.get_mut(key) {
            if now.duration_since(entry.window_start) > self.config.window {
                entry.count = 1;
                entry.window_start = now;
                entry.started_at = self.clock.system_time();
                return true;
            }

            if entry.count >= self.config.max_requests {
                debug!(key, count = entry.count, "rate limit exceeded");
                return false;
            }

            entry.count += 1;
            return true;
        }

        if self.config.max_requests == 0 {
            debug!(key, "rate limiter admits no requests");
            return false;
        }

        entries.insert(
            key.to_owned(),
            WindowEntry { count: 1, window_start: now, started_at: self.clock.system_time() },
        );
        true
    }

    /// Current window for `key`, if one is tracked.
    pub fn stats(&self, key: &str) -> Option<WindowStats> {
        self.entries
            .read()
            .get(key)
            .map(|entry| WindowStats { count: entry.count, window_start: entry.started_at })
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.entries.read().len()
    }

    /// Evict keys whose window opened more than two window lengths ago.
    ///
    /// Returns the number of evicted keys.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let retention = self.config.retention();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.window_start) <= retention);
        before - entries.len()
    }

    /// Run [`Self::sweep`] every `interval` until `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let period = if interval.is_zero() { self.config.window } else { interval };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        info!("rate limiter sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = self.sweep();
                        if evicted > 0 {
                            debug!(evicted, remaining = self.tracked_keys(), "evicted stale rate limit windows");
                        }
                    }
                }
            }
        })
    }
}
