//! Sliding-window rate limiting
//!
//! Admits at most N actions in any trailing window of duration W, computed by
//! discarding expired timestamps on each check. State is process-local and
//! resets on restart; the AI-generation quota is deliberately NOT enforced
//! here but against the persistent marketing-plans table, so this limiter is
//! only used for cheap abuse gates (contact form submissions).
//!
//! The clock is an injected dependency so tests never sleep.

use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;

/// Source of the current time in milliseconds since the Unix epoch
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        let now = OffsetDateTime::now_utc();
        now.unix_timestamp() * 1_000 + i64::from(now.millisecond())
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum number of requests allowed within the window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: i64,
}

/// Timestamps of accepted calls within the current window, oldest first.
/// Bounded by `max_requests` after pruning.
#[derive(Debug)]
struct Window {
    timestamps: Vec<i64>,
}

impl Window {
    fn new() -> Self {
        Self {
            timestamps: Vec::new(),
        }
    }

    fn prune(&mut self, now_ms: i64, window_ms: i64) {
        self.timestamps.retain(|ts| now_ms - ts < window_ms);
    }

    fn try_admit(&mut self, config: &RateLimitConfig, now_ms: i64) -> bool {
        self.prune(now_ms, config.window_ms);
        if (self.timestamps.len() as u32) < config.max_requests {
            self.timestamps.push(now_ms);
            return true;
        }
        false
    }

    fn time_until_next(&self, config: &RateLimitConfig, now_ms: i64) -> i64 {
        if (self.timestamps.len() as u32) < config.max_requests {
            return 0;
        }
        match self.timestamps.first() {
            Some(oldest) => (oldest + config.window_ms - now_ms).max(0),
            None => 0,
        }
    }
}

/// Single-key sliding window rate limiter
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    window: Window,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            window: Window::new(),
        }
    }

    /// Check whether a new request may proceed right now.
    /// On success the current timestamp is recorded against the quota.
    pub fn can_make_request(&mut self) -> bool {
        let now = self.clock.now_ms();
        self.window.try_admit(&self.config, now)
    }

    /// Milliseconds until the oldest recorded timestamp exits the window
    /// (0 if the limiter is not currently exhausted).
    pub fn time_until_next_request(&mut self) -> i64 {
        let now = self.clock.now_ms();
        self.window.prune(now, self.config.window_ms);
        self.window.time_until_next(&self.config, now)
    }
}

/// Decision returned by [`RateLimitService::check`]
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Milliseconds until the next request would be admitted; 0 when allowed
    pub retry_after_ms: i64,
}

/// Keyed rate limiter for per-caller gates (e.g. contact form per client IP)
pub struct RateLimitService {
    clock: Arc<dyn Clock>,
    windows: tokio::sync::RwLock<HashMap<String, Window>>,
}

impl RateLimitService {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Check and record a request for `key`
    pub async fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitDecision {
        let now = self.clock.now_ms();
        let mut windows = self.windows.write().await;
        let window = windows.entry(key.to_string()).or_insert_with(Window::new);

        if window.try_admit(config, now) {
            RateLimitDecision {
                allowed: true,
                retry_after_ms: 0,
            }
        } else {
            RateLimitDecision {
                allowed: false,
                retry_after_ms: window.time_until_next(config, now),
            }
        }
    }

    /// Drop windows whose every timestamp has expired (call periodically)
    pub async fn cleanup(&self, window_ms: i64) {
        let now = self.clock.now_ms();
        let mut windows = self.windows.write().await;
        windows.retain(|_, w| {
            w.prune(now, window_ms);
            !w.timestamps.is_empty()
        });
    }
}

impl Default for RateLimitService {
    fn default() -> Self {
        Self::new()
    }
}
