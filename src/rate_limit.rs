//! Fixed-window rate limiting for the public endpoints.
//!
//! Applies to user-initiated requests (subscription creation,
//! management-link requests), not to the background pipeline. The counter
//! map is process-local and best-effort: it resets on cold restart, which
//! is an accepted weakness of this tier, not a guarantee.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Configuration for one fixed-window limiter.
#[derive(Debug, Clone, Copy)]
pub struct LimiterConfig {
    /// Maximum attempts allowed in the window.
    pub max_attempts: u32,
    /// Window duration; the counter resets when it rolls over.
    pub window: Duration,
}

impl LimiterConfig {
    /// Create a new limiter configuration.
    pub fn new(max_attempts: u32, window_secs: u64) -> Self {
        Self {
            max_attempts,
            window: Duration::from_secs(window_secs),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            window: Duration::from_secs(3600),
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Attempt is allowed.
    Allowed,
    /// Attempt is denied until the window rolls over.
    Denied {
        /// Time until the window resets.
        retry_after: Duration,
    },
}

impl RateLimitResult {
    /// Check if the attempt is allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }

    /// Retry-after duration for denied attempts.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RateLimitResult::Allowed => None,
            RateLimitResult::Denied { retry_after } => Some(*retry_after),
        }
    }
}

/// Attempt counter for one key's current window.
#[derive(Debug)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed-window rate limiter keyed by string.
///
/// Keys are client network identifiers or normalized contact addresses.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    config: LimiterConfig,
    windows: RwLock<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    /// Create a new limiter with the given configuration.
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Check the key without recording an attempt.
    pub fn check(&self, key: &str) -> RateLimitResult {
        let windows = self.windows.read().unwrap();
        match windows.get(key) {
            Some(window) => self.evaluate(window),
            None => RateLimitResult::Allowed,
        }
    }

    /// Check and record in one operation.
    ///
    /// Records the attempt and returns `Allowed`, or returns `Denied`
    /// without recording.
    pub fn check_and_record(&self, key: &str) -> RateLimitResult {
        let mut windows = self.windows.write().unwrap();
        let now = Instant::now();

        let window = windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        // Window rolled over: reset the counter
        if now.duration_since(window.started_at) >= self.config.window {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.config.max_attempts {
            let elapsed = now.duration_since(window.started_at);
            return RateLimitResult::Denied {
                retry_after: self.config.window.saturating_sub(elapsed),
            };
        }

        window.count += 1;
        RateLimitResult::Allowed
    }

    fn evaluate(&self, window: &Window) -> RateLimitResult {
        let elapsed = window.started_at.elapsed();
        if elapsed >= self.config.window {
            return RateLimitResult::Allowed;
        }
        if window.count >= self.config.max_attempts {
            return RateLimitResult::Denied {
                retry_after: self.config.window.saturating_sub(elapsed),
            };
        }
        RateLimitResult::Allowed
    }

    /// Drop expired windows to free memory.
    pub fn cleanup(&self) {
        let mut windows = self.windows.write().unwrap();
        let window_len = self.config.window;
        windows.retain(|_, w| w.started_at.elapsed() < window_len);
    }
}

/// Dual-key guard for submission endpoints.
///
/// Combines an address-scoped and an origin-scoped limiter; a request
/// must pass both. This closes both the "spam one target address" and
/// the "spam from one source" vectors.
#[derive(Debug)]
pub struct SubmissionGuard {
    address: FixedWindowLimiter,
    origin: FixedWindowLimiter,
}

impl SubmissionGuard {
    /// Create a guard from the two limiter configurations.
    pub fn new(address: LimiterConfig, origin: LimiterConfig) -> Self {
        Self {
            address: FixedWindowLimiter::new(address),
            origin: FixedWindowLimiter::new(origin),
        }
    }

    /// Check both keys, recording the attempt on both when admitted.
    ///
    /// The address key is case-normalized. When either limiter denies,
    /// nothing is recorded and the longer retry-after wins.
    pub fn check_and_record(&self, address: &str, origin: &str) -> RateLimitResult {
        let address = address.trim().to_lowercase();

        let address_result = self.address.check(&address);
        let origin_result = self.origin.check(origin);

        match (&address_result, &origin_result) {
            (RateLimitResult::Allowed, RateLimitResult::Allowed) => {
                self.address.check_and_record(&address);
                self.origin.check_and_record(origin)
            }
            _ => {
                let retry_after = address_result
                    .retry_after()
                    .into_iter()
                    .chain(origin_result.retry_after())
                    .max()
                    .unwrap_or(Duration::ZERO);
                RateLimitResult::Denied { retry_after }
            }
        }
    }

    /// Drop expired windows on both limiters.
    pub fn cleanup(&self) {
        self.address.cleanup();
        self.origin.cleanup();
    }
}
