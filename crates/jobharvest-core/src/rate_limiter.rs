//! Per-source token-bucket admission control.
//!
//! Every live page fetch must first take a token from its source's bucket.
//! Buckets refill continuously at `refill_rate` tokens per second up to
//! `capacity`. Refill happens lazily inside [`RateLimiter::acquire`], under
//! the same lock as the debit, so concurrent callers never over-spend.
//!
//! # Example
//!
//! ```rust
//! use jobharvest_core::rate_limiter::{RateLimiter, RateLimiterConfig};
//!
//! let limiter = RateLimiter::new("linkedin", RateLimiterConfig::new(5, 1.0));
//! for _ in 0..5 {
//!     assert!(limiter.acquire(1));
//! }
//! assert!(!limiter.acquire(1));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{AppError, ScrapeContext};

/// Slack for float accumulation when comparing token counts.
const TOKEN_EPSILON: f64 = 1e-6;

/// Bucket shape for one source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterConfig {
    /// Maximum number of tokens the bucket holds (and starts with).
    pub capacity: u32,
    /// Tokens added per second. Zero means the bucket never refills.
    pub refill_rate: f64,
}

impl RateLimiterConfig {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate: if refill_rate.is_finite() {
                refill_rate.max(0.0)
            } else {
                0.0
            },
        }
    }
}

impl Default for RateLimiterConfig {
    /// One request per second with no burst.
    fn default() -> Self {
        Self::new(1, 1.0)
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket. Clones share the same bucket.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    name: String,
    config: RateLimiterConfig,
    state: Arc<Mutex<BucketState>>,
}

impl RateLimiter {
    /// Create a full bucket.
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Arc::new(Mutex::new(BucketState {
                tokens: f64::from(config.capacity),
                last_refill: Instant::now(),
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> RateLimiterConfig {
        self.config
    }

    /// Acquires the bucket lock, recovering from poison if necessary.
    fn lock_state(&self) -> std::sync::MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(limiter = %self.name, "Recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        let capacity = f64::from(self.config.capacity);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.config.refill_rate).min(capacity);
        state.last_refill = now;
    }

    /// Take `n` tokens if they are available.
    ///
    /// Returns `false` without consuming anything otherwise. A limiter with
    /// zero capacity denies every request. Never blocks; callers own their
    /// retry and backoff policy.
    pub fn acquire(&self, n: u32) -> bool {
        if self.config.capacity == 0 {
            return false;
        }
        let mut state = self.lock_state();
        self.refill(&mut state, Instant::now());

        let wanted = f64::from(n);
        if state.tokens + TOKEN_EPSILON >= wanted {
            state.tokens = (state.tokens - wanted).max(0.0);
            true
        } else {
            tracing::trace!(
                limiter = %self.name,
                available = state.tokens,
                wanted = n,
                "Admission denied"
            );
            false
        }
    }

    /// Tokens currently available (after refill).
    pub fn available(&self) -> f64 {
        let mut state = self.lock_state();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    /// How long until `n` tokens would be available, or `None` if never.
    pub fn time_until(&self, n: u32) -> Option<Duration> {
        if self.config.capacity == 0 || n > self.config.capacity {
            return None;
        }
        let mut state = self.lock_state();
        self.refill(&mut state, Instant::now());

        let missing = f64::from(n) - state.tokens;
        if missing <= TOKEN_EPSILON {
            return Some(Duration::ZERO);
        }
        if self.config.refill_rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(missing / self.config.refill_rate))
    }
}

/// Bounded retry schedule used when admission is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total admission attempts before giving up.
    pub attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            min_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt, derived from the bucket's refill rate.
    fn delay_for(&self, limiter: &RateLimiter) -> Duration {
        limiter
            .time_until(1)
            .unwrap_or(self.max_backoff)
            .clamp(self.min_backoff, self.max_backoff.max(self.min_backoff))
    }
}

impl RateLimiter {
    /// Take one token, sleeping between denials according to `policy`.
    ///
    /// Fails with [`AppError::RateLimited`] once every attempt was denied.
    pub async fn admit(&self, policy: &BackoffPolicy, context: &ScrapeContext) -> Result<(), AppError> {
        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            if self.acquire(1) {
                return Ok(());
            }
            if attempt < attempts {
                let delay = policy.delay_for(self);
                tracing::debug!(
                    limiter = %self.name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Admission denied, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }

        let retry_after = self.time_until(1).unwrap_or(policy.max_backoff);
        tracing::warn!(
            limiter = %self.name,
            %context,
            attempts,
            "Admission denied after bounded retries"
        );
        Err(AppError::RateLimited {
            context: context.clone(),
            attempts,
            retry_after,
        })
    }
}

/// One shared bucket per source, created on first use.
///
/// Clones share the same buckets, so concurrent scrape invocations against
/// the same source draw from the same budget.
#[derive(Debug, Clone)]
pub struct RateLimiters {
    default_config: RateLimiterConfig,
    overrides: HashMap<String, RateLimiterConfig>,
    buckets: Arc<Mutex<HashMap<String, RateLimiter>>>,
}

impl RateLimiters {
    pub fn new(default_config: RateLimiterConfig) -> Self {
        Self {
            default_config,
            overrides: HashMap::new(),
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Use a different bucket shape for one source.
    pub fn with_override(mut self, source: impl Into<String>, config: RateLimiterConfig) -> Self {
        self.overrides.insert(source.into(), config);
        self
    }

    /// The bucket for `source`, creating it if this is the first request.
    pub fn for_source(&self, source: &str) -> RateLimiter {
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        buckets
            .entry(source.to_string())
            .or_insert_with(|| {
                let config = self
                    .overrides
                    .get(source)
                    .copied()
                    .unwrap_or(self.default_config);
                tracing::debug!(
                    %source,
                    capacity = config.capacity,
                    refill_rate = config.refill_rate,
                    "Created rate limiter"
                );
                RateLimiter::new(source, config)
            })
            .clone()
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}
