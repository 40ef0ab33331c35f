//! Admission rate limiting.
//!
//! A single token bucket per gateway instance. Callers that find the bucket
//! empty reserve a future token instead of being rejected, then sleep until
//! their slot. Reservations are handed out in arrival order under the lock,
//! so nobody waits longer than the backlog ahead of them.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::observability::metrics;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RateLimitError {
    #[error("rate must be a positive number of requests per second, got {0}")]
    InvalidRate(f64),

    #[error("burst size must be at least 1")]
    InvalidBurst,
}

/// A token bucket that may go negative to represent queued reservations.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    /// Take one token and return how long the caller must wait for it.
    fn reserve(&mut self, capacity: f64, refill_rate: f64) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            // Waits beyond what Duration can hold saturate instead of panicking.
            Duration::try_from_secs_f64(-self.tokens / refill_rate).unwrap_or(Duration::MAX)
        }
    }
}

/// Per-instance admission gate.
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    rate: f64,
    burst: f64,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter admitting `rate` requests per second with `burst` capacity.
    pub fn new(rate: f64, burst: u32) -> Result<Self, RateLimitError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(RateLimitError::InvalidRate(rate));
        }
        if burst == 0 {
            return Err(RateLimitError::InvalidBurst);
        }
        let burst = burst as f64;
        Ok(Self {
            bucket: Mutex::new(TokenBucket::new(burst)),
            rate,
            burst,
        })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Reserve an admission slot without waiting for it.
    pub fn reserve(&self) -> Duration {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.reserve(self.burst, self.rate)
    }

    /// Wait until this caller may start its request.
    pub async fn admit(&self) {
        let wait = self.reserve();
        metrics::record_admission_wait(wait);
        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Admission delayed");
            tokio::time::sleep(wait).await;
        }
    }
}
