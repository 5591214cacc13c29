//! Token bucket rate limiter for global speed control
//!
//! A single limiter is shared by every transfer of a scan, so the ceiling
//! applies to the aggregate byte rate. Fairness between simultaneous
//! transfers is best-effort: chunks are consumed in small slices so that
//! waiting transfers interleave.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Largest number of bytes taken from the bucket in one step
const MAX_SLICE: u64 = 16 * 1024;

/// Longest single sleep while waiting for tokens
const MAX_WAIT: Duration = Duration::from_millis(50);

/// Global rate limiter using token bucket algorithm
#[derive(Clone)]
pub struct RateLimiter {
    state: Option<Arc<Mutex<RateLimiterState>>>,
}

struct RateLimiterState {
    /// Maximum tokens (bytes) in the bucket, one second worth
    capacity: f64,
    /// Current available tokens
    tokens: f64,
    /// Last token refill time
    last_refill: Instant,
    /// Tokens added per second (the speed limit)
    refill_rate: f64,
}

impl RateLimiter {
    /// Create a limiter for `bytes_per_second` (0 = unlimited)
    pub fn new(bytes_per_second: u64) -> Self {
        if bytes_per_second == 0 {
            return Self::unlimited();
        }

        let capacity = bytes_per_second as f64;
        Self {
            state: Some(Arc::new(Mutex::new(RateLimiterState {
                capacity,
                tokens: capacity, // Start with full bucket
                last_refill: Instant::now(),
                refill_rate: capacity,
            }))),
        }
    }

    /// Create an unlimited rate limiter (no throttling)
    pub fn unlimited() -> Self {
        Self { state: None }
    }

    /// Take `bytes` from the bucket, waiting as long as needed
    pub async fn acquire(&self, bytes: u64) {
        let Some(state) = &self.state else {
            return;
        };

        let mut remaining = bytes;
        while remaining > 0 {
            let wait_time = {
                let mut state = state.lock().await;
                state.refill();

                let slice = remaining.min(MAX_SLICE).min(state.capacity as u64).max(1) as f64;
                if state.tokens >= slice {
                    state.tokens -= slice;
                    remaining -= slice as u64;
                    Duration::ZERO
                } else {
                    let needed = slice - state.tokens;
                    Duration::from_secs_f64(needed / state.refill_rate).min(MAX_WAIT)
                }
            };

            // Wait outside the lock so other transfers can also check
            if wait_time > Duration::ZERO {
                tokio::time::sleep(wait_time).await;
            }
        }
    }
}

impl RateLimiterState {
    /// Refill tokens based on elapsed time
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_secs = now.duration_since(self.last_refill).as_secs_f64();

        if elapsed_secs > 0.001 {
            self.tokens = (self.tokens + elapsed_secs * self.refill_rate).min(self.capacity);
            self.last_refill = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_basic() {
        let limiter = RateLimiter::new(1000); // 1KB/s

        let start = Instant::now();
        limiter.acquire(500).await; // Should be immediate
        assert!(start.elapsed().as_millis() < 50);

        limiter.acquire(500).await; // Should also be immediate
        assert!(start.elapsed().as_millis() < 50);

        limiter.acquire(500).await; // Should wait ~0.5s
        assert!(start.elapsed().as_millis() >= 400);
    }

    #[tokio::test]
    async fn test_rate_limiter_unlimited() {
        let limiter = RateLimiter::new(0);
        assert!(limiter.state.is_none());

        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire(10000).await;
        }
        assert!(start.elapsed().as_millis() < 50);
    }

    #[tokio::test]
    async fn test_chunks_larger_than_bucket_are_fully_charged() {
        let limiter = RateLimiter::new(100_000);

        let start = Instant::now();
        limiter.acquire(130_000).await; // 100KB from the bucket, 30KB at 100KB/s
        let elapsed = start.elapsed();
        assert!(elapsed.as_millis() >= 250, "took {:?}", elapsed);
        assert!(elapsed.as_millis() < 1000, "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_limit_is_shared_between_clones() {
        let limiter = RateLimiter::new(1000);
        let other = limiter.clone();

        let start = Instant::now();
        limiter.acquire(1000).await;
        other.acquire(500).await;
        assert!(start.elapsed().as_millis() >= 400);
    }
}
