// src/resilience/rate_limit.rs - Per-provider token-bucket rate limiting
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rps: u32) -> Self {
        let capacity = rps.max(1) as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token if available, otherwise report how long until the
    /// next token exists.
    fn try_take(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }
}

/// Keyed token buckets shared by every concurrent call to a provider.
/// `acquire` blocks (async) until a token frees up.
#[derive(Debug)]
pub struct RateLimiter {
    default_rps: u32,
    buckets: Arc<Mutex<HashMap<String, Bucket>>>,
}

impl RateLimiter {
    pub fn new(default_rps: u32) -> Self {
        Self {
            default_rps,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Pre-register a provider with a custom budget; unregistered
    /// providers fall back to the default.
    pub fn register(&self, provider: &str, rps: u32) {
        self.buckets
            .lock()
            .insert(provider.to_string(), Bucket::new(rps));
    }

    /// Wait until a request token is available for `provider`.
    pub async fn acquire(&self, provider: &str) {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock();
                let bucket = buckets
                    .entry(provider.to_string())
                    .or_insert_with(|| Bucket::new(self.default_rps));
                match bucket.try_take() {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            debug!("Rate limit reached for {}, waiting {:?}", provider, wait);
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_up_to_capacity_is_free() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire("Binance").await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn sixth_request_waits_for_a_refill() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            limiter.acquire("OKX").await;
        }
        let start = Instant::now();
        limiter.acquire("OKX").await;
        // One token refills in 1/5 s.
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn providers_have_independent_buckets() {
        let limiter = RateLimiter::new(1);
        limiter.acquire("Kraken").await;
        let start = Instant::now();
        limiter.acquire("CoinGecko").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn registered_budget_overrides_default() {
        let limiter = RateLimiter::new(1);
        limiter.register("CoinGecko", 10);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire("CoinGecko").await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
