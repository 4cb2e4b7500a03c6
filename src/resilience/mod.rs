// src/resilience/mod.rs - Composed resilience stack for outbound HTTP calls
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::constants::*;
use crate::price_feed::types::FeedError;

pub mod circuit_breaker;
pub mod rate_limit;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;

/// Shared resilience state: one breaker and one limiter, both keyed by
/// provider, safe for concurrent adapter calls.
#[derive(Clone)]
pub struct ResilienceLayer {
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    default_timeout: Duration,
}

impl ResilienceLayer {
    pub fn new(config: &AppConfig) -> Self {
        let limiter = RateLimiter::new(RATE_LIMIT_DEFAULT_RPS);
        for (provider, rps) in &config.provider_rate_limits {
            limiter.register(provider, *rps);
        }
        Self {
            breaker: Arc::new(CircuitBreaker::default()),
            limiter: Arc::new(limiter),
            retry: RetryPolicy::default(),
            default_timeout: Duration::from_secs(config.provider_timeout_secs),
        }
    }

    /// Assemble a layer from explicit components; used by tests and by
    /// callers that need non-default tuning.
    pub fn with_components(
        breaker: CircuitBreaker,
        limiter: RateLimiter,
        retry: RetryPolicy,
        default_timeout: Duration,
    ) -> Self {
        Self {
            breaker: Arc::new(breaker),
            limiter: Arc::new(limiter),
            retry,
            default_timeout,
        }
    }

    /// A per-provider handle applying the full stack.
    pub fn policy(&self, provider: &'static str) -> ResiliencePolicy {
        ResiliencePolicy {
            provider,
            layer: self.clone(),
            timeout: self.default_timeout,
        }
    }

    pub fn breaker_state(&self, provider: &str) -> CircuitState {
        self.breaker.state(provider)
    }
}

/// Resilience stack bound to one provider. Policies compose outer to
/// inner as Retry -> CircuitBreaker -> Timeout -> RateLimit around the
/// supplied operation.
#[derive(Clone)]
pub struct ResiliencePolicy {
    provider: &'static str,
    layer: ResilienceLayer,
    timeout: Duration,
}

impl ResiliencePolicy {
    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, FeedError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FeedError>>,
    {
        let retry = &self.layer.retry;
        let mut last_error = FeedError::CircuitOpen(self.provider.to_string());

        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                let delay = retry.delay(attempt);
                debug!(
                    "Retrying {} call in {:?} (attempt {}/{})",
                    self.provider,
                    delay,
                    attempt + 1,
                    retry.max_attempts
                );
                tokio::time::sleep(delay).await;
            }

            if !self.layer.breaker.is_request_allowed(self.provider) {
                last_error = FeedError::CircuitOpen(self.provider.to_string());
                continue;
            }

            let attempt_result = tokio::time::timeout(self.timeout, async {
                self.layer.limiter.acquire(self.provider).await;
                operation().await
            })
            .await;

            match attempt_result {
                Ok(Ok(value)) => {
                    self.layer.breaker.record_success(self.provider);
                    return Ok(value);
                }
                Ok(Err(error)) => {
                    if error.is_transient() {
                        self.layer.breaker.record_failure(self.provider);
                    } else {
                        // The provider answered; only transport-class
                        // failures count against the breaker.
                        self.layer.breaker.record_success(self.provider);
                    }
                    if !retry.should_retry(&error, attempt) {
                        return Err(error);
                    }
                    warn!("{} call failed (attempt {}): {}", self.provider, attempt + 1, error);
                    last_error = error;
                }
                Err(_elapsed) => {
                    self.layer.breaker.record_failure(self.provider);
                    let error = FeedError::Timeout(self.timeout);
                    if !retry.should_retry(&error, attempt) {
                        return Err(error);
                    }
                    warn!(
                        "{} call timed out after {:?} (attempt {})",
                        self.provider,
                        self.timeout,
                        attempt + 1
                    );
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_layer() -> ResilienceLayer {
        ResilienceLayer::with_components(
            CircuitBreaker::default(),
            RateLimiter::new(1_000),
            RetryPolicy {
                max_attempts: 3,
                jitter_max_ms: 0,
            },
            Duration::from_secs(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn success_passes_through() {
        let policy = fast_layer().policy("Binance");
        let result: Result<u32, _> = policy.execute(|| async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_to_success() {
        let calls = AtomicU32::new(0);
        let policy = fast_layer().policy("OKX");
        let result = policy
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(FeedError::MalformedPayload("flaky".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_errors_short_circuit() {
        let calls = AtomicU32::new(0);
        let policy = fast_layer().policy("Kraken");
        let result: Result<(), _> = policy
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(FeedError::Unsupported {
                        symbol: "NEOBTC".into(),
                        provider: "Kraken".into(),
                    })
                }
            })
            .await;
        assert!(matches!(result, Err(FeedError::Unsupported { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_returns_circuit_open_without_calling() {
        let layer = fast_layer();
        for _ in 0..5 {
            layer.breaker.record_failure("Coinbase");
        }
        let calls = AtomicU32::new(0);
        let policy = layer.policy("Coinbase");
        let result: Result<(), _> = policy
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(FeedError::CircuitOpen(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_after_consecutive_transport_failures() {
        let layer = fast_layer();
        let policy = layer.policy("CoinMarketCap");
        // Two exhausted executions of 3 attempts each: 6 consecutive failures.
        for _ in 0..2 {
            let _: Result<(), _> = policy
                .execute(|| async { Err(FeedError::MalformedPayload("500".into())) })
                .await;
        }
        assert_eq!(layer.breaker_state("CoinMarketCap"), CircuitState::Open);
    }
}
