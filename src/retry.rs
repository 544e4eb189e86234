// Retry executor: bounded attempts, exponential backoff with jitter,
// per-attempt timeout, and retryability classification
//
// Every provider call in the engine goes through here so that backoff and
// rate-limit handling are applied uniformly instead of per-client.

use std::future::Future;
use std::sync::Arc;

use rand::Rng;
use tokio::time::Duration;

use crate::error::{OperationFailed, ProviderFailure};
use crate::models::ProviderId;
use crate::ratelimit::RateLimiter;

/// Backoff/attempt configuration. The three profiles trade latency against
/// provider load; operators pick one by name.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// More attempts, shorter initial delay. For interactive lookups where
    /// giving up early is worse than hammering a flaky provider.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            ..Self::default()
        }
    }

    /// Fewer attempts, longer initial delay. For background sweeps.
    pub fn conservative() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(2000),
            ..Self::default()
        }
    }

    /// Resolve a profile by its configuration name. Unknown names get the
    /// default profile.
    pub fn profile(name: &str) -> Self {
        match name {
            "aggressive" => Self::aggressive(),
            "conservative" => Self::conservative(),
            _ => Self::default(),
        }
    }

    /// Backoff before retry number `attempt` (counted from 0), before jitter:
    /// `min(initial_delay * multiplier^attempt, max_delay)`.
    fn base_delay(&self, attempt: u32) -> Duration {
        let scaled =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(scaled.round() as u64).min(self.max_delay)
    }
}

/// Runs a single asynchronous provider operation with bounded retries.
pub struct RetryExecutor {
    config: RetryConfig,
    rate_limiter: Arc<RateLimiter>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            config,
            rate_limiter,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `op` with the built-in retryability classification
    /// ([`ProviderFailure::is_retryable`]).
    pub async fn execute<T, F, Fut>(
        &self,
        provider: &ProviderId,
        operation: &str,
        attempt_timeout: Duration,
        op: F,
    ) -> Result<T, OperationFailed>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderFailure>>,
    {
        self.execute_with(
            provider,
            operation,
            attempt_timeout,
            ProviderFailure::is_retryable,
            op,
        )
        .await
    }

    /// Run `op` with a caller-supplied retry predicate.
    ///
    /// Each attempt is wrapped in `attempt_timeout`; an elapsed timeout
    /// counts as a retryable network failure. Before every attempt any
    /// active cooldown for the provider is waited out, and a rate-limit
    /// failure from an attempt feeds the cooldown tracker. A non-retryable
    /// failure short-circuits without consuming remaining attempts.
    pub async fn execute_with<T, F, Fut, P>(
        &self,
        provider: &ProviderId,
        operation: &str,
        attempt_timeout: Duration,
        should_retry: P,
        mut op: F,
    ) -> Result<T, OperationFailed>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderFailure>>,
        P: Fn(&ProviderFailure) -> bool,
    {
        let mut last_failure: Option<ProviderFailure> = None;

        for attempt in 0..self.config.max_attempts {
            self.rate_limiter.await_if_limited(provider).await;

            tracing::debug!(
                "{} {}: attempt {}/{}",
                provider,
                operation,
                attempt + 1,
                self.config.max_attempts
            );

            let result = match tokio::time::timeout(attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderFailure::timeout(operation)),
            };

            let failure = match result {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            tracing::warn!(
                "{} {} failed on attempt {}: {}",
                provider,
                operation,
                attempt + 1,
                failure
            );

            if let ProviderFailure::RateLimited { retry_after } = &failure {
                self.rate_limiter
                    .record_rate_limit(provider, *retry_after)
                    .await;
            }

            if !should_retry(&failure) {
                return Err(OperationFailed {
                    provider: provider.clone(),
                    operation: operation.to_string(),
                    attempts: attempt + 1,
                    source: failure,
                });
            }

            if attempt + 1 < self.config.max_attempts {
                let delay = self.backoff_delay(attempt);
                tracing::debug!(
                    "{} {}: backing off {:?} before retry",
                    provider,
                    operation,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            last_failure = Some(failure);
        }

        Err(OperationFailed {
            provider: provider.clone(),
            operation: operation.to_string(),
            attempts: self.config.max_attempts,
            source: last_failure.unwrap_or(ProviderFailure::Unknown {
                message: "no attempts were made".to_string(),
            }),
        })
    }

    /// Backoff for retry `attempt` with up to 25% uniform jitter on top.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay(attempt);
        if !self.config.jitter {
            return base;
        }

        let jitter_max = (base.as_millis() / 4) as u64;
        if jitter_max == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..jitter_max);
        base + Duration::from_millis(jitter)
    }
}
