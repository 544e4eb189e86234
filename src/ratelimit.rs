// Per-provider cooldown tracker
//
// A provider is either free or limited until some instant. Callers wait out
// an active cooldown before dispatching (a queuing wait, not a failure);
// recording a 429 moves the provider into the limited state.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};

use crate::models::ProviderId;

/// Cooldown applied when a provider signals throttling without a
/// `Retry-After` hint.
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

/// Tracks which providers are currently cooling down after a rate-limit
/// signal. Transitions for one provider are serialized by the mutex, so two
/// racing calls against the same provider cannot lose an update.
#[derive(Debug, Default)]
pub struct RateLimiter {
    limited_until: Mutex<HashMap<ProviderId, Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a throttling signal from `provider`. The cooldown ends at
    /// `now + retry_after` when the provider supplied a wait hint, otherwise
    /// after the default cooldown.
    pub async fn record_rate_limit(&self, provider: &ProviderId, retry_after: Option<Duration>) {
        let cooldown = retry_after.unwrap_or(DEFAULT_COOLDOWN);
        let reset_at = Instant::now() + cooldown;

        let mut limited = self.limited_until.lock().await;
        limited.insert(provider.clone(), reset_at);
        tracing::warn!(
            "{} signalled rate limiting, cooling down for {:?}",
            provider,
            cooldown
        );
    }

    /// If `provider` is cooling down, suspend until the cooldown ends, then
    /// proceed. Returns immediately for a free provider.
    pub async fn await_if_limited(&self, provider: &ProviderId) {
        let reset_at = {
            let mut limited = self.limited_until.lock().await;
            match limited.get(provider) {
                Some(&at) if at > Instant::now() => Some(at),
                Some(_) => {
                    // Cooldown already elapsed; back to free.
                    limited.remove(provider);
                    None
                }
                None => None,
            }
        };

        let Some(reset_at) = reset_at else {
            return;
        };

        tracing::debug!(
            "{} is cooling down, waiting {:?}",
            provider,
            reset_at.saturating_duration_since(Instant::now())
        );
        sleep_until(reset_at).await;

        // Clear the entry unless another rate-limit signal extended it while
        // we were waiting.
        let mut limited = self.limited_until.lock().await;
        if let Some(&at) = limited.get(provider) {
            if at <= reset_at {
                limited.remove(provider);
            }
        }
    }

    /// Whether `provider` currently has an active cooldown.
    pub async fn is_limited(&self, provider: &ProviderId) -> bool {
        let limited = self.limited_until.lock().await;
        limited
            .get(provider)
            .map(|&at| at > Instant::now())
            .unwrap_or(false)
    }
}
