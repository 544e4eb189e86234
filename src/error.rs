// Failure taxonomy for the aggregation engine
//
// Everything that can go wrong talking to a provider or the local cache is
// one of these closed variants, so retry classification and degradation
// decisions branch on types instead of inspecting message strings.

use std::time::Duration;

use crate::models::ProviderId;

/// A failure from a single provider call (search, details, episodes, ...)
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderFailure {
    /// Connectivity problem or timeout before a usable response arrived
    #[error("network failure: {message}")]
    Network { message: String },

    /// The provider asked us to slow down (HTTP 429)
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Provider-side error (HTTP 5xx)
    #[error("server error (HTTP {status})")]
    Server { status: u16 },

    /// Malformed request or response (HTTP 4xx other than 408/429, bad JSON)
    #[error("validation failure: {message}")]
    Validation { message: String },

    /// Catch-all for failures that fit none of the above
    #[error("unknown failure: {message}")]
    Unknown { message: String },
}

impl ProviderFailure {
    /// Built-in retry classification: connectivity/timeouts, 5xx, 408 and
    /// 429 are worth another attempt; other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderFailure::Network { .. } => true,
            ProviderFailure::RateLimited { .. } => true,
            ProviderFailure::Server { .. } => true,
            ProviderFailure::Validation { .. } => false,
            ProviderFailure::Unknown { .. } => false,
        }
    }

    /// Map a non-success HTTP status to the taxonomy. `retry_after` carries
    /// a parsed `Retry-After` header value when the provider supplied one.
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            429 => ProviderFailure::RateLimited { retry_after },
            408 => ProviderFailure::Network {
                message: "request timeout (HTTP 408)".to_string(),
            },
            500..=599 => ProviderFailure::Server { status },
            _ => ProviderFailure::Validation {
                message: format!("HTTP {}", status),
            },
        }
    }

    /// A per-attempt timeout elapsed at the call site.
    pub fn timeout(operation: &str) -> Self {
        ProviderFailure::Network {
            message: format!("{} timed out", operation),
        }
    }
}

impl From<reqwest::Error> for ProviderFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ProviderFailure::Network {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            ProviderFailure::from_status(status.as_u16(), None)
        } else if err.is_decode() {
            ProviderFailure::Validation {
                message: err.to_string(),
            }
        } else {
            ProviderFailure::Unknown {
                message: err.to_string(),
            }
        }
    }
}

/// Terminal failure of a retried operation: every attempt was used up (or a
/// non-retryable failure short-circuited the loop).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{operation} against {provider} failed after {attempts} attempt(s): {source}")]
pub struct OperationFailed {
    pub provider: ProviderId,
    pub operation: String,
    pub attempts: u32,
    #[source]
    pub source: ProviderFailure,
}

/// Failures of the durable cross-reference store.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache was used before `init()` opened the backing store
    #[error("cross-reference cache used before init()")]
    NotInitialized,

    /// The backing store is unavailable or rejected the operation
    #[error("cross-reference store failure: {0}")]
    Store(#[from] sqlx::Error),

    /// A persisted row could not be decoded
    #[error("corrupt cross-reference entry: {0}")]
    Corrupt(String),
}

/// Failure of a whole aggregation pass.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    /// Not a single provider (primary included) contributed any data
    #[error("all providers failed for '{title}'")]
    AllProvidersFailed { title: String },

    /// The cache failed in a way the pass could not degrade around
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ProviderFailure::Network {
            message: "connection reset".into()
        }
        .is_retryable());
        assert!(ProviderFailure::Server { status: 503 }.is_retryable());
        assert!(ProviderFailure::RateLimited { retry_after: None }.is_retryable());
        assert!(!ProviderFailure::Validation {
            message: "HTTP 400".into()
        }
        .is_retryable());
        assert!(!ProviderFailure::Unknown {
            message: "?".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ProviderFailure::from_status(429, Some(Duration::from_secs(2))),
            ProviderFailure::RateLimited {
                retry_after: Some(d)
            } if d == Duration::from_secs(2)
        ));
        // 408 counts as a network timeout, not a client error
        assert!(ProviderFailure::from_status(408, None).is_retryable());
        assert!(matches!(
            ProviderFailure::from_status(502, None),
            ProviderFailure::Server { status: 502 }
        ));
        assert!(!ProviderFailure::from_status(404, None).is_retryable());
    }
}
