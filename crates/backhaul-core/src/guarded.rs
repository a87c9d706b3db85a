//! Guarded client: a backend composed with its circuit breaker and an
//! optional fixed-delay retry budget.
//!
//! This is the unit the dispatcher hands out. It keeps the same capability
//! set as the bare backend (send, liveness, base URL) so the rest of the
//! system never needs to care whether retries are configured.

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};
use tracing::debug;
use url::Url;

use crate::backend::Backend;
use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::error::{ProxyError, Result};

/// Fixed-attempt, fixed-delay retry budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

/// A backend wrapped with its circuit breaker and optional retry loop.
///
/// The breaker is created with the client and never replaced. Without a
/// retry policy, `send` makes exactly one gated attempt.
#[derive(Debug)]
pub struct GuardedClient {
    backend: Backend,
    breaker: CircuitBreaker,
    retry: Option<RetryPolicy>,
}

impl GuardedClient {
    pub fn new(backend: Backend, breaker_config: BreakerConfig, retry: Option<RetryPolicy>) -> Self {
        Self {
            backend,
            breaker: CircuitBreaker::new(breaker_config),
            retry,
        }
    }

    /// Sends a request through the breaker, retrying transport failures.
    ///
    /// Returns the first response whose gated attempt succeeded, or the last
    /// error once the attempt budget is spent. Two error kinds end the loop
    /// immediately:
    ///
    /// - breaker-open: retrying would only hammer a breaker that already
    ///   refused the call
    /// - slow success: a response was observed, and responses are never
    ///   retried, whatever their status or latency
    pub async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response> {
        let max_attempts = self.retry.as_ref().map(|r| r.max_attempts.max(1)).unwrap_or(1);

        let mut attempt = 1;
        loop {
            let outcome = self
                .breaker
                .execute(|| {
                    self.backend
                        .send(method.clone(), path_and_query, headers.clone(), body.clone())
                })
                .await;

            match outcome {
                Ok(response) => return Ok(response),
                Err(err @ (ProxyError::CircuitOpen | ProxyError::SlowResponse { .. })) => {
                    return Err(err)
                }
                Err(err) => {
                    debug!(
                        backend = %self.backend.base_url(),
                        attempt,
                        max_attempts,
                        error = %err,
                        "attempt failed"
                    );
                    if attempt >= max_attempts {
                        return Err(err);
                    }
                    if let Some(retry) = &self.retry {
                        tokio::time::sleep(retry.delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Whether this client is eligible for dispatch: the liveness flag is
    /// set and the breaker is not open.
    pub fn is_up(&self) -> bool {
        self.backend.is_up() && !self.breaker.is_open()
    }

    /// The raw liveness flag, ignoring breaker state. The health checker
    /// keys its up/down transitions off this.
    pub fn marked_up(&self) -> bool {
        self.backend.is_up()
    }

    /// Marks the backend up and resets its breaker. This is the health
    /// checker's recovery path and the only out-of-band breaker reset.
    pub fn mark_up(&self) {
        self.backend.set_up(true);
        self.breaker.reset();
    }

    /// Marks the backend down. The breaker is left as is; it carries its own
    /// history into recovery.
    pub fn mark_down(&self) {
        self.backend.set_up(false);
    }

    pub fn base_url(&self) -> &Url {
        self.backend.base_url()
    }

    /// Breaker readout, for observability and tests.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}
