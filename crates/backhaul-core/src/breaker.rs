//! Per-backend circuit breaker with failure and slow-call accounting.
//!
//! Each backend gets exactly one breaker for its lifetime. The breaker gates
//! every outbound attempt and bounds how often a failing or too-slow backend
//! is re-tried:
//!
//! - **Closed**: normal operation, attempts flow through
//! - **Open**: attempts are short-circuited until the reset timeout elapses
//! - **HalfOpen**: exactly one probe attempt is allowed; its outcome decides
//!   the next state
//!
//! Two locks cooperate here. An async permit serializes attempts, which is
//! what makes the half-open single-probe guarantee hold: no second call can
//! start while the probe is in flight. The observable state (state, counters,
//! last problem time) lives behind a plain mutex taken only for short reads
//! and writes, so `is_open` stays callable from synchronous paths like the
//! dispatcher's rebuild.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{ProxyError, Result};

/// Breaker state. See the module docs for the transition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker thresholds. Immutable after construction.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker.
    ///
    /// Default: 5
    pub max_failures: u32,
    /// Consecutive slow calls that trip the breaker.
    ///
    /// Default: 3
    pub max_slow_count: u32,
    /// Wall-clock duration above which a call counts as slow, even when it
    /// succeeds.
    ///
    /// Default: 5 seconds
    pub slow_threshold: Duration,
    /// How long an open breaker refuses attempts before allowing a single
    /// half-open probe, measured from the last observed problem.
    ///
    /// Default: 60 seconds
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            max_slow_count: 3,
            slow_threshold: Duration::from_secs(5),
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    slow_count: u32,
    last_problem: Option<Instant>,
}

/// A per-backend circuit breaker.
///
/// `execute` invocations are serialized; their effects on the state and
/// counters are totally ordered. The only out-of-band mutation permitted is
/// [`reset`](CircuitBreaker::reset), which the health checker calls when it
/// marks a backend up again.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    /// Serializes attempts. Held across the in-flight call on purpose.
    permit: tokio::sync::Mutex<()>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            permit: tokio::sync::Mutex::new(()),
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                slow_count: 0,
                last_problem: None,
            }),
        }
    }

    /// Runs one gated attempt through the breaker.
    ///
    /// `op` must perform exactly one attempt. The breaker measures its wall
    /// duration and classifies the outcome:
    ///
    /// - fast success: counters reset, state becomes `Closed`, the value is
    ///   returned
    /// - slow success: the slow counter advances and the response is
    ///   discarded; the caller sees [`ProxyError::SlowResponse`]
    /// - failure: the failure counter advances (and the slow counter too if
    ///   the attempt was also slow); the original error is returned
    ///
    /// A call arriving while the breaker is open and inside the reset dwell
    /// is short-circuited with [`ProxyError::CircuitOpen`] without invoking
    /// `op` at all. After the dwell the breaker moves to half-open and the
    /// next outcome deterministically opens or closes it.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _permit = self.permit.lock().await;

        let was_half_open = {
            let mut inner = self.lock_inner();
            if inner.state == BreakerState::Open {
                let dwell_over = inner
                    .last_problem
                    .map(|t| t.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if !dwell_over {
                    return Err(ProxyError::CircuitOpen);
                }
                inner.state = BreakerState::HalfOpen;
            }
            inner.state == BreakerState::HalfOpen
        };

        let started = Instant::now();
        let outcome = op().await;
        let elapsed = started.elapsed();

        let mut inner = self.lock_inner();
        match outcome {
            Ok(value) if elapsed <= self.config.slow_threshold => {
                inner.failure_count = 0;
                inner.slow_count = 0;
                inner.state = BreakerState::Closed;
                Ok(value)
            }
            Ok(_slow) => {
                inner.slow_count += 1;
                inner.last_problem = Some(Instant::now());
                if was_half_open || self.tripped(&inner) {
                    inner.state = BreakerState::Open;
                }
                Err(ProxyError::SlowResponse {
                    elapsed,
                    threshold: self.config.slow_threshold,
                })
            }
            Err(err) => {
                inner.failure_count += 1;
                if elapsed > self.config.slow_threshold {
                    inner.slow_count += 1;
                }
                inner.last_problem = Some(Instant::now());
                if was_half_open || self.tripped(&inner) {
                    inner.state = BreakerState::Open;
                }
                Err(err)
            }
        }
    }

    /// Forces the breaker closed and zeroes the counters.
    ///
    /// Reserved for the health checker when it marks the backend up again
    /// after a successful probe.
    pub fn reset(&self) {
        let mut inner = self.lock_inner();
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.slow_count = 0;
        inner.last_problem = None;
    }

    pub fn is_open(&self) -> bool {
        self.lock_inner().state == BreakerState::Open
    }

    pub fn state(&self) -> BreakerState {
        self.lock_inner().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock_inner().failure_count
    }

    pub fn slow_count(&self) -> u32 {
        self.lock_inner().slow_count
    }

    fn tripped(&self, inner: &BreakerInner) -> bool {
        inner.failure_count >= self.config.max_failures
            || inner.slow_count >= self.config.max_slow_count
    }

    fn lock_inner(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().expect("breaker state lock poisoned")
    }
}
