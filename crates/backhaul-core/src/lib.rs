//! Backhaul core: the dispatch and resilience layer of the gateway.
//!
//! This crate contains everything between "a request arrived" and "a
//! backend answered": the per-origin HTTP client, the circuit breaker that
//! gates it, the retrying wrapper around both, the active health checker,
//! and the round-robin dispatcher over the currently-healthy subset.
//!
//! # Architecture
//!
//! Three concurrent actors mutate shared state here, and the design keeps
//! their coordination small:
//!
//! 1. **Request handlers** call [`RoundRobin::next`] and then
//!    [`GuardedClient::send`]. The dispatcher's rotation lives behind one
//!    short-lived lock; the breaker serializes attempts per backend.
//! 2. **The health checker** probes every backend each tick, flips liveness
//!    flags, resets the breaker of a recovering backend, and invokes the
//!    dispatcher's rebuild callback when anything flipped.
//! 3. **Circuit breakers** transition per-backend on call outcomes,
//!    independently of each other.
//!
//! Ownership is acyclic: the dispatcher owns the guarded clients, each
//! guarded client owns its backend and breaker, and the health checker
//! holds shared handles plus a callback, never the reverse.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use backhaul_core::{
//!     Backend, BreakerConfig, GuardedClient, HealthCheckConfig, HealthChecker, RoundRobin,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let origins = ["http://127.0.0.1:9001", "http://127.0.0.1:9002"];
//! let clients: Vec<_> = origins
//!     .iter()
//!     .map(|origin| {
//!         let backend = Backend::new(origin, Duration::from_secs(30), Duration::from_secs(5))?;
//!         Ok(Arc::new(GuardedClient::new(backend, BreakerConfig::default(), None)))
//!     })
//!     .collect::<Result<_, backhaul_core::ProxyError>>()?;
//!
//! let balancer = Arc::new(RoundRobin::new(clients.clone()));
//! let rebuild = {
//!     let balancer = balancer.clone();
//!     move || balancer.on_health_change()
//! };
//! let checker = HealthChecker::new(clients, HealthCheckConfig::default(), rebuild)?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let _handle = checker.spawn(shutdown_rx);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod balancer;
pub mod breaker;
pub mod error;
pub mod guarded;
pub mod health;

pub use backend::Backend;
pub use balancer::{BalancerKind, RoundRobin};
pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use error::{ProxyError, Result};
pub use guarded::{GuardedClient, RetryPolicy};
pub use health::{HealthCheckConfig, HealthChecker};
