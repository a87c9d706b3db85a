//! Round-robin dispatch over the currently-healthy subset of backends.
//!
//! The dispatcher owns the full ordered list of guarded clients for the
//! process lifetime. A separate `available` subsequence tracks which of them
//! are eligible right now; it is rebuilt by the health-change callback and
//! consumed by `next`. Both operations run under one short-lived lock, so an
//! observer never sees a partially-rebuilt subset or an out-of-range cursor.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::guarded::GuardedClient;

/// Balancing strategy selector.
///
/// Round-robin is the only strategy; unknown configuration values fall back
/// to it rather than failing startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalancerKind {
    RoundRobin,
}

impl BalancerKind {
    pub fn parse(value: &str) -> Self {
        match value {
            "round-robin" => BalancerKind::RoundRobin,
            other => {
                warn!(balancer = other, "unknown balancer type, falling back to round-robin");
                BalancerKind::RoundRobin
            }
        }
    }
}

#[derive(Debug)]
struct Rotation {
    /// Indices into `clients`, in declaration order, of the backends that
    /// were up at the last health change.
    available: Vec<usize>,
    /// Advances by one per dispatch, evaluated modulo `available.len()`.
    cursor: usize,
}

/// Round-robin dispatcher.
///
/// `next` and `on_health_change` may run concurrently from request handlers
/// and the health checker; the rotation lock linearizes them.
#[derive(Debug)]
pub struct RoundRobin {
    clients: Vec<Arc<GuardedClient>>,
    rotation: Mutex<Rotation>,
}

impl RoundRobin {
    /// Creates a dispatcher over a fixed, ordered set of clients. All of
    /// them start available.
    pub fn new(clients: Vec<Arc<GuardedClient>>) -> Self {
        let available = (0..clients.len()).collect();
        Self {
            clients,
            rotation: Mutex::new(Rotation {
                available,
                cursor: 0,
            }),
        }
    }

    /// Returns the next available backend and advances the cursor, or `None`
    /// when no backend is available.
    pub fn next(&self) -> Option<Arc<GuardedClient>> {
        let mut rotation = self.lock_rotation();
        if rotation.available.is_empty() {
            return None;
        }

        let slot = rotation.cursor % rotation.available.len();
        let index = rotation.available[slot];
        rotation.cursor = (rotation.cursor + 1) % rotation.available.len();
        Some(Arc::clone(&self.clients[index]))
    }

    /// Rebuilds the available subsequence from the clients' current
    /// liveness, preserving declaration order, and renormalizes the cursor.
    ///
    /// Registered with the health checker as its health-change callback. The
    /// cursor keeps its position modulo the new size so a topology change
    /// does not bias dispatch back to the first backend.
    pub fn on_health_change(&self) {
        // Liveness is read before taking the rotation lock so no two
        // component locks are ever held at once.
        let available: Vec<usize> = self
            .clients
            .iter()
            .enumerate()
            .filter(|(_, client)| client.is_up())
            .map(|(index, _)| index)
            .collect();

        let mut rotation = self.lock_rotation();
        rotation.available = available;

        if rotation.available.is_empty() {
            rotation.cursor = 0;
        } else {
            rotation.cursor %= rotation.available.len();
        }

        debug!(
            available = rotation.available.len(),
            total = self.clients.len(),
            "dispatch set rebuilt"
        );
    }

    /// Number of backends currently eligible for dispatch.
    pub fn available_count(&self) -> usize {
        self.lock_rotation().available.len()
    }

    /// All clients, in declaration order, regardless of liveness.
    pub fn clients(&self) -> &[Arc<GuardedClient>] {
        &self.clients
    }

    fn lock_rotation(&self) -> MutexGuard<'_, Rotation> {
        self.rotation.lock().expect("rotation lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::breaker::BreakerConfig;
    use std::time::Duration;

    fn clients(origins: &[&str]) -> Vec<Arc<GuardedClient>> {
        origins
            .iter()
            .map(|origin| {
                let backend =
                    Backend::new(origin, Duration::from_secs(1), Duration::from_secs(1))
                        .expect("valid test origin");
                Arc::new(GuardedClient::new(backend, BreakerConfig::default(), None))
            })
            .collect()
    }

    fn next_origin(rr: &RoundRobin) -> String {
        rr.next().expect("a backend should be available").base_url().to_string()
    }

    #[test]
    fn test_round_robin_order_and_wrap() {
        let rr = RoundRobin::new(clients(&[
            "http://127.0.0.1:9001",
            "http://127.0.0.1:9002",
            "http://127.0.0.1:9003",
        ]));

        assert_eq!(next_origin(&rr), "http://127.0.0.1:9001/");
        assert_eq!(next_origin(&rr), "http://127.0.0.1:9002/");
        assert_eq!(next_origin(&rr), "http://127.0.0.1:9003/");
        assert_eq!(next_origin(&rr), "http://127.0.0.1:9001/");
    }

    #[test]
    fn test_empty_set_returns_none() {
        let rr = RoundRobin::new(Vec::new());
        assert!(rr.next().is_none());
    }

    #[test]
    fn test_fairness_over_stable_set() {
        let rr = RoundRobin::new(clients(&[
            "http://127.0.0.1:9001",
            "http://127.0.0.1:9002",
            "http://127.0.0.1:9003",
        ]));

        let mut counts = std::collections::HashMap::new();
        for _ in 0..300 {
            *counts.entry(next_origin(&rr)).or_insert(0) += 1;
        }

        assert_eq!(counts["http://127.0.0.1:9001/"], 100);
        assert_eq!(counts["http://127.0.0.1:9002/"], 100);
        assert_eq!(counts["http://127.0.0.1:9003/"], 100);
    }

    #[test]
    fn test_health_change_filters_downed_backends() {
        let rr = RoundRobin::new(clients(&[
            "http://127.0.0.1:9001",
            "http://127.0.0.1:9002",
            "http://127.0.0.1:9003",
        ]));

        rr.clients()[1].mark_down();
        rr.on_health_change();

        assert_eq!(rr.available_count(), 2);
        assert_eq!(next_origin(&rr), "http://127.0.0.1:9001/");
        assert_eq!(next_origin(&rr), "http://127.0.0.1:9003/");
        assert_eq!(next_origin(&rr), "http://127.0.0.1:9001/");
    }

    #[test]
    fn test_cursor_renormalizes_on_shrink() {
        let rr = RoundRobin::new(clients(&[
            "http://127.0.0.1:9001",
            "http://127.0.0.1:9002",
            "http://127.0.0.1:9003",
        ]));

        // Advance the cursor past what the shrunken set can index.
        let _ = rr.next();
        let _ = rr.next();

        rr.clients()[0].mark_down();
        rr.clients()[1].mark_down();
        rr.on_health_change();

        // Only one backend left; the cursor must still index a valid slot.
        assert_eq!(next_origin(&rr), "http://127.0.0.1:9003/");
        assert_eq!(next_origin(&rr), "http://127.0.0.1:9003/");
    }

    #[test]
    fn test_all_down_then_recovery() {
        let rr = RoundRobin::new(clients(&["http://127.0.0.1:9001", "http://127.0.0.1:9002"]));

        for client in rr.clients() {
            client.mark_down();
        }
        rr.on_health_change();
        assert!(rr.next().is_none());
        assert_eq!(rr.available_count(), 0);

        rr.clients()[1].mark_up();
        rr.on_health_change();
        assert_eq!(next_origin(&rr), "http://127.0.0.1:9002/");
    }

    #[test]
    fn test_unknown_balancer_kind_falls_back() {
        assert_eq!(BalancerKind::parse("round-robin"), BalancerKind::RoundRobin);
        assert_eq!(BalancerKind::parse("least-connections"), BalancerKind::RoundRobin);
        assert_eq!(BalancerKind::parse(""), BalancerKind::RoundRobin);
    }

    #[test]
    fn test_concurrent_dispatch_is_linearizable() {
        use std::thread;

        let rr = Arc::new(RoundRobin::new(clients(&[
            "http://127.0.0.1:9001",
            "http://127.0.0.1:9002",
            "http://127.0.0.1:9003",
        ])));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let rr = Arc::clone(&rr);
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    assert!(rr.next().is_some());
                    rr.on_health_change();
                }
            }));
        }
        for handle in handles {
            handle.join().expect("dispatch thread panicked");
        }
    }
}
