//! Active health checking.
//!
//! A long-lived task probes every backend on a timer, independently of
//! request traffic. Probes deliberately bypass the circuit breaker: a
//! backend whose breaker is open must still be probeable, otherwise nothing
//! could ever observe its recovery ahead of the breaker's own half-open
//! schedule.
//!
//! Each tick fans out one probe per backend, waits for all of them, then
//! applies the results in one pass. Liveness only flips down after a
//! configured number of consecutive probe failures; a single healthy probe
//! flips it back up and resets the breaker. Whenever a tick changed any
//! flag, the health-change callback fires exactly once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use http::StatusCode;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Result;
use crate::guarded::GuardedClient;

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Time between probe ticks.
    ///
    /// Default: 5 seconds
    pub interval: Duration,
    /// Per-probe timeout. Must be strictly smaller than the interval.
    ///
    /// Default: 3 seconds
    pub timeout: Duration,
    /// Consecutive probe failures required to mark a backend down.
    ///
    /// Default: 3
    pub failure_threshold: u32,
    /// Path probed on each backend.
    ///
    /// Default: "/health"
    pub check_path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(3),
            failure_threshold: 3,
            check_path: "/health".to_string(),
        }
    }
}

/// Periodic prober that flips backend liveness flags.
pub struct HealthChecker {
    clients: Vec<Arc<GuardedClient>>,
    on_health_change: Box<dyn Fn() + Send + Sync>,
    probe_client: reqwest::Client,
    config: HealthCheckConfig,
    failure_counts: HashMap<String, u32>,
}

impl HealthChecker {
    /// Creates a checker over the given clients.
    ///
    /// `on_health_change` is invoked after any tick in which at least one
    /// liveness flag flipped; the dispatcher registers its rebuild here. The
    /// probe HTTP client carries the probe timeout and is separate from the
    /// backends' own clients, so probes are never gated by a breaker.
    pub fn new(
        clients: Vec<Arc<GuardedClient>>,
        config: HealthCheckConfig,
        on_health_change: impl Fn() + Send + Sync + 'static,
    ) -> Result<Self> {
        let probe_client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            clients,
            on_health_change: Box::new(on_health_change),
            probe_client,
            config,
            failure_counts: HashMap::new(),
        })
    }

    /// Spawns the probe loop as a background task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Runs the probe loop until the shutdown signal fires. A tick that
    /// races the signal is not completed.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("health checker stopping");
                    return;
                }
                _ = ticker.tick() => {}
            }

            // Abandon an in-flight tick if the signal fires mid-probe. The
            // result pass below the probes has no await points, so a dropped
            // tick never applies a partial update.
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("health checker stopping");
                    return;
                }
                _ = self.check_all() => {}
            }
        }
    }

    async fn check_all(&mut self) {
        let probes = self.clients.iter().map(|client| {
            let client = Arc::clone(client);
            let probe_client = &self.probe_client;
            let check_path = self.config.check_path.as_str();
            async move {
                let healthy = probe(probe_client, check_path, client.base_url()).await;
                (client, healthy)
            }
        });
        let results = join_all(probes).await;

        let mut changed = false;
        for (client, healthy) in results {
            let url = client.base_url().to_string();
            let count = self.failure_counts.entry(url.clone()).or_insert(0);

            if healthy {
                *count = 0;
                if !client.marked_up() {
                    client.mark_up();
                    info!(backend = %url, "backend marked healthy");
                    changed = true;
                }
            } else {
                *count += 1;
                debug!(
                    backend = %url,
                    consecutive_failures = *count,
                    threshold = self.config.failure_threshold,
                    "health check failure recorded"
                );
                if *count >= self.config.failure_threshold && client.marked_up() {
                    client.mark_down();
                    warn!(
                        backend = %url,
                        consecutive_failures = *count,
                        "backend marked unhealthy"
                    );
                    changed = true;
                }
            }
        }

        if changed {
            (self.on_health_change)();
        }
    }
}

/// One probe: GET base-URL + check-path. Healthy iff HTTP 200; any other
/// status or transport error is unhealthy.
async fn probe(client: &reqwest::Client, check_path: &str, base_url: &Url) -> bool {
    let url = match base_url.join(check_path) {
        Ok(url) => url,
        Err(err) => {
            warn!(backend = %base_url, error = %err, "invalid health check url");
            return false;
        }
    };

    match client.get(url).send().await {
        Ok(response) => response.status() == StatusCode::OK,
        Err(err) => {
            debug!(backend = %base_url, error = %err, "health probe failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_check_config_default() {
        let config = HealthCheckConfig::default();
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.check_path, "/health");
    }

    #[test]
    fn test_probe_timeout_fits_inside_interval() {
        let config = HealthCheckConfig::default();
        assert!(config.timeout < config.interval);
    }
}
