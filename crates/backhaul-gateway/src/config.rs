//! Environment-driven configuration.
//!
//! The gateway is configured entirely through environment variables, with
//! defaults matching a conservative production posture. Durations are
//! integer millisecond values (`*_MS` keys). Validation happens at load
//! time; the rest of the process only ever sees a well-formed [`Config`].
//!
//! Backend origins come from `APPLICATION_APIS` (comma-separated) or, when
//! that is unset, from `API_1` through `API_10`.

use std::time::Duration;

use backhaul_core::RetryPolicy;
use thiserror::Error;
use url::Url;

const MAX_NUMBERED_APIS: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("at least one backend origin must be configured")]
    NoBackends,

    #[error("health check timeout must be strictly smaller than the check interval")]
    ProbeTimeoutTooLarge,
}

/// Fully-validated gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Inbound listener port (`PORT`, required).
    pub port: u16,
    /// Ordered backend origins.
    pub backends: Vec<String>,
    /// Balancer selector string (`BALANCER_TYPE`, default "round-robin").
    pub balancer: String,
    /// Time between health probe ticks (`HEALTH_CHECK_INTERVAL_MS`).
    pub health_check_interval: Duration,
    /// Per-probe timeout (`HEALTH_CHECK_TIMEOUT_MS`).
    pub health_check_timeout: Duration,
    /// Consecutive probe failures to mark a backend down
    /// (`HEALTH_CHECK_FAILURE_THRESHOLD`, default 3).
    pub health_check_failure_threshold: u32,
    /// Path probed on each backend (`HEALTH_CHECK_PATH`, default "/health").
    pub health_check_path: String,
    /// Breaker failure threshold (`MAX_FAILURES`, required).
    pub max_failures: u32,
    /// Breaker slow-call threshold (`MAX_SLOW_COUNT`, default 3).
    pub max_slow_count: u32,
    /// Latency above which a call counts as slow (`SLOW_THRESHOLD_MS`).
    pub slow_threshold: Duration,
    /// Open-breaker dwell before a half-open probe (`RESET_TIMEOUT_MS`).
    pub reset_timeout: Duration,
    /// Optional retry budget; present iff `RETRY_MAX_ATTEMPTS` is set.
    /// `RETRY_DELAY_MS` defaults to 100.
    pub retry: Option<RetryPolicy>,
    /// Outbound per-request timeout (`REQUEST_TIMEOUT_MS`).
    pub request_timeout: Duration,
    /// Outbound connect timeout (`CONNECT_TIMEOUT_MS`).
    pub connect_timeout: Duration,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port_raw = require(&lookup, "PORT")?;
        let port = port_raw.parse::<u16>().map_err(|err| ConfigError::Invalid {
            key: "PORT".to_string(),
            reason: err.to_string(),
        })?;

        let backends = backend_origins(&lookup)?;
        if backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        let max_failures_raw = require(&lookup, "MAX_FAILURES")?;
        let max_failures = parse_u32_value("MAX_FAILURES", &max_failures_raw)?;

        let retry = match optional(&lookup, "RETRY_MAX_ATTEMPTS") {
            Some(raw) => Some(RetryPolicy {
                max_attempts: parse_u32_value("RETRY_MAX_ATTEMPTS", &raw)?,
                delay: duration_ms(&lookup, "RETRY_DELAY_MS", 100)?,
            }),
            None => None,
        };

        let config = Self {
            port,
            backends,
            balancer: optional(&lookup, "BALANCER_TYPE")
                .unwrap_or_else(|| "round-robin".to_string()),
            health_check_interval: duration_ms(&lookup, "HEALTH_CHECK_INTERVAL_MS", 5_000)?,
            health_check_timeout: duration_ms(&lookup, "HEALTH_CHECK_TIMEOUT_MS", 3_000)?,
            health_check_failure_threshold: parse_u32(&lookup, "HEALTH_CHECK_FAILURE_THRESHOLD", 3)?,
            health_check_path: optional(&lookup, "HEALTH_CHECK_PATH")
                .unwrap_or_else(|| "/health".to_string()),
            max_failures,
            max_slow_count: parse_u32(&lookup, "MAX_SLOW_COUNT", 3)?,
            slow_threshold: duration_ms(&lookup, "SLOW_THRESHOLD_MS", 5_000)?,
            reset_timeout: duration_ms(&lookup, "RESET_TIMEOUT_MS", 60_000)?,
            retry,
            request_timeout: duration_ms(&lookup, "REQUEST_TIMEOUT_MS", 30_000)?,
            connect_timeout: duration_ms(&lookup, "CONNECT_TIMEOUT_MS", 5_000)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_failures == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_FAILURES".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.health_check_timeout >= self.health_check_interval {
            return Err(ConfigError::ProbeTimeoutTooLarge);
        }
        for origin in &self.backends {
            let url = Url::parse(origin).map_err(|err| ConfigError::Invalid {
                key: format!("backend origin {origin}"),
                reason: err.to_string(),
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::Invalid {
                    key: format!("backend origin {origin}"),
                    reason: "must use http:// or https://".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<String, ConfigError> {
    optional(lookup, key).ok_or(ConfigError::Missing(key))
}

fn parse_u32_value(key: &str, raw: &str) -> Result<u32, ConfigError> {
    raw.parse::<u32>().map_err(|err| ConfigError::Invalid {
        key: key.to_string(),
        reason: err.to_string(),
    })
}

fn parse_u32(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u32,
) -> Result<u32, ConfigError> {
    match optional(lookup, key) {
        Some(raw) => parse_u32_value(key, &raw),
        None => Ok(default),
    }
}

fn duration_ms(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    match optional(lookup, key) {
        Some(raw) => {
            let ms = raw.parse::<u64>().map_err(|err| ConfigError::Invalid {
                key: key.to_string(),
                reason: err.to_string(),
            })?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(Duration::from_millis(default_ms)),
    }
}

fn backend_origins(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Vec<String>, ConfigError> {
    if let Some(list) = optional(lookup, "APPLICATION_APIS") {
        return Ok(list
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect());
    }

    let mut origins = Vec::new();
    for i in 1..=MAX_NUMBERED_APIS {
        if let Some(origin) = optional(lookup, &format!("API_{i}")) {
            origins.push(origin);
        }
    }
    Ok(origins)
}
