//! Backhaul gateway: the HTTP surface and process wiring around
//! [`backhaul_core`].
//!
//! The gateway accepts arbitrary HTTP requests on a single port and
//! forwards each one to exactly one of a pre-configured set of backend
//! origins, steering traffic away from backends that fail their health
//! probes or trip their circuit breakers. This crate owns what the core
//! treats as external: configuration loading, router setup, request
//! logging, and graceful shutdown.

pub mod config;
pub mod proxy;
pub mod server;

pub use config::{Config, ConfigError};
pub use proxy::AppState;
pub use server::build_router;
