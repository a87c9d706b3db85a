//! Backhaul gateway entrypoint.
//!
//! Wires configuration into the core: one guarded client per backend
//! origin, a round-robin balancer over them, a health checker feeding the
//! balancer's rebuild callback, and the axum server in front. Shutdown is
//! two-phase: the listener drains on signal, then the health checker is
//! told to stop and joined.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backhaul_core::{
    Backend, BalancerKind, BreakerConfig, GuardedClient, HealthCheckConfig, HealthChecker,
    RoundRobin,
};
use backhaul_gateway::config::Config;
use backhaul_gateway::proxy::AppState;
use backhaul_gateway::server::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env().context("failed to load configuration")?;

    let breaker_config = BreakerConfig {
        max_failures: config.max_failures,
        max_slow_count: config.max_slow_count,
        slow_threshold: config.slow_threshold,
        reset_timeout: config.reset_timeout,
    };

    let mut clients = Vec::with_capacity(config.backends.len());
    for origin in &config.backends {
        let backend = Backend::new(origin, config.request_timeout, config.connect_timeout)
            .with_context(|| format!("invalid backend origin {origin}"))?;
        clients.push(Arc::new(GuardedClient::new(
            backend,
            breaker_config.clone(),
            config.retry.clone(),
        )));
    }

    let balancer = match BalancerKind::parse(&config.balancer) {
        BalancerKind::RoundRobin => Arc::new(RoundRobin::new(clients.clone())),
    };

    let health_config = HealthCheckConfig {
        interval: config.health_check_interval,
        timeout: config.health_check_timeout,
        failure_threshold: config.health_check_failure_threshold,
        check_path: config.health_check_path.clone(),
    };
    let checker = HealthChecker::new(clients, health_config, {
        let balancer = Arc::clone(&balancer);
        move || balancer.on_health_change()
    })
    .context("failed to build health checker")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let checker_handle = checker.spawn(shutdown_rx);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    info!(
        port = config.port,
        backends = config.backends.len(),
        "backhaul gateway listening"
    );

    axum::serve(listener, build_router(AppState { balancer }))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    info!("shutting down");
    let _ = shutdown_tx.send(true);
    let _ = checker_handle.await;

    Ok(())
}

fn init_tracing() {
    let default_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
