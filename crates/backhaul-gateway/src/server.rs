//! Router assembly for the gateway's HTTP surface.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tracing::info;

use crate::proxy::{self, AppState};

/// Builds the gateway router: the liveness endpoint, the catch-all proxy
/// route, and one request-log line per handled request.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(proxy::health))
        .fallback(proxy::proxy_request)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "handled request"
    );
    response
}
