//! Shared mock backend for integration tests.
//!
//! Spins up a real axum server on an ephemeral port, the same way the
//! gateway's backends look in production: a catch-all route that answers
//! with the backend's name, plus a `/health` route driven by a toggle.

// Not every test binary exercises every helper.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

pub struct MockBackend {
    pub addr: SocketAddr,
    healthy: Arc<AtomicBool>,
    hits: Arc<AtomicU32>,
    _handle: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    /// Starts a backend that answers every non-health route with `name`.
    pub async fn start(name: &'static str) -> Self {
        Self::start_with(name, None, StatusCode::OK).await
    }

    /// Starts a backend that sleeps for `delay` before answering.
    pub async fn start_slow(name: &'static str, delay: Duration) -> Self {
        Self::start_with(name, Some(delay), StatusCode::OK).await
    }

    /// Starts a backend that answers every non-health route with `status`.
    pub async fn start_with_status(name: &'static str, status: StatusCode) -> Self {
        Self::start_with(name, None, status).await
    }

    async fn start_with(name: &'static str, delay: Option<Duration>, status: StatusCode) -> Self {
        let healthy = Arc::new(AtomicBool::new(true));
        let hits = Arc::new(AtomicU32::new(0));

        let app = Router::new()
            .route(
                "/health",
                get({
                    let healthy = Arc::clone(&healthy);
                    move || {
                        let healthy = Arc::clone(&healthy);
                        async move {
                            if healthy.load(Ordering::SeqCst) {
                                (StatusCode::OK, "OK")
                            } else {
                                (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
                            }
                        }
                    }
                }),
            )
            .fallback({
                let hits = Arc::clone(&hits);
                move |_req: Request| {
                    let hits = Arc::clone(&hits);
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        if let Some(delay) = delay {
                            tokio::time::sleep(delay).await;
                        }
                        (status, name).into_response()
                    }
                }
            });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock backend");
        let addr = listener.local_addr().expect("mock backend has no local addr");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock backend server failed");
        });

        Self {
            addr,
            healthy,
            hits,
            _handle: handle,
        }
    }

    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Reserves an address nothing listens on. Connecting to it is refused.
pub async fn unreachable_origin() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to reserve an address");
    let addr = listener.local_addr().expect("reserved listener has no local addr");
    drop(listener);
    format!("http://{addr}")
}
