//! Mock backends for gateway end-to-end tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
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
        Self::serve(None, name, None, StatusCode::OK).await
    }

    /// Starts a backend bound to a specific address, for tests that revive
    /// a previously-dead origin.
    pub async fn start_at(addr: SocketAddr, name: &'static str) -> Self {
        Self::serve(Some(addr), name, None, StatusCode::OK).await
    }

    /// Starts a backend that sleeps for `delay` before answering.
    pub async fn start_slow(name: &'static str, delay: Duration) -> Self {
        Self::serve(None, name, Some(delay), StatusCode::OK).await
    }

    /// Starts a backend that answers every non-health route with `status`.
    pub async fn start_with_status(name: &'static str, status: StatusCode) -> Self {
        Self::serve(None, name, None, status).await
    }

    async fn serve(
        bind: Option<SocketAddr>,
        name: &'static str,
        delay: Option<Duration>,
        status: StatusCode,
    ) -> Self {
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
                                (StatusCode::INTERNAL_SERVER_ERROR, "unhealthy")
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

        let listener = match bind {
            Some(addr) => TcpListener::bind(addr).await.expect("failed to rebind mock backend"),
            None => TcpListener::bind("127.0.0.1:0").await.expect("failed to bind mock backend"),
        };
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

/// Starts a backend that echoes the forwarded request back as JSON so tests
/// can assert forwarding fidelity.
pub async fn start_echo() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let app = Router::new().fallback(|req: Request| async move {
        let (parts, body) = req.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();

        let headers: serde_json::Map<String, serde_json::Value> = parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    serde_json::Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
                )
            })
            .collect();

        Json(serde_json::json!({
            "method": parts.method.as_str(),
            "path": parts.uri.path(),
            "query": parts.uri.query().unwrap_or(""),
            "headers": headers,
            "body": String::from_utf8_lossy(&body).into_owned(),
        }))
    });

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind echo backend");
    let addr = listener.local_addr().expect("echo backend has no local addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("echo backend server failed");
    });

    (addr, handle)
}

/// Reserves an address nothing listens on. Connecting to it is refused.
pub async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to reserve an address");
    let addr = listener.local_addr().expect("reserved listener has no local addr");
    drop(listener);
    addr
}
