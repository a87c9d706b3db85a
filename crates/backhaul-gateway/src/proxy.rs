//! Proxy handlers: the liveness endpoint and the catch-all forwarder.
//!
//! The forwarder buffers the inbound request body (so a configured retry
//! can replay it), dispatches through the balancer, and streams the
//! backend's response straight back without buffering it. Terminal errors
//! from the resilience layer map onto the gateway's own small error
//! vocabulary: 500 when there is nothing to dispatch to, 502 for anything
//! that kept us from relaying an upstream response.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use futures::TryStreamExt;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

use backhaul_core::{ProxyError, RoundRobin};

/// Largest inbound request body the gateway will buffer for forwarding.
const MAX_REQUEST_BODY: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub balancer: Arc<RoundRobin>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// `GET /health`: reports only that this process is running, independent of
/// backend state.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Catch-all proxy route: pick a backend, forward the request unchanged,
/// stream the response back, translate failures.
pub async fn proxy_request(State(state): State<AppState>, request: Request) -> Response {
    let Some(client) = state.balancer.next() else {
        warn!("no available backend to dispatch to");
        return error_response(&ProxyError::NoBackends);
    };

    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(body) => body,
        Err(err) => {
            warn!(error = %err, "failed to read inbound request body");
            return (StatusCode::BAD_REQUEST, "cannot read request body").into_response();
        }
    };

    let mut headers = parts.headers;
    // The Host header belongs to the backend's authority, which reqwest
    // derives from the target URL.
    headers.remove(header::HOST);
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    match client
        .send(parts.method.clone(), path_and_query, headers, body)
        .await
    {
        Ok(upstream) => forward_response(upstream),
        Err(err) => {
            warn!(
                backend = %client.base_url(),
                method = %parts.method,
                path = path_and_query,
                error = %err,
                "forwarding failed"
            );
            error_response(&err)
        }
    }
}

/// Copies status and headers, then hands the body stream to the client.
/// Once the status line is out, a mid-stream failure can only terminate the
/// connection; it never rewrites what was already sent.
fn forward_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut builder = Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in upstream.headers() {
            headers.append(name.clone(), value.clone());
        }
    }

    // By the time the stream is polled the status line is already out; an
    // interrupted copy terminates the connection and gets logged here.
    let body = upstream
        .bytes_stream()
        .inspect_err(|err| warn!(error = %err, "response body copy interrupted"));

    match builder.body(Body::from_stream(body)) {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "failed to assemble upstream response");
            (
                StatusCode::BAD_GATEWAY,
                "cannot reach server: invalid upstream response",
            )
                .into_response()
        }
    }
}

fn error_response(err: &ProxyError) -> Response {
    let (status, message) = match err {
        ProxyError::NoBackends => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        ProxyError::CircuitOpen | ProxyError::SlowResponse { .. } => {
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
        other => (
            StatusCode::BAD_GATEWAY,
            format!("cannot reach server: {other}"),
        ),
    };
    (status, message).into_response()
}
