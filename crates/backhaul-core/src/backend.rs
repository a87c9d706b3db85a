//! Backend client: a single addressable upstream origin.
//!
//! A [`Backend`] owns the base URL of one origin, a dedicated HTTP client
//! configured with the outbound timeouts, and the liveness flag the health
//! checker flips. The set of backends is fixed at construction; only the
//! liveness flag ever changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};
use url::Url;

use crate::error::Result;

/// An addressable backend origin.
///
/// The base URL contributes scheme and authority; path and query are taken
/// from each forwarded request. HTTP status codes, including 5xx, are never
/// errors here: any response that made it back over the wire is returned as
/// is. Only network-layer failures (connect, read, write, timeout) surface
/// as [`ProxyError::Transport`](crate::error::ProxyError::Transport).
#[derive(Debug)]
pub struct Backend {
    base_url: Url,
    client: reqwest::Client,
    up: AtomicBool,
}

impl Backend {
    /// Creates a backend for `origin` with per-call timeouts baked into the
    /// underlying HTTP client. Backends start marked up.
    pub fn new(origin: &str, request_timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(origin)?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            base_url,
            client,
            up: AtomicBool::new(true),
        })
    }

    /// Performs a single outbound HTTP call.
    ///
    /// `path_and_query` is resolved against the configured base URL, so the
    /// request reaches the same path on the backend that the caller asked
    /// this gateway for. The response body is not buffered; the returned
    /// [`reqwest::Response`] streams on demand.
    pub async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response> {
        let url = self.base_url.join(path_and_query)?;
        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        Ok(response)
    }

    /// Current liveness flag. Safe under concurrent access.
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    /// Flips the liveness flag. Only the health checker writes this.
    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    /// The configured origin. Constant for the lifetime of the backend.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}
