use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the dispatch and resilience layer.
///
/// The taxonomy is deliberately small: callers only ever need to distinguish
/// "the network failed", "the breaker refused the call", "the call succeeded
/// but too slowly", and "there is nothing to dispatch to". Upstream HTTP
/// status codes are not errors at this layer; they travel back as ordinary
/// responses.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Any network-layer failure on an outbound call: connect, read, write,
    /// or timeout. Counted as a failure by the circuit breaker and retried
    /// by the guarded client.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The circuit breaker refused to attempt the call. Never retried.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The call succeeded but exceeded the slow-call threshold. The response
    /// is discarded so the breaker can account for the latency.
    #[error("response too slow: {elapsed:?} exceeded threshold {threshold:?}")]
    SlowResponse { elapsed: Duration, threshold: Duration },

    /// No healthy backend was available to dispatch to.
    #[error("no servers configured")]
    NoBackends,

    /// A backend origin or probe path could not be parsed into a URL.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
