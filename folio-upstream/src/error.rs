use std::time::Duration;

use thiserror::Error;

/// Errors raised while opening or reading an upstream completion stream.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport failure (connect, TLS, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status before streaming.
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A streamed chunk was not valid completion JSON.
    #[error("malformed upstream chunk: {0}")]
    MalformedChunk(String),

    /// The provider reported an error inside the stream.
    #[error("provider error: {0}")]
    Provider(String),

    /// No fragment arrived within the idle deadline.
    #[error("no fragment received within {0:?}")]
    Timeout(Duration),
}
