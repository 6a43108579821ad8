use std::sync::Arc;

use reqwest::StatusCode;

/// Result type used by the fallible parts of the crate (fetching definitions, starting the
/// poller). Flag evaluation itself never fails; it degrades to the caller-supplied fallback.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the flags API or managing the poller thread.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// `api_host` cannot be combined with an endpoint path into a valid URL.
    #[error("invalid api_host configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// Connection failure or request timeout.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// The server answered with something other than `200 OK`.
    #[error("unexpected response status {status}: {body}")]
    UnexpectedStatus {
        /// Status code returned by the server.
        status: StatusCode,
        /// Response body, kept for diagnostics.
        body: String,
    },

    /// The response body is not the JSON we expected.
    #[error("failed to parse response body")]
    Parse(#[source] Arc<serde_json::Error>),

    /// An I/O error, e.g. the poller thread could not be spawned.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Indicates that the poller thread panicked. This should normally never happen.
    #[error("poller thread panicked")]
    PollerThreadPanicked,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        // The URL carries the project token in its query string.
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Parse(Arc::new(value))
    }
}
