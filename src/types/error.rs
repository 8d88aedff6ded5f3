use http::StatusCode;
use thiserror::Error;
use url::Url;

/// Possible errors when interacting with `hclient`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Network error while sending a request via reqwest
    #[error("Network error while trying to connect to an endpoint")]
    NetworkRequest(#[from] reqwest::Error),

    /// Reading the response body failed after the request itself succeeded
    #[error("Error while reading the response body")]
    ReadResponseBody(#[source] reqwest::Error),

    /// The aggregate per-request deadline was exceeded.
    ///
    /// This bounds the sum of all attempts (including backoff sleeps and
    /// the wait for a rate-limiter token), not each attempt individually.
    #[error("Request deadline exceeded after {attempts} attempt(s)")]
    Timeout {
        /// Number of attempts that were completed before the deadline hit
        attempts: u64,
    },

    /// The caller cancelled the request before or during execution
    #[error("Request was cancelled")]
    Cancelled,

    /// The server answered with a transient error status.
    ///
    /// This is only surfaced wrapped inside [`ErrorKind::RetriesExhausted`]
    /// once all retries are used up; a non-transient status (e.g. 4xx) is
    /// returned as a regular [`Response`](crate::Response) instead.
    #[error("Server responded with {status} for {url}")]
    ServerStatus {
        /// Status code of the last attempt
        status: StatusCode,
        /// The requested URL
        url: Url,
    },

    /// All attempts failed with a transient error
    #[error("Giving up after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        /// Total number of attempts performed, i.e. `max_retries + 1`
        attempts: u64,
        /// The error of the last attempt
        source: Box<ErrorKind>,
    },

    /// The request payload could not be serialized to JSON
    #[error("Failed to encode JSON payload")]
    EncodeJson(#[source] serde_json::Error),

    /// The response body could not be deserialized from JSON
    #[error("Failed to decode JSON response body")]
    DecodeJson(#[source] serde_json::Error),

    /// An operation was issued after the client was closed
    #[error("Client is closed")]
    ClientClosed,

    /// The bounded wait for a pooled connection expired
    #[error("Timed out waiting for a connection slot")]
    PoolExhausted,

    /// The given header could not be parsed.
    /// A possible error when converting a `HeaderValue` from a string or byte
    /// slice.
    #[error("Header could not be parsed")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The client was constructed with invalid options
    #[error("Invalid client options: {0}")]
    InvalidOptions(String),

    /// An async work function panicked.
    ///
    /// The panic is caught at the worker-pool boundary and delivered as a
    /// result instead of crashing the worker.
    #[error("Async work function panicked: {0}")]
    Panicked(String),
}

impl ErrorKind {
    /// Returns the underlying `reqwest::Error`, if this error wraps one
    #[must_use]
    pub fn reqwest_error(&self) -> Option<&reqwest::Error> {
        match self {
            Self::NetworkRequest(e) | Self::ReadResponseBody(e) => Some(e),
            _ => None,
        }
    }

    /// Number of attempts performed before this error was returned, if known
    #[must_use]
    pub const fn attempts(&self) -> Option<u64> {
        match self {
            Self::Timeout { attempts } | Self::RetriesExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
