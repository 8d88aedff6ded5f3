use std::fmt;
use std::time::Duration;

use http::{HeaderMap, Method, StatusCode};
use url::Url;

use crate::ErrorKind;

/// The result of a single attempt (one network round-trip).
///
/// Produced once per attempt and handed to the client's
/// [`AttemptObserver`] before the retry decision is made, so every
/// attempt is observable, not just the final one.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    /// Attempt number, starting at 1 and at most `max_retries + 1`
    pub attempt: u64,
    /// Status code, if a response was received
    pub status: Option<StatusCode>,
    /// Error description, if the attempt failed before a response arrived
    pub error: Option<String>,
    /// Wall-clock duration of the attempt
    pub elapsed: Duration,
}

/// Context passed to [`AttemptObserver::on_attempt`] for one attempt
#[derive(Debug)]
pub struct AttemptRecord<'a> {
    /// Caller-supplied correlation id (may be empty)
    pub request_id: &'a str,
    /// HTTP method of the request
    pub method: &'a Method,
    /// Target URL
    pub url: &'a Url,
    /// Request headers
    pub headers: &'a HeaderMap,
    /// Raw request body, if any
    pub body: Option<&'a [u8]>,
    /// Outcome of this attempt
    pub outcome: &'a AttemptOutcome,
}

/// Context passed to [`AttemptObserver::on_complete`] once per request
#[derive(Debug)]
pub struct CompletionRecord<'a> {
    /// Caller-supplied correlation id (may be empty)
    pub request_id: &'a str,
    /// HTTP method of the request
    pub method: &'a Method,
    /// Target URL
    pub url: &'a Url,
    /// Total number of attempts performed
    pub attempts: u64,
    /// Final status code, if the request produced a response
    pub status: Option<StatusCode>,
    /// Final error, if the request failed
    pub error: Option<&'a ErrorKind>,
}

/// Hook invoked synchronously for every attempt and once per completed
/// request.
///
/// The observer is owned by the client instance it is installed on, so
/// multiple clients in one process never contend on shared logging state.
/// Implementations must not block the retry loop; hand off to a
/// non-blocking sink if the work is expensive.
pub trait AttemptObserver: Send + Sync + fmt::Debug {
    /// Called after each attempt, before the decision to retry is made
    fn on_attempt(&self, record: &AttemptRecord<'_>);

    /// Called once with the final combined result of the request
    fn on_complete(&self, record: &CompletionRecord<'_>);
}

/// Default observer which emits one `log` record per attempt and per
/// completed request, mirroring the request id, URL, status and timing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl AttemptObserver for LogObserver {
    fn on_attempt(&self, record: &AttemptRecord<'_>) {
        let outcome = record.outcome;
        match (&outcome.status, &outcome.error) {
            (Some(status), _) if !status.is_server_error() => log::info!(
                "request_id={} method={} url={} attempt={} status={} elapsed={:?}",
                record.request_id,
                record.method,
                record.url,
                outcome.attempt,
                status,
                outcome.elapsed,
            ),
            (Some(status), _) => log::warn!(
                "request_id={} method={} url={} attempt={} status={} elapsed={:?}",
                record.request_id,
                record.method,
                record.url,
                outcome.attempt,
                status,
                outcome.elapsed,
            ),
            (None, error) => log::error!(
                "request_id={} method={} url={} attempt={} error={} elapsed={:?}",
                record.request_id,
                record.method,
                record.url,
                outcome.attempt,
                error.as_deref().unwrap_or("unknown"),
                outcome.elapsed,
            ),
        }
    }

    fn on_complete(&self, record: &CompletionRecord<'_>) {
        match record.error {
            None => log::info!(
                "request_id={} method={} url={} attempts={} status={} completed",
                record.request_id,
                record.method,
                record.url,
                record.attempts,
                record
                    .status
                    .map_or_else(|| "-".to_string(), |s| s.to_string()),
            ),
            Some(error) => log::error!(
                "request_id={} method={} url={} attempts={} error={error}",
                record.request_id,
                record.method,
                record.url,
                record.attempts,
            ),
        }
    }
}
