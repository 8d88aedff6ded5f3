use std::io;

use http::StatusCode;

use crate::ErrorKind;

/// An extension trait to help determine if a failed attempt
/// is worth retrying.
///
/// Modified from `Retryable` in [reqwest-middleware].
/// We vendor this code to avoid a dependency on `reqwest-middleware` and
/// to easily customize the logic.
///
/// [reqwest-middleware]: https://github.com/TrueLayer/reqwest-middleware/blob/f854725791ccf4a02c401a26cab3d9db753f468c/reqwest-retry/src/retryable.rs
pub(crate) trait RetryExt {
    fn should_retry(&self) -> bool;
}

impl RetryExt for StatusCode {
    #[allow(clippy::if_same_then_else)]
    fn should_retry(&self) -> bool {
        let status = *self;
        if status.is_server_error() {
            true
        } else if status.is_client_error()
            && status != StatusCode::REQUEST_TIMEOUT
            && status != StatusCode::TOO_MANY_REQUESTS
        {
            false
        } else if status.is_success() {
            false
        } else {
            status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS
        }
    }
}

impl RetryExt for reqwest::Error {
    fn should_retry(&self) -> bool {
        if self.is_timeout() || self.is_connect() {
            true
        } else if self.is_body() || self.is_decode() || self.is_builder() || self.is_redirect() {
            false
        } else if self.is_request() {
            // It seems that hyper::Error(IncompleteMessage) is not correctly handled by reqwest.
            // Here we check if the Reqwest error was originated by hyper and map it consistently.
            if let Some(hyper_error) = get_source_error_type::<hyper::Error>(&self) {
                // The hyper::Error(IncompleteMessage) is raised if the HTTP
                // response is well formatted but does not contain all the
                // bytes. This can happen when the server has started sending
                // back the response but the connection is cut halfway through.
                // We can safely retry the call, hence marking this error as
                // transient.
                //
                // Instead hyper::Error(Canceled) is raised when the connection is
                // gracefully closed on the server side.
                if hyper_error.is_incomplete_message() || hyper_error.is_canceled() {
                    true

                // Try and downcast the hyper error to [`io::Error`] if that is the
                // underlying error, and try and classify it.
                } else if let Some(io_error) = get_source_error_type::<io::Error>(hyper_error) {
                    should_retry_io(io_error)
                } else {
                    false
                }
            } else {
                false
            }
        } else if let Some(status) = self.status() {
            status.should_retry()
        } else {
            false
        }
    }
}

impl RetryExt for ErrorKind {
    fn should_retry(&self) -> bool {
        // If the error wraps a `reqwest::Error`, delegate to that
        if let Some(r) = self.reqwest_error() {
            r.should_retry()
        } else if let Self::ServerStatus { status, .. } = self {
            status.should_retry()
        } else {
            // Timeout, Cancelled, PoolExhausted, ClientClosed and friends
            // all terminate immediately
            false
        }
    }
}

/// Classifies an `io::Error` into retryable or not.
fn should_retry_io(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::TimedOut
    )
}

/// Downcasts the given err source into T.
fn get_source_error_type<T: std::error::Error + 'static>(
    err: &dyn std::error::Error,
) -> Option<&T> {
    let mut source = err.source();

    while let Some(err) = source {
        if let Some(typed_err) = err.downcast_ref::<T>() {
            return Some(typed_err);
        }

        source = err.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::RetryExt;
    use crate::ErrorKind;

    #[test]
    fn test_should_retry_status() {
        assert!(StatusCode::REQUEST_TIMEOUT.should_retry());
        assert!(StatusCode::TOO_MANY_REQUESTS.should_retry());
        assert!(StatusCode::INTERNAL_SERVER_ERROR.should_retry());
        assert!(StatusCode::SERVICE_UNAVAILABLE.should_retry());
        assert!(!StatusCode::OK.should_retry());
        assert!(!StatusCode::BAD_REQUEST.should_retry());
        assert!(!StatusCode::FORBIDDEN.should_retry());
    }

    #[test]
    fn test_should_retry_error_kind() {
        assert!(ErrorKind::ServerStatus {
            status: StatusCode::BAD_GATEWAY,
            url: "https://example.com/".parse().unwrap(),
        }
        .should_retry());
        assert!(!ErrorKind::Cancelled.should_retry());
        assert!(!ErrorKind::Timeout { attempts: 1 }.should_retry());
        assert!(!ErrorKind::PoolExhausted.should_retry());
        assert!(!ErrorKind::ClientClosed.should_retry());
    }
}
