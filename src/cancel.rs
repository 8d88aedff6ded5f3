use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::{ErrorKind, Result};

/// Cooperative cancellation signal shared between a submitter and the
/// execution path of a request.
///
/// The flag can only move from "live" to "cancelled", exactly once. It is
/// checked before each attempt and before each backoff sleep; an attempt
/// already in flight runs to completion or its own lower-level timeout.
///
/// The default token can never be cancelled and is used for plain
/// synchronous calls.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    /// Creates a live token
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    pub(crate) fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag: Some(flag) }
    }

    /// Requests cancellation.
    ///
    /// Returns `true` if this call performed the flip from live to
    /// cancelled, `false` if the token was already cancelled or can never
    /// be cancelled.
    pub fn cancel(&self) -> bool {
        self.flag
            .as_ref()
            .is_some_and(|flag| !flag.swap(true, Ordering::SeqCst))
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// Combined cancellation and deadline signal threaded through one request.
///
/// The deadline bounds the sum of all attempts, backoff sleeps and the
/// wait for a rate-limiter token.
#[derive(Debug, Clone)]
pub(crate) struct Cancellation {
    deadline: Option<Instant>,
    token: CancelToken,
}

impl Cancellation {
    pub(crate) fn new(timeout: Option<Duration>, token: CancelToken) -> Self {
        Self {
            deadline: timeout.map(|t| Instant::now() + t),
            token,
        }
    }

    /// Time left until the deadline; `None` means unbounded
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Fails with [`ErrorKind::Cancelled`] or [`ErrorKind::Timeout`] if
    /// the signal has fired. `attempts` is attached to timeout errors for
    /// diagnostics.
    pub(crate) fn check(&self, attempts: u64) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(ErrorKind::Cancelled);
        }
        if self.remaining().is_some_and(|rem| rem.is_zero()) {
            return Err(ErrorKind::Timeout { attempts });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_token_never_cancels() {
        let token = CancelToken::default();
        assert!(!token.cancel());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_flips_exactly_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel());
        assert!(token.is_cancelled());
        // Second cancel is a no-op
        assert!(!token.cancel());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_expiry() {
        tokio::time::pause();
        let cancel = Cancellation::new(Some(Duration::from_secs(1)), CancelToken::default());
        assert!(cancel.check(0).is_ok());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(
            cancel.check(3),
            Err(ErrorKind::Timeout { attempts: 3 })
        ));
    }

    #[test]
    fn test_cancelled_token_fails_check() {
        let token = CancelToken::new();
        let cancel = Cancellation::new(None, token.clone());
        assert!(cancel.check(0).is_ok());
        token.cancel();
        assert!(matches!(cancel.check(0), Err(ErrorKind::Cancelled)));
    }
}
