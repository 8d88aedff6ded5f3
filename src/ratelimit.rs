use std::num::NonZeroU32;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as DirectRateLimiter,
};

use crate::cancel::Cancellation;
use crate::{ErrorKind, Result};

/// Token-bucket gate bounding the number of requests per second issued by
/// one client instance.
///
/// The bucket holds at most one second's worth of tokens, so short bursts
/// are absorbed while sustained traffic is smoothed to the configured
/// rate. A rate of 0 disables limiting entirely.
///
/// Safe for any number of concurrent callers; all waiting happens inside
/// governor's lock-free state.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    inner: Option<DirectRateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    pub(crate) fn new(requests_per_second: u32) -> Self {
        let inner = NonZeroU32::new(requests_per_second)
            .map(|rps| DirectRateLimiter::direct(Quota::per_second(rps)));
        Self { inner }
    }

    /// Blocks until a token is available, the deadline expires or the
    /// caller cancels.
    ///
    /// With limiting disabled this returns immediately without touching
    /// the cancellation signal's budget.
    pub(crate) async fn acquire(&self, cancel: &Cancellation) -> Result<()> {
        let Some(limiter) = &self.inner else {
            return Ok(());
        };

        cancel.check(0)?;
        match cancel.remaining() {
            None => {
                limiter.until_ready().await;
                Ok(())
            }
            Some(remaining) => tokio::time::timeout(remaining, limiter.until_ready())
                .await
                .map_err(|_| ErrorKind::Timeout { attempts: 0 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::cancel::CancelToken;

    fn unbounded() -> Cancellation {
        Cancellation::new(None, CancelToken::default())
    }

    #[tokio::test]
    async fn test_unlimited_acquires_immediately() {
        let limiter = RateLimiter::new(0);
        let start = Instant::now();
        for _ in 0..1_000 {
            limiter.acquire(&unbounded()).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_smooths_to_configured_rate() {
        // Burst capacity is one second's worth of tokens (2 here), so the
        // third and fourth acquisition must wait roughly half a second each.
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        for _ in 0..4 {
            limiter.acquire(&unbounded()).await.unwrap();
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(900), "elapsed: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_acquire_times_out() {
        let limiter = RateLimiter::new(1);
        // Drain the bucket
        limiter.acquire(&unbounded()).await.unwrap();

        let cancel = Cancellation::new(Some(Duration::from_millis(50)), CancelToken::default());
        let err = limiter.acquire(&cancel).await.unwrap_err();
        assert!(matches!(err, ErrorKind::Timeout { attempts: 0 }));
    }

    #[tokio::test]
    async fn test_acquire_observes_cancellation() {
        let limiter = RateLimiter::new(1);
        let token = CancelToken::new();
        token.cancel();
        let cancel = Cancellation::new(None, token);
        let err = limiter.acquire(&cancel).await.unwrap_err();
        assert!(matches!(err, ErrorKind::Cancelled));
    }
}
