use std::time::Duration;

use http::Method;
use rand::Rng;
use tokio::time::{sleep, Instant};

use crate::cancel::Cancellation;
use crate::retryable::RetryExt;
use crate::transport::Transport;
use crate::types::{AttemptObserver, AttemptOutcome, AttemptRecord};
use crate::{ErrorKind, Request, Response, Result};

/// Backoff parameters for one client, fixed at construction.
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    /// Maximum number of retries; total attempts are `max_retries + 1`
    pub(crate) max_retries: u64,
    /// Base delay before the first retry
    pub(crate) wait_min: Duration,
    /// Ceiling for any single backoff delay
    pub(crate) wait_max: Duration,
}

impl RetryPolicy {
    /// Computes the delay between attempt `attempt` and the next one:
    /// exponential growth from `wait_min`, plus a jitter of up to half the
    /// exponential delay, capped at `wait_max`.
    ///
    /// Keeping the jitter below half of the (doubling) exponential term
    /// makes consecutive delays non-decreasing.
    pub(crate) fn backoff_delay(&self, attempt: u64) -> Duration {
        let shift = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(32);
        let exponential = self
            .wait_min
            .checked_mul(2u32.saturating_pow(shift))
            .unwrap_or(self.wait_max)
            .min(self.wait_max);

        let jitter_ceiling = (exponential / 2).as_millis();
        let jitter = if jitter_ceiling == 0 {
            Duration::ZERO
        } else {
            let millis = rand::thread_rng().gen_range(0..=jitter_ceiling);
            Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
        };

        (exponential + jitter).min(self.wait_max)
    }
}

/// A successfully executed request, together with the number of attempts
/// it took.
#[derive(Debug)]
pub(crate) struct Executed {
    pub(crate) response: Response,
    pub(crate) attempts: u64,
}

/// Runs up to `max_retries + 1` attempts of one logical request against
/// the transport.
///
/// Retries of a single request are strictly ordered; attempt `n` completes
/// before attempt `n + 1` starts. Every attempt is reported to the
/// observer before the retry decision. The cancellation signal is checked
/// before each attempt and before each backoff sleep; the aggregate
/// deadline bounds the whole loop, and a sleep that would overrun it fails
/// fast with [`ErrorKind::Timeout`] instead.
pub(crate) async fn execute(
    transport: &Transport,
    method: &Method,
    request: &Request,
    policy: &RetryPolicy,
    observer: &dyn AttemptObserver,
    cancel: &Cancellation,
) -> Result<Executed> {
    let total_attempts = policy.max_retries + 1;
    let mut attempt: u64 = 1;

    loop {
        cancel.check(attempt - 1)?;

        let started = Instant::now();
        let result = transport.send(method.clone(), request, cancel).await;

        let outcome = match &result {
            Ok(response) => AttemptOutcome {
                attempt,
                status: Some(response.status()),
                error: None,
                elapsed: started.elapsed(),
            },
            Err(error) => AttemptOutcome {
                attempt,
                status: None,
                error: Some(error.to_string()),
                elapsed: started.elapsed(),
            },
        };
        observer.on_attempt(&AttemptRecord {
            request_id: &request.id,
            method,
            url: &request.url,
            headers: &request.headers,
            body: request.body.as_deref(),
            outcome: &outcome,
        });

        let last_error = match result {
            Ok(response) => {
                if !response.status().should_retry() {
                    return Ok(Executed {
                        response,
                        attempts: attempt,
                    });
                }
                ErrorKind::ServerStatus {
                    status: response.status(),
                    url: request.url.clone(),
                }
            }
            Err(error) => {
                if !error.should_retry() {
                    return Err(error);
                }
                error
            }
        };

        if attempt >= total_attempts {
            return Err(ErrorKind::RetriesExhausted {
                attempts: attempt,
                source: Box::new(last_error),
            });
        }

        let delay = policy.backoff_delay(attempt);
        cancel.check(attempt)?;
        if let Some(remaining) = cancel.remaining() {
            if delay >= remaining {
                return Err(ErrorKind::Timeout { attempts: attempt });
            }
        }
        sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u64, wait_min: Duration, wait_max: Duration) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            wait_min,
            wait_max,
        }
    }

    #[test]
    fn test_backoff_delays_non_decreasing_and_capped() {
        let policy = policy(10, Duration::from_millis(100), Duration::from_secs(2));

        let mut previous = Duration::ZERO;
        for attempt in 1..=10 {
            let delay = policy.backoff_delay(attempt);
            assert!(
                delay >= previous,
                "attempt {attempt}: {delay:?} < {previous:?}"
            );
            assert!(delay <= Duration::from_secs(2));
            previous = delay;
        }
    }

    #[test]
    fn test_backoff_first_delay_at_least_base() {
        let policy = policy(3, Duration::from_millis(200), Duration::from_secs(30));
        let delay = policy.backoff_delay(1);
        assert!(delay >= Duration::from_millis(200));
        // Jitter adds at most half of the exponential term
        assert!(delay <= Duration::from_millis(300));
    }

    #[test]
    fn test_backoff_huge_attempt_does_not_overflow() {
        let policy = policy(u64::MAX, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(u64::MAX), Duration::from_secs(5));
    }
}
