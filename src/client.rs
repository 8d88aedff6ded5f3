//! Handler of outbound HTTP operations.
//!
//! This module defines two structs, [`Client`] and [`ClientBuilder`].
//! `Client` owns the transport, enforces the rate limit and drives the
//! retry policy. `ClientBuilder` exposes a finer level of granularity for
//! building a `Client`.
//!
//! One `Client` is meant to be shared by many callers; cloning is cheap
//! and clones share the same pool, limiter and observer.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, Method};
use serde::Serialize;
use tokio::sync::OnceCell;
use typed_builder::TypedBuilder;

use crate::cancel::{CancelToken, Cancellation};
use crate::ratelimit::RateLimiter;
use crate::retry::{self, Executed, RetryPolicy};
use crate::transport::Transport;
use crate::types::{AttemptObserver, CompletionRecord, LogObserver};
use crate::{ErrorKind, Request, Response, Result};

/// Default number of retries before a request is deemed as failed, 3.
pub const DEFAULT_MAX_RETRIES: u64 = 3;
/// Default base wait time in seconds between retries, 1.
pub const DEFAULT_RETRY_WAIT_MIN_SECS: u64 = 1;
/// Default ceiling in seconds for a single backoff delay, 30.
pub const DEFAULT_RETRY_WAIT_MAX_SECS: u64 = 30;
/// Default maximum number of pooled connections per host, 10.
pub const DEFAULT_MAX_POOL_SIZE: usize = 10;
/// Default user agent, `hclient-<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("hclient/", env!("CARGO_PKG_VERSION"));

/// Resolved client options, immutable after construction.
#[derive(Debug, Clone)]
pub(crate) struct Options {
    pub(crate) user_agent: String,
    pub(crate) timeout: Option<Duration>,
    pub(crate) requests_per_second: u32,
    pub(crate) max_pool_size: usize,
    pub(crate) kill_idle_connections: bool,
    pub(crate) custom_headers: HeaderMap,
}

/// Builder for [`Client`].
///
/// See crate-level documentation for usage example.
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `ClientBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `ClientBuilder`.
"))]
pub struct ClientBuilder {
    /// User-agent used for outgoing requests.
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,

    /// Default deadline per request.
    ///
    /// Bounds the sum of all attempts of a request, including backoff
    /// sleeps and the wait for a rate-limiter token. `None` means
    /// unbounded. A per-request timeout overrides this value.
    timeout: Option<Duration>,

    /// Maximum number of retries per request before returning an error.
    #[builder(default = DEFAULT_MAX_RETRIES)]
    max_retries: u64,

    /// Initial time between retries of failed requests.
    ///
    /// The wait time will increase using an exponential backoff mechanism.
    #[builder(default = Duration::from_secs(DEFAULT_RETRY_WAIT_MIN_SECS))]
    retry_wait_min: Duration,

    /// Upper bound for the time between retries, jitter included.
    #[builder(default = Duration::from_secs(DEFAULT_RETRY_WAIT_MAX_SECS))]
    retry_wait_max: Duration,

    /// Maximum number of requests per second issued by this client.
    ///
    /// 0 disables rate limiting. The limiter holds at most one second's
    /// worth of burst capacity.
    requests_per_second: u32,

    /// Maximum number of pooled connections per target host.
    ///
    /// Also bounds the number of in-flight requests; callers beyond the
    /// bound queue instead of opening new connections. Must be at least 1.
    #[builder(default = DEFAULT_MAX_POOL_SIZE)]
    max_pool_size: usize,

    /// When `true`, connections idle for longer than 90 seconds are
    /// closed, bounding resource usage for long-lived clients.
    #[builder(default = true)]
    kill_idle_connections: bool,

    /// Sets the default headers for every request.
    ///
    /// Headers set on an individual [`Request`] take precedence.
    custom_headers: HeaderMap,

    /// Hook invoked once per attempt and once per completed request.
    ///
    /// Defaults to [`LogObserver`], which emits `log` records. The
    /// observer is owned by this client instance only.
    observer: Option<Arc<dyn AttemptObserver>>,
}

impl Default for ClientBuilder {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientBuilder {
    /// Instantiates a [`Client`].
    ///
    /// The transport and rate limiter themselves are constructed lazily on
    /// first use, so this never performs I/O.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if `max_pool_size` is 0.
    pub fn client(self) -> Result<Client> {
        if self.max_pool_size == 0 {
            return Err(ErrorKind::InvalidOptions(
                "max_pool_size must be at least 1".to_string(),
            ));
        }

        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(LogObserver) as Arc<dyn AttemptObserver>);

        Ok(Client {
            inner: Arc::new(ClientInner {
                options: Options {
                    user_agent: self.user_agent,
                    timeout: self.timeout,
                    requests_per_second: self.requests_per_second,
                    max_pool_size: self.max_pool_size,
                    kill_idle_connections: self.kill_idle_connections,
                    custom_headers: self.custom_headers,
                },
                policy: RetryPolicy {
                    max_retries: self.max_retries,
                    wait_min: self.retry_wait_min,
                    wait_max: self.retry_wait_max,
                },
                observer,
                shared: OnceCell::new(),
                closed: AtomicBool::new(false),
            }),
        })
    }
}

/// Lazily constructed pieces shared by all clones of a client.
#[derive(Debug)]
struct Shared {
    transport: Transport,
    limiter: RateLimiter,
}

#[derive(Debug)]
struct ClientInner {
    options: Options,
    policy: RetryPolicy,
    observer: Arc<dyn AttemptObserver>,
    shared: OnceCell<Shared>,
    closed: AtomicBool,
}

impl ClientInner {
    /// Returns the transport and limiter, constructing them on first use.
    ///
    /// Concurrent first calls construct exactly one transport.
    async fn shared(&self) -> Result<&Shared> {
        self.shared
            .get_or_try_init(|| async {
                Ok(Shared {
                    transport: Transport::new(&self.options)?,
                    limiter: RateLimiter::new(self.options.requests_per_second),
                })
            })
            .await
    }
}

/// Issues outbound HTTP requests with rate limiting, bounded pooling and
/// retry-with-backoff.
///
/// See [`ClientBuilder`] which contains sane defaults for all
/// configuration options. The rate limiter and connection pool are only
/// reachable through the client's operations; callers never lock or
/// synchronize explicitly.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Sends a GET request.
    ///
    /// # Errors
    ///
    /// See [`Client::execute`].
    pub async fn get(&self, request: Request) -> Result<Response> {
        self.execute(Method::GET, request, CancelToken::default())
            .await
    }

    /// Sends a POST request with the descriptor's raw body.
    ///
    /// # Errors
    ///
    /// See [`Client::execute`].
    pub async fn post(&self, request: Request) -> Result<Response> {
        self.execute(Method::POST, request, CancelToken::default())
            .await
    }

    /// Sends a GET request carrying `payload` serialized as a JSON body,
    /// with a `Content-Type: application/json` default.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::EncodeJson`] before any network attempt or
    /// rate-limiter token consumption if serialization fails; otherwise
    /// see [`Client::execute`].
    pub async fn get_json<T: Serialize + ?Sized>(
        &self,
        request: Request,
        payload: &T,
    ) -> Result<Response> {
        let request = request.with_json_body(payload)?;
        self.execute(Method::GET, request, CancelToken::default())
            .await
    }

    /// Sends a POST request carrying `payload` serialized as a JSON body,
    /// with a `Content-Type: application/json` default.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::EncodeJson`] before any network attempt or
    /// rate-limiter token consumption if serialization fails; otherwise
    /// see [`Client::execute`].
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        request: Request,
        payload: &T,
    ) -> Result<Response> {
        let request = request.with_json_body(payload)?;
        self.execute(Method::POST, request, CancelToken::default())
            .await
    }

    /// Executes a request with an explicit method and cancellation token.
    ///
    /// This is the entry point used by dispatcher work functions: the
    /// token is checked before each attempt and before each backoff sleep,
    /// so cancellation is observed at attempt boundaries.
    ///
    /// The final combined result is reported to the observer's
    /// `on_complete` hook before returning.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::ClientClosed`] after [`Client::close`]
    /// - [`ErrorKind::Timeout`] when the aggregate deadline is exceeded
    /// - [`ErrorKind::Cancelled`] when the token fires
    /// - [`ErrorKind::PoolExhausted`] when the bounded wait for a
    ///   connection slot expires
    /// - [`ErrorKind::RetriesExhausted`] when all attempts failed with a
    ///   transient error
    /// - [`ErrorKind::NetworkRequest`] for non-transient transport errors
    pub async fn execute(
        &self,
        method: Method,
        request: Request,
        token: CancelToken,
    ) -> Result<Response> {
        let result = self.run(&method, &request, token).await;

        match result {
            Ok(executed) => {
                self.inner.observer.on_complete(&CompletionRecord {
                    request_id: &request.id,
                    method: &method,
                    url: &request.url,
                    attempts: executed.attempts,
                    status: Some(executed.response.status()),
                    error: None,
                });
                Ok(executed.response)
            }
            Err(error) => {
                self.inner.observer.on_complete(&CompletionRecord {
                    request_id: &request.id,
                    method: &method,
                    url: &request.url,
                    attempts: error.attempts().unwrap_or(0),
                    status: None,
                    error: Some(&error),
                });
                Err(error)
            }
        }
    }

    async fn run(&self, method: &Method, request: &Request, token: CancelToken) -> Result<Executed> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ErrorKind::ClientClosed);
        }

        let shared = self.inner.shared().await?;
        let cancel = Cancellation::new(request.timeout.or(self.inner.options.timeout), token);

        shared.limiter.acquire(&cancel).await?;
        retry::execute(
            &shared.transport,
            method,
            request,
            &self.inner.policy,
            self.inner.observer.as_ref(),
            &cancel,
        )
        .await
    }

    /// Shuts the client down.
    ///
    /// Operations issued after this fail with [`ErrorKind::ClientClosed`];
    /// callers queued for a connection slot fail the same way, while
    /// in-flight attempts run to completion. Pooled connections are
    /// released once the last clone of this client is dropped.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(shared) = self.inner.shared.get() {
            shared.transport.close();
        }
    }

    /// Whether [`Client::close`] has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::mock_server;

    fn client() -> Client {
        ClientBuilder::builder()
            .requests_per_second(0_u32)
            .build()
            .client()
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_ok() {
        let mock_server = mock_server!(StatusCode::OK);
        let request = Request::new(mock_server.uri().parse().unwrap());

        let response = client().get(request).await.unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_zero_pool_size_rejected() {
        let err = ClientBuilder::builder()
            .max_pool_size(0_usize)
            .build()
            .client()
            .unwrap_err();
        assert!(matches!(err, ErrorKind::InvalidOptions(_)));
    }

    #[tokio::test]
    async fn test_operations_after_close_fail() {
        let mock_server = mock_server!(StatusCode::OK);
        let client = client();
        let request = Request::new(mock_server.uri().parse().unwrap());

        client.get(request.clone()).await.unwrap();
        client.close();
        assert!(client.is_closed());

        let err = client.get(request).await.unwrap_err();
        assert!(matches!(err, ErrorKind::ClientClosed));
    }

    #[tokio::test]
    async fn test_encode_failure_before_any_attempt() {
        // An unreachable URL: a serialization failure must surface before
        // any network activity would be attempted.
        let request = Request::new("http://127.0.0.1:1/".parse().unwrap());
        let payload: std::collections::HashMap<(u8, u8), u8> =
            [((1, 2), 3)].into_iter().collect();

        let err = client().post_json(request, &payload).await.unwrap_err();
        assert!(matches!(err, ErrorKind::EncodeJson(_)));
    }
}
