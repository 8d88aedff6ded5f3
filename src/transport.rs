use std::time::Duration;

use http::header::{HeaderValue, USER_AGENT};
use http::Method;
use tokio::sync::Semaphore;

use crate::cancel::Cancellation;
use crate::client::Options;
use crate::{ErrorKind, Request, Response, Result};

/// A timeout for only the connect phase of a request.
const CONNECT_TIMEOUT: u64 = 10;
/// TCP keepalive
/// See <https://tldp.org/HOWTO/TCP-Keepalive-HOWTO/overview.html> for more info
const TCP_KEEPALIVE: u64 = 60;
/// How long a connection may sit idle in the pool before it is closed,
/// when idle reclamation is enabled.
const IDLE_CONNECTION_TIMEOUT: u64 = 90;

/// Pooled HTTP transport for a single client.
///
/// Wraps a `reqwest::Client` (which owns the per-host connection pool) and
/// bounds the number of in-flight requests with a semaphore, so callers
/// queue instead of opening unbounded new connections. Idle connections
/// are reclaimed by the pool itself after [`IDLE_CONNECTION_TIMEOUT`] when
/// `kill_idle_connections` is set.
///
/// This layer never retries; failures surface to the retry executor one
/// level up so backoff applies and attempts are counted.
#[derive(Debug)]
pub(crate) struct Transport {
    client: reqwest::Client,
    permits: Semaphore,
}

impl Transport {
    pub(crate) fn new(options: &Options) -> Result<Self> {
        let mut headers = options.custom_headers.clone();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&options.user_agent).map_err(ErrorKind::InvalidHeader)?,
        );

        let builder = reqwest::ClientBuilder::new()
            .gzip(true)
            .default_headers(headers)
            .pool_max_idle_per_host(options.max_pool_size)
            .pool_idle_timeout(
                options
                    .kill_idle_connections
                    .then(|| Duration::from_secs(IDLE_CONNECTION_TIMEOUT)),
            )
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT))
            .tcp_keepalive(Duration::from_secs(TCP_KEEPALIVE));

        let client = builder.build().map_err(ErrorKind::NetworkRequest)?;

        Ok(Self {
            client,
            permits: Semaphore::new(options.max_pool_size),
        })
    }

    /// Performs one attempt: waits for a connection slot, sends the
    /// request and buffers the response body.
    ///
    /// The wait for a slot is bounded by the remaining deadline and fails
    /// with [`ErrorKind::PoolExhausted`] on expiry. After [`Self::close`]
    /// both queued and new callers fail with [`ErrorKind::ClientClosed`].
    pub(crate) async fn send(
        &self,
        method: Method,
        request: &Request,
        cancel: &Cancellation,
    ) -> Result<Response> {
        let _permit = match cancel.remaining() {
            None => self
                .permits
                .acquire()
                .await
                .map_err(|_| ErrorKind::ClientClosed)?,
            Some(remaining) => tokio::time::timeout(remaining, self.permits.acquire())
                .await
                .map_err(|_| ErrorKind::PoolExhausted)?
                .map_err(|_| ErrorKind::ClientClosed)?,
        };

        let mut builder = self
            .client
            .request(method, request.url.clone())
            .headers(request.headers.clone());
        if let Some(remaining) = cancel.remaining() {
            builder = builder.timeout(remaining);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(ErrorKind::NetworkRequest)?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(ErrorKind::ReadResponseBody)?
            .to_vec();

        Ok(Response::new(status, headers, url, body))
    }

    /// Shuts the transport down: queued waiters fail with
    /// [`ErrorKind::ClientClosed`], in-flight requests run to completion.
    pub(crate) fn close(&self) {
        self.permits.close();
    }
}
