//! `hclient` is a resilient outbound HTTP client layer: it adds
//! retry-with-backoff, per-client rate limiting, bounded connection
//! pooling with idle-connection reclamation, and optional asynchronous
//! dispatch on top of a plain HTTP transport.
//!
//! It is meant to be embedded by application code that issues many
//! outbound requests to a single or few target hosts and needs bounded
//! concurrency, resilience to transient failures, and observability of
//! every request/response pair.
//!
//! "Hello world" example:
//! ```no_run
//! use hclient::{ClientBuilder, Request, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = ClientBuilder::default().client()?;
//!     let request = Request::new("https://example.com/send".parse().unwrap());
//!     let response = client.get(request).await?;
//!     assert!(response.is_success());
//!     Ok(())
//! }
//! ```
//!
//! For more specific use-cases, configure the client through its builder
//! and submit operations through a [`Dispatcher`] for bounded background
//! execution with cancellation:
//!
//! ```no_run
//! use hclient::{ClientBuilder, Dispatcher, Request, Result};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = ClientBuilder::builder()
//!         .max_retries(2_u64)
//!         .requests_per_second(100_u32)
//!         .timeout(Duration::from_secs(10))
//!         .build()
//!         .client()?;
//!
//!     let dispatcher = Dispatcher::default();
//!     let request = Request::new("https://example.com/send".parse().unwrap());
//!     let unit = dispatcher
//!         .submit("req-1", move |token| {
//!             let client = client.clone();
//!             async move { client.execute(http::Method::GET, request, token).await }
//!         })
//!         .await?;
//!
//!     let response = unit.wait().await?;
//!     println!("{}", response.status());
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

mod cancel;
mod client;
mod ratelimit;
mod retry;
mod retryable;
mod transport;
mod types;

pub mod dispatch;
#[cfg(test)]
#[macro_use]
pub mod test_utils;

pub use cancel::CancelToken;
pub use client::{
    Client, ClientBuilder, DEFAULT_MAX_POOL_SIZE, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_WAIT_MAX_SECS, DEFAULT_RETRY_WAIT_MIN_SECS, DEFAULT_USER_AGENT,
};
pub use dispatch::{Dispatcher, WorkUnit};
pub use types::*;
