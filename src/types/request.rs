use std::time::Duration;

use http::header::{HeaderValue, CONTENT_TYPE};
use http::HeaderMap;
use serde::Serialize;
use typed_builder::TypedBuilder;
use url::Url;

use crate::{ErrorKind, Result};

/// A resolved request descriptor, consumed by one client operation.
///
/// A `Request` is a plain value: it holds the target URL, correlation id,
/// headers and an optional raw body, plus a per-request deadline override.
/// It carries no connection state and is not reused across calls; build a
/// fresh one per request (cloning is cheap enough for fan-out).
///
/// The HTTP method is not part of the descriptor; it is decided by the
/// client operation (`get`, `post`, ...) the request is handed to.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
pub struct Request {
    /// Target URL of the request
    #[builder(!default)]
    pub url: Url,

    /// Correlation id attached to log records for this request.
    ///
    /// Id generation is up to the caller; an empty id is allowed.
    pub id: String,

    /// Headers sent with every attempt of this request.
    ///
    /// Headers are passed through unmodified, except that the `*_json`
    /// operations add a `Content-Type: application/json` default when the
    /// header is absent.
    pub headers: HeaderMap,

    /// Raw request body. The `*_json` operations overwrite this with the
    /// serialized payload.
    pub body: Option<Vec<u8>>,

    /// Per-request deadline, overriding the client-wide timeout.
    ///
    /// Bounds the sum of all attempts, not each attempt individually.
    pub timeout: Option<Duration>,
}

impl Request {
    /// Creates a request for the given URL with all other fields defaulted
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self::builder().url(url).build()
    }

    /// Replaces the body with the JSON serialization of `payload` and
    /// defaults the `Content-Type` header to `application/json` when the
    /// header is absent.
    ///
    /// Serialization happens before any network activity or rate-limiter
    /// token consumption.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::EncodeJson`] if the payload cannot be
    /// serialized.
    pub fn with_json_body<T: Serialize + ?Sized>(mut self, payload: &T) -> Result<Self> {
        let body = serde_json::to_vec(payload).map_err(ErrorKind::EncodeJson)?;
        self.body = Some(body);
        if !self.headers.contains_key(CONTENT_TYPE) {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        Ok(self)
    }
}
