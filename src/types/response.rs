use std::borrow::Cow;

use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{ErrorKind, Result};

/// A buffered HTTP response.
///
/// The body is read eagerly so that the underlying connection can be
/// returned to the pool before the caller inspects the response. A non-2xx
/// status is not an error; callers decide how to treat it.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    body: Vec<u8>,
}

impl Response {
    pub(crate) const fn new(status: StatusCode, headers: HeaderMap, url: Url, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            url,
            body,
        }
    }

    /// Status code of the final attempt
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Whether the status code is in the 2xx range
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Response headers
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The URL the response was received from (after transport redirects)
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Raw response body
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Response body decoded as UTF-8, lossily
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserializes the response body as JSON
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::DecodeJson`] if the body is not valid JSON for
    /// the target type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(ErrorKind::DecodeJson)
    }
}
