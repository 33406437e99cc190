//! Response wrapper with single-read, close-once body handling.
//!
//! [`Response`] owns the raw transport response. Its body can be consumed
//! exactly once, either by one of the read methods or by [`Response::close`];
//! every later read fails with [`Error::BodyConsumed`] and every later close is
//! a no-op. [`Reply`] is the typed result of a parsed call.

use crate::{Error, Result};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

/// One transport response, with a not-yet-consumed body.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    attempts: usize,
    latency: Duration,
    body: Option<reqwest::Response>,
}

impl Response {
    /// Wraps a raw transport response.
    pub fn new(raw: reqwest::Response) -> Self {
        Self {
            status: raw.status(),
            headers: raw.headers().clone(),
            attempts: 1,
            latency: Duration::ZERO,
            body: Some(raw),
        }
    }

    /// Builds a response without touching the network.
    ///
    /// Middlewares use this to short-circuit the chain with their own answer.
    ///
    /// # Examples
    ///
    /// ```
    /// use skein::Response;
    /// use http::{HeaderMap, StatusCode};
    ///
    /// let response = Response::from_parts(StatusCode::OK, HeaderMap::new(), "cached");
    /// assert_eq!(response.status(), StatusCode::OK);
    /// ```
    pub fn from_parts(
        status: StatusCode,
        headers: HeaderMap,
        body: impl Into<reqwest::Body>,
    ) -> Self {
        let mut raw = http::Response::new(body.into());
        *raw.status_mut() = status;
        *raw.headers_mut() = headers;
        Self::new(reqwest::Response::from(raw))
    }

    /// The HTTP status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// The number of attempts it took to obtain this response.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Total time spent from the first attempt until this response arrived.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Returns `true` if the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns `true` once the body has been read or released.
    pub fn is_closed(&self) -> bool {
        self.body.is_none()
    }

    /// Releases the underlying body stream.
    ///
    /// Safe to call any number of times; only the first call releases anything.
    pub fn close(&mut self) {
        if self.body.take().is_some() {
            tracing::trace!(status = self.status.as_u16(), "Response body released");
        }
    }

    pub(crate) fn set_stats(&mut self, attempts: usize, latency: Duration) {
        self.attempts = attempts;
        self.latency = latency;
    }

    /// Reads the full body.
    pub async fn bytes(&mut self) -> Result<bytes::Bytes> {
        let raw = self.body.take().ok_or(Error::BodyConsumed)?;
        Ok(raw.bytes().await?)
    }

    /// Reads the full body as UTF-8 text.
    pub async fn text(&mut self) -> Result<String> {
        let status = self.status;
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Parse {
            raw_response: String::from_utf8_lossy(e.as_bytes()).into_owned(),
            message: e.to_string(),
            status,
        })
    }

    /// Reads the full body and decodes it as JSON.
    ///
    /// The body is released whether decoding succeeds or not.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let status = self.status;
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            let raw_response = String::from_utf8_lossy(&bytes).into_owned();
            tracing::error!(
                error = %e,
                status = status.as_u16(),
                raw_response = %raw_response,
                "Failed to parse response"
            );
            Error::Parse {
                raw_response,
                message: e.to_string(),
                status,
            }
        })
    }

    /// Decodes a 2xx body as `T` and any other body as `E`.
    ///
    /// Lets an API's error payload be read as a type of its own instead of a
    /// raw string. Either decode failing is an [`Error::Parse`].
    ///
    /// # Examples
    ///
    /// ```
    /// # async fn example() -> Result<(), skein::Error> {
    /// use http::{HeaderMap, StatusCode};
    /// use serde::Deserialize;
    /// use skein::Response;
    ///
    /// #[derive(Deserialize)]
    /// struct ApiError {
    ///     reason: String,
    /// }
    ///
    /// let mut response = Response::from_parts(
    ///     StatusCode::CONFLICT,
    ///     HeaderMap::new(),
    ///     r#"{"reason":"taken"}"#,
    /// );
    /// match response.json_or::<serde_json::Value, ApiError>().await? {
    ///     Ok(_) => unreachable!(),
    ///     Err(e) => assert_eq!(e.reason, "taken"),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn json_or<T, E>(&mut self) -> Result<std::result::Result<T, E>>
    where
        T: DeserializeOwned,
        E: DeserializeOwned,
    {
        if self.status.is_success() {
            self.json::<T>().await.map(Ok)
        } else {
            self.json::<E>().await.map(Err)
        }
    }

    /// Converts a non-2xx response into [`Error::Status`], reading its body.
    pub async fn error_for_status(mut self) -> Result<Self> {
        if self.status.is_success() {
            return Ok(self);
        }
        let raw_response = match self.bytes().await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => String::new(),
        };
        Err(Error::Status {
            status: self.status,
            raw_response,
            headers: std::mem::take(&mut self.headers),
        })
    }

    /// Parses the body as JSON into a [`Reply`] carrying this response's metadata.
    pub async fn into_reply<T: DeserializeOwned>(mut self) -> Result<Reply<T>> {
        let data = self.json::<T>().await?;
        Ok(Reply {
            data,
            status: self.status,
            headers: std::mem::take(&mut self.headers),
            latency: self.latency,
            attempts: self.attempts,
        })
    }

    /// Like [`into_reply`](Response::into_reply), but non-2xx bodies decode as `E`.
    pub async fn into_reply_or<T, E>(mut self) -> Result<Reply<std::result::Result<T, E>>>
    where
        T: DeserializeOwned,
        E: DeserializeOwned,
    {
        let data = self.json_or::<T, E>().await?;
        Ok(Reply {
            data,
            status: self.status,
            headers: std::mem::take(&mut self.headers),
            latency: self.latency,
            attempts: self.attempts,
        })
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("attempts", &self.attempts)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A successfully parsed response.
///
/// # Examples
///
/// ```no_run
/// use skein::Client;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), skein::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// let reply = client.request().send_json::<User>("/users/123").await?;
///
/// println!("User: {}", reply.data.name);
/// println!("Request took {:?}", reply.latency);
/// println!("Attempts: {}", reply.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Reply<T> {
    /// The decoded response data.
    pub data: T,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The total latency of the call, including all retry attempts and waits.
    pub latency: Duration,

    /// The number of attempts made to complete this call.
    pub attempts: usize,
}

impl<T> Reply<T> {
    /// Maps the data to a different type while preserving the metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// # use skein::Reply;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let reply = Reply {
    ///     data: 42,
    ///     status: StatusCode::OK,
    ///     headers: HeaderMap::new(),
    ///     latency: Duration::from_millis(100),
    ///     attempts: 1,
    /// };
    ///
    /// let reply = reply.map(|n| n.to_string());
    /// assert_eq!(reply.data, "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> Reply<U>
    where
        F: FnOnce(T) -> U,
    {
        Reply {
            data: f(self.data),
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if the call required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl<T> AsRef<T> for Reply<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Reply<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Greeting {
        name: String,
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut response = Response::from_parts(StatusCode::OK, HeaderMap::new(), "hi");
        assert!(!response.is_closed());

        response.close();
        response.close();
        assert!(response.is_closed());
        assert!(matches!(response.text().await, Err(Error::BodyConsumed)));
    }

    #[tokio::test]
    async fn test_body_is_read_once() {
        let mut response =
            Response::from_parts(StatusCode::OK, HeaderMap::new(), r#"{"name":"ann"}"#);

        let greeting: Greeting = response.json().await.unwrap();
        assert_eq!(greeting.name, "ann");
        assert!(response.is_closed());
        assert!(matches!(response.bytes().await, Err(Error::BodyConsumed)));
    }

    #[tokio::test]
    async fn test_parse_failure_releases_body() {
        let mut response = Response::from_parts(StatusCode::OK, HeaderMap::new(), "nope");

        match response.json::<Greeting>().await {
            Err(Error::Parse {
                raw_response,
                status,
                ..
            }) => {
                assert_eq!(raw_response, "nope");
                assert_eq!(status, StatusCode::OK);
            }
            other => panic!("Expected Parse error, got {:?}", other),
        }
        assert!(response.is_closed());
        response.close();
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Problem {
        detail: String,
    }

    #[tokio::test]
    async fn test_json_or_picks_target_by_status() {
        let mut ok = Response::from_parts(StatusCode::OK, HeaderMap::new(), r#"{"name":"ann"}"#);
        let decoded = ok.json_or::<Greeting, Problem>().await.unwrap();
        assert_eq!(decoded.unwrap().name, "ann");
        assert!(ok.is_closed());

        let mut bad = Response::from_parts(
            StatusCode::UNPROCESSABLE_ENTITY,
            HeaderMap::new(),
            r#"{"detail":"name too short"}"#,
        );
        let decoded = bad.json_or::<Greeting, Problem>().await.unwrap();
        assert_eq!(
            decoded.unwrap_err(),
            Problem {
                detail: "name too short".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_json_or_reports_malformed_error_body() {
        let mut bad = Response::from_parts(StatusCode::BAD_GATEWAY, HeaderMap::new(), "<html>");
        match bad.json_or::<Greeting, Problem>().await {
            Err(Error::Parse { status, raw_response, .. }) => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(raw_response, "<html>");
            }
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_for_status() {
        let ok = Response::from_parts(StatusCode::OK, HeaderMap::new(), "");
        assert!(ok.error_for_status().await.is_ok());

        let missing = Response::from_parts(StatusCode::NOT_FOUND, HeaderMap::new(), "gone");
        match missing.error_for_status().await {
            Err(Error::Status {
                status,
                raw_response,
                ..
            }) => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(raw_response, "gone");
            }
            other => panic!("Expected Status error, got {:?}", other),
        }
    }
}
