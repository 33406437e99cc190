//! Per-call request builder and the retrying executor.
//!
//! A [`Request`] collects method, headers, query and form parameters, body,
//! middleware and retry settings, then [`send`](Request::send)s itself. Each
//! attempt rebuilds the transport request from that state: the URL is joined
//! from the client's base URL and the given path, explicit query parameters
//! are appended after any query already present, form parameters win over an
//! explicit body, and per-request headers override client defaults key by key.

use crate::{
    body::{IntoBody, Json, Materialized, Reader, FORM_URLENCODED},
    cancel::CancelToken,
    client::parse_header,
    middleware::{self, Middleware},
    retry::{RetryPolicy, RetryPredicate},
    Client, Error, Reply, Response, Result,
};
use bytes::Bytes;
use http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, Method};
use serde::{de::DeserializeOwned, Serialize};
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// A single outbound call under construction.
///
/// Requests are created by [`Client::request`] and consumed by sending them.
/// They are not meant to be shared between tasks.
///
/// # Examples
///
/// ```no_run
/// use skein::Client;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), skein::Error> {
/// let client = Client::builder().base_url("https://api.example.com")?.build()?;
///
/// let response = client
///     .request()
///     .header("x-request-id", "42")?
///     .query("page", "2")
///     .retry(2, Duration::from_millis(100))
///     .get("/users")
///     .await?;
/// println!("status: {}", response.status());
/// # Ok(())
/// # }
/// ```
pub struct Request {
    client: Client,
    method: Option<Method>,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
    body: Option<Bytes>,
    middlewares: Vec<Middleware>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    cancel: CancelToken,
}

impl Request {
    pub(crate) fn new(client: Client) -> Self {
        let inner = client.inner();
        let retry = inner.retry.clone();
        let timeout = inner.timeout;
        Self {
            client,
            method: None,
            headers: HeaderMap::new(),
            query: Vec::new(),
            form: Vec::new(),
            body: None,
            middlewares: Vec::new(),
            retry,
            timeout,
            cancel: CancelToken::new(),
        }
    }

    /// Sets the HTTP method. Requests without one are sent as GET.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets a header, replacing any earlier value for the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets several headers at once.
    ///
    /// # Errors
    ///
    /// Returns an error on the first invalid header name or value.
    pub fn headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self = self.header(name, value)?;
        }
        Ok(self)
    }

    /// Sets the `Content-Type` header.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid header value.
    pub fn content_type(self, content_type: impl AsRef<str>) -> Result<Self> {
        self.header(CONTENT_TYPE.as_str(), content_type)
    }

    /// Sets a query parameter, replacing earlier values for `key`.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        set_param(&mut self.query, key.into(), value.into());
        self
    }

    /// Adds a query parameter, keeping earlier values for `key`.
    pub fn append_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets several query parameters at once.
    pub fn query_map<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in params {
            set_param(&mut self.query, key.into(), value.into());
        }
        self
    }

    /// Sets a form parameter, replacing earlier values for `key`.
    ///
    /// Any form parameter makes the body a urlencoded form, overriding
    /// whatever was set with [`body`](Self::body).
    pub fn form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        set_param(&mut self.form, key.into(), value.into());
        self
    }

    /// Sets several form parameters at once.
    pub fn form_map<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in params {
            set_param(&mut self.form, key.into(), value.into());
        }
        self
    }

    /// Sets the body, materializing it into bytes right away.
    ///
    /// If the payload implies a content type and none was set yet, that
    /// content type is applied.
    pub fn body(self, body: impl IntoBody) -> Self {
        self.with_materialized(body.materialize())
    }

    /// Sets a JSON body.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Self {
        self.body(Json(value))
    }

    /// Drains `reader` into the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Body`] if the stream fails part-way; the request is
    /// dropped rather than sent with a truncated body.
    pub fn reader(self, reader: impl Read) -> Result<Self> {
        let materialized = Reader(reader).drain().map_err(|e| {
            tracing::error!(error = %e, "Failed to read request body stream");
            Error::Body(e)
        })?;
        Ok(self.with_materialized(materialized))
    }

    fn with_materialized(mut self, materialized: Materialized) -> Self {
        self.body = materialized.bytes;
        if let Some(content_type) = materialized.content_type {
            if !self.headers.contains_key(CONTENT_TYPE) {
                self.headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }
        self
    }

    /// Sets the retry count and a fixed interval between attempts.
    ///
    /// A count of zero or less means a single attempt; an interval of zero
    /// retries immediately.
    pub fn retry(mut self, count: i64, interval: Duration) -> Self {
        self.retry.set_count(count, interval);
        self
    }

    /// Replaces the whole retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Sets the retry condition for this request.
    pub fn retry_predicate(mut self, predicate: Arc<dyn RetryPredicate>) -> Self {
        self.retry.set_predicate(predicate);
        self
    }

    /// Appends a middleware that applies to this request only.
    ///
    /// It runs inside the client's default middlewares.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches a cancellation token.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Sends a GET request.
    pub async fn get(self, url: &str) -> Result<Response> {
        self.method(Method::GET).send(url).await
    }

    /// Sends a POST request.
    pub async fn post(self, url: &str) -> Result<Response> {
        self.method(Method::POST).send(url).await
    }

    /// Sends a PUT request.
    pub async fn put(self, url: &str) -> Result<Response> {
        self.method(Method::PUT).send(url).await
    }

    /// Sends a DELETE request.
    pub async fn delete(self, url: &str) -> Result<Response> {
        self.method(Method::DELETE).send(url).await
    }

    /// Sends a PATCH request.
    pub async fn patch(self, url: &str) -> Result<Response> {
        self.method(Method::PATCH).send(url).await
    }

    /// Sends a HEAD request.
    pub async fn head(self, url: &str) -> Result<Response> {
        self.method(Method::HEAD).send(url).await
    }

    /// Sends an OPTIONS request.
    pub async fn options(self, url: &str) -> Result<Response> {
        self.method(Method::OPTIONS).send(url).await
    }

    /// Sends the request and decodes a JSON body from the final response.
    ///
    /// A parse failure releases the response and is reported as
    /// [`Error::Parse`]; it never triggers another attempt.
    pub async fn send_json<T: DeserializeOwned>(self, url: &str) -> Result<Reply<T>> {
        self.send(url).await?.into_reply().await
    }

    /// Sends the request and decodes the final body as `T` on 2xx, else as `E`.
    ///
    /// Retries still follow the request's policy; only the response that ends
    /// the loop is decoded.
    pub async fn send_json_or<T, E>(self, url: &str) -> Result<Reply<std::result::Result<T, E>>>
    where
        T: DeserializeOwned,
        E: DeserializeOwned,
    {
        self.send(url).await?.into_reply_or().await
    }

    /// Sends the request and reads the final response body as text.
    pub async fn send_text(self, url: &str) -> Result<Reply<String>> {
        let mut response = self.send(url).await?;
        let data = response.text().await?;
        Ok(Reply {
            data,
            status: response.status(),
            headers: response.headers().clone(),
            latency: response.latency(),
            attempts: response.attempts(),
        })
    }

    /// Sends the request, retrying according to its policy.
    ///
    /// Returns the last attempt's response or error. Non-2xx responses are
    /// returned as responses. Cancellation, in flight or during a retry wait,
    /// aborts at once with [`Error::Cancelled`].
    pub async fn send(self, url: &str) -> Result<Response> {
        let method = self.method.clone().unwrap_or(Method::GET);
        let max_attempts = self.retry.max_attempts();
        let started = Instant::now();

        let inner = self.client.inner();
        let chain: Vec<Middleware> = inner
            .middlewares
            .iter()
            .chain(self.middlewares.iter())
            .cloned()
            .collect();
        let handler = middleware::compose(middleware::terminal(Arc::clone(&inner.transport)), &chain);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let outgoing = self.build_attempt(&method, url)?;

            tracing::debug!(
                method = %method,
                url = %outgoing.url(),
                attempt = attempt,
                max_attempts = max_attempts,
                "Executing HTTP request"
            );

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                outcome = handler(outgoing) => outcome,
            };

            if attempt >= max_attempts || !self.retry.should_retry(&outcome, attempt) {
                return match outcome {
                    Ok(mut response) => {
                        response.set_stats(attempt, started.elapsed());
                        Ok(response)
                    }
                    Err(e) => {
                        if attempt > 1 {
                            tracing::warn!(
                                error = %e,
                                attempts = attempt,
                                method = %method,
                                url = url,
                                "Request failed after retries"
                            );
                        }
                        Err(e)
                    }
                };
            }

            let delay = self.retry_delay(&outcome, attempt);
            match outcome {
                Ok(mut response) => {
                    tracing::info!(
                        status = response.status().as_u16(),
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis(),
                        "Retrying request"
                    );
                    response.close();
                }
                Err(e) => tracing::info!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis(),
                    "Retrying request"
                ),
            }

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    fn retry_delay(&self, outcome: &Result<Response>, attempt: usize) -> Duration {
        let server_delay = match outcome {
            Ok(response) => self.client.inner().rate_limit.delay(response.headers()),
            Err(_) => None,
        };
        server_delay.unwrap_or_else(|| self.retry.backoff().delay_for_attempt(attempt))
    }

    /// Builds the transport request for one attempt.
    fn build_attempt(&self, method: &Method, path: &str) -> Result<reqwest::Request> {
        let inner = self.client.inner();

        let mut url = Url::parse(&join_url(&inner.base_url, path))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }

        let mut request = reqwest::Request::new(method.clone(), url);

        let headers = request.headers_mut();
        for (name, value) in &inner.default_headers {
            headers.insert(name.clone(), value.clone());
        }
        for name in self.headers.keys() {
            headers.remove(name);
            for value in self.headers.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        if !self.form.is_empty() {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.form.iter())
                .finish();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_URLENCODED));
            *request.body_mut() = Some(encoded.into());
        } else if let Some(body) = &self.body {
            *request.body_mut() = Some(body.clone().into());
        }

        *request.timeout_mut() = self.timeout;
        Ok(request)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("form", &self.form)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("middlewares", &self.middlewares.len())
            .field("retry", &self.retry)
            .finish()
    }
}

fn set_param(params: &mut Vec<(String, String)>, key: String, value: String) {
    params.retain(|(k, _)| *k != key);
    params.push((key, value));
}

/// Joins a base URL and a path with exactly one `/` between them.
///
/// Absolute `http://` and `https://` paths bypass the base, as does an empty base.
///
/// # Examples
///
/// ```
/// use skein::join_url;
///
/// assert_eq!(join_url("http://x/", "/y"), "http://x/y");
/// assert_eq!(join_url("http://x", "y"), "http://x/y");
/// assert_eq!(join_url("http://x", "https://other/z"), "https://other/z");
/// ```
pub fn join_url(base: &str, path: &str) -> String {
    if base.is_empty() || path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
