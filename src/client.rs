//! Shared client configuration and the transport seam.
//!
//! The [`Client`] type is the entry point for outbound calls. It holds an
//! immutable snapshot of base URL, default headers, default middleware and
//! default retry policy, and hands out [`Request`] builders that copy from it.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::{
    middleware::Middleware,
    rate_limit::RateLimitConfig,
    retry::{Backoff, RetryPolicy, RetryPredicate},
    Error, Request, Result,
};
use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Performs one round-trip for an already-built request.
///
/// Implementations must be safe for concurrent use; connection pooling is
/// their business. `reqwest::Client` is the default implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the raw response, any status included.
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        Ok(reqwest::Client::execute(self, request).await?)
    }
}

/// A client for making outbound calls with middleware and retries.
///
/// Cloning is cheap and every clone shares the same configuration and
/// connection pool.
///
/// # Examples
///
/// ```no_run
/// use skein::Client;
/// use serde::Deserialize;
/// use std::time::Duration;
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
///     .timeout(Duration::from_secs(30))
///     .retry(3, Duration::from_millis(200))
///     .build()?;
///
/// let user = client.request().send_json::<User>("/users/123").await?;
/// println!("User: {}", user.data.name);
///
/// let created = client
///     .request()
///     .json(&serde_json::json!({ "name": "Alice" }))
///     .post("/users")
///     .await?;
/// println!("Created with status {}", created.status());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) base_url: String,
    pub(crate) default_headers: HeaderMap,
    pub(crate) middlewares: Vec<Middleware>,
    pub(crate) retry: RetryPolicy,
    pub(crate) timeout: Option<Duration>,
    pub(crate) rate_limit: RateLimitConfig,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a new request bound to this client.
    pub fn request(&self) -> Request {
        Request::new(self.clone())
    }

    /// Short alias for [`request`](Self::request).
    pub fn r(&self) -> Request {
        self.request()
    }

    /// The base URL, or an empty string when none was configured.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub(crate) fn inner(&self) -> &ClientInner {
        &self.inner
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url)
            .field("default_headers", &self.inner.default_headers)
            .field("middlewares", &self.inner.middlewares.len())
            .field("retry", &self.inner.retry)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

/// Client settings as they appear in a configuration source.
///
/// # Examples
///
/// ```
/// use skein::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(r#"{
///     "base_url": "https://api.example.com",
///     "headers": { "User-Agent": "svc/1.0" },
///     "retry_count": 2,
///     "retry_interval_ms": 250
/// }"#).unwrap();
/// assert_eq!(config.retry_count, 2);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL prepended to relative request paths.
    pub base_url: Option<String>,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Number of retries after the first attempt.
    pub retry_count: i64,
    /// Fixed wait between attempts in milliseconds.
    pub retry_interval_ms: u64,
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use skein::{ClientBuilder, middleware};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), skein::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .retry(3, Duration::from_millis(100))
///     .default_header("User-Agent", "my-app/1.0")?
///     .middleware(middleware::trace())
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<String>,
    default_headers: HeaderMap,
    middlewares: Vec<Middleware>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    rate_limit: RateLimitConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            default_headers: HeaderMap::new(),
            middlewares: Vec::new(),
            retry: RetryPolicy::default(),
            timeout: None,
            rate_limit: RateLimitConfig::default(),
            transport: None,
        }
    }

    /// Starts a builder from configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or a header is invalid.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = Self::new().retry(
            config.retry_count,
            Duration::from_millis(config.retry_interval_ms),
        );
        if let Some(base_url) = &config.base_url {
            builder = builder.base_url(base_url)?;
        }
        for (name, value) in &config.headers {
            builder = builder.default_header(name, value)?;
        }
        if let Some(ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        Ok(builder)
    }

    /// Sets the base URL for relative request paths.
    ///
    /// The URL is validated but kept verbatim; joining with request paths
    /// happens per request.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        Url::parse(url.as_ref())?;
        self.base_url = Some(url.as_ref().to_string());
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Appends a middleware to the default chain.
    ///
    /// Middlewares run in the order they are added.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Sets the default retry count and fixed interval.
    pub fn retry(mut self, count: i64, interval: Duration) -> Self {
        self.retry.set_count(count, interval);
        self
    }

    /// Replaces the default backoff, keeping the retry count.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.retry = self.retry.with_backoff(backoff);
        self
    }

    /// Sets the default retry condition.
    pub fn retry_predicate(mut self, predicate: Arc<dyn RetryPredicate>) -> Self {
        self.retry.set_predicate(predicate);
        self
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets how response rate-limit headers affect retry waits.
    pub fn rate_limit_config(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Replaces the transport; a default `reqwest::Client` is used otherwise.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the default HTTP client cannot be constructed.
    pub fn build(self) -> Result<Client> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let http_client = reqwest::Client::builder().build().map_err(|e| {
                    Error::Configuration(format!("Failed to build HTTP client: {}", e))
                })?;
                Arc::new(http_client)
            }
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                transport,
                base_url: self.base_url.unwrap_or_default(),
                default_headers: self.default_headers,
                middlewares: self.middlewares,
                retry: self.retry,
                timeout: self.timeout,
                rate_limit: self.rate_limit,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::try_from(name)
        .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
    let value = HeaderValue::try_from(value)
        .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(matches!(
            Client::builder().base_url("not a url"),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        assert!(matches!(
            Client::builder().default_header("bad header", "x"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config: ClientConfig = serde_json::from_str(
            r#"{
                "base_url": "http://localhost:8080/api/",
                "headers": { "x-team": "edge" },
                "timeout_ms": 1500,
                "retry_count": 2,
                "retry_interval_ms": 50
            }"#,
        )
        .unwrap();

        let client = ClientBuilder::from_config(&config).unwrap().build().unwrap();
        let inner = client.inner();

        assert_eq!(client.base_url(), "http://localhost:8080/api/");
        assert_eq!(inner.default_headers.get("x-team").unwrap(), "edge");
        assert_eq!(inner.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(inner.retry.max_attempts(), 3);
        assert_eq!(
            inner.retry.backoff(),
            &Backoff::Fixed(Duration::from_millis(50))
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        let client = ClientBuilder::from_config(&config).unwrap().build().unwrap();

        assert_eq!(client.base_url(), "");
        assert_eq!(client.inner().retry.max_attempts(), 1);
    }
}
