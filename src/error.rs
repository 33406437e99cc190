//! Error types for outbound HTTP calls.
//!
//! Transport failures, parse failures and cancellation are kept apart so that
//! retry predicates and callers can tell them apart without string matching.
//! Non-2xx statuses are *not* errors by default: they come back as a normal
//! [`Response`](crate::Response) unless a middleware such as
//! [`fail_on_status`](crate::middleware::fail_on_status) converts them.

use http::{HeaderMap, StatusCode};

/// Boxed error type used for transport and caller-supplied failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for outbound HTTP calls.
///
/// # Examples
///
/// ```no_run
/// use skein::{Client, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match client.request().send_json::<serde_json::Value>("/endpoint").await {
///     Ok(reply) => println!("Success: {:?}", reply.data),
///     Err(Error::Parse { raw_response, message, .. }) => {
///         eprintln!("Failed to parse. Raw response: {}", raw_response);
///         eprintln!("Parser said: {}", message);
///     }
///     Err(Error::Cancelled) => eprintln!("Call was cancelled"),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred (connection refused, DNS failure, reset, ...).
    ///
    /// Retryable by the default predicate.
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// The transport gave up waiting for the server.
    #[error("Request timed out")]
    Timeout,

    /// A non-2xx status, raised only when a middleware or the caller asks for it.
    #[error("HTTP error {status}: {raw_response}")]
    Status {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
    },

    /// The response body could not be decoded into the requested target.
    ///
    /// Never retried.
    #[error("Failed to parse response (status {status}): {message}")]
    Parse {
        /// The raw response body that failed to parse
        raw_response: String,
        /// The decoder's error message
        message: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// A request body stream could not be read.
    ///
    /// Raised while building the request, before anything is sent.
    #[error("Failed to read request body: {0}")]
    Body(#[source] std::io::Error),

    /// The response body was already read or the response was closed.
    #[error("Response body already consumed")]
    BodyConsumed,

    /// The call was cancelled, either in flight or while waiting to retry.
    #[error("Request cancelled")]
    Cancelled,

    /// Invalid configuration was provided (bad header, bad method, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// An error produced by a caller-supplied middleware.
    #[error("Middleware error: {0}")]
    Middleware(#[source] BoxError),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Transport(Box::new(err))
        }
    }
}

impl Error {
    /// Returns `true` if this error is potentially retryable.
    ///
    /// Transport errors, timeouts, and `Status` errors for 5xx or 429 are
    /// considered retryable. Parse failures and cancellation are not.
    ///
    /// # Examples
    ///
    /// ```
    /// use skein::Error;
    /// use http::StatusCode;
    ///
    /// let err = Error::Status {
    ///     status: StatusCode::SERVICE_UNAVAILABLE,
    ///     raw_response: "busy".to_string(),
    ///     headers: http::HeaderMap::new(),
    /// };
    /// assert!(err.is_retryable());
    /// assert!(!Error::Cancelled.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) | Error::Timeout => true,
            Error::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Error::Parse { .. }
            | Error::Body(_)
            | Error::BodyConsumed
            | Error::Cancelled
            | Error::Configuration(_)
            | Error::InvalidUrl(_)
            | Error::Middleware(_) => false,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } | Error::Parse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if this error carries one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Status { raw_response, .. } | Error::Parse { raw_response, .. } => {
                Some(raw_response)
            }
            _ => None,
        }
    }

    /// Returns `true` if the call was abandoned because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Wraps an arbitrary error raised from inside a middleware.
    pub fn middleware(err: impl Into<BoxError>) -> Self {
        Error::Middleware(err.into())
    }
}

/// A specialized `Result` type for outbound HTTP calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_retryability() {
        let status = |code: u16| Error::Status {
            status: StatusCode::from_u16(code).unwrap(),
            raw_response: String::new(),
            headers: HeaderMap::new(),
        };

        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(400).is_retryable());
    }

    #[test]
    fn test_parse_error_is_not_retryable() {
        let err = Error::Parse {
            raw_response: "not json".to_string(),
            message: "expected value".to_string(),
            status: StatusCode::OK,
        };
        assert!(!err.is_retryable());
        assert_eq!(err.status(), Some(StatusCode::OK));
        assert_eq!(err.raw_response(), Some("not json"));
    }

    #[test]
    fn test_transport_error_is_retryable() {
        let err = Error::Transport("connection reset".into());
        assert!(err.is_retryable());
        assert_eq!(err.status(), None);
    }
}
