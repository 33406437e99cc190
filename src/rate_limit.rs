//! Honouring server-provided retry delays.
//!
//! When enabled, a retried response that carries `Retry-After` or a
//! `X-RateLimit-Reset` / `RateLimit-Reset` timestamp dictates the wait before
//! the next attempt instead of the policy's backoff. Disabled by default.

use http::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Configuration for server-directed retry delays.
///
/// # Examples
///
/// ```
/// use skein::rate_limit::RateLimitConfig;
/// use std::time::Duration;
///
/// let config = RateLimitConfig::enabled_with_max_wait(Duration::from_secs(30));
/// assert!(config.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Whether response headers may override the retry delay.
    pub enabled: bool,

    /// Upper bound on a header-directed wait.
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_wait: Duration::from_secs(300),
        }
    }
}

impl RateLimitConfig {
    /// Enables header-directed delays, capped at `max_wait`.
    pub fn enabled_with_max_wait(max_wait: Duration) -> Self {
        Self {
            enabled: true,
            max_wait,
        }
    }

    /// Returns the header-directed delay for `headers`, if enabled and present.
    pub fn delay(&self, headers: &HeaderMap) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        server_delay(headers).map(|d| d.min(self.max_wait))
    }
}

/// Reads the delay a server asked for, preferring `Retry-After`.
pub fn server_delay(headers: &HeaderMap) -> Option<Duration> {
    parse_retry_after(headers).or_else(|| {
        parse_reset(headers)?
            .duration_since(SystemTime::now())
            .ok()
    })
}

/// `Retry-After` as delay-seconds or an HTTP date.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;

    if let Ok(seconds) = header.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = httpdate::parse_http_date(header).ok()?;
    Some(at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO))
}

/// Unix-timestamp reset headers, most common spelling first.
fn parse_reset(headers: &HeaderMap) -> Option<SystemTime> {
    ["x-ratelimit-reset", "ratelimit-reset"]
        .iter()
        .find_map(|name| headers.get(*name)?.to_str().ok()?.trim().parse::<u64>().ok())
        .map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("60"));
        assert_eq!(server_delay(&headers), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_retry_after_http_date_in_the_past_is_zero() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(server_delay(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn test_reset_timestamp() {
        let reset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 120;
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&reset.to_string()).unwrap(),
        );

        let delay = server_delay(&headers).unwrap();
        assert!(delay > Duration::from_secs(100) && delay <= Duration::from_secs(120));
    }

    #[test]
    fn test_disabled_config_ignores_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("5"));

        assert_eq!(RateLimitConfig::default().delay(&headers), None);
        assert_eq!(
            RateLimitConfig::enabled_with_max_wait(Duration::from_secs(2)).delay(&headers),
            Some(Duration::from_secs(2))
        );
    }
}
