//! Retry policies and predicates for handling transient failures.
//!
//! A [`RetryPolicy`] bundles how many times to retry, how long to wait
//! between attempts, and which outcomes are worth retrying. Predicates see the
//! raw outcome of an attempt: either the [`Response`] (any status) or the
//! [`Error`] that prevented one.

use crate::{Error, Response};
use http::StatusCode;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How long to wait between attempts.
///
/// # Examples
///
/// ```
/// use skein::retry::Backoff;
/// use std::time::Duration;
///
/// // 1s, 1s, 1s...
/// let fixed = Backoff::Fixed(Duration::from_secs(1));
/// assert_eq!(fixed.delay_for_attempt(3), Duration::from_secs(1));
///
/// // 100ms, 200ms, 400ms... capped at 2s
/// let exponential = Backoff::Exponential {
///     initial: Duration::from_millis(100),
///     max: Duration::from_secs(2),
///     jitter: false,
/// };
/// assert_eq!(exponential.delay_for_attempt(3), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// The same delay before every retry. A zero delay retries immediately.
    Fixed(Duration),

    /// Each retry waits for `initial * 2^(attempt - 1)`, capped at `max`.
    ///
    /// With `jitter` the delay is scaled by a random factor in `[0.5, 1.0]`.
    Exponential {
        /// The delay before the first retry.
        initial: Duration,
        /// The maximum delay between retries.
        max: Duration,
        /// Whether to add random jitter to delays.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(Duration::ZERO)
    }
}

impl Backoff {
    /// Returns the delay before the retry that follows attempt `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                initial,
                max,
                jitter,
            } => {
                let exponent = attempt.saturating_sub(1).min(31) as u32;
                let delay = initial.saturating_mul(2u32.saturating_pow(exponent)).min(*max);

                if *jitter {
                    let factor = rand::thread_rng().gen_range(0.5..=1.0);
                    delay.mul_f64(factor)
                } else {
                    delay
                }
            }
        }
    }
}

/// Decides whether an attempt's outcome should be retried.
///
/// Closures of the shape `Fn(&Result<Response, Error>) -> bool` implement
/// this trait, so ad-hoc conditions need no named type.
///
/// # Examples
///
/// ```
/// use skein::{Error, Response, RetryPredicate};
///
/// struct RetryOnTeapot;
///
/// impl RetryPredicate for RetryOnTeapot {
///     fn should_retry(&self, outcome: &Result<Response, Error>, _attempt: usize) -> bool {
///         matches!(outcome, Ok(response) if response.status().as_u16() == 418)
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` if the request should be attempted again.
    ///
    /// `attempt` is the number of the attempt that produced `outcome` (1-indexed).
    fn should_retry(&self, outcome: &Result<Response, Error>, attempt: usize) -> bool;
}

impl<F> RetryPredicate for F
where
    F: Fn(&Result<Response, Error>) -> bool + Send + Sync,
{
    fn should_retry(&self, outcome: &Result<Response, Error>, _attempt: usize) -> bool {
        self(outcome)
    }
}

/// The default predicate: retry on transport-level errors, on 5xx, and on 429.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnRetryable;

impl RetryPredicate for RetryOnRetryable {
    fn should_retry(&self, outcome: &Result<Response, Error>, _attempt: usize) -> bool {
        match outcome {
            Ok(response) => {
                let status = response.status();
                status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
            }
            Err(error) => error.is_retryable(),
        }
    }
}

/// Retry only on 5xx server errors, whether returned or raised by a middleware.
#[derive(Debug, Clone, Copy)]
pub struct RetryOn5xx;

impl RetryPredicate for RetryOn5xx {
    fn should_retry(&self, outcome: &Result<Response, Error>, _attempt: usize) -> bool {
        match outcome {
            Ok(response) => response.status().is_server_error(),
            Err(error) => error.status().is_some_and(|s| s.is_server_error()),
        }
    }
}

/// Retry only on timeouts.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTimeout;

impl RetryPredicate for RetryOnTimeout {
    fn should_retry(&self, outcome: &Result<Response, Error>, _attempt: usize) -> bool {
        matches!(outcome, Err(Error::Timeout))
    }
}

/// Retry only on network/connection errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnConnectionError;

impl RetryPredicate for RetryOnConnectionError {
    fn should_retry(&self, outcome: &Result<Response, Error>, _attempt: usize) -> bool {
        matches!(outcome, Err(Error::Transport(_)))
    }
}

/// Combine multiple retry predicates with OR logic.
///
/// # Examples
///
/// ```
/// use skein::retry::{RetryOn5xx, RetryOnTimeout, OrPredicate};
///
/// let predicate = OrPredicate::new(vec![
///     Box::new(RetryOn5xx),
///     Box::new(RetryOnTimeout),
/// ]);
/// ```
pub struct OrPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl OrPredicate {
    /// Creates a new `OrPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for OrPredicate {
    fn should_retry(&self, outcome: &Result<Response, Error>, attempt: usize) -> bool {
        self.predicates
            .iter()
            .any(|p| p.should_retry(outcome, attempt))
    }
}

/// Combine multiple retry predicates with AND logic.
pub struct AndPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl AndPredicate {
    /// Creates a new `AndPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for AndPredicate {
    fn should_retry(&self, outcome: &Result<Response, Error>, attempt: usize) -> bool {
        self.predicates
            .iter()
            .all(|p| p.should_retry(outcome, attempt))
    }
}

/// Retry count, backoff, and retry condition for one logical call.
///
/// A count of zero (the default) means exactly one attempt.
#[derive(Clone, Default)]
pub struct RetryPolicy {
    count: usize,
    backoff: Backoff,
    predicate: Option<Arc<dyn RetryPredicate>>,
}

impl RetryPolicy {
    /// Creates a policy with a fixed interval between attempts.
    ///
    /// A negative `count` is treated as zero.
    pub fn new(count: i64, interval: Duration) -> Self {
        Self {
            count: usize::try_from(count).unwrap_or(0),
            backoff: Backoff::Fixed(interval),
            predicate: None,
        }
    }

    /// Replaces the backoff.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replaces the retry condition.
    pub fn with_predicate(mut self, predicate: Arc<dyn RetryPredicate>) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// The configured number of retries.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Total attempts allowed: retries plus the initial attempt.
    pub fn max_attempts(&self) -> usize {
        self.count.saturating_add(1)
    }

    /// The configured backoff.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Applies the custom predicate, or [`RetryOnRetryable`] if none was set.
    pub fn should_retry(&self, outcome: &Result<Response, Error>, attempt: usize) -> bool {
        match &self.predicate {
            Some(predicate) => predicate.should_retry(outcome, attempt),
            None => RetryOnRetryable.should_retry(outcome, attempt),
        }
    }

    pub(crate) fn set_count(&mut self, count: i64, interval: Duration) {
        self.count = usize::try_from(count).unwrap_or(0);
        self.backoff = Backoff::Fixed(interval);
    }

    pub(crate) fn set_predicate(&mut self, predicate: Arc<dyn RetryPredicate>) {
        self.predicate = Some(predicate);
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("count", &self.count)
            .field("backoff", &self.backoff)
            .field("custom_predicate", &self.predicate.is_some())
            .finish()
    }
}
