//! Bounded retry of API calls and classification of retryable failures.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::warn;

use crate::sdk::SdkError;

/// Base budget for read calls and status polling.
pub const READ_RETRY_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Base budget for mutating calls.
pub const WRITE_RETRY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Delay between retry attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Horizon used when a budget is too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Instant at which a `budget` started at `start` runs out.
///
/// Budgets that overflow the clock saturate at a horizon decades ahead.
pub(crate) fn deadline_after(start: Instant, budget: Duration) -> Instant {
    start
        .checked_add(budget)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// Error codes that indicate a transient condition.
///
/// A code also matches when it extends one of these with a dotted suffix
/// (`InternalError.DbError`) or ends with one after a dot
/// (`FailedOperation.ResourceBusy`).
pub const RETRYABLE_ERROR_CODES: &[&str] = &[
    "ClientError.NetworkError",
    "ClientError.HttpStatusCodeError",
    "InternalError",
    "RequestLimitExceeded",
    "ResourceInUse",
    "ResourceBusy",
];

/// An error tagged with whether the operation may be attempted again.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RetryError<E> {
    /// Transient failure; try again until the budget runs out.
    #[error("retryable: {0}")]
    Retryable(E),
    /// Permanent failure; stop immediately.
    #[error("{0}")]
    NonRetryable(E),
}

impl<E> RetryError<E> {
    /// Returns the wrapped error.
    pub fn into_inner(self) -> E {
        match self {
            Self::Retryable(err) | Self::NonRetryable(err) => err,
        }
    }

    /// Reports whether the error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Terminal outcome of [`retry`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RetryFailure<E> {
    /// The operation failed with a non-retryable error.
    #[error("{0}")]
    NonRetryable(E),
    /// The budget elapsed while the operation kept failing transiently.
    #[error("gave up after {elapsed:?}: {last_error}")]
    TimedOut {
        /// Time spent retrying.
        elapsed: Duration,
        /// Error from the final attempt.
        last_error: E,
    },
}

impl<E> RetryFailure<E> {
    /// Returns the error from the final attempt.
    pub fn into_inner(self) -> E {
        match self {
            Self::NonRetryable(err) | Self::TimedOut { last_error: err, .. } => err,
        }
    }
}

fn code_matches(code: &str, candidate: &str) -> bool {
    code == candidate
        || code
            .strip_prefix(candidate)
            .is_some_and(|rest| rest.starts_with('.'))
        || code
            .strip_suffix(candidate)
            .is_some_and(|rest| rest.ends_with('.'))
}

/// Reports whether `code` is in the built-in retryable set or in `extra`.
#[must_use]
pub fn is_retryable_code(code: &str, extra: &[&str]) -> bool {
    RETRYABLE_ERROR_CODES
        .iter()
        .chain(extra)
        .any(|candidate| code_matches(code, candidate))
}

/// Tags an SDK error as retryable or not.
///
/// `extra_codes` lists additional codes the caller knows to be transient for
/// this particular call, such as a resource still being provisioned.
#[must_use]
pub fn retryable_sdk_error(error: SdkError, extra_codes: &[&str]) -> RetryError<SdkError> {
    if is_retryable_code(error.code(), extra_codes) {
        RetryError::Retryable(error)
    } else {
        RetryError::NonRetryable(error)
    }
}

/// Runs `operation` until it succeeds, fails permanently, or `timeout`
/// elapses.
///
/// The operation always runs at least once. Sleeps between attempts never
/// overshoot the deadline.
///
/// # Errors
///
/// Returns [`RetryFailure::NonRetryable`] as soon as the operation reports a
/// permanent error, and [`RetryFailure::TimedOut`] with the last transient
/// error once the budget is spent.
pub async fn retry<T, E, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut operation: F,
) -> Result<T, RetryFailure<E>>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError<E>>>,
{
    let started = Instant::now();
    let deadline = deadline_after(started, timeout);
    let mut attempt: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(RetryError::NonRetryable(err)) => return Err(RetryFailure::NonRetryable(err)),
            Err(RetryError::Retryable(err)) => err,
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(RetryFailure::TimedOut {
                elapsed: now.duration_since(started),
                last_error: err,
            });
        }
        warn!(attempt, error = %err, "retrying after transient failure");
        sleep(interval.min(deadline - now)).await;
    }
}
