//! Polling state convergence for long-running cloud operations.
//!
//! Most cloud mutations return before the resource settles. A
//! [`Convergence`] repeatedly calls an accessor that fetches the resource's
//! current status and classifies each answer as pending, ready or failed,
//! until the desired state is observed, a failure is observed, or the
//! timeout elapses.
//!
//! The accessor returns `Ok(None)` when the resource does not exist. For a
//! delete that is success; for a create or an update it is an error.
//! Accessor errors tagged [`RetryError::Retryable`] are tolerated until the
//! deadline, anything else ends the wait immediately.

mod backoff;
mod status;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::retry::{RetryError, deadline_after};

pub use backoff::{DEFAULT_POLL_INTERVAL, PollBackoff};
pub use status::{Observed, StatusClass, StatusSets};

/// Intent whose outcome is being awaited.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    /// The resource was just requested.
    Create,
    /// The resource was just modified.
    Update,
    /// The resource was just deleted.
    Delete,
}

impl Operation {
    /// Lower-case name used in messages and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful end of a wait.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Converged<T> {
    /// The observation whose status matched a target status.
    Reached(T),
    /// A delete observed that the resource no longer exists.
    Gone,
}

impl<T> Converged<T> {
    /// Returns the observation, if the wait ended on one.
    pub fn into_observed(self) -> Option<T> {
        match self {
            Self::Reached(observed) => Some(observed),
            Self::Gone => None,
        }
    }
}

/// Errors raised while waiting for a resource to converge.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConvergeError<E> {
    /// The deadline passed without a terminal status.
    #[error("timed out after {elapsed:?} waiting for {operation} of {resource_id}")]
    Timeout {
        /// Operation being awaited.
        operation: Operation,
        /// Resource identifier.
        resource_id: String,
        /// Time spent waiting.
        elapsed: Duration,
        /// Last status observed before the deadline, if any.
        last_status: Option<String>,
        /// Last transient accessor error, if any.
        last_error: Option<String>,
    },
    /// The resource reported a fatal or unexpected status.
    #[error("{operation} of {resource_id} failed: resource reached status {status}")]
    FatalStatus {
        /// Operation being awaited.
        operation: Operation,
        /// Resource identifier.
        resource_id: String,
        /// Status that ended the wait.
        status: String,
    },
    /// A create or update observed that the resource does not exist.
    #[error("{operation} of {resource_id} failed: resource not found")]
    NotFound {
        /// Operation being awaited.
        operation: Operation,
        /// Resource identifier.
        resource_id: String,
    },
    /// The accessor failed with a non-retryable error.
    #[error("refreshing {resource_id} during {operation} failed: {error}")]
    Refresh {
        /// Operation being awaited.
        operation: Operation,
        /// Resource identifier.
        resource_id: String,
        /// Error returned by the accessor.
        error: E,
    },
}

/// Wait for a resource's status to reach a desired condition.
#[derive(Clone, Debug)]
pub struct Convergence {
    operation: Operation,
    resource_id: String,
    statuses: StatusSets,
    timeout: Duration,
    backoff: PollBackoff,
    initial_delay: Duration,
}

impl Convergence {
    /// Starts a wait for `operation` on `resource_id` bounded by `timeout`.
    ///
    /// Without further configuration every status is pending, so only a
    /// delete can succeed (by observing absence).
    #[must_use]
    pub fn new(operation: Operation, resource_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            operation,
            resource_id: resource_id.into(),
            statuses: StatusSets::new(),
            timeout,
            backoff: PollBackoff::default(),
            initial_delay: Duration::ZERO,
        }
    }

    /// Waits for a deleted resource to disappear.
    #[must_use]
    pub fn absence(resource_id: impl Into<String>, timeout: Duration) -> Self {
        Self::new(Operation::Delete, resource_id, timeout)
    }

    /// Statuses that end the wait successfully.
    #[must_use]
    pub fn target(mut self, statuses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.statuses = self.statuses.target(statuses);
        self
    }

    /// Statuses that keep the loop waiting.
    #[must_use]
    pub fn pending(mut self, statuses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.statuses = self.statuses.pending(statuses);
        self
    }

    /// Statuses that end the wait with [`ConvergeError::FatalStatus`].
    #[must_use]
    pub fn fatal(mut self, statuses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.statuses = self.statuses.fatal(statuses);
        self
    }

    /// Delay schedule between polls.
    #[must_use]
    pub const fn backoff(mut self, backoff: PollBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before the first poll. It counts against the timeout.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Operation being awaited.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Identifier of the awaited resource.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Polls `refresh` until the resource converges.
    ///
    /// `refresh` runs at least once and never again after a terminal answer.
    /// Sleeps never overshoot the deadline; one final poll happens at the
    /// deadline before giving up.
    ///
    /// # Errors
    ///
    /// - [`ConvergeError::FatalStatus`] when a fatal or unexpected status is
    ///   observed;
    /// - [`ConvergeError::NotFound`] when a create or update observes absence;
    /// - [`ConvergeError::Refresh`] when `refresh` fails non-retryably;
    /// - [`ConvergeError::Timeout`] when the deadline passes first.
    pub async fn wait<T, E, F, Fut>(&self, mut refresh: F) -> Result<Converged<T>, ConvergeError<E>>
    where
        T: Observed,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, RetryError<E>>>,
    {
        let started = Instant::now();
        let deadline = deadline_after(started, self.timeout);
        if !self.initial_delay.is_zero() {
            sleep(self.initial_delay.min(self.timeout)).await;
        }

        let mut attempt: u32 = 0;
        let mut last_status = None;
        let mut last_error = None;

        loop {
            attempt = attempt.saturating_add(1);
            match refresh().await {
                Ok(None) => return self.on_absent(attempt),
                Ok(Some(observed)) => match self.statuses.classify(observed.status()) {
                    StatusClass::Ready => {
                        info!(
                            resource_id = %self.resource_id,
                            operation = %self.operation,
                            status = observed.status(),
                            attempt,
                            "resource converged"
                        );
                        return Ok(Converged::Reached(observed));
                    }
                    StatusClass::Failed => {
                        return Err(ConvergeError::FatalStatus {
                            operation: self.operation,
                            resource_id: self.resource_id.clone(),
                            status: observed.status().to_owned(),
                        });
                    }
                    StatusClass::Pending => {
                        debug!(
                            resource_id = %self.resource_id,
                            operation = %self.operation,
                            status = observed.status(),
                            attempt,
                            "waiting for resource"
                        );
                        last_status = Some(observed.status().to_owned());
                    }
                },
                Err(RetryError::Retryable(err)) => {
                    warn!(
                        resource_id = %self.resource_id,
                        operation = %self.operation,
                        attempt,
                        error = %err,
                        "transient error while waiting for resource"
                    );
                    last_error = Some(err.to_string());
                }
                Err(RetryError::NonRetryable(err)) => {
                    return Err(ConvergeError::Refresh {
                        operation: self.operation,
                        resource_id: self.resource_id.clone(),
                        error: err,
                    });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ConvergeError::Timeout {
                    operation: self.operation,
                    resource_id: self.resource_id.clone(),
                    elapsed: now.duration_since(started),
                    last_status,
                    last_error,
                });
            }
            sleep(self.backoff.delay(attempt).min(deadline - now)).await;
        }
    }

    fn on_absent<T, E>(&self, attempt: u32) -> Result<Converged<T>, ConvergeError<E>> {
        match self.operation {
            Operation::Delete => {
                info!(
                    resource_id = %self.resource_id,
                    attempt,
                    "resource no longer exists"
                );
                Ok(Converged::Gone)
            }
            Operation::Create | Operation::Update => Err(ConvergeError::NotFound {
                operation: self.operation,
                resource_id: self.resource_id.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests;
