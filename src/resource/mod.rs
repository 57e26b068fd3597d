//! Create/read/update/delete glue for managed resources.
//!
//! Each resource turns a desired spec into service calls, retries transient
//! API failures within the write or read budget, and then waits for the
//! resource to converge before reporting the observed state.

pub mod compute;
pub mod database;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::converge::{ConvergeError, Converged, Convergence};
use crate::retry::RetryFailure;
use crate::sdk::SdkError;

pub use compute::{ComputeInstanceResource, ComputeInstanceSpec, ComputeInstanceSpecBuilder};
pub use database::{DatabaseInstanceResource, DatabaseInstanceSpec};

/// Future returned by resource operations.
pub type ResourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ResourceError>> + Send + 'a>>;

/// Lifecycle of one kind of managed resource.
pub trait ResourceLifecycle {
    /// Desired configuration.
    type Spec;
    /// Observed state returned after each operation.
    type State;
    /// Identifier assigned by the cloud.
    type Id;

    /// Creates the resource and waits until it is usable.
    fn create<'a>(&'a self, spec: &'a Self::Spec) -> ResourceFuture<'a, Self::State>;

    /// Reads the current state, or `None` when the resource no longer exists.
    fn read<'a>(&'a self, id: &'a Self::Id) -> ResourceFuture<'a, Option<Self::State>>;

    /// Applies `spec` to an existing resource and waits until it settles.
    fn update<'a>(
        &'a self,
        id: &'a Self::Id,
        spec: &'a Self::Spec,
    ) -> ResourceFuture<'a, Self::State>;

    /// Deletes the resource and waits until it is gone. Deleting a missing
    /// resource succeeds.
    fn delete<'a>(&'a self, id: &'a Self::Id) -> ResourceFuture<'a, ()>;
}

/// Errors raised by resource operations.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ResourceError {
    /// Raised when a spec is missing a required field or holds an invalid
    /// value.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// Raised when an API call fails outside a retry loop.
    #[error(transparent)]
    Sdk(#[from] SdkError),
    /// Raised when an API call keeps failing until its budget runs out, or
    /// fails permanently.
    #[error(transparent)]
    Retry(#[from] RetryFailure<SdkError>),
    /// Raised when the resource does not converge.
    #[error(transparent)]
    Converge(#[from] ConvergeError<SdkError>),
}

impl ResourceError {
    /// Builds a validation error.
    #[must_use]
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Returns the underlying SDK error, if the failure came from the API.
    #[must_use]
    pub fn sdk_error(&self) -> Option<&SdkError> {
        match self {
            Self::Sdk(err)
            | Self::Retry(RetryFailure::NonRetryable(err))
            | Self::Retry(RetryFailure::TimedOut {
                last_error: err, ..
            })
            | Self::Converge(ConvergeError::Refresh { error: err, .. }) => Some(err),
            Self::Validation { .. } | Self::Converge(_) => None,
        }
    }
}

/// Unwraps a create or update wait, which never ends in [`Converged::Gone`].
fn reached<T>(convergence: &Convergence, outcome: Converged<T>) -> Result<T, ResourceError> {
    outcome.into_observed().ok_or_else(|| {
        ResourceError::Converge(ConvergeError::NotFound {
            operation: convergence.operation(),
            resource_id: convergence.resource_id().to_owned(),
        })
    })
}

fn require(field: &'static str, value: &str) -> Result<(), ResourceError> {
    if value.trim().is_empty() {
        return Err(ResourceError::validation(field, "must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
