//! Service wrappers: one struct per cloud service, one method per action.
//!
//! Wrappers borrow the [`ClientRegistry`](crate::registry::ClientRegistry)
//! and return typed results. Reads map "not found" to `Ok(None)` and deletes
//! map it to `Ok(())`; every other failure is surfaced as the
//! [`SdkError`](crate::sdk::SdkError) the API reported.

pub mod compute;
pub mod database;
mod paginate;
mod types;

use serde::Serialize;

pub use compute::{ComputeService, Instance, InstanceFilter, LaunchRequest};
pub use database::{AsyncRequest, DatabaseService, DbCreation, DbInstance, DbInstanceRequest};
pub use paginate::{Page, paginate};
pub use types::{AsyncRequestId, DbInstanceId, InstanceId};

/// Page size used by list actions.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Named filter accepted by describe actions.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Filter {
    /// Filter name, for example `instance-name`.
    pub name: String,
    /// Accepted values.
    pub values: Vec<String>,
}

impl Filter {
    /// Creates a filter matching any of `values`.
    #[must_use]
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

fn is_empty<T>(items: &&[T]) -> bool {
    items.is_empty()
}
