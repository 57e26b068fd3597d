//! Managed database actions and their asynchronous tasks.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::types::{AsyncRequestId, DbInstanceId};
use crate::converge::Observed;
use crate::registry::{ClientRegistry, ServiceKind};
use crate::retry::{RetryError, retryable_sdk_error};
use crate::sdk::{SdkError, ServiceClient};

/// Database is being provisioned.
pub const DB_CREATING: &str = "CREATING";
/// Database is serving.
pub const DB_RUNNING: &str = "RUNNING";
/// Database is being reconfigured.
pub const DB_MODIFYING: &str = "MODIFYING";
/// Database is being moved to the recycle bin.
pub const DB_ISOLATING: &str = "ISOLATING";
/// Database sits in the recycle bin.
pub const DB_ISOLATED: &str = "ISOLATED";
/// Database failed to provision.
pub const DB_CREATE_FAILED: &str = "CREATE_FAILED";

/// Task accepted but not started.
pub const TASK_INITIAL: &str = "INITIAL";
/// Task in progress.
pub const TASK_RUNNING: &str = "RUNNING";
/// Task finished successfully.
pub const TASK_SUCCESS: &str = "SUCCESS";
/// Task failed.
pub const TASK_FAILED: &str = "FAILED";
/// Task was cancelled.
pub const TASK_KILLED: &str = "KILLED";

/// Managed database as reported by `DescribeDBInstances`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbInstance {
    /// Instance identifier.
    pub instance_id: DbInstanceId,
    /// Display name.
    #[serde(default)]
    pub instance_name: String,
    /// Lifecycle status, for example `RUNNING`.
    pub status: String,
    /// Engine version, for example `8.0`.
    #[serde(default)]
    pub engine_version: String,
    /// Memory size in MiB.
    #[serde(default)]
    pub memory: u64,
    /// Disk size in GiB.
    #[serde(default)]
    pub volume: u64,
    /// Availability zone.
    #[serde(default)]
    pub zone: String,
    /// Private address, once assigned.
    #[serde(default)]
    pub vip: Option<String>,
}

impl Observed for DbInstance {
    fn status(&self) -> &str {
        &self.status
    }
}

/// Progress of an asynchronous database task.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AsyncRequest {
    /// One of `INITIAL`, `RUNNING`, `SUCCESS`, `FAILED` or `KILLED`.
    pub status: String,
    /// Free-form progress or failure detail.
    #[serde(default)]
    pub info: String,
}

impl Observed for AsyncRequest {
    fn status(&self) -> &str {
        &self.status
    }
}

/// Parameters for creating one database instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DbInstanceRequest {
    /// Display name.
    pub name: String,
    /// Engine version.
    pub engine_version: String,
    /// Memory size in MiB.
    pub memory: u64,
    /// Disk size in GiB.
    pub volume: u64,
    /// Availability zone.
    pub zone: String,
    client_token: String,
}

impl DbInstanceRequest {
    /// Creates a request with a fresh idempotency token.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        engine_version: impl Into<String>,
        memory: u64,
        volume: u64,
        zone: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            engine_version: engine_version.into(),
            memory,
            volume,
            zone: zone.into(),
            client_token: Uuid::new_v4().to_string(),
        }
    }

    /// Idempotency token sent with the create call.
    #[must_use]
    pub fn client_token(&self) -> &str {
        &self.client_token
    }
}

/// Result of `CreateDBInstance`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DbCreation {
    /// Identifier of the new instance.
    pub instance_id: DbInstanceId,
    /// Task tracking the provisioning, when the API returned one.
    pub async_request_id: Option<AsyncRequestId>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeDbInstancesRequest<'a> {
    instance_ids: [&'a DbInstanceId; 1],
    offset: u64,
    limit: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeDbInstancesResponse {
    #[serde(default)]
    items: Vec<DbInstance>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateDbInstanceRequest<'a> {
    instance_name: &'a str,
    engine_version: &'a str,
    memory: u64,
    volume: u64,
    zone: &'a str,
    goods_num: u32,
    client_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateDbInstanceResponse {
    #[serde(default)]
    instance_ids: Vec<DbInstanceId>,
    #[serde(default)]
    async_request_id: Option<AsyncRequestId>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TerminateDbInstanceRequest<'a> {
    instance_ids: [&'a DbInstanceId; 1],
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TerminateDbInstanceResponse {
    #[serde(default)]
    async_request_id: Option<AsyncRequestId>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeAsyncRequestInfoRequest<'a> {
    async_request_id: &'a AsyncRequestId,
}

/// Database actions, one method per call.
#[derive(Clone, Copy, Debug)]
pub struct DatabaseService<'a> {
    registry: &'a ClientRegistry,
}

impl<'a> DatabaseService<'a> {
    /// Binds the wrapper to `registry`.
    #[must_use]
    pub const fn new(registry: &'a ClientRegistry) -> Self {
        Self { registry }
    }

    fn client(&self) -> &'a ServiceClient {
        self.registry.client(ServiceKind::Database)
    }

    /// Looks up one database instance. A missing instance yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError`] for any failure other than "not found".
    pub async fn describe_db_instance(
        &self,
        id: &DbInstanceId,
    ) -> Result<Option<DbInstance>, SdkError> {
        let request = DescribeDbInstancesRequest {
            instance_ids: [id],
            offset: 0,
            limit: 1,
        };
        match self
            .client()
            .call::<_, DescribeDbInstancesResponse>("DescribeDBInstances", &request)
            .await
        {
            Ok(response) => Ok(response
                .items
                .into_iter()
                .find(|instance| &instance.instance_id == id)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Requests a new database instance.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError`] when the call fails or the response carries no
    /// instance identifier.
    pub async fn create_db_instance(
        &self,
        spec: &DbInstanceRequest,
    ) -> Result<DbCreation, SdkError> {
        let request = CreateDbInstanceRequest {
            instance_name: &spec.name,
            engine_version: &spec.engine_version,
            memory: spec.memory,
            volume: spec.volume,
            zone: &spec.zone,
            goods_num: 1,
            client_token: &spec.client_token,
        };
        let response: CreateDbInstanceResponse =
            self.client().call("CreateDBInstance", &request).await?;
        let instance_id = response.instance_ids.into_iter().next().ok_or_else(|| {
            SdkError::decode("CreateDBInstance", "response carried no instance id")
        })?;
        info!(
            instance_id = %instance_id,
            async_request_id = ?response.async_request_id,
            "database creation accepted"
        );
        Ok(DbCreation {
            instance_id,
            async_request_id: response.async_request_id,
        })
    }

    /// Terminates a database instance and returns the tracking task, if any.
    /// Terminating a missing instance succeeds with `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError`] for any failure other than "not found".
    pub async fn delete_db_instance(
        &self,
        id: &DbInstanceId,
    ) -> Result<Option<AsyncRequestId>, SdkError> {
        let request = TerminateDbInstanceRequest { instance_ids: [id] };
        match self
            .client()
            .call::<_, TerminateDbInstanceResponse>("TerminateDBInstance", &request)
            .await
        {
            Ok(response) => {
                info!(instance_id = %id, "database termination accepted");
                Ok(response.async_request_id)
            }
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Reports the progress of an asynchronous task. An unknown task yields
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError`] for any failure other than "not found".
    pub async fn describe_async_request(
        &self,
        id: &AsyncRequestId,
    ) -> Result<Option<AsyncRequest>, SdkError> {
        let request = DescribeAsyncRequestInfoRequest {
            async_request_id: id,
        };
        match self
            .client()
            .call::<_, AsyncRequest>("DescribeAsyncRequestInfo", &request)
            .await
        {
            Ok(task) => Ok(Some(task)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Instance status accessor for convergence waits.
    ///
    /// # Errors
    ///
    /// Tags failures with [`retryable_sdk_error`].
    pub async fn db_instance_refresh(
        &self,
        id: &DbInstanceId,
    ) -> Result<Option<DbInstance>, RetryError<SdkError>> {
        self.describe_db_instance(id)
            .await
            .map_err(|err| retryable_sdk_error(err, &[]))
    }

    /// Task status accessor for convergence waits.
    ///
    /// # Errors
    ///
    /// Tags failures with [`retryable_sdk_error`].
    pub async fn async_request_refresh(
        &self,
        id: &AsyncRequestId,
    ) -> Result<Option<AsyncRequest>, RetryError<SdkError>> {
        self.describe_async_request(id)
            .await
            .map_err(|err| retryable_sdk_error(err, &[]))
    }
}
