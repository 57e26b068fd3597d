//! Compute instance actions.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::paginate::{Page, paginate};
use super::types::InstanceId;
use super::{DEFAULT_PAGE_SIZE, Filter, is_empty};
use crate::converge::Observed;
use crate::registry::{ClientRegistry, ServiceKind};
use crate::retry::{RetryError, retryable_sdk_error};
use crate::sdk::{SdkError, ServiceClient};

/// Instance is being provisioned.
pub const INSTANCE_PENDING: &str = "PENDING";
/// Instance failed to launch and will never run.
pub const INSTANCE_LAUNCH_FAILED: &str = "LAUNCH_FAILED";
/// Instance is up.
pub const INSTANCE_RUNNING: &str = "RUNNING";
/// Instance is stopped.
pub const INSTANCE_STOPPED: &str = "STOPPED";
/// Instance is booting.
pub const INSTANCE_STARTING: &str = "STARTING";
/// Instance is shutting down.
pub const INSTANCE_STOPPING: &str = "STOPPING";
/// Instance is rebooting.
pub const INSTANCE_REBOOTING: &str = "REBOOTING";
/// Instance is being released.
pub const INSTANCE_SHUTDOWN: &str = "SHUTDOWN";
/// Instance is being destroyed.
pub const INSTANCE_TERMINATING: &str = "TERMINATING";

/// Compute instance as reported by `DescribeInstances`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    /// Instance identifier.
    pub instance_id: InstanceId,
    /// Display name.
    #[serde(default)]
    pub instance_name: String,
    /// Lifecycle state, for example `RUNNING`.
    pub instance_state: String,
    /// Machine type.
    #[serde(default)]
    pub instance_type: String,
    /// Boot image.
    #[serde(default)]
    pub image_id: String,
    /// Private IPv4 addresses.
    #[serde(default)]
    pub private_ip_addresses: Vec<String>,
    /// Creation time as reported by the API.
    #[serde(default)]
    pub created_time: Option<String>,
}

impl Observed for Instance {
    fn status(&self) -> &str {
        &self.instance_state
    }
}

/// Parameters for launching one instance.
///
/// The client token is generated once per request so that retried launches
/// are deduplicated by the API.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchRequest {
    /// Display name.
    pub name: String,
    /// Machine type.
    pub instance_type: String,
    /// Boot image.
    pub image_id: String,
    /// Availability zone.
    pub zone: String,
    client_token: String,
}

impl LaunchRequest {
    /// Creates a launch request with a fresh idempotency token.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        instance_type: impl Into<String>,
        image_id: impl Into<String>,
        zone: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            instance_type: instance_type.into(),
            image_id: image_id.into(),
            zone: zone.into(),
            client_token: Uuid::new_v4().to_string(),
        }
    }

    /// Idempotency token sent with the launch.
    #[must_use]
    pub fn client_token(&self) -> &str {
        &self.client_token
    }
}

/// Narrows `describe_instances`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceFilter {
    /// Only these instances.
    pub instance_ids: Vec<InstanceId>,
    /// Only instances with this exact name.
    pub name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesRequest<'a> {
    #[serde(skip_serializing_if = "is_empty")]
    instance_ids: &'a [InstanceId],
    #[serde(skip_serializing_if = "is_empty")]
    filters: &'a [Filter],
    offset: u64,
    limit: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesResponse {
    #[serde(default)]
    total_count: Option<u64>,
    #[serde(default)]
    instance_set: Vec<Instance>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Placement<'a> {
    zone: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstancesRequest<'a> {
    instance_name: &'a str,
    instance_type: &'a str,
    image_id: &'a str,
    placement: Placement<'a>,
    instance_count: u32,
    client_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstancesResponse {
    #[serde(default)]
    instance_id_set: Vec<InstanceId>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ModifyInstancesAttributeRequest<'a> {
    instance_ids: [&'a InstanceId; 1],
    instance_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TerminateInstancesRequest<'a> {
    instance_ids: [&'a InstanceId; 1],
}

/// Compute actions, one method per call.
#[derive(Clone, Copy, Debug)]
pub struct ComputeService<'a> {
    registry: &'a ClientRegistry,
}

impl<'a> ComputeService<'a> {
    /// Binds the wrapper to `registry`.
    #[must_use]
    pub const fn new(registry: &'a ClientRegistry) -> Self {
        Self { registry }
    }

    fn client(&self) -> &'a ServiceClient {
        self.registry.client(ServiceKind::Compute)
    }

    /// Looks up one instance. A missing instance yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError`] for any failure other than "not found".
    pub async fn describe_instance(&self, id: &InstanceId) -> Result<Option<Instance>, SdkError> {
        let request = DescribeInstancesRequest {
            instance_ids: std::slice::from_ref(id),
            filters: &[],
            offset: 0,
            limit: 1,
        };
        match self
            .client()
            .call::<_, DescribeInstancesResponse>("DescribeInstances", &request)
            .await
        {
            Ok(response) => Ok(response
                .instance_set
                .into_iter()
                .find(|instance| &instance.instance_id == id)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Lists every instance matching `filter`, following pagination.
    ///
    /// # Errors
    ///
    /// Returns the first [`SdkError`] raised while paging.
    pub async fn describe_instances(
        &self,
        filter: &InstanceFilter,
    ) -> Result<Vec<Instance>, SdkError> {
        let name_filters: Vec<Filter> = filter
            .name
            .iter()
            .map(|name| Filter::new("instance-name", [name.as_str()]))
            .collect();
        let client = self.client();
        let instance_ids = filter.instance_ids.as_slice();
        let filters = name_filters.as_slice();

        paginate(DEFAULT_PAGE_SIZE, move |offset, limit| async move {
            let request = DescribeInstancesRequest {
                instance_ids,
                filters,
                offset,
                limit,
            };
            let response: DescribeInstancesResponse =
                client.call("DescribeInstances", &request).await?;
            Ok::<_, SdkError>(Page {
                items: response.instance_set,
                total: response.total_count,
            })
        })
        .await
    }

    /// Launches one instance and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError`] when the call fails or the response carries no
    /// instance identifier.
    pub async fn create_instance(&self, launch: &LaunchRequest) -> Result<InstanceId, SdkError> {
        let request = RunInstancesRequest {
            instance_name: &launch.name,
            instance_type: &launch.instance_type,
            image_id: &launch.image_id,
            placement: Placement { zone: &launch.zone },
            instance_count: 1,
            client_token: &launch.client_token,
        };
        let response: RunInstancesResponse = self.client().call("RunInstances", &request).await?;
        let id = response
            .instance_id_set
            .into_iter()
            .next()
            .ok_or_else(|| SdkError::decode("RunInstances", "response carried no instance id"))?;
        info!(instance_id = %id, zone = %launch.zone, "instance launch accepted");
        Ok(id)
    }

    /// Renames an instance.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError`] when the call fails.
    pub async fn modify_instance_name(&self, id: &InstanceId, name: &str) -> Result<(), SdkError> {
        let request = ModifyInstancesAttributeRequest {
            instance_ids: [id],
            instance_name: name,
        };
        self.client()
            .call::<_, IgnoredAny>("ModifyInstancesAttribute", &request)
            .await?;
        Ok(())
    }

    /// Terminates an instance. Terminating a missing instance succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError`] for any failure other than "not found".
    pub async fn terminate_instance(&self, id: &InstanceId) -> Result<(), SdkError> {
        let request = TerminateInstancesRequest { instance_ids: [id] };
        match self
            .client()
            .call::<_, IgnoredAny>("TerminateInstances", &request)
            .await
        {
            Ok(_) => {
                info!(instance_id = %id, "instance termination accepted");
                Ok(())
            }
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Status accessor for convergence waits.
    ///
    /// # Errors
    ///
    /// Tags failures with [`retryable_sdk_error`].
    pub async fn instance_refresh(
        &self,
        id: &InstanceId,
    ) -> Result<Option<Instance>, RetryError<SdkError>> {
        self.describe_instance(id)
            .await
            .map_err(|err| retryable_sdk_error(err, &[]))
    }
}
