//! Compute instance resource.

use tracing::info;

use super::{ResourceError, ResourceFuture, ResourceLifecycle, reached, require};
use crate::converge::{ConvergeError, Convergence, Operation, PollBackoff};
use crate::registry::ClientRegistry;
use crate::retry::{DEFAULT_RETRY_INTERVAL, retry, retryable_sdk_error};
use crate::service::compute::{
    INSTANCE_LAUNCH_FAILED, INSTANCE_PENDING, INSTANCE_REBOOTING, INSTANCE_RUNNING,
    INSTANCE_STARTING,
};
use crate::service::{ComputeService, Instance, InstanceId, LaunchRequest};

/// Desired configuration of a compute instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ComputeInstanceSpec {
    /// Display name. The only field that can change in place.
    pub name: String,
    /// Machine type.
    pub instance_type: String,
    /// Boot image.
    pub image_id: String,
    /// Availability zone.
    pub zone: String,
}

impl ComputeInstanceSpec {
    /// Starts a builder for a [`ComputeInstanceSpec`].
    #[must_use]
    pub fn builder() -> ComputeInstanceSpecBuilder {
        ComputeInstanceSpecBuilder::default()
    }

    /// Validates the spec, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Validation`] when any field is empty.
    pub fn validate(&self) -> Result<(), ResourceError> {
        require("name", &self.name)?;
        require("instance_type", &self.instance_type)?;
        require("image_id", &self.image_id)?;
        require("zone", &self.zone)?;
        Ok(())
    }
}

/// Builder for [`ComputeInstanceSpec`] that trims inputs and validates on
/// build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ComputeInstanceSpecBuilder {
    name: String,
    instance_type: String,
    image_id: String,
    zone: String,
}

impl ComputeInstanceSpecBuilder {
    /// Sets the display name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the machine type.
    #[must_use]
    pub fn instance_type(mut self, value: impl Into<String>) -> Self {
        self.instance_type = value.into();
        self
    }

    /// Sets the boot image.
    #[must_use]
    pub fn image_id(mut self, value: impl Into<String>) -> Self {
        self.image_id = value.into();
        self
    }

    /// Sets the availability zone.
    #[must_use]
    pub fn zone(mut self, value: impl Into<String>) -> Self {
        self.zone = value.into();
        self
    }

    /// Builds and validates the spec.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Validation`] when any field is empty.
    pub fn build(self) -> Result<ComputeInstanceSpec, ResourceError> {
        let spec = ComputeInstanceSpec {
            name: self.name.trim().to_owned(),
            instance_type: self.instance_type.trim().to_owned(),
            image_id: self.image_id.trim().to_owned(),
            zone: self.zone.trim().to_owned(),
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Compute instances driven through [`ComputeService`].
#[derive(Clone, Copy, Debug)]
pub struct ComputeInstanceResource<'a> {
    registry: &'a ClientRegistry,
    backoff: PollBackoff,
}

impl<'a> ComputeInstanceResource<'a> {
    /// Binds the resource to `registry` with the default poll schedule.
    #[must_use]
    pub fn new(registry: &'a ClientRegistry) -> Self {
        Self {
            registry,
            backoff: PollBackoff::default(),
        }
    }

    /// Overrides the poll schedule.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: PollBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    const fn service(&self) -> ComputeService<'a> {
        ComputeService::new(self.registry)
    }

    fn running(&self, operation: Operation, id: &InstanceId) -> Convergence {
        Convergence::new(operation, id.as_str(), self.registry.timeouts().compute_wait)
            .target([INSTANCE_RUNNING])
            .pending([INSTANCE_PENDING, INSTANCE_STARTING, INSTANCE_REBOOTING])
            .fatal([INSTANCE_LAUNCH_FAILED])
            .backoff(self.backoff)
    }

    async fn await_running(
        &self,
        operation: Operation,
        id: &InstanceId,
    ) -> Result<Instance, ResourceError> {
        let compute = self.service();
        let convergence = self.running(operation, id);
        let outcome = convergence
            .wait(move || async move { compute.instance_refresh(id).await })
            .await?;
        reached(&convergence, outcome)
    }

    async fn create_instance(&self, spec: &ComputeInstanceSpec) -> Result<Instance, ResourceError> {
        spec.validate()?;
        let compute = self.service();
        let launch = LaunchRequest::new(
            spec.name.as_str(),
            spec.instance_type.as_str(),
            spec.image_id.as_str(),
            spec.zone.as_str(),
        );
        let launch_ref = &launch;
        let id = retry(
            self.registry.timeouts().write,
            DEFAULT_RETRY_INTERVAL,
            move || async move {
                compute
                    .create_instance(launch_ref)
                    .await
                    .map_err(|err| retryable_sdk_error(err, &[]))
            },
        )
        .await?;

        let instance = self.await_running(Operation::Create, &id).await?;
        info!(instance_id = %id, name = %spec.name, "compute instance created");
        Ok(instance)
    }

    async fn read_instance(&self, id: &InstanceId) -> Result<Option<Instance>, ResourceError> {
        let compute = self.service();
        let found = retry(
            self.registry.timeouts().read,
            DEFAULT_RETRY_INTERVAL,
            move || async move { compute.instance_refresh(id).await },
        )
        .await?;
        Ok(found)
    }

    async fn update_instance(
        &self,
        id: &InstanceId,
        spec: &ComputeInstanceSpec,
    ) -> Result<Instance, ResourceError> {
        spec.validate()?;
        let compute = self.service();
        let Some(current) = self.read_instance(id).await? else {
            return Err(ResourceError::Converge(ConvergeError::NotFound {
                operation: Operation::Update,
                resource_id: id.to_string(),
            }));
        };
        immutable("instance_type", &current.instance_type, &spec.instance_type)?;
        immutable("image_id", &current.image_id, &spec.image_id)?;

        if current.instance_name != spec.name {
            let name = spec.name.as_str();
            retry(
                self.registry.timeouts().write,
                DEFAULT_RETRY_INTERVAL,
                move || async move {
                    compute
                        .modify_instance_name(id, name)
                        .await
                        .map_err(|err| retryable_sdk_error(err, &[]))
                },
            )
            .await?;
            info!(instance_id = %id, name, "compute instance renamed");
        }

        self.await_running(Operation::Update, id).await
    }

    async fn delete_instance(&self, id: &InstanceId) -> Result<(), ResourceError> {
        let compute = self.service();
        retry(
            self.registry.timeouts().write,
            DEFAULT_RETRY_INTERVAL,
            move || async move {
                compute
                    .terminate_instance(id)
                    .await
                    .map_err(|err| retryable_sdk_error(err, &[]))
            },
        )
        .await?;

        Convergence::absence(id.as_str(), self.registry.timeouts().compute_wait)
            .backoff(self.backoff)
            .wait(move || async move { compute.instance_refresh(id).await })
            .await?;
        info!(instance_id = %id, "compute instance deleted");
        Ok(())
    }
}

/// Rejects changes to fields that cannot be modified in place. An empty
/// observed value means the API did not report the field.
fn immutable(field: &'static str, current: &str, desired: &str) -> Result<(), ResourceError> {
    if current.is_empty() || current == desired {
        return Ok(());
    }
    Err(ResourceError::validation(
        field,
        format!("cannot change from {current} to {desired} in place"),
    ))
}

impl ResourceLifecycle for ComputeInstanceResource<'_> {
    type Spec = ComputeInstanceSpec;
    type State = Instance;
    type Id = InstanceId;

    fn create<'a>(&'a self, spec: &'a Self::Spec) -> ResourceFuture<'a, Self::State> {
        Box::pin(self.create_instance(spec))
    }

    fn read<'a>(&'a self, id: &'a Self::Id) -> ResourceFuture<'a, Option<Self::State>> {
        Box::pin(self.read_instance(id))
    }

    fn update<'a>(
        &'a self,
        id: &'a Self::Id,
        spec: &'a Self::Spec,
    ) -> ResourceFuture<'a, Self::State> {
        Box::pin(self.update_instance(id, spec))
    }

    fn delete<'a>(&'a self, id: &'a Self::Id) -> ResourceFuture<'a, ()> {
        Box::pin(self.delete_instance(id))
    }
}
