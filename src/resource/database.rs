//! Managed database instance resource.

use tracing::info;

use super::{ResourceError, ResourceFuture, ResourceLifecycle, reached, require};
use crate::converge::{ConvergeError, Convergence, Operation, PollBackoff};
use crate::registry::ClientRegistry;
use crate::retry::{DEFAULT_RETRY_INTERVAL, retry, retryable_sdk_error};
use crate::service::database::{
    DB_CREATE_FAILED, DB_CREATING, DB_MODIFYING, DB_RUNNING, TASK_FAILED, TASK_INITIAL,
    TASK_KILLED, TASK_RUNNING, TASK_SUCCESS,
};
use crate::service::{AsyncRequestId, DatabaseService, DbInstance, DbInstanceId, DbInstanceRequest};

/// Codes returned while a previous task still holds the instance.
const DB_BUSY_CODES: &[&str] = &["OperationDenied.InstanceTaskRunning"];

/// Desired configuration of a managed database instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DatabaseInstanceSpec {
    /// Display name.
    pub name: String,
    /// Engine version, for example `8.0`.
    pub engine_version: String,
    /// Memory size in MiB.
    pub memory: u64,
    /// Disk size in GiB.
    pub volume: u64,
    /// Availability zone.
    pub zone: String,
}

impl DatabaseInstanceSpec {
    /// Validates the spec.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Validation`] when a string field is empty or
    /// a size is zero.
    pub fn validate(&self) -> Result<(), ResourceError> {
        require("name", &self.name)?;
        require("engine_version", &self.engine_version)?;
        require("zone", &self.zone)?;
        if self.memory == 0 {
            return Err(ResourceError::validation("memory", "must be positive"));
        }
        if self.volume == 0 {
            return Err(ResourceError::validation("volume", "must be positive"));
        }
        Ok(())
    }
}

/// Database instances driven through [`DatabaseService`].
#[derive(Clone, Copy, Debug)]
pub struct DatabaseInstanceResource<'a> {
    registry: &'a ClientRegistry,
    backoff: PollBackoff,
}

impl<'a> DatabaseInstanceResource<'a> {
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

    const fn service(&self) -> DatabaseService<'a> {
        DatabaseService::new(self.registry)
    }

    async fn await_task(
        &self,
        operation: Operation,
        task: &AsyncRequestId,
    ) -> Result<(), ResourceError> {
        let database = self.service();
        let convergence = Convergence::new(
            operation,
            task.as_str(),
            self.registry.timeouts().database_wait,
        )
        .target([TASK_SUCCESS])
        .pending([TASK_INITIAL, TASK_RUNNING])
        .fatal([TASK_FAILED, TASK_KILLED])
        .backoff(self.backoff);
        convergence
            .wait(move || async move { database.async_request_refresh(task).await })
            .await?;
        Ok(())
    }

    async fn await_running(&self, id: &DbInstanceId) -> Result<DbInstance, ResourceError> {
        let database = self.service();
        let convergence = Convergence::new(
            Operation::Create,
            id.as_str(),
            self.registry.timeouts().database_wait,
        )
        .target([DB_RUNNING])
        .pending([DB_CREATING, DB_MODIFYING])
        .fatal([DB_CREATE_FAILED])
        .backoff(self.backoff);
        let outcome = convergence
            .wait(move || async move { database.db_instance_refresh(id).await })
            .await?;
        reached(&convergence, outcome)
    }

    async fn create_instance(
        &self,
        spec: &DatabaseInstanceSpec,
    ) -> Result<DbInstance, ResourceError> {
        spec.validate()?;
        let database = self.service();
        let request = DbInstanceRequest::new(
            spec.name.as_str(),
            spec.engine_version.as_str(),
            spec.memory,
            spec.volume,
            spec.zone.as_str(),
        );
        let request_ref = &request;
        let creation = retry(
            self.registry.timeouts().write,
            DEFAULT_RETRY_INTERVAL,
            move || async move {
                database
                    .create_db_instance(request_ref)
                    .await
                    .map_err(|err| retryable_sdk_error(err, DB_BUSY_CODES))
            },
        )
        .await?;

        if let Some(task) = &creation.async_request_id {
            self.await_task(Operation::Create, task).await?;
        }
        let instance = self.await_running(&creation.instance_id).await?;
        info!(
            instance_id = %creation.instance_id,
            name = %spec.name,
            "database instance created"
        );
        Ok(instance)
    }

    async fn read_instance(&self, id: &DbInstanceId) -> Result<Option<DbInstance>, ResourceError> {
        let database = self.service();
        let found = retry(
            self.registry.timeouts().read,
            DEFAULT_RETRY_INTERVAL,
            move || async move { database.db_instance_refresh(id).await },
        )
        .await?;
        Ok(found)
    }

    async fn update_instance(
        &self,
        id: &DbInstanceId,
        spec: &DatabaseInstanceSpec,
    ) -> Result<DbInstance, ResourceError> {
        spec.validate()?;
        let Some(current) = self.read_instance(id).await? else {
            return Err(ResourceError::Converge(ConvergeError::NotFound {
                operation: Operation::Update,
                resource_id: id.to_string(),
            }));
        };
        let drift = [
            ("name", current.instance_name != spec.name),
            ("engine_version", current.engine_version != spec.engine_version),
            ("memory", current.memory != spec.memory),
            ("volume", current.volume != spec.volume),
            ("zone", current.zone != spec.zone),
        ];
        if let Some((field, _)) = drift.into_iter().find(|(_, changed)| *changed) {
            return Err(ResourceError::validation(
                field,
                "database instances cannot be modified in place",
            ));
        }
        Ok(current)
    }

    async fn delete_instance(&self, id: &DbInstanceId) -> Result<(), ResourceError> {
        let database = self.service();
        let task = retry(
            self.registry.timeouts().write,
            DEFAULT_RETRY_INTERVAL,
            move || async move {
                database
                    .delete_db_instance(id)
                    .await
                    .map_err(|err| retryable_sdk_error(err, DB_BUSY_CODES))
            },
        )
        .await?;

        if let Some(task_id) = &task {
            self.await_task(Operation::Delete, task_id).await?;
        }
        Convergence::absence(id.as_str(), self.registry.timeouts().database_wait)
            .backoff(self.backoff)
            .wait(move || async move { database.db_instance_refresh(id).await })
            .await?;
        info!(instance_id = %id, "database instance deleted");
        Ok(())
    }
}

impl ResourceLifecycle for DatabaseInstanceResource<'_> {
    type Spec = DatabaseInstanceSpec;
    type State = DbInstance;
    type Id = DbInstanceId;

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
