//! Provider runtime for Stratus Cloud resources.
//!
//! A signed JSON API client ([`sdk`]) is shared through a per-provider
//! [`ClientRegistry`], and each cloud service gets a thin typed wrapper
//! ([`service`]). Resource lifecycles ([`resource`]) settle their
//! long-running operations through polling state convergence
//! ([`converge`]).

pub mod config;
pub mod converge;
pub mod registry;
pub mod resource;
pub mod retry;
pub mod sdk;
pub mod service;
pub mod test_support;

pub use config::{ConfigError, ProviderConfig, Timeouts};
pub use converge::{
    ConvergeError, Converged, Convergence, Observed, Operation, PollBackoff, StatusClass,
    StatusSets,
};
pub use registry::{ClientRegistry, RegistryError, ServiceKind};
pub use resource::{
    ComputeInstanceResource, ComputeInstanceSpec, DatabaseInstanceResource, DatabaseInstanceSpec,
    ResourceError, ResourceFuture, ResourceLifecycle,
};
pub use retry::{RetryError, RetryFailure, retry};
pub use sdk::{ApiTransport, Credential, CredentialSource, HttpTransport, SdkError, ServiceClient};
pub use service::{ComputeService, DatabaseService};
