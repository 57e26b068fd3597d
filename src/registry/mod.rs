//! Per-provider registry of service clients.
//!
//! Each service gets one client, built on first use and kept for the life of
//! the registry. The security-token client is the exception: it carries the
//! credential itself and is rebuilt from the [`CredentialSource`] on every
//! call so that rotated secrets are picked up.

use std::fmt;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, ProviderConfig, Timeouts};
use crate::sdk::{
    ApiTransport, CredentialSource, HttpTransport, SdkError, ServiceClient, ServiceEndpoint,
    StaticCredential,
};

/// Endpoint of the security-token service.
pub const STS_ENDPOINT: ServiceEndpoint = ServiceEndpoint {
    name: "sts",
    version: "2018-08-13",
};

/// Cloud services reachable through the registry.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ServiceKind {
    /// Virtual machine instances.
    Compute,
    /// Managed database instances.
    Database,
    /// Virtual networks and subnets.
    Network,
    /// Security groups and access policies.
    Security,
    /// Message queues and topics.
    Messaging,
    /// Object storage buckets.
    Storage,
}

impl ServiceKind {
    /// Every service, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Compute,
        Self::Database,
        Self::Network,
        Self::Security,
        Self::Messaging,
        Self::Storage,
    ];

    /// Endpoint name and API version of the service.
    #[must_use]
    pub const fn endpoint(self) -> ServiceEndpoint {
        let (name, version) = match self {
            Self::Compute => ("compute", "2017-03-12"),
            Self::Database => ("database", "2017-03-20"),
            Self::Network => ("network", "2017-03-12"),
            Self::Security => ("security", "2019-01-16"),
            Self::Messaging => ("messaging", "2020-02-17"),
            Self::Storage => ("storage", "2018-11-27"),
        };
        ServiceEndpoint { name, version }
    }
}

/// Errors raised while assembling a registry from configuration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Configuration was missing or malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The HTTP transport could not be built.
    #[error("failed to build transport: {0}")]
    Transport(#[from] SdkError),
}

/// Lazily populated set of service clients sharing one region, credential
/// source, and transport.
pub struct ClientRegistry {
    region: String,
    credentials: Arc<dyn CredentialSource>,
    transport: Arc<dyn ApiTransport>,
    timeouts: Timeouts,
    compute: OnceLock<ServiceClient>,
    database: OnceLock<ServiceClient>,
    network: OnceLock<ServiceClient>,
    security: OnceLock<ServiceClient>,
    messaging: OnceLock<ServiceClient>,
    storage: OnceLock<ServiceClient>,
}

impl ClientRegistry {
    /// Creates an empty registry. No client is built until first use.
    #[must_use]
    pub fn new(
        region: impl Into<String>,
        credentials: Arc<dyn CredentialSource>,
        transport: Arc<dyn ApiTransport>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            region: region.into(),
            credentials,
            transport,
            timeouts,
            compute: OnceLock::new(),
            database: OnceLock::new(),
            network: OnceLock::new(),
            security: OnceLock::new(),
            messaging: OnceLock::new(),
            storage: OnceLock::new(),
        }
    }

    /// Validates `config`, reads the timeout overrides from the environment,
    /// and builds an HTTP-backed registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Config`] when validation or a timeout override
    /// fails, and [`RegistryError::Transport`] when the HTTP client cannot be
    /// built.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, RegistryError> {
        config.validate()?;
        let timeouts = Timeouts::from_env()?;
        let transport = HttpTransport::new(
            config.protocol.as_str(),
            config.domain.as_str(),
            config.request_timeout(),
        )?;
        Ok(Self::new(
            config.region.as_str(),
            Arc::new(StaticCredential::new(config.credential())),
            Arc::new(transport),
            timeouts,
        ))
    }

    /// Region every client is scoped to.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Time budgets resolved when the registry was built.
    #[must_use]
    pub const fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Returns the client for `kind`, building it on first use.
    ///
    /// Concurrent first calls build exactly one client; every caller sees
    /// the same instance.
    #[must_use]
    pub fn client(&self, kind: ServiceKind) -> &ServiceClient {
        self.cell(kind).get_or_init(|| {
            debug!(
                service = kind.endpoint().name,
                region = %self.region,
                "building service client"
            );
            self.build(kind.endpoint())
        })
    }

    /// Builds a fresh security-token client from the current credential.
    #[must_use]
    pub fn sts_client(&self) -> ServiceClient {
        self.build(STS_ENDPOINT)
    }

    const fn cell(&self, kind: ServiceKind) -> &OnceLock<ServiceClient> {
        match kind {
            ServiceKind::Compute => &self.compute,
            ServiceKind::Database => &self.database,
            ServiceKind::Network => &self.network,
            ServiceKind::Security => &self.security,
            ServiceKind::Messaging => &self.messaging,
            ServiceKind::Storage => &self.storage,
        }
    }

    fn build(&self, endpoint: ServiceEndpoint) -> ServiceClient {
        ServiceClient::new(
            endpoint,
            self.region.as_str(),
            self.credentials.credential(),
            Arc::clone(&self.transport),
        )
    }
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let built: Vec<_> = ServiceKind::ALL
            .into_iter()
            .filter(|kind| self.cell(*kind).get().is_some())
            .collect();
        f.debug_struct("ClientRegistry")
            .field("region", &self.region)
            .field("timeouts", &self.timeouts)
            .field("built", &built)
            .finish_non_exhaustive()
    }
}
