//! Configuration loading via `ortho-config` and wait-timeout overrides.

use std::env;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::retry::{READ_RETRY_TIMEOUT, WRITE_RETRY_TIMEOUT};
use crate::sdk::Credential;

/// Environment variable overriding the compute wait timeout, in seconds.
pub const COMPUTE_WAIT_TIMEOUT_ENV: &str = "STRATUS_COMPUTE_WAIT_TIMEOUT";

/// Environment variable overriding the database wait timeout, in seconds.
pub const DATABASE_WAIT_TIMEOUT_ENV: &str = "STRATUS_DATABASE_WAIT_TIMEOUT";

/// Largest accepted wait timeout override, in seconds (thirty days).
pub const MAX_WAIT_TIMEOUT_SECS: u64 = 30 * 86_400;

/// Default per-request HTTP timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Provider configuration derived from environment variables, configuration
/// files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "STRATUS",
    discovery(
        app_name = "stratus",
        env_var = "STRATUS_CONFIG_PATH",
        config_file_name = "stratus.toml",
        dotfile_name = ".stratus.toml",
        project_file_name = "stratus.toml"
    )
)]
pub struct ProviderConfig {
    /// Access key identifier. Required.
    pub secret_id: String,
    /// Access key secret used to sign requests. Required.
    pub secret_key: String,
    /// Session token accompanying temporary credentials.
    pub security_token: Option<String>,
    /// Region every client is scoped to. Defaults to `eu-central-1`.
    #[ortho_config(default = "eu-central-1".to_owned())]
    pub region: String,
    /// Parent domain of the service endpoints.
    #[ortho_config(default = "stratuscloudapi.com".to_owned())]
    pub domain: String,
    /// Either `https` (default) or `http`.
    #[ortho_config(default = "https".to_owned())]
    pub protocol: String,
    /// Per-request HTTP timeout in seconds. Defaults to 30.
    pub request_timeout_secs: Option<u64>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ProviderConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to stratus.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("stratus")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::InvalidValue`] when the protocol or request timeout
    /// is unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.secret_id,
            &FieldMetadata::new("API secret id", "STRATUS_SECRET_ID", "secret_id"),
        )?;
        Self::require_field(
            &self.secret_key,
            &FieldMetadata::new("API secret key", "STRATUS_SECRET_KEY", "secret_key"),
        )?;
        Self::require_field(
            &self.region,
            &FieldMetadata::new("region", "STRATUS_REGION", "region"),
        )?;
        Self::require_field(
            &self.domain,
            &FieldMetadata::new("endpoint domain", "STRATUS_DOMAIN", "domain"),
        )?;
        if !matches!(self.protocol.as_str(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                field: String::from("protocol"),
                value: self.protocol.clone(),
            });
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: String::from("request_timeout_secs"),
                value: String::from("0"),
            });
        }
        Ok(())
    }

    /// Credential described by this configuration.
    #[must_use]
    pub fn credential(&self) -> Credential {
        Credential::new(self.secret_id.trim(), self.secret_key.trim())
            .with_token(self.security_token.clone())
    }

    /// Per-request HTTP timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }
}

/// Time budgets for API calls and convergence waits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timeouts {
    /// Budget for retrying read calls.
    pub read: Duration,
    /// Budget for retrying mutating calls.
    pub write: Duration,
    /// Budget for waiting on compute instances.
    pub compute_wait: Duration,
    /// Budget for waiting on database instances and their tasks.
    pub database_wait: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: READ_RETRY_TIMEOUT,
            write: WRITE_RETRY_TIMEOUT,
            compute_wait: READ_RETRY_TIMEOUT.saturating_mul(4),
            database_wait: READ_RETRY_TIMEOUT.saturating_mul(10),
        }
    }
}

impl Timeouts {
    /// Applies the wait-timeout overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTimeout`] when an override is set but is
    /// not a positive integer number of seconds.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| {
            env::var_os(name).map(|value| value.to_string_lossy().into_owned())
        })
    }

    /// Applies the wait-timeout overrides returned by `lookup`.
    ///
    /// Unset or blank variables keep the default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTimeout`] when an override is set but is
    /// not a positive integer number of seconds.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            compute_wait: parse_override(COMPUTE_WAIT_TIMEOUT_ENV, &lookup)?
                .unwrap_or(defaults.compute_wait),
            database_wait: parse_override(DATABASE_WAIT_TIMEOUT_ENV, &lookup)?
                .unwrap_or(defaults.database_wait),
            ..defaults
        })
    }

    /// Uses `budget` for every call and wait.
    #[must_use]
    pub const fn uniform(budget: Duration) -> Self {
        Self {
            read: budget,
            write: budget,
            compute_wait: budget,
            database_wait: budget,
        }
    }
}

fn parse_override<F>(variable: &str, lookup: &F) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(variable) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<u64>() {
        Ok(secs) if (1..=MAX_WAIT_TIMEOUT_SECS).contains(&secs) => {
            Ok(Some(Duration::from_secs(secs)))
        }
        _ => Err(ConfigError::InvalidTimeout {
            variable: variable.to_owned(),
            value: raw.clone(),
        }),
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds a value outside its accepted range.
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue {
        /// Name of the offending field.
        field: String,
        /// Value that was rejected.
        value: String,
    },
    /// Indicates a wait-timeout override is not a positive integer.
    #[error(
        "{variable} must be a whole number of seconds between 1 and {max}, got {value:?}",
        max = MAX_WAIT_TIMEOUT_SECS
    )]
    InvalidTimeout {
        /// Environment variable holding the override.
        variable: String,
        /// Value that was rejected.
        value: String,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
