//! API credentials and the sources that hand them out.

use std::fmt;

/// Key pair (and optional session token) used to sign API requests.
#[derive(Clone, Eq, PartialEq)]
pub struct Credential {
    /// Public half of the key pair, sent with every request.
    pub secret_id: String,
    secret_key: String,
    /// Session token issued alongside temporary credentials.
    pub token: Option<String>,
}

impl Credential {
    /// Creates a credential from a key pair.
    #[must_use]
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            token: None,
        }
    }

    /// Attaches a session token.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|value| !value.trim().is_empty());
        self
    }

    pub(crate) fn secret_key(&self) -> &str {
        &self.secret_key
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Supplies the credential to use for a client.
///
/// Sources backed by rotating secrets may return a different value on each
/// call.
pub trait CredentialSource: Send + Sync {
    /// Returns the current credential.
    fn credential(&self) -> Credential;
}

/// Source that always returns the same credential.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StaticCredential(Credential);

impl StaticCredential {
    /// Wraps a fixed credential.
    #[must_use]
    pub const fn new(credential: Credential) -> Self {
        Self(credential)
    }
}

impl CredentialSource for StaticCredential {
    fn credential(&self) -> Credential {
        self.0.clone()
    }
}

impl<F> CredentialSource for F
where
    F: Fn() -> Credential + Send + Sync,
{
    fn credential(&self) -> Credential {
        self()
    }
}
