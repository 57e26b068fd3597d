//! Error types for the thin API client.

use thiserror::Error;

/// Error code reported for connection-level failures.
pub const NETWORK_ERROR_CODE: &str = "ClientError.NetworkError";

/// Error code reported when the endpoint answers with a non-2xx status.
pub const HTTP_STATUS_ERROR_CODE: &str = "ClientError.HttpStatusCodeError";

/// Error code reported when a payload cannot be encoded or decoded.
pub const PARSE_ERROR_CODE: &str = "ClientError.ParseError";

/// Error code reported when a request cannot be signed.
pub const SIGNING_ERROR_CODE: &str = "ClientError.SigningError";

/// How a request failed before the API produced a structured answer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportFailure {
    /// The connection could not be established or was interrupted.
    Network,
    /// The endpoint returned the given non-success HTTP status.
    HttpStatus(u16),
}

/// Errors raised while talking to a cloud service.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SdkError {
    /// Structured error returned by the API inside the response envelope.
    #[error("[{code}] {message} (request id {request_id})")]
    Api {
        /// Error code, for example `ResourceNotFound.InstanceNotExist`.
        code: String,
        /// Human readable message returned by the API.
        message: String,
        /// Request identifier echoed by the API.
        request_id: String,
    },
    /// Raised when the HTTP round-trip fails.
    #[error("transport error ({failure:?}): {message}")]
    Transport {
        /// Classification of the transport failure.
        failure: TransportFailure,
        /// Underlying error text.
        message: String,
    },
    /// Raised when a request payload cannot be serialised.
    #[error("failed to encode {action} request: {message}")]
    Encode {
        /// API action being called.
        action: String,
        /// Serialiser error message.
        message: String,
    },
    /// Raised when a response body does not match the expected shape.
    #[error("failed to decode {action} response: {message}")]
    Decode {
        /// API action being called.
        action: String,
        /// Deserialiser error message.
        message: String,
    },
    /// Raised when the request signature cannot be computed.
    #[error("failed to sign request: {0}")]
    Signing(String),
}

impl SdkError {
    /// Returns the error code used for retry classification.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Api { code, .. } => code,
            Self::Transport {
                failure: TransportFailure::Network,
                ..
            } => NETWORK_ERROR_CODE,
            Self::Transport {
                failure: TransportFailure::HttpStatus(_),
                ..
            } => HTTP_STATUS_ERROR_CODE,
            Self::Encode { .. } | Self::Decode { .. } => PARSE_ERROR_CODE,
            Self::Signing(_) => SIGNING_ERROR_CODE,
        }
    }

    /// Reports whether the API said the addressed resource does not exist.
    ///
    /// Matches `ResourceNotFound`, `ResourceNotFound.*` and any `*.NotFound`
    /// style code such as `InvalidInstanceId.NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        let Self::Api { code, .. } = self else {
            return false;
        };
        code.starts_with("ResourceNotFound")
            || code.ends_with(".NotFound")
            || code.ends_with("NotExist")
    }

    pub(crate) fn network(message: impl Into<String>) -> Self {
        Self::Transport {
            failure: TransportFailure::Network,
            message: message.into(),
        }
    }

    pub(crate) fn decode(action: &str, message: impl Into<String>) -> Self {
        Self::Decode {
            action: action.to_owned(),
            message: message.into(),
        }
    }
}
