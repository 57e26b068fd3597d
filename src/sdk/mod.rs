//! Thin client for the cloud's JSON-over-HTTPS action API.
//!
//! Every call is a signed POST carrying a JSON payload for a single action.
//! Responses arrive wrapped in a `Response` envelope which either holds the
//! result fields plus a `RequestId`, or an `Error` object with a code and a
//! message. Transports hand back the unwrapped envelope so that service
//! wrappers only deal with typed payloads and [`SdkError`].

mod credential;
mod error;
mod http;
mod sign;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub use credential::{Credential, CredentialSource, StaticCredential};
pub use error::{
    HTTP_STATUS_ERROR_CODE, NETWORK_ERROR_CODE, PARSE_ERROR_CODE, SIGNING_ERROR_CODE, SdkError,
    TransportFailure,
};
pub use http::HttpTransport;
pub use sign::SIGNATURE_ALGORITHM;

/// Future returned by transports.
pub type SdkFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SdkError>> + Send + 'a>>;

/// Endpoint name and API version of one cloud service.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ServiceEndpoint {
    /// Sub-domain of the service, for example `compute`.
    pub name: &'static str,
    /// API version string sent with every request.
    pub version: &'static str,
}

/// One API call as handed to a transport.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    /// Service receiving the call.
    pub endpoint: ServiceEndpoint,
    /// Region the call is scoped to.
    pub region: String,
    /// Action name, for example `DescribeInstances`.
    pub action: String,
    /// JSON payload of the action.
    pub payload: Value,
    /// Credential used to sign the call.
    pub credential: Credential,
}

/// Successful, unwrapped response envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    /// Request identifier echoed by the API.
    pub request_id: String,
    /// Result fields of the envelope, without `RequestId`.
    pub body: Value,
}

/// Sends API requests to a cloud endpoint.
pub trait ApiTransport: Send + Sync {
    /// Sends the request and returns the unwrapped response envelope.
    fn send<'a>(&'a self, request: &'a ApiRequest) -> SdkFuture<'a, ApiResponse>;
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Response")]
    response: Map<String, Value>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Unwraps a raw `{"Response": {...}}` document.
///
/// # Errors
///
/// Returns [`SdkError::Api`] when the envelope carries an `Error` object and
/// [`SdkError::Decode`] when the document has no `Response` object.
pub fn parse_envelope(action: &str, document: Value) -> Result<ApiResponse, SdkError> {
    let Envelope { mut response } = serde_json::from_value(document)
        .map_err(|err| SdkError::decode(action, err.to_string()))?;
    let request_id = response
        .remove("RequestId")
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_default();

    if let Some(error) = response.remove("Error") {
        let body: ApiErrorBody = serde_json::from_value(error)
            .map_err(|err| SdkError::decode(action, err.to_string()))?;
        return Err(SdkError::Api {
            code: body.code,
            message: body.message,
            request_id,
        });
    }

    Ok(ApiResponse {
        request_id,
        body: Value::Object(response),
    })
}

/// Handle for one cloud service, bound to a region and a credential.
#[derive(Clone)]
pub struct ServiceClient {
    endpoint: ServiceEndpoint,
    region: String,
    credential: Credential,
    transport: Arc<dyn ApiTransport>,
}

impl ServiceClient {
    /// Creates a client for `endpoint` that sends through `transport`.
    #[must_use]
    pub fn new(
        endpoint: ServiceEndpoint,
        region: impl Into<String>,
        credential: Credential,
        transport: Arc<dyn ApiTransport>,
    ) -> Self {
        Self {
            endpoint,
            region: region.into(),
            credential,
            transport,
        }
    }

    /// Service this client talks to.
    #[must_use]
    pub const fn endpoint(&self) -> ServiceEndpoint {
        self.endpoint
    }

    /// Region the client is scoped to.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Credential captured when the client was built.
    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Calls `action` with `request` and decodes the result fields.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError`] when encoding, the round-trip, or decoding fails,
    /// or when the API reports an error.
    pub async fn call<Req, Resp>(&self, action: &str, request: &Req) -> Result<Resp, SdkError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_value(request).map_err(|err| SdkError::Encode {
            action: action.to_owned(),
            message: err.to_string(),
        })?;
        let api_request = ApiRequest {
            endpoint: self.endpoint,
            region: self.region.clone(),
            action: action.to_owned(),
            payload,
            credential: self.credential.clone(),
        };

        let response = match self.transport.send(&api_request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    service = self.endpoint.name,
                    action,
                    code = err.code(),
                    error = %err,
                    "api call failed"
                );
                return Err(err);
            }
        };
        debug!(
            service = self.endpoint.name,
            action,
            request_id = %response.request_id,
            "api call succeeded"
        );

        serde_json::from_value(response.body)
            .map_err(|err| SdkError::decode(action, err.to_string()))
    }
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}
