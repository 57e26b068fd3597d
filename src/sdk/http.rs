//! `reqwest` transport for the action API.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use super::{ApiRequest, ApiResponse, ApiTransport, SdkError, SdkFuture, TransportFailure, sign};

const HEADER_ACTION: &str = "X-Stratus-Action";
const HEADER_VERSION: &str = "X-Stratus-Version";
const HEADER_REGION: &str = "X-Stratus-Region";
const HEADER_TIMESTAMP: &str = "X-Stratus-Timestamp";
const HEADER_TOKEN: &str = "X-Stratus-Token";

/// Transport that signs each request and POSTs it over HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    protocol: String,
    domain: String,
    base_url: Option<String>,
}

impl HttpTransport {
    /// Builds a transport targeting `{protocol}://{service}.{domain}/`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Transport`] when the HTTP client cannot be built.
    pub fn new(
        protocol: impl Into<String>,
        domain: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SdkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SdkError::network(err.to_string()))?;
        Ok(Self {
            client,
            protocol: protocol.into(),
            domain: domain.into(),
            base_url: None,
        })
    }

    /// Sends every service to a single base URL instead of per-service hosts.
    ///
    /// Useful for regional gateways and local stubs.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Authority covered by the request signature.
    pub(super) fn host_for(&self, request: &ApiRequest) -> String {
        match &self.base_url {
            Some(url) => {
                let rest = url.split_once("://").map_or(url.as_str(), |(_, rest)| rest);
                rest.split_once('/')
                    .map_or(rest, |(authority, _)| authority)
                    .to_owned()
            }
            None => format!("{}.{}", request.endpoint.name, self.domain),
        }
    }

    fn url_for(&self, request: &ApiRequest) -> String {
        match &self.base_url {
            Some(url) => url.clone(),
            None => format!("{}://{}/", self.protocol, self.host_for(request)),
        }
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

impl ApiTransport for HttpTransport {
    fn send<'a>(&'a self, request: &'a ApiRequest) -> SdkFuture<'a, ApiResponse> {
        Box::pin(async move {
            let body = serde_json::to_vec(&request.payload).map_err(|err| SdkError::Encode {
                action: request.action.clone(),
                message: err.to_string(),
            })?;
            let timestamp = unix_timestamp();
            let canonical =
                sign::canonical_request(request, &self.host_for(request), timestamp, &body);
            let authorization = sign::authorization(&request.credential, &canonical)?;

            let mut builder = self
                .client
                .post(self.url_for(request))
                .header(CONTENT_TYPE, "application/json")
                .header(reqwest::header::AUTHORIZATION, authorization)
                .header(HEADER_ACTION, &request.action)
                .header(HEADER_VERSION, request.endpoint.version)
                .header(HEADER_REGION, &request.region)
                .header(HEADER_TIMESTAMP, timestamp.to_string());
            if let Some(token) = &request.credential.token {
                builder = builder.header(HEADER_TOKEN, token);
            }

            let response = builder
                .body(body)
                .send()
                .await
                .map_err(|err| SdkError::network(err.to_string()))?;
            let status = response.status();
            let bytes = response
                .bytes()
                .await
                .map_err(|err| SdkError::network(err.to_string()))?;

            if !status.is_success() {
                return Err(SdkError::Transport {
                    failure: TransportFailure::HttpStatus(status.as_u16()),
                    message: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }

            let document: Value = serde_json::from_slice(&bytes)
                .map_err(|err| SdkError::decode(&request.action, err.to_string()))?;
            super::parse_envelope(&request.action, document)
        })
    }
}
