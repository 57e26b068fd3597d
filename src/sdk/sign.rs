//! HMAC-SHA256 request signing.
//!
//! The canonical request is the newline-joined sequence of method, host,
//! action, version, timestamp and the hex SHA-256 digest of the body. The
//! signature is the hex HMAC of that string keyed with the secret key.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::{ApiRequest, Credential, SdkError};

/// Name of the signature scheme placed in the `Authorization` header.
pub const SIGNATURE_ALGORITHM: &str = "HMAC-SHA256";

pub(crate) fn canonical_request(
    request: &ApiRequest,
    host: &str,
    timestamp: u64,
    body: &[u8],
) -> String {
    format!(
        "POST\n{host}\n{}\n{}\n{timestamp}\n{}",
        request.action,
        request.endpoint.version,
        hex::encode(Sha256::digest(body))
    )
}

pub(crate) fn signature(credential: &Credential, canonical: &str) -> Result<String, SdkError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(credential.secret_key().as_bytes())
        .map_err(|err| SdkError::Signing(err.to_string()))?;
    mac.update(canonical.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub(crate) fn authorization(credential: &Credential, canonical: &str) -> Result<String, SdkError> {
    let digest = signature(credential, canonical)?;
    Ok(format!(
        "{SIGNATURE_ALGORITHM} Credential={}, Signature={digest}",
        credential.secret_id
    ))
}
