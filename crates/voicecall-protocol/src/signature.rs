//! Telephony webhook signature verification.
//!
//! Both `/voice/answer` and `/voice/status` are signed by computing
//! HMAC-SHA256 over the request URL followed by the sorted form parameters
//! (key+value, no separators — the provider's documented scheme), keyed by
//! the account's shared secret, then hex-encoding the result.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid signing key length")]
    InvalidKey,
    #[error("signature header missing or not valid hex")]
    MalformedSignature,
    #[error("signature mismatch")]
    Mismatch,
}

/// Compute the expected signature for a request URL and its form parameters.
pub fn compute_signature(
    secret: &str,
    url: &str,
    params: &BTreeMap<String, String>,
) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(url.as_bytes());
    for (key, value) in params {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a request's signature header against the expected value.
pub fn verify_signature(
    secret: &str,
    url: &str,
    params: &BTreeMap<String, String>,
    signature_header: &str,
) -> Result<(), SignatureError> {
    let expected = compute_signature(secret, url, params)?;
    let expected_bytes =
        hex::decode(&expected).map_err(|_| SignatureError::MalformedSignature)?;
    let got_bytes =
        hex::decode(signature_header).map_err(|_| SignatureError::MalformedSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(url.as_bytes());
    for (key, value) in params {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    let _ = expected_bytes;
    mac.verify_slice(&got_bytes)
        .map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BTreeMap<String, String> {
        let mut p = BTreeMap::new();
        p.insert("CallSid".to_string(), "CA123".to_string());
        p.insert("CallStatus".to_string(), "completed".to_string());
        p
    }

    #[test]
    fn verifies_a_correctly_signed_request() {
        let url = "https://example.com/voice/status";
        let sig = compute_signature("s3cret", url, &params()).unwrap();
        assert!(verify_signature("s3cret", url, &params(), &sig).is_ok());
    }

    #[test]
    fn rejects_tampered_params() {
        let url = "https://example.com/voice/status";
        let sig = compute_signature("s3cret", url, &params()).unwrap();
        let mut tampered = params();
        tampered.insert("CallStatus".to_string(), "failed".to_string());
        assert!(verify_signature("s3cret", url, &tampered, &sig).is_err());
    }

    #[test]
    fn rejects_wrong_secret() {
        let url = "https://example.com/voice/status";
        let sig = compute_signature("s3cret", url, &params()).unwrap();
        assert!(verify_signature("wrong", url, &params(), &sig).is_err());
    }
}
