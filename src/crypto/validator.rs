//! Checks a provider-returned signature against the session hash it was made over.

use data_encoding::BASE64;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::certificate::Certificate;
use super::digest::decode_session_hash;

/// The certificate and signature a provider returns when a session completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCompletion {
    /// Signer certificate, base64 DER (PEM and hex are accepted too).
    pub certificate: String,
    /// Base64 of the raw signature: fixed-width `r || s` for EC keys,
    /// PKCS#1 v1.5 for RSA.
    pub signature: String,
    /// Signature algorithm as reported by the provider, e.g. `SHA256WithECEncryption`.
    #[serde(default)]
    pub algorithm: Option<String>,
}

impl SessionCompletion {
    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        decode_signature(&self.signature)
    }
}

fn decode_signature(signature: &str) -> Result<Vec<u8>> {
    let bytes = BASE64
        .decode(signature.trim().as_bytes())
        .map_err(|e| Error::SignatureFormat(format!("signature is not base64: {e}")))?;
    if bytes.is_empty() {
        return Err(Error::SignatureFormat("signature is empty".to_string()));
    }
    Ok(bytes)
}

/// Is `completion.signature` a valid signature over `session_hash` by the
/// key in `completion.certificate`?
///
/// A signature that decodes but does not verify is `Ok(false)`; only input
/// that cannot be checked at all is an error.
pub fn validate(completion: &SessionCompletion, session_hash: &str) -> Result<bool> {
    let certificate = signer(completion)?;
    validate_with(&certificate, &completion.signature, session_hash)
}

/// As [`validate`], with an already parsed certificate.
pub fn validate_with(certificate: &Certificate, signature: &str, session_hash: &str) -> Result<bool> {
    let public_key = certificate.public_key()?;
    let signature = decode_signature(signature)?;
    let prehash = decode_session_hash(session_hash)?;
    let valid = public_key.verify_raw(&prehash, &signature)?;
    if !valid {
        debug!(
            "{} signature by {:?} did not verify",
            public_key.algorithm_name(),
            certificate.field("CommonName")
        );
    }
    Ok(valid)
}

/// The parsed signer certificate, for linking the signature to a person.
pub fn signer(completion: &SessionCompletion) -> Result<Certificate> {
    Certificate::parse(&completion.certificate)
}
