//! Content digests and the short verification code shown to signers.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::{Error, Result};

/// Number of random bytes hashed when no input is supplied.
const RANDOM_INPUT_LENGTH: usize = 64;

/// Number of digits in a verification code.
pub const VERIFICATION_CODE_LENGTH: usize = 4;

/// Supported digest algorithms.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Name used by the Mobile-ID and Smart-ID APIs in `hashType`.
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA256",
            Self::Sha384 => "SHA384",
            Self::Sha512 => "SHA512",
        }
    }

    /// XML Signature algorithm URI.
    pub fn xmldsig_uri(&self) -> &'static str {
        match self {
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        };
        write!(f, "{name}")
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(Error::InvalidInput(format!("unsupported hash algorithm {s}"))),
        }
    }
}

/// Raw digest of `input`.
pub fn digest_bytes(input: &[u8], algorithm: HashAlgorithm) -> Vec<u8> {
    match algorithm {
        HashAlgorithm::Sha256 => Sha256::digest(input).to_vec(),
        HashAlgorithm::Sha384 => Sha384::digest(input).to_vec(),
        HashAlgorithm::Sha512 => Sha512::digest(input).to_vec(),
    }
}

/// Lowercase hex digest of `input`.
///
/// An empty input is replaced by fresh random bytes, which is how session
/// hashes not tied to any document are minted.
pub fn hash(input: &[u8], algorithm: HashAlgorithm) -> String {
    if input.is_empty() {
        let mut random = [0u8; RANDOM_INPUT_LENGTH];
        rand::thread_rng().fill_bytes(&mut random);
        return HEXLOWER.encode(&digest_bytes(&random, algorithm));
    }
    HEXLOWER.encode(&digest_bytes(input, algorithm))
}

/// A fresh SHA-256 session hash for authentication flows.
pub fn random_session_hash() -> String {
    hash(&[], HashAlgorithm::Sha256)
}

/// Decode a hex session hash into its raw bytes.
pub fn decode_session_hash(session_hash: &str) -> Result<Vec<u8>> {
    let bytes = HEXLOWER_PERMISSIVE
        .decode(session_hash.trim().as_bytes())
        .map_err(|e| Error::InvalidInput(format!("session hash is not hex: {e}")))?;
    if bytes.is_empty() {
        return Err(Error::InvalidInput("session hash is empty".to_string()));
    }
    Ok(bytes)
}

/// The four digit code a signer compares on their device.
///
/// SHA-256 over the raw session hash bytes; the last two bytes of that digest,
/// read as a big-endian `u16`, reduced modulo 10000 and zero padded.
pub fn verification_code(session_hash: &str) -> Result<String> {
    let bytes = decode_session_hash(session_hash)?;
    let digest = Sha256::digest(&bytes);
    let tail = u16::from_be_bytes([digest[digest.len() - 2], digest[digest.len() - 1]]);
    Ok(format!(
        "{:0width$}",
        tail % 10_000,
        width = VERIFICATION_CODE_LENGTH
    ))
}
