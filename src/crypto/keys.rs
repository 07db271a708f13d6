use p256::ecdsa::signature::hazmat::PrehashVerifier;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};
use x509_cert::der::oid::ObjectIdentifier;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::error::{Error, Result};

/// rsaEncryption
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
/// id-ecPublicKey
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
/// prime256v1 / secp256r1
const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

const ECDSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";
const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

/// A signer's public key: an elliptic-curve key on one of the curves used
/// by eID cards, or the RSA key Smart-ID accounts carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
    Rsa(RsaPublicKey),
}

impl PublicKey {
    /// Recover the key from a certificate's SubjectPublicKeyInfo.
    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        if spki.algorithm.oid == RSA_ENCRYPTION {
            return RsaPublicKey::from_pkcs1_der(spki.subject_public_key.raw_bytes())
                .map(Self::Rsa)
                .map_err(|e| Error::InvalidCertificate(format!("invalid RSA public key: {e}")));
        }
        if spki.algorithm.oid != EC_PUBLIC_KEY {
            return Err(Error::InvalidCertificate(format!(
                "unsupported public key algorithm {}",
                spki.algorithm.oid
            )));
        }
        let curve = spki
            .algorithm
            .parameters
            .as_ref()
            .and_then(|params| ObjectIdentifier::from_bytes(params.value()).ok())
            .ok_or_else(|| Error::InvalidCertificate("EC key has no named curve".to_string()))?;
        let point = spki.subject_public_key.raw_bytes();

        let invalid_point =
            |_| Error::InvalidCertificate(format!("invalid public key point on curve {curve}"));
        if curve == SECP256R1 {
            p256::ecdsa::VerifyingKey::from_sec1_bytes(point)
                .map(Self::P256)
                .map_err(invalid_point)
        } else if curve == SECP384R1 {
            p384::ecdsa::VerifyingKey::from_sec1_bytes(point)
                .map(Self::P384)
                .map_err(invalid_point)
        } else {
            Err(Error::InvalidCertificate(format!("unsupported curve {curve}")))
        }
    }

    /// Exact length in bytes of a raw signature by this key: `r || s` for
    /// EC keys, the modulus width for RSA.
    pub fn signature_len(&self) -> usize {
        match self {
            Self::P256(_) => 64,
            Self::P384(_) => 96,
            Self::Rsa(key) => rsa::traits::PublicKeyParts::size(key),
        }
    }

    pub fn algorithm_name(&self) -> &'static str {
        match self {
            Self::P256(_) => "P-256",
            Self::P384(_) => "P-384",
            Self::Rsa(_) => "RSA",
        }
    }

    /// XMLDSig `SignatureMethod` for a SHA-256 signature by this key.
    pub fn signature_method(&self) -> &'static str {
        match self {
            Self::P256(_) | Self::P384(_) => ECDSA_SHA256,
            Self::Rsa(_) => RSA_SHA256,
        }
    }

    /// Verify a raw signature over an already hashed message.
    ///
    /// EC signatures are fixed-width `r || s`; RSA ones are PKCS#1 v1.5,
    /// with the digest algorithm given by the prehash length. Errors only
    /// when the bytes have the wrong shape for this key. Anything that is
    /// well formed but wrong, out-of-range scalars included, is `Ok(false)`.
    pub fn verify_raw(&self, prehash: &[u8], signature: &[u8]) -> Result<bool> {
        let expected = self.signature_len();
        if signature.len() != expected {
            return Err(Error::SignatureFormat(format!(
                "expected a {expected} byte {} signature, got {}",
                self.algorithm_name(),
                signature.len()
            )));
        }

        let verified = match self {
            Self::P256(key) => {
                let (r, s) = signature.split_at(expected / 2);
                let signature = p256::ecdsa::Signature::from_scalars(
                    p256::FieldBytes::clone_from_slice(r),
                    p256::FieldBytes::clone_from_slice(s),
                );
                signature.map_or(false, |signature| {
                    key.verify_prehash(prehash, &signature).is_ok()
                })
            }
            Self::P384(key) => {
                let (r, s) = signature.split_at(expected / 2);
                let signature = p384::ecdsa::Signature::from_scalars(
                    p384::FieldBytes::clone_from_slice(r),
                    p384::FieldBytes::clone_from_slice(s),
                );
                signature.map_or(false, |signature| {
                    key.verify_prehash(prehash, &signature).is_ok()
                })
            }
            Self::Rsa(key) => {
                let scheme = match prehash.len() {
                    32 => Pkcs1v15Sign::new::<Sha256>(),
                    48 => Pkcs1v15Sign::new::<Sha384>(),
                    64 => Pkcs1v15Sign::new::<Sha512>(),
                    other => {
                        return Err(Error::SignatureFormat(format!(
                            "no RSA digest algorithm has a {other} byte output"
                        )))
                    }
                };
                key.verify(scheme, prehash, signature).is_ok()
            }
        };
        Ok(verified)
    }
}
