//! A read-only view over an X.509 signer certificate.
//!
//! Certificates arrive in whatever shape the provider or browser produced:
//! PEM, PEM with the armour stripped, hex, or raw DER. [`Certificate::parse`]
//! accepts all of them and keeps the DER bytes as the canonical form.

use std::fmt::{Debug, Formatter};

use chrono::{DateTime, TimeZone, Utc};
use data_encoding::{BASE64, HEXLOWER_PERMISSIVE};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use x509_cert::der::asn1::{Any, Ia5StringRef, PrintableStringRef, Utf8StringRef};
use x509_cert::der::{oid::ObjectIdentifier, Decode, Tag, Tagged};
use x509_cert::name::Name;
use x509_cert::time::Time;

use crate::error::{Error, Result};

use super::keys::PublicKey;

/// Maps subject attribute OIDs to the names the rest of the system uses.
const SUBJECT_FIELDS: &[(&str, &str)] = &[
    ("2.5.4.3", "CommonName"),
    ("2.5.4.4", "SurName"),
    ("2.5.4.5", "DeviceSerialNumber"),
    ("2.5.4.6", "Country"),
    ("2.5.4.7", "Locality"),
    ("2.5.4.8", "StateOrProvince"),
    ("2.5.4.9", "StreetAddress"),
    ("2.5.4.10", "Organization"),
    ("2.5.4.11", "OrganizationUnit"),
    ("2.5.4.12", "Title"),
    ("2.5.4.42", "GivenName"),
    ("2.5.4.43", "Initials"),
    ("2.5.4.46", "DnQualifier"),
    ("2.5.4.65", "Pseudonym"),
    ("2.5.4.97", "OrganizationIdentifier"),
    ("1.2.840.113549.1.9.1", "E-mail"),
];

/// Friendly name for a subject attribute OID, or the dotted OID itself.
pub fn field_name(oid: &ObjectIdentifier) -> String {
    let dotted = oid.to_string();
    SUBJECT_FIELDS
        .iter()
        .find(|(known, _)| *known == dotted)
        .map(|(_, name)| name.to_string())
        .unwrap_or(dotted)
}

/// One subject attribute, in certificate order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectField {
    pub name: String,
    pub value: String,
}

/// The identity of a natural-person signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    pub first_name: String,
    pub last_name: String,
    /// Personal identification code, without any semantic identifier prefix.
    pub pid: String,
    pub country: String,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Certificate {
    der: Vec<u8>,
    inner: x509_cert::Certificate,
    subject: Vec<SubjectField>,
}

impl Certificate {
    /// Parse a certificate from PEM, armour-less base64, hex or DER.
    pub fn parse(input: impl AsRef<[u8]>) -> Result<Self> {
        let der = decode_input(input.as_ref())?;
        Self::from_der(der)
    }

    /// Parse raw DER bytes.
    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        let inner = x509_cert::Certificate::from_der(&der)
            .map_err(|e| Error::InvalidCertificate(format!("ASN.1 decoding failed: {e}")))?;
        let subject = subject_fields(&inner.tbs_certificate.subject);
        Ok(Self {
            der,
            inner,
            subject,
        })
    }

    /// The DER encoding this certificate was parsed from.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Base64 of the DER encoding, as embedded in XML signatures.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.der)
    }

    /// Subject attributes in certificate order.
    pub fn subject(&self) -> &[SubjectField] {
        &self.subject
    }

    /// First subject attribute with the given friendly name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.subject
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }

    /// Name, personal code and country of the signer.
    pub fn personal_info(&self) -> Result<PersonalInfo> {
        let required = |name: &str| {
            self.field(name)
                .map(str::to_string)
                .ok_or_else(|| Error::InvalidCertificate(format!("subject has no {name}")))
        };
        let serial = required("DeviceSerialNumber")?;
        Ok(PersonalInfo {
            first_name: required("GivenName")?,
            last_name: required("SurName")?,
            pid: strip_semantic_prefix(&serial).to_string(),
            country: required("Country")?,
        })
    }

    /// The subject's elliptic-curve public key.
    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    /// The issuer's distinguished name in RFC 4514 form.
    pub fn issuer_name(&self) -> String {
        self.inner.tbs_certificate.issuer.to_string()
    }

    pub fn issuer_common_name(&self) -> Option<String> {
        subject_fields(&self.inner.tbs_certificate.issuer)
            .into_iter()
            .find(|field| field.name == "CommonName")
            .map(|field| field.value)
    }

    /// Certificate serial number in decimal.
    pub fn serial_number(&self) -> String {
        BigUint::from_bytes_be(self.inner.tbs_certificate.serial_number.as_bytes()).to_string()
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        to_datetime(&self.inner.tbs_certificate.validity.not_before)
    }

    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        to_datetime(&self.inner.tbs_certificate.validity.not_after)
    }

    /// Is `at` inside the validity window?
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        match (self.not_before(), self.not_after()) {
            (Some(start), Some(end)) => start <= at && at <= end,
            _ => false,
        }
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl Debug for Certificate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("serial_number", &self.serial_number())
            .finish()
    }
}

impl TryFrom<String> for Certificate {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Certificate> for String {
    fn from(certificate: Certificate) -> Self {
        certificate.to_base64()
    }
}

/// Turn any accepted textual or binary form into DER.
fn decode_input(input: &[u8]) -> Result<Vec<u8>> {
    let is_text = input
        .iter()
        .all(|b| b.is_ascii_graphic() || b.is_ascii_whitespace());
    if !is_text {
        return Ok(input.to_vec());
    }

    let trimmed = trim_whitespace(input);
    if trimmed.is_empty() {
        return Err(Error::InvalidCertificate("empty input".to_string()));
    }

    if trimmed.starts_with(b"-----BEGIN") {
        let text = std::str::from_utf8(trimmed)
            .map_err(|_| Error::InvalidCertificate("PEM is not UTF-8".to_string()))?;
        let body: String = text
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .flat_map(|line| line.chars())
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        return BASE64
            .decode(body.as_bytes())
            .map_err(|e| Error::InvalidCertificate(format!("PEM body is not base64: {e}")));
    }

    if trimmed.iter().all(u8::is_ascii_hexdigit) && trimmed.len() % 2 == 0 {
        return HEXLOWER_PERMISSIVE
            .decode(trimmed)
            .map_err(|e| Error::InvalidCertificate(format!("invalid hex: {e}")));
    }

    if trimmed
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || b.is_ascii_whitespace() || b"+/=".contains(b))
    {
        let body: Vec<u8> = trimmed
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        return BASE64
            .decode(&body)
            .map_err(|e| Error::InvalidCertificate(format!("invalid base64: {e}")));
    }

    Err(Error::InvalidCertificate(
        "unrecognised certificate encoding".to_string(),
    ))
}

fn trim_whitespace(input: &[u8]) -> &[u8] {
    let start = input
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(input.len());
    let end = input
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &input[start..end]
}

fn subject_fields(name: &Name) -> Vec<SubjectField> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .map(|attribute| SubjectField {
            name: field_name(&attribute.oid),
            value: attribute_text(&attribute.value),
        })
        .collect()
}

/// The text of a directory string, decoded according to its ASN.1 tag.
fn attribute_text(value: &Any) -> String {
    let bytes = value.value();
    let decoded = match value.tag() {
        Tag::Utf8String => value.decode_as::<Utf8StringRef<'_>>().map(|s| s.to_string()),
        Tag::PrintableString => value
            .decode_as::<PrintableStringRef<'_>>()
            .map(|s| s.to_string()),
        Tag::Ia5String => value.decode_as::<Ia5StringRef<'_>>().map(|s| s.to_string()),
        // UCS-2, big endian.
        Tag::BmpString => {
            let units = bytes
                .chunks(2)
                .map(|pair| u16::from_be_bytes([pair[0], *pair.get(1).unwrap_or(&0)]));
            return char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect();
        }
        // Issuers put Latin-1 in T61 strings.
        Tag::TeletexString => return bytes.iter().map(|&b| char::from(b)).collect(),
        _ => return String::from_utf8_lossy(bytes).into_owned(),
    };
    decoded.unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

/// `PNOEE-38001085718` -> `38001085718`. Codes without an ETSI semantic
/// identifier prefix are returned unchanged.
pub fn strip_semantic_prefix(serial: &str) -> &str {
    let bytes = serial.as_bytes();
    let is_prefixed = bytes.len() > 6
        && bytes[..5].iter().all(u8::is_ascii_uppercase)
        && bytes[5] == b'-';
    if is_prefixed {
        &serial[6..]
    } else {
        serial
    }
}

fn to_datetime(time: &Time) -> Option<DateTime<Utc>> {
    let seconds = i64::try_from(time.to_unix_duration().as_secs()).ok()?;
    Utc.timestamp_opt(seconds, 0).single()
}
