//! XAdES signature skeleton for a container.
//!
//! The XML is emitted directly in exclusive canonical form, so the bytes
//! written here are the bytes that get digested and signed. Elements are
//! never self-closed, attributes are in canonical order, and each namespace
//! is declared where exclusive canonicalization would render it.

use chrono::{DateTime, SecondsFormat, Utc};
use data_encoding::{BASE64, HEXLOWER_PERMISSIVE};
use serde::{Deserialize, Serialize};

use crate::crypto::certificate::Certificate;
use crate::crypto::digest::{digest_bytes, hash, HashAlgorithm};
use crate::error::{Error, Result};

use super::builder::ContainerEntry;

const NS_DS: &str = "http://www.w3.org/2000/09/xmldsig#";
const NS_XADES: &str = "http://uri.etsi.org/01903/v1.3.2#";
const NS_ASIC: &str = "http://uri.etsi.org/02918/v1.2.1#";
const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
const SIGNED_PROPERTIES_TYPE: &str = "http://uri.etsi.org/01903#SignedProperties";

/// Signature element ID; a fresh container only ever has one signature.
pub const SIGNATURE_ID: &str = "S0";

/// The signed parts of a XAdES signature, waiting for a signature value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureTemplate {
    certificate: Certificate,
    signing_time: DateTime<Utc>,
    signed_properties: String,
    signed_info: String,
}

impl SignatureTemplate {
    /// Lay out `SignedProperties` and `SignedInfo` for the manifest, to be
    /// signed by the holder of `certificate`.
    pub fn new(
        manifest: &[ContainerEntry],
        certificate: &Certificate,
        signing_time: DateTime<Utc>,
    ) -> Result<Self> {
        let signed_properties = signed_properties(manifest, certificate, signing_time);
        let signature_method = certificate.public_key()?.signature_method();
        let signed_info = signed_info(manifest, signature_method, &signed_properties)?;
        Ok(Self {
            certificate: certificate.clone(),
            signing_time,
            signed_properties,
            signed_info,
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn signing_time(&self) -> DateTime<Utc> {
        self.signing_time
    }

    pub fn signed_properties(&self) -> &str {
        &self.signed_properties
    }

    pub fn signed_info(&self) -> &str {
        &self.signed_info
    }

    /// The exact bytes the signer's key signs over.
    pub fn data_to_sign(&self) -> &[u8] {
        self.signed_info.as_bytes()
    }

    /// Hex SHA-256 of [`data_to_sign`](Self::data_to_sign), sent to the
    /// signing provider.
    pub fn session_hash(&self) -> String {
        hash(self.data_to_sign(), HashAlgorithm::Sha256)
    }

    /// The complete `META-INF/signatures0.xml` document.
    ///
    /// `signature_value` is the base64 `r || s` signature over the session hash.
    pub fn into_signature_document(self, signature_value: &str) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#,
                "\n",
                r#"<asic:XAdESSignatures xmlns:asic="{asic}" xmlns:ds="{ds}" xmlns:xades="{xades}">"#,
                r#"<ds:Signature Id="{id}">"#,
                "{signed_info}",
                r#"<ds:SignatureValue Id="{id}-SIG">{value}</ds:SignatureValue>"#,
                "<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{certificate}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
                r##"<ds:Object><xades:QualifyingProperties Target="#{id}">{signed_properties}</xades:QualifyingProperties></ds:Object>"##,
                "</ds:Signature>",
                "</asic:XAdESSignatures>",
            ),
            asic = NS_ASIC,
            ds = NS_DS,
            xades = NS_XADES,
            id = SIGNATURE_ID,
            signed_info = self.signed_info,
            value = escape_text(signature_value.trim()),
            certificate = self.certificate.to_base64(),
            signed_properties = self.signed_properties,
        )
    }
}

fn reference_id(index: usize) -> String {
    format!("{SIGNATURE_ID}-RefId{index}")
}

fn signed_properties(
    manifest: &[ContainerEntry],
    certificate: &Certificate,
    signing_time: DateTime<Utc>,
) -> String {
    let sha256 = HashAlgorithm::Sha256.xmldsig_uri();
    let certificate_digest = BASE64.encode(&digest_bytes(certificate.der(), HashAlgorithm::Sha256));

    let mut xml = format!(
        r#"<xades:SignedProperties xmlns:xades="{NS_XADES}" Id="{SIGNATURE_ID}-SignedProperties">"#
    );
    xml.push_str("<xades:SignedSignatureProperties>");
    xml.push_str(&format!(
        "<xades:SigningTime>{}</xades:SigningTime>",
        signing_time.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    xml.push_str("<xades:SigningCertificate><xades:Cert><xades:CertDigest>");
    xml.push_str(&format!(
        r#"<ds:DigestMethod xmlns:ds="{NS_DS}" Algorithm="{sha256}"></ds:DigestMethod>"#
    ));
    xml.push_str(&format!(
        r#"<ds:DigestValue xmlns:ds="{NS_DS}">{certificate_digest}</ds:DigestValue>"#
    ));
    xml.push_str("</xades:CertDigest><xades:IssuerSerial>");
    xml.push_str(&format!(
        r#"<ds:X509IssuerName xmlns:ds="{NS_DS}">{}</ds:X509IssuerName>"#,
        escape_text(&certificate.issuer_name())
    ));
    xml.push_str(&format!(
        r#"<ds:X509SerialNumber xmlns:ds="{NS_DS}">{}</ds:X509SerialNumber>"#,
        certificate.serial_number()
    ));
    xml.push_str("</xades:IssuerSerial></xades:Cert></xades:SigningCertificate>");
    xml.push_str("</xades:SignedSignatureProperties>");

    xml.push_str("<xades:SignedDataObjectProperties>");
    for (index, entry) in manifest.iter().enumerate() {
        xml.push_str(&format!(
            r##"<xades:DataObjectFormat ObjectReference="#{}"><xades:MimeType>{}</xades:MimeType></xades:DataObjectFormat>"##,
            reference_id(index),
            escape_text(&entry.mime_type)
        ));
    }
    xml.push_str("</xades:SignedDataObjectProperties>");
    xml.push_str("</xades:SignedProperties>");
    xml
}

fn signed_info(
    manifest: &[ContainerEntry],
    signature_method: &str,
    signed_properties: &str,
) -> Result<String> {
    let sha256 = HashAlgorithm::Sha256.xmldsig_uri();

    let mut xml = format!(r#"<ds:SignedInfo xmlns:ds="{NS_DS}">"#);
    xml.push_str(&format!(
        r#"<ds:CanonicalizationMethod Algorithm="{EXC_C14N}"></ds:CanonicalizationMethod>"#
    ));
    xml.push_str(&format!(
        r#"<ds:SignatureMethod Algorithm="{signature_method}"></ds:SignatureMethod>"#
    ));

    for (index, entry) in manifest.iter().enumerate() {
        let digest = HEXLOWER_PERMISSIVE
            .decode(entry.digest.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("digest of {} is not hex: {e}", entry.path)))?;
        xml.push_str(&format!(
            r#"<ds:Reference Id="{}" URI="{}">"#,
            reference_id(index),
            escape_attribute(&uri_escape(&entry.path))
        ));
        xml.push_str(&format!(
            r#"<ds:DigestMethod Algorithm="{sha256}"></ds:DigestMethod>"#
        ));
        xml.push_str(&format!(
            "<ds:DigestValue>{}</ds:DigestValue></ds:Reference>",
            BASE64.encode(&digest)
        ));
    }

    let properties_digest =
        BASE64.encode(&digest_bytes(signed_properties.as_bytes(), HashAlgorithm::Sha256));
    xml.push_str(&format!(
        r##"<ds:Reference Id="{SIGNATURE_ID}-RefId-SP" Type="{SIGNED_PROPERTIES_TYPE}" URI="#{SIGNATURE_ID}-SignedProperties">"##
    ));
    xml.push_str(&format!(
        r#"<ds:Transforms><ds:Transform Algorithm="{EXC_C14N}"></ds:Transform></ds:Transforms>"#
    ));
    xml.push_str(&format!(
        r#"<ds:DigestMethod Algorithm="{sha256}"></ds:DigestMethod>"#
    ));
    xml.push_str(&format!(
        "<ds:DigestValue>{properties_digest}</ds:DigestValue></ds:Reference>"
    ));
    xml.push_str("</ds:SignedInfo>");
    Ok(xml)
}

/// Character data as canonical XML writes it.
pub(crate) fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\r' => escaped.push_str("&#xD;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Attribute values as canonical XML writes them.
pub(crate) fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '"' => escaped.push_str("&quot;"),
            '\t' => escaped.push_str("&#x9;"),
            '\n' => escaped.push_str("&#xA;"),
            '\r' => escaped.push_str("&#xD;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Percent-encode a container path for use as a reference URI.
fn uri_escape(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                escaped.push(byte as char)
            }
            _ => escaped.push_str(&format!("%{byte:02X}")),
        }
    }
    escaped
}
