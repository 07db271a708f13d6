use async_trait::async_trait;
use data_encoding::BASE64;
use serde::{Deserialize, Serialize};

use crate::config::{DisplayConfig, ProviderConfig};
use crate::container::{ContainerEntry, SignatureTemplate};
use crate::crypto::digest::{decode_session_hash, HashAlgorithm};
use crate::crypto::Certificate;
use crate::error::{Error, Result};
use crate::logging::{mask, SessionTag};
use crate::model::PhoneNumber;

use super::client::ProviderClient;
use super::session::{describe, Protocol, SessionStatusPayload, SessionType};
use super::{SigningProtocol, StartedSignature};

/// Who is asked to sign: their personal code and Mobile-ID phone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobileIdSignatory {
    pub personal_id: String,
    pub phone_number: PhoneNumber,
}

impl MobileIdSignatory {
    /// Validates the phone number before anything is sent.
    pub fn new(personal_id: &str, phone_number: &str) -> Result<Self> {
        let personal_id = personal_id.trim();
        if personal_id.is_empty() {
            return Err(Error::InvalidInput("personal ID is empty".to_string()));
        }
        Ok(Self {
            personal_id: personal_id.to_string(),
            phone_number: phone_number.parse()?,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CertificateRequest<'a> {
    #[serde(rename = "relyingPartyUUID")]
    relying_party_uuid: &'a str,
    relying_party_name: &'a str,
    phone_number: String,
    national_identity_number: &'a str,
}

#[derive(Deserialize)]
struct CertificateResponse {
    result: String,
    #[serde(default)]
    cert: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest<'a> {
    #[serde(rename = "relyingPartyUUID")]
    relying_party_uuid: &'a str,
    relying_party_name: &'a str,
    phone_number: String,
    national_identity_number: &'a str,
    /// Base64 of the raw hash bytes.
    hash: String,
    hash_type: &'static str,
    language: &'a str,
    display_text: &'a str,
    display_text_format: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(rename = "sessionID")]
    session_id: String,
}

/// The Mobile-ID REST API.
#[derive(Debug, Clone)]
pub struct MobileIdService {
    client: ProviderClient,
    display: DisplayConfig,
}

impl MobileIdService {
    pub fn new(config: ProviderConfig, display: DisplayConfig) -> Result<Self> {
        Ok(Self {
            client: ProviderClient::new("mid", config)?,
            display,
        })
    }

    /// Look up the signing certificate of a Mobile-ID user.
    pub async fn certificate(
        &self,
        signatory: &MobileIdSignatory,
        tag: SessionTag,
    ) -> Result<Certificate> {
        let config = self.client.config();
        let request = CertificateRequest {
            relying_party_uuid: config.relying_party_uuid(),
            relying_party_name: config.relying_party_name(),
            phone_number: signatory.phone_number.e164(),
            national_identity_number: &signatory.personal_id,
        };
        let response: CertificateResponse = self
            .client
            .post_json("/certificate", &request, tag)
            .await?;

        match (response.result.as_str(), response.cert) {
            ("OK", Some(cert)) => Certificate::parse(cert),
            (result, _) => {
                warn!(
                    "Mobile-ID{tag} no certificate for {}: {result}",
                    mask(&signatory.personal_id)
                );
                Err(Error::provider(200, Some(result.to_string()), describe(result)))
            }
        }
    }

    /// Start an authentication session over a hash not tied to any document.
    pub async fn authenticate(
        &self,
        signatory: &MobileIdSignatory,
        session_hash: &str,
        tag: SessionTag,
    ) -> Result<String> {
        self.start(SessionType::Authentication, signatory, session_hash, tag).await
    }

    /// Start a signature session over `session_hash`.
    pub async fn sign(
        &self,
        signatory: &MobileIdSignatory,
        session_hash: &str,
        tag: SessionTag,
    ) -> Result<String> {
        self.start(SessionType::Signature, signatory, session_hash, tag).await
    }

    async fn start(
        &self,
        session_type: SessionType,
        signatory: &MobileIdSignatory,
        session_hash: &str,
        tag: SessionTag,
    ) -> Result<String> {
        let config = self.client.config();
        let request = SessionRequest {
            relying_party_uuid: config.relying_party_uuid(),
            relying_party_name: config.relying_party_name(),
            phone_number: signatory.phone_number.e164(),
            national_identity_number: &signatory.personal_id,
            hash: BASE64.encode(&decode_session_hash(session_hash)?),
            hash_type: HashAlgorithm::Sha256.provider_name(),
            language: self.display.language(),
            display_text: self.display.display_text(),
            display_text_format: self.display.display_text_format(),
        };
        let path = format!("/{}", session_type.path_segment());
        let response: SessionResponse = self.client.post_json(&path, &request, tag).await?;
        Ok(response.session_id)
    }
}

#[async_trait]
impl SigningProtocol for MobileIdService {
    type Signatory = MobileIdSignatory;

    fn protocol(&self) -> Protocol {
        Protocol::MobileId
    }

    async fn signing_certificate(
        &self,
        signatory: &MobileIdSignatory,
        tag: SessionTag,
    ) -> Result<Option<Certificate>> {
        self.certificate(signatory, tag).await.map(Some)
    }

    async fn start_signature(
        &self,
        signatory: &MobileIdSignatory,
        _: &[ContainerEntry],
        template: &SignatureTemplate,
        tag: SessionTag,
    ) -> Result<StartedSignature> {
        let session_hash = template.session_hash();
        let session_id = self.sign(signatory, &session_hash, tag).await?;
        Ok(StartedSignature {
            session_id,
            session_hash,
            signature_id: None,
        })
    }

    /// `GET {apiPath}/{type}/session/{sessionId}`, with `timeoutMs` as a
    /// long-poll hint when given.
    async fn session_status(
        &self,
        session_type: SessionType,
        session_id: &str,
        timeout_ms: Option<u64>,
        tag: SessionTag,
    ) -> Result<SessionStatusPayload> {
        let path = format!("/{}/session/{session_id}", session_type.path_segment());
        let query: Vec<_> = timeout_ms
            .map(|timeout| ("timeoutMs", timeout.to_string()))
            .into_iter()
            .collect();
        self.client.get_json(&path, &query, tag).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::crypto::certificate::tests::SIGNER_P256_PEM;

    fn service(server: &mockito::Server) -> MobileIdService {
        let config = ProviderConfig::default()
            .with_base_url(&format!("{}/mid-api", server.url()))
            .with_authorize_token("token");
        MobileIdService::new(config, DisplayConfig::default()).unwrap()
    }

    fn signatory() -> MobileIdSignatory {
        MobileIdSignatory::new("38001085718", "+37251234567").unwrap()
    }

    #[test]
    fn signatory_validation() {
        assert_matches!(
            MobileIdSignatory::new("38001085718", "garbage"),
            Err(Error::InvalidInput(_))
        );
        assert_matches!(
            MobileIdSignatory::new(" ", "+37251234567"),
            Err(Error::InvalidInput(_))
        );
    }

    #[tokio::test]
    async fn authentication_sends_base64_hash() {
        let mut server = mockito::Server::new_async().await;
        let session_hash = "00".repeat(32);
        let mock = server
            .mock("POST", "/mid-api/authentication")
            .match_header("authorization", "Bearer token")
            .match_body(Matcher::PartialJson(json!({
                "phoneNumber": "+37251234567",
                "nationalIdentityNumber": "38001085718",
                "hash": BASE64.encode(&[0u8; 32]),
                "hashType": "SHA256",
                "language": "EST",
            })))
            .with_body(r#"{"sessionID": "de305d54-75b4-431b-adb2-eb6b9e546014"}"#)
            .create_async()
            .await;

        let session_id = service(&server)
            .authenticate(&signatory(), &session_hash, SessionTag::next())
            .await
            .unwrap();
        assert_eq!(session_id, "de305d54-75b4-431b-adb2-eb6b9e546014");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn certificate_lookup() {
        let mut server = mockito::Server::new_async().await;
        let cert = Certificate::parse(SIGNER_P256_PEM).unwrap();
        server
            .mock("POST", "/mid-api/certificate")
            .with_body(json!({"result": "OK", "cert": cert.to_base64()}).to_string())
            .create_async()
            .await;

        let found = service(&server)
            .signing_certificate(&signatory(), SessionTag::next())
            .await
            .unwrap();
        assert_eq!(found, Some(cert));
    }

    #[tokio::test]
    async fn certificate_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/mid-api/certificate")
            .with_body(r#"{"result": "NOT_FOUND"}"#)
            .create_async()
            .await;

        let result = service(&server).certificate(&signatory(), SessionTag::next()).await;
        assert_matches!(result, Err(Error::Provider { code: Some(code), .. }) if code == "NOT_FOUND");
    }

    #[tokio::test]
    async fn status_passes_timeout_hint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/mid-api/signature/session/abc")
            .match_query(Matcher::UrlEncoded("timeoutMs".into(), "5000".into()))
            .with_body(r#"{"state": "RUNNING"}"#)
            .create_async()
            .await;

        let payload = service(&server)
            .session_status(SessionType::Signature, "abc", Some(5000), SessionTag::next())
            .await
            .unwrap();
        assert_eq!(payload.state, "RUNNING");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn provider_error_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/mid-api/signature")
            .with_status(400)
            .with_body(r#"{"error": "X"}"#)
            .create_async()
            .await;

        let result = service(&server)
            .sign(&signatory(), &"ab".repeat(32), SessionTag::next())
            .await;
        assert_matches!(result, Err(Error::Provider { status: 400, message, .. }) if message == "X");
    }
}
