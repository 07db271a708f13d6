use async_trait::async_trait;
use data_encoding::BASE64;
use serde::{Deserialize, Serialize};

use crate::config::{DisplayConfig, ProviderConfig};
use crate::container::{ContainerEntry, SignatureTemplate};
use crate::crypto::digest::{decode_session_hash, HashAlgorithm};
use crate::crypto::Certificate;
use crate::error::{Error, Result};
use crate::logging::SessionTag;

use super::client::ProviderClient;
use super::session::{Protocol, SessionStatusPayload, SessionType};
use super::{SigningProtocol, StartedSignature};

/// Smart-ID caps `displayText60` at sixty characters.
const DISPLAY_TEXT_MAX: usize = 60;

/// A Smart-ID user, addressed by ETSI semantic identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartIdSignatory {
    pub personal_id: String,
    /// ISO 3166-1 alpha-2, upper case.
    pub country_code: String,
}

impl SmartIdSignatory {
    pub fn new(personal_id: &str, country_code: &str) -> Result<Self> {
        let personal_id = personal_id.trim();
        let country_code = country_code.trim().to_ascii_uppercase();
        if personal_id.is_empty() {
            return Err(Error::InvalidInput("personal ID is empty".to_string()));
        }
        if country_code.len() != 2 || !country_code.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(Error::InvalidInput(format!(
                "invalid country code {country_code:?}"
            )));
        }
        Ok(Self {
            personal_id: personal_id.to_string(),
            country_code,
        })
    }

    /// `PNO{CC}-{personal id}`
    pub fn semantic_id(&self) -> String {
        format!("PNO{}-{}", self.country_code, self.personal_id)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Interaction {
    #[serde(rename = "type")]
    kind: &'static str,
    display_text60: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest<'a> {
    #[serde(rename = "relyingPartyUUID")]
    relying_party_uuid: &'a str,
    relying_party_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    certificate_level: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    allowed_interactions_order: Vec<Interaction>,
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(rename = "sessionID")]
    session_id: String,
}

/// The Smart-ID relying party API (v2).
#[derive(Debug, Clone)]
pub struct SmartIdService {
    client: ProviderClient,
    display: DisplayConfig,
}

impl SmartIdService {
    pub fn new(config: ProviderConfig, display: DisplayConfig) -> Result<Self> {
        Ok(Self {
            client: ProviderClient::new("sid", config)?,
            display,
        })
    }

    fn request(&self, session_hash: Option<&str>) -> Result<SessionRequest<'_>> {
        let config = self.client.config();
        let hash = session_hash
            .map(|hash| decode_session_hash(hash).map(|bytes| BASE64.encode(&bytes)))
            .transpose()?;
        let allowed_interactions_order = match hash {
            Some(_) => vec![Interaction {
                kind: "displayTextAndPIN",
                display_text60: self
                    .display
                    .display_text()
                    .chars()
                    .take(DISPLAY_TEXT_MAX)
                    .collect(),
            }],
            None => vec![],
        };
        Ok(SessionRequest {
            relying_party_uuid: config.relying_party_uuid(),
            relying_party_name: config.relying_party_name(),
            hash_type: hash.as_ref().map(|_| HashAlgorithm::Sha256.provider_name()),
            hash,
            certificate_level: Some("QUALIFIED"),
            allowed_interactions_order,
        })
    }

    async fn start(
        &self,
        endpoint: &str,
        signatory: &SmartIdSignatory,
        request: &SessionRequest<'_>,
        tag: SessionTag,
    ) -> Result<String> {
        let path = format!("/{endpoint}/etsi/{}", signatory.semantic_id());
        let response: SessionResponse = self.client.post_json(&path, request, tag).await?;
        Ok(response.session_id)
    }

    /// Start an authentication session over a hash not tied to any document.
    pub async fn authenticate(
        &self,
        signatory: &SmartIdSignatory,
        session_hash: &str,
        tag: SessionTag,
    ) -> Result<String> {
        let request = self.request(Some(session_hash))?;
        self.start("authentication", signatory, &request, tag).await
    }

    /// Ask the user's app which qualified certificate to sign with.
    pub async fn certificate_choice(
        &self,
        signatory: &SmartIdSignatory,
        tag: SessionTag,
    ) -> Result<String> {
        let request = self.request(None)?;
        self.start("certificatechoice", signatory, &request, tag).await
    }

    /// Start a signature session over `session_hash`.
    pub async fn sign(
        &self,
        signatory: &SmartIdSignatory,
        session_hash: &str,
        tag: SessionTag,
    ) -> Result<String> {
        let request = self.request(Some(session_hash))?;
        self.start("signature", signatory, &request, tag).await
    }
}

#[async_trait]
impl SigningProtocol for SmartIdService {
    type Signatory = SmartIdSignatory;

    fn protocol(&self) -> Protocol {
        Protocol::SmartId
    }

    /// The certificate comes from a prior certificate choice session.
    async fn signing_certificate(
        &self,
        _: &SmartIdSignatory,
        _: SessionTag,
    ) -> Result<Option<Certificate>> {
        Ok(None)
    }

    async fn start_signature(
        &self,
        signatory: &SmartIdSignatory,
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

    /// `GET /session/{sessionId}`; the session type is implied by the ID.
    async fn session_status(
        &self,
        _: SessionType,
        session_id: &str,
        timeout_ms: Option<u64>,
        tag: SessionTag,
    ) -> Result<SessionStatusPayload> {
        let query: Vec<_> = timeout_ms
            .map(|timeout| ("timeoutMs", timeout.to_string()))
            .into_iter()
            .collect();
        self.client
            .get_json(&format!("/session/{session_id}"), &query, tag)
            .await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    fn service(server: &mockito::Server) -> SmartIdService {
        let config = ProviderConfig::default().with_base_url(&format!("{}/v2", server.url()));
        SmartIdService::new(config, DisplayConfig::default()).unwrap()
    }

    #[test]
    fn semantic_identifier() {
        let signatory = SmartIdSignatory::new("30303039914", "lt").unwrap();
        assert_eq!(signatory.semantic_id(), "PNOLT-30303039914");
        assert_matches!(SmartIdSignatory::new("1", "EST"), Err(Error::InvalidInput(_)));
        assert_matches!(SmartIdSignatory::new("", "EE"), Err(Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn signature_request_shape() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/signature/etsi/PNOEE-38001085718")
            .match_body(Matcher::PartialJson(json!({
                "relyingPartyName": "DEMO",
                "hash": BASE64.encode(&[0xab; 32]),
                "hashType": "SHA256",
                "certificateLevel": "QUALIFIED",
                "allowedInteractionsOrder": [
                    {"type": "displayTextAndPIN", "displayText60": "CitizenOS vote"}
                ],
            })))
            .with_body(r#"{"sessionID": "sid-1"}"#)
            .create_async()
            .await;

        let signatory = SmartIdSignatory::new("38001085718", "EE").unwrap();
        let session_id = service(&server)
            .sign(&signatory, &"ab".repeat(32), SessionTag::next())
            .await
            .unwrap();
        assert_eq!(session_id, "sid-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn certificate_choice_has_no_hash() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/certificatechoice/etsi/PNOEE-38001085718")
            .match_body(Matcher::Json(json!({
                "relyingPartyUUID": "00000000-0000-0000-0000-000000000000",
                "relyingPartyName": "DEMO",
                "certificateLevel": "QUALIFIED",
            })))
            .with_body(r#"{"sessionID": "sid-2"}"#)
            .create_async()
            .await;

        let signatory = SmartIdSignatory::new("38001085718", "EE").unwrap();
        let session_id = service(&server)
            .certificate_choice(&signatory, SessionTag::next())
            .await
            .unwrap();
        assert_eq!(session_id, "sid-2");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn status_by_session_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/session/sid-1")
            .match_query(Matcher::Any)
            .with_body(r#"{"state": "COMPLETE", "result": {"endResult": "USER_REFUSED"}}"#)
            .create_async()
            .await;

        let payload = service(&server)
            .session_status(SessionType::Signature, "sid-1", Some(1000), SessionTag::next())
            .await
            .unwrap();
        assert_eq!(payload.result.unwrap().code(), "USER_REFUSED");
    }
}
