use async_trait::async_trait;
use data_encoding::BASE64;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::container::{ContainerEntry, SignatureTemplate};
use crate::crypto::Certificate;
use crate::error::{Error, Result};
use crate::logging::SessionTag;

use super::client::ProviderClient;
use super::session::{Protocol, SessionStatusPayload, SessionType};
use super::{SigningProtocol, StartedSignature};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrepareRequest<'a> {
    #[serde(rename = "relyingPartyUUID")]
    relying_party_uuid: &'a str,
    relying_party_name: &'a str,
    certificate: String,
    files: &'a [ContainerEntry],
    /// Base64 of the SignedInfo bytes.
    signed_info: String,
    signed_info_digest: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrepareResponse {
    signature_id: String,
    signed_info_digest: String,
}

/// The ID-card signing service. The card itself is driven by the user's
/// browser; this service only registers the signature being prepared.
#[derive(Debug, Clone)]
pub struct IdCardService {
    client: ProviderClient,
}

impl IdCardService {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: ProviderClient::new("idcard", config)?,
        })
    }

    /// Register a signature over `template` by the card holding `certificate`.
    ///
    /// Returns the service's signature ID and the SignedInfo digest the
    /// card must sign, which must equal the template's own.
    pub async fn prepare(
        &self,
        manifest: &[ContainerEntry],
        template: &SignatureTemplate,
        tag: SessionTag,
    ) -> Result<(String, String)> {
        let config = self.client.config();
        let expected = template.session_hash();
        let request = PrepareRequest {
            relying_party_uuid: config.relying_party_uuid(),
            relying_party_name: config.relying_party_name(),
            certificate: template.certificate().to_base64(),
            files: manifest,
            signed_info: BASE64.encode(template.data_to_sign()),
            signed_info_digest: expected.clone(),
        };
        let response: PrepareResponse = self
            .client
            .post_json("/signature/prepare", &request, tag)
            .await?;

        if !response.signed_info_digest.eq_ignore_ascii_case(&expected) {
            return Err(Error::provider(
                200,
                Some("SIGNED_INFO_MISMATCH".to_string()),
                "signing service prepared a different SignedInfo",
            ));
        }
        Ok((response.signature_id, expected))
    }
}

#[async_trait]
impl SigningProtocol for IdCardService {
    /// The card is identified by its certificate alone.
    type Signatory = ();

    fn protocol(&self) -> Protocol {
        Protocol::IdCard
    }

    async fn signing_certificate(&self, _: &(), _: SessionTag) -> Result<Option<Certificate>> {
        Ok(None)
    }

    async fn start_signature(
        &self,
        _: &(),
        manifest: &[ContainerEntry],
        template: &SignatureTemplate,
        tag: SessionTag,
    ) -> Result<StartedSignature> {
        let (signature_id, session_hash) = self.prepare(manifest, template, tag).await?;
        Ok(StartedSignature {
            // The browser completes the signature; there is no provider session.
            session_id: Uuid::new_v4().to_string(),
            session_hash,
            signature_id: Some(signature_id),
        })
    }

    async fn session_status(
        &self,
        _: SessionType,
        session_id: &str,
        _: Option<u64>,
        _: SessionTag,
    ) -> Result<SessionStatusPayload> {
        Err(Error::InvalidInput(format!(
            "ID-card session {session_id} has no provider status; finalize it with the card's signature"
        )))
    }
}
