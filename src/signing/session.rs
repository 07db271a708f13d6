use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::container::{ContainerEntry, SignatureTemplate};
use crate::crypto::SessionCompletion;
use crate::error::{Error, Result};

/// Which provider a session runs with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Protocol {
    IdCard,
    MobileId,
    SmartId,
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::IdCard => "idCard",
            Self::MobileId => "mobileId",
            Self::SmartId => "smartId",
        };
        write!(f, "{name}")
    }
}

/// What a provider session is for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Authentication,
    Signature,
    /// Smart-ID certificate choice.
    Certificate,
}

impl SessionType {
    /// Path segment used by the Mobile-ID status endpoint.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Signature => "signature",
            Self::Certificate => "certificate",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Initiated,
    Polling,
    Complete,
    Failed,
    Expired,
}

/// A session's state after one status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Initiated,
    Polling,
    /// The user confirmed; carries the signer certificate and signature.
    Complete(SessionCompletion),
    /// A certificate choice completed; carries the chosen certificate.
    CertificateChosen { certificate: String },
    Failed { code: String, message: String },
    Expired { code: String },
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Initiated => SessionStatus::Initiated,
            Self::Polling => SessionStatus::Polling,
            Self::Complete(_) | Self::CertificateChosen { .. } => SessionStatus::Complete,
            Self::Failed { .. } => SessionStatus::Failed,
            Self::Expired { .. } => SessionStatus::Expired,
        }
    }

    /// Will polling again change nothing?
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Initiated | Self::Polling)
    }
}

/// The container a signature session commits to, kept until finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSignature {
    pub vote_id: Uuid,
    pub user_id: Uuid,
    pub option_ids: Vec<Uuid>,
    pub manifest: Vec<ContainerEntry>,
    pub template: SignatureTemplate,
}

/// One sign or authentication attempt.
///
/// Not persisted by this crate: callers keep it for the lifetime of the
/// attempt and hand it back to poll and finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningSession {
    /// Provider session ID; a local ID for ID-card sessions.
    pub session_id: String,
    /// Hex digest of what the user signs.
    pub session_hash: String,
    /// Verification code derived from `session_hash`.
    pub challenge_id: String,
    pub protocol: Protocol,
    pub session_type: SessionType,
    pub status: SessionStatus,
    /// ID-card signing service's handle on the prepared signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingSignature>,
}

/// A provider's `result`: a bare code (Mobile-ID) or an object (Smart-ID).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StatusResult {
    Code(String),
    #[serde(rename_all = "camelCase")]
    Detailed {
        end_result: String,
        #[serde(default)]
        document_number: Option<String>,
    },
}

impl StatusResult {
    pub fn code(&self) -> &str {
        match self {
            Self::Code(code) => code,
            Self::Detailed { end_result, .. } => end_result,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignatureValue {
    pub value: String,
    #[serde(default)]
    pub algorithm: Option<String>,
}

/// A provider's `cert`: a bare base64 string or an object with a `value`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CertValue {
    Plain(String),
    #[serde(rename_all = "camelCase")]
    Detailed {
        value: String,
        #[serde(default)]
        certificate_level: Option<String>,
    },
}

impl CertValue {
    pub fn value(&self) -> &str {
        match self {
            Self::Plain(value) | Self::Detailed { value, .. } => value,
        }
    }
}

/// A session status response, as Mobile-ID and Smart-ID send it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusPayload {
    /// `RUNNING` or `COMPLETE`.
    pub state: String,
    #[serde(default)]
    pub result: Option<StatusResult>,
    #[serde(default)]
    pub signature: Option<SignatureValue>,
    #[serde(default)]
    pub cert: Option<CertValue>,
}

impl SessionStatusPayload {
    /// Interpret the payload. An unknown `state` is a provider error.
    pub fn into_state(self) -> Result<SessionState> {
        match self.state.as_str() {
            "RUNNING" => return Ok(SessionState::Polling),
            "COMPLETE" => {}
            other => {
                return Err(Error::provider(
                    200,
                    Some(other.to_string()),
                    "unknown session state",
                ))
            }
        }

        let code = self
            .result
            .as_ref()
            .map(|result| result.code().to_string())
            .unwrap_or_default();
        if code != "OK" {
            return Ok(if code == "TIMEOUT" || code == "EXPIRED_TRANSACTION" {
                SessionState::Expired { code }
            } else {
                let message = describe(&code).to_string();
                SessionState::Failed { code, message }
            });
        }

        match (self.cert, self.signature) {
            (Some(cert), Some(signature)) => Ok(SessionState::Complete(SessionCompletion {
                certificate: cert.value().to_string(),
                signature: signature.value,
                algorithm: signature.algorithm,
            })),
            (Some(cert), None) => Ok(SessionState::CertificateChosen {
                certificate: cert.value().to_string(),
            }),
            (None, _) => Err(Error::provider(
                200,
                Some(code),
                "completed session carries no certificate",
            )),
        }
    }
}

/// Human readable text for the result codes Mobile-ID and Smart-ID use.
pub fn describe(code: &str) -> &'static str {
    match code {
        "TIMEOUT" | "EXPIRED_TRANSACTION" => "The user did not respond in time",
        "NOT_MID_CLIENT" => "The user is not a Mobile-ID client",
        "USER_CANCELLED" | "USER_REFUSED" => "The user cancelled the operation",
        "SIGNATURE_HASH_MISMATCH" => "The signature does not match the requested hash",
        "PHONE_ABSENT" => "The phone is unreachable",
        "DELIVERY_ERROR" => "The request could not be delivered to the phone",
        "SIM_ERROR" => "SIM application error",
        "DOCUMENT_UNUSABLE" => "The user's Smart-ID account cannot be used",
        "WRONG_VC" => "The user chose the wrong verification code",
        "REQUIRED_INTERACTION_NOT_SUPPORTED_BY_APP" => "The user's app does not support this request",
        "USER_REFUSED_CERT_CHOICE" | "USER_REFUSED_DISPLAYTEXTANDPIN" | "USER_REFUSED_VC_CHOICE"
        | "USER_REFUSED_CONFIRMATIONMESSAGE" | "USER_REFUSED_CONFIRMATIONMESSAGE_WITH_VC_CHOICE" => {
            "The user refused the request"
        }
        _ => "The signing provider reported a failure",
    }
}
