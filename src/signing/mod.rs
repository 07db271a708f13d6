//! ID-card, Mobile-ID and Smart-ID signing sessions.
//!
//! The three providers share one shape: start a session over a hash, poll
//! its status, validate what comes back. [`SigningProtocol`] captures what
//! differs between them; [`Signer`] does the rest once for all three.

use async_trait::async_trait;

use crate::container::{ContainerEntry, SignatureTemplate};
use crate::crypto::Certificate;
use crate::error::Result;
use crate::logging::SessionTag;

pub mod client;
pub mod id_card;
pub mod mobile_id;
pub mod poller;
pub mod session;
mod signer;
pub mod smart_id;

pub use client::ProviderClient;
pub use id_card::IdCardService;
pub use mobile_id::{MobileIdService, MobileIdSignatory};
pub use poller::{SessionPoller, Settled};
pub use session::{
    PendingSignature, Protocol, SessionState, SessionStatus, SessionStatusPayload, SessionType,
    SigningSession,
};
pub use signer::{AuthStatus, Signer};
pub use smart_id::{SmartIdService, SmartIdSignatory};

/// A signature session as the provider reports it when started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedSignature {
    pub session_id: String,
    /// Hex digest the user's key will sign.
    pub session_hash: String,
    /// Set by providers that keep their own handle on the signature.
    pub signature_id: Option<String>,
}

/// One remote signing provider.
#[async_trait]
pub trait SigningProtocol: Send + Sync {
    /// Whatever identifies the user to this provider.
    type Signatory: Send + Sync;

    fn protocol(&self) -> Protocol;

    /// The user's signing certificate, if the provider can look it up.
    /// `None` means the caller has to supply it.
    async fn signing_certificate(
        &self,
        signatory: &Self::Signatory,
        tag: SessionTag,
    ) -> Result<Option<Certificate>>;

    /// Ask the provider to have the user sign `template`.
    async fn start_signature(
        &self,
        signatory: &Self::Signatory,
        manifest: &[ContainerEntry],
        template: &SignatureTemplate,
        tag: SessionTag,
    ) -> Result<StartedSignature>;

    /// One status request. Never loops; `timeout_ms` is forwarded to the
    /// provider as a long-poll hint.
    async fn session_status(
        &self,
        session_type: SessionType,
        session_id: &str,
        timeout_ms: Option<u64>,
        tag: SessionTag,
    ) -> Result<SessionStatusPayload>;
}
