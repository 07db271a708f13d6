use chrono::Utc;
use uuid::Uuid;

use crate::config::SigningConfig;
use crate::container::{
    asice, ContainerBuilder, HtmlUserInfo, SignatureTemplate, UserInfoRenderer,
};
use crate::crypto::{
    random_session_hash, signer, validate, validate_with, verification_code, Certificate,
    PersonalInfo, SessionCompletion,
};
use crate::error::{Error, Result};
use crate::logging::{mask, SessionTag};
use crate::model::{VoteStore, VoteUserContainer};

use super::id_card::IdCardService;
use super::mobile_id::{MobileIdService, MobileIdSignatory};
use super::poller::SessionPoller;
use super::session::{
    PendingSignature, Protocol, SessionState, SessionStatus, SessionStatusPayload, SessionType,
    SigningSession,
};
use super::smart_id::{SmartIdService, SmartIdSignatory};
use super::SigningProtocol;

/// Outcome of one authentication status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStatus {
    pub state: SessionState,
    /// Who authenticated, once the session completed with a valid signature.
    pub identity: Option<PersonalInfo>,
}

/// Entry point for vote signing: builds a voter's container, runs the
/// provider session over it, and stores the signed result.
pub struct Signer<S, R = HtmlUserInfo> {
    config: SigningConfig,
    builder: ContainerBuilder<S, R>,
    id_card: IdCardService,
    mobile_id: MobileIdService,
    smart_id: SmartIdService,
    poller: SessionPoller,
}

impl<S: VoteStore> Signer<S> {
    pub fn new(config: SigningConfig, store: S) -> Result<Self> {
        Self::with_renderer(config, store, HtmlUserInfo)
    }
}

impl<S, R> Signer<S, R>
where
    S: VoteStore,
    R: UserInfoRenderer,
{
    pub fn with_renderer(config: SigningConfig, store: S, renderer: R) -> Result<Self> {
        let display = config.display().clone();
        Ok(Self {
            id_card: IdCardService::new(config.id_card().clone())?,
            mobile_id: MobileIdService::new(config.mobile_id().clone(), display.clone())?,
            smart_id: SmartIdService::new(config.smart_id().clone(), display)?,
            poller: SessionPoller::new(config.poll().clone()),
            builder: ContainerBuilder::with_renderer(store, renderer),
            config,
        })
    }

    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    pub fn builder(&self) -> &ContainerBuilder<S, R> {
        &self.builder
    }

    pub fn store(&self) -> &S {
        self.builder.store()
    }

    /// Build the voter's container and have the ID card behind
    /// `certificate` sign it. The browser drives the card; finish with
    /// [`finalize_signature`](Self::finalize_signature).
    pub async fn sign_init_id_card(
        &self,
        vote_id: Uuid,
        user_id: Uuid,
        option_ids: &[Uuid],
        certificate: &str,
        txn: &mut S::Txn,
    ) -> Result<SigningSession> {
        let certificate = Certificate::parse(certificate)?;
        self.sign_init(&self.id_card, &(), Some(certificate), vote_id, user_id, option_ids, txn)
            .await
    }

    /// Build the voter's container and send it to their Mobile-ID phone.
    pub async fn sign_init_mobile(
        &self,
        vote_id: Uuid,
        user_id: Uuid,
        option_ids: &[Uuid],
        personal_id: &str,
        phone_number: &str,
        txn: &mut S::Txn,
    ) -> Result<SigningSession> {
        let signatory = MobileIdSignatory::new(personal_id, phone_number)?;
        self.sign_init(&self.mobile_id, &signatory, None, vote_id, user_id, option_ids, txn)
            .await
    }

    /// Build the voter's container and send it to their Smart-ID app.
    /// `certificate` comes from an earlier certificate choice.
    #[allow(clippy::too_many_arguments)]
    pub async fn sign_init_smart_id(
        &self,
        vote_id: Uuid,
        user_id: Uuid,
        option_ids: &[Uuid],
        personal_id: &str,
        country_code: &str,
        certificate: &str,
        txn: &mut S::Txn,
    ) -> Result<SigningSession> {
        let signatory = SmartIdSignatory::new(personal_id, country_code)?;
        let certificate = Certificate::parse(certificate)?;
        self.sign_init(
            &self.smart_id,
            &signatory,
            Some(certificate),
            vote_id,
            user_id,
            option_ids,
            txn,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn sign_init<P: SigningProtocol>(
        &self,
        provider: &P,
        signatory: &P::Signatory,
        certificate: Option<Certificate>,
        vote_id: Uuid,
        user_id: Uuid,
        option_ids: &[Uuid],
        txn: &mut S::Txn,
    ) -> Result<SigningSession> {
        let tag = SessionTag::next();
        let protocol = provider.protocol();
        info!("->sign{tag} {protocol} signature for vote {vote_id}");

        let manifest = self
            .builder
            .build_user_container(vote_id, user_id, option_ids, txn)
            .await?;
        let certificate = match certificate {
            Some(certificate) => certificate,
            None => provider
                .signing_certificate(signatory, tag)
                .await?
                .ok_or_else(|| {
                    Error::InvalidInput(format!("{protocol} needs a signing certificate"))
                })?,
        };
        if !certificate.is_valid_at(Utc::now()) {
            warn!("->sign{tag} signing certificate is outside its validity period");
        }

        let template = SignatureTemplate::new(&manifest, &certificate, Utc::now())?;
        let started = provider
            .start_signature(signatory, &manifest, &template, tag)
            .await?;
        let challenge_id = verification_code(&started.session_hash)?;
        info!("<-sign{tag} {protocol} session {} started", started.session_id);

        Ok(SigningSession {
            session_id: started.session_id,
            session_hash: started.session_hash,
            challenge_id,
            protocol,
            session_type: SessionType::Signature,
            status: SessionStatus::Initiated,
            signature_id: started.signature_id,
            pending: Some(PendingSignature {
                vote_id,
                user_id,
                option_ids: option_ids.to_vec(),
                manifest,
                template,
            }),
        })
    }

    /// Start a Mobile-ID authentication over a fresh random hash.
    pub async fn authenticate_mobile(
        &self,
        personal_id: &str,
        phone_number: &str,
    ) -> Result<SigningSession> {
        let signatory = MobileIdSignatory::new(personal_id, phone_number)?;
        let tag = SessionTag::next();
        info!("->auth{tag} mobileId for {}", mask(&signatory.personal_id));

        let session_hash = random_session_hash();
        let session_id = self
            .mobile_id
            .authenticate(&signatory, &session_hash, tag)
            .await?;
        auth_session(Protocol::MobileId, session_id, session_hash)
    }

    /// Start a Smart-ID authentication over a fresh random hash.
    pub async fn authenticate_smart_id(
        &self,
        personal_id: &str,
        country_code: &str,
    ) -> Result<SigningSession> {
        let signatory = SmartIdSignatory::new(personal_id, country_code)?;
        let tag = SessionTag::next();
        info!("->auth{tag} smartId for {}", mask(&signatory.personal_id));

        let session_hash = random_session_hash();
        let session_id = self
            .smart_id
            .authenticate(&signatory, &session_hash, tag)
            .await?;
        auth_session(Protocol::SmartId, session_id, session_hash)
    }

    /// The Mobile-ID signing certificate of a user.
    pub async fn mobile_certificate(
        &self,
        personal_id: &str,
        phone_number: &str,
    ) -> Result<Certificate> {
        let signatory = MobileIdSignatory::new(personal_id, phone_number)?;
        self.mobile_id.certificate(&signatory, SessionTag::next()).await
    }

    /// Start a Smart-ID certificate choice. Poll it with
    /// [`session_state`](Self::session_state) until it yields
    /// [`SessionState::CertificateChosen`].
    pub async fn smart_id_certificate_choice(
        &self,
        personal_id: &str,
        country_code: &str,
    ) -> Result<SigningSession> {
        let signatory = SmartIdSignatory::new(personal_id, country_code)?;
        let session_id = self
            .smart_id
            .certificate_choice(&signatory, SessionTag::next())
            .await?;
        Ok(SigningSession {
            session_id,
            session_hash: String::new(),
            challenge_id: String::new(),
            protocol: Protocol::SmartId,
            session_type: SessionType::Certificate,
            status: SessionStatus::Initiated,
            signature_id: None,
            pending: None,
        })
    }

    /// One status request to the provider, returned as it came.
    ///
    /// Without a `timeout_ms` the configured default hint is used, if any.
    pub async fn get_session_status(
        &self,
        protocol: Protocol,
        session_type: SessionType,
        session_id: &str,
        timeout_ms: Option<u64>,
    ) -> Result<SessionStatusPayload> {
        let timeout_ms = timeout_ms.or(self.config.status_timeout_ms());
        let tag = SessionTag::next();
        match protocol {
            Protocol::IdCard => {
                self.id_card
                    .session_status(session_type, session_id, timeout_ms, tag)
                    .await
            }
            Protocol::MobileId => {
                self.mobile_id
                    .session_status(session_type, session_id, timeout_ms, tag)
                    .await
            }
            Protocol::SmartId => {
                self.smart_id
                    .session_status(session_type, session_id, timeout_ms, tag)
                    .await
            }
        }
    }

    /// As [`get_session_status`](Self::get_session_status), interpreted.
    pub async fn session_state(
        &self,
        protocol: Protocol,
        session_type: SessionType,
        session_id: &str,
        timeout_ms: Option<u64>,
    ) -> Result<SessionState> {
        self.get_session_status(protocol, session_type, session_id, timeout_ms)
            .await?
            .into_state()
    }

    /// Poll a signature session once.
    ///
    /// A completed session's signature is checked against the session
    /// hash; one that does not verify is `SignatureRejected`.
    pub async fn status_sign(
        &self,
        session: &mut SigningSession,
        timeout_ms: Option<u64>,
    ) -> Result<SessionState> {
        expect_type(session, SessionType::Signature)?;
        let state = self
            .session_state(session.protocol, session.session_type, &session.session_id, timeout_ms)
            .await?;
        settle(session, state)
    }

    /// Poll a signature session until it settles, on the configured backoff.
    pub async fn await_signature(&self, session: &mut SigningSession) -> Result<SessionState> {
        expect_type(session, SessionType::Signature)?;
        let (protocol, session_type) = (session.protocol, session.session_type);
        let session_id = session.session_id.as_str();
        let state = self
            .poller
            .poll_until_settled(move || self.session_state(protocol, session_type, session_id, None))
            .await?;
        settle(session, state)
    }

    /// Poll an authentication session once, identifying the user when it
    /// completes with a valid signature.
    pub async fn status_auth(
        &self,
        session: &mut SigningSession,
        timeout_ms: Option<u64>,
    ) -> Result<AuthStatus> {
        expect_type(session, SessionType::Authentication)?;
        let state = self
            .session_state(session.protocol, session.session_type, &session.session_id, timeout_ms)
            .await?;
        let state = settle(session, state)?;
        let identity = match &state {
            SessionState::Complete(completion) => Some(signer(completion)?.personal_info()?),
            _ => None,
        };
        if let Some(identity) = &identity {
            info!(
                "<-auth {} session {} authenticated {}",
                session.protocol,
                session.session_id,
                mask(&identity.pid)
            );
        }
        Ok(AuthStatus { state, identity })
    }

    /// Turn a completed signature into the voter's stored BDOC container.
    ///
    /// The signature must verify and be made with the certificate the
    /// session was started with. The container is rebuilt and must match
    /// what was signed; a vote edited in between is `ContainerChanged`.
    pub async fn finalize_signature(
        &self,
        session: &SigningSession,
        completion: &SessionCompletion,
        txn: &mut S::Txn,
    ) -> Result<VoteUserContainer> {
        let pending = session.pending.as_ref().ok_or_else(|| {
            Error::SessionNotComplete(format!(
                "session {} has no pending signature",
                session.session_id
            ))
        })?;

        let certificate = signer(completion)?;
        if &certificate != pending.template.certificate() {
            return Err(Error::SignatureRejected(
                "signed with a different certificate than the session was started with"
                    .to_string(),
            ));
        }
        if !validate_with(&certificate, &completion.signature, &session.session_hash)? {
            return Err(Error::SignatureRejected(format!(
                "signature for session {} does not verify",
                session.session_id
            )));
        }

        let files = self
            .builder
            .collect_files(pending.vote_id, pending.user_id, &pending.option_ids, txn)
            .await?;
        if files.iter().map(|file| &file.entry).ne(pending.manifest.iter()) {
            warn!(
                "Container for vote {} changed during signing session {}",
                pending.vote_id, session.session_id
            );
            return Err(Error::ContainerChanged {
                vote_id: pending.vote_id,
            });
        }

        let signature_xml = pending
            .template
            .clone()
            .into_signature_document(&completion.signature);
        let container = VoteUserContainer {
            vote_id: pending.vote_id,
            pid: certificate.personal_info()?.pid,
            user_id: pending.user_id,
            container: asice::package(&files, &signature_xml)?,
            created_at: Utc::now(),
        };
        self.store().save_user_container(&container, txn).await?;
        info!(
            "Stored signed container for vote {} by {}",
            container.vote_id,
            mask(&container.pid)
        );
        Ok(container)
    }
}

fn auth_session(protocol: Protocol, session_id: String, session_hash: String) -> Result<SigningSession> {
    let challenge_id = verification_code(&session_hash)?;
    Ok(SigningSession {
        session_id,
        session_hash,
        challenge_id,
        protocol,
        session_type: SessionType::Authentication,
        status: SessionStatus::Initiated,
        signature_id: None,
        pending: None,
    })
}

fn expect_type(session: &SigningSession, session_type: SessionType) -> Result<()> {
    if session.session_type != session_type {
        return Err(Error::InvalidInput(format!(
            "session {} is a {:?} session, not {:?}",
            session.session_id, session.session_type, session_type
        )));
    }
    Ok(())
}

/// Record a polled state on the session, rejecting completed sessions
/// whose signature does not verify.
fn settle(session: &mut SigningSession, state: SessionState) -> Result<SessionState> {
    if let SessionState::Complete(completion) = &state {
        if !validate(completion, &session.session_hash)? {
            session.status = SessionStatus::Failed;
            warn!(
                "<-{} session {} returned a signature that does not verify",
                session.protocol, session.session_id
            );
            return Err(Error::SignatureRejected(format!(
                "signature for session {} does not verify",
                session.session_id
            )));
        }
    }
    if state.status() != session.status {
        debug!(
            "{} session {}: {:?} -> {:?}",
            session.protocol,
            session.session_id,
            session.status,
            state.status()
        );
    }
    session.status = state.status();
    Ok(state)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use assert_matches::assert_matches;
    use data_encoding::{BASE64, HEXLOWER};
    use mockito::{Matcher, Server, ServerGuard};
    use p256::ecdsa::signature::hazmat::PrehashSigner;
    use p256::pkcs8::DecodePrivateKey;
    use serde_json::json;

    use super::*;
    use crate::config::ProviderConfig;
    use crate::container::{METAINFO_FILE_NAME, TOPIC_FILE_NAME, USERINFO_FILE_NAME};
    use crate::crypto::certificate::tests::{SIGNER_P256_PEM, SIGNER_RSA_PEM};
    use crate::crypto::validator::tests::sign_rsa;
    use crate::model::vote::examples::{created, vote_with_options};
    use crate::model::{MemoryVoteStore, VoteContainerFile, VoteOption};

    const SIGNER_P256_KEY: &str = include_str!("../../tests/fixtures/signer-p256.key");
    const PID: &str = "38001085718";
    const PHONE: &str = "+37251234567";

    struct Fixture {
        server: ServerGuard,
        signer: Signer<MemoryVoteStore>,
        vote_id: Uuid,
        options: Vec<VoteOption>,
    }

    async fn fixture() -> Fixture {
        // These tests run the whole signing path, so enable logging.
        log4rs_test_utils::test_logging::init_logging_once_for(["cos_signature"], None, None);

        let server = Server::new_async().await;
        let url = server.url();
        let config = SigningConfig::new(
            ProviderConfig::default().with_base_url(&format!("{url}/idcard")),
            ProviderConfig::default().with_base_url(&format!("{url}/mid-api")),
            ProviderConfig::default().with_base_url(&format!("{url}/v2")),
        );
        let store = MemoryVoteStore::new();
        let (vote_id, options, files) = vote_with_options(&["Yes", "No"]);
        for file in files {
            store.insert_file(file).await;
        }
        for option in &options {
            store.insert_option(option.clone()).await;
        }
        Fixture {
            server,
            signer: Signer::new(config, store).unwrap(),
            vote_id,
            options,
        }
    }

    fn certificate_b64() -> String {
        Certificate::parse(SIGNER_P256_PEM).unwrap().to_base64()
    }

    fn sign(session_hash: &str) -> String {
        let key = p256::ecdsa::SigningKey::from_pkcs8_pem(SIGNER_P256_KEY).unwrap();
        let prehash = HEXLOWER.decode(session_hash.as_bytes()).unwrap();
        let signature: p256::ecdsa::Signature = key.sign_prehash(&prehash).unwrap();
        BASE64.encode(&signature.to_bytes())
    }

    fn completion(session_hash: &str) -> SessionCompletion {
        SessionCompletion {
            certificate: certificate_b64(),
            signature: sign(session_hash),
            algorithm: Some("SHA256WithECEncryption".to_string()),
        }
    }

    async fn mock_mobile_init(server: &mut ServerGuard) {
        server
            .mock("POST", "/mid-api/certificate")
            .with_body(json!({"result": "OK", "cert": certificate_b64()}).to_string())
            .create_async()
            .await;
        server
            .mock("POST", "/mid-api/signature")
            .match_body(Matcher::PartialJson(json!({
                "nationalIdentityNumber": PID,
                "phoneNumber": PHONE,
            })))
            .with_body(r#"{"sessionID": "mid-session"}"#)
            .create_async()
            .await;
    }

    async fn mock_mobile_complete(server: &mut ServerGuard, session_type: &str, completion: &SessionCompletion) {
        server
            .mock("GET", format!("/mid-api/{session_type}/session/mid-session").as_str())
            .match_query(Matcher::Any)
            .with_body(
                json!({
                    "state": "COMPLETE",
                    "result": "OK",
                    "signature": {"value": completion.signature, "algorithm": "SHA256WithECEncryption"},
                    "cert": completion.certificate,
                })
                .to_string(),
            )
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn mobile_signature_end_to_end() {
        let mut f = fixture().await;
        mock_mobile_init(&mut f.server).await;
        let user_id = Uuid::new_v4();

        let mut session = f
            .signer
            .sign_init_mobile(f.vote_id, user_id, &[f.options[0].id], PID, PHONE, &mut ())
            .await
            .unwrap();
        assert_eq!(session.session_id, "mid-session");
        assert_eq!(session.protocol, Protocol::MobileId);
        assert_eq!(session.status, SessionStatus::Initiated);
        assert_eq!(session.challenge_id, verification_code(&session.session_hash).unwrap());
        let pending = session.pending.clone().unwrap();
        let paths: Vec<_> = pending.manifest.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, [TOPIC_FILE_NAME, METAINFO_FILE_NAME, "Yes.html", USERINFO_FILE_NAME]);
        assert_eq!(session.session_hash, pending.template.session_hash());

        let completion = completion(&session.session_hash);
        mock_mobile_complete(&mut f.server, "signature", &completion).await;
        let state = f.signer.status_sign(&mut session, Some(1000)).await.unwrap();
        assert_eq!(state, SessionState::Complete(completion.clone()));
        assert_eq!(session.status, SessionStatus::Complete);

        let container = f
            .signer
            .finalize_signature(&session, &completion, &mut ())
            .await
            .unwrap();
        assert_eq!(container.pid, PID);
        assert_eq!(container.user_id, user_id);
        let stored = f.signer.store().user_container(f.vote_id, PID).await.unwrap();
        assert_eq!(stored, container);

        let mut archive = zip::ZipArchive::new(Cursor::new(container.container)).unwrap();
        assert_eq!(archive.by_index(0).unwrap().name(), "mimetype");
        assert!(archive.by_name("No.html").is_err());
        let mut signature_xml = String::new();
        archive
            .by_name("META-INF/signatures0.xml")
            .unwrap()
            .read_to_string(&mut signature_xml)
            .unwrap();
        assert!(signature_xml.contains(&completion.signature));
        assert!(signature_xml.contains(pending.template.signed_info()));
    }

    #[tokio::test]
    async fn await_signature_polls_until_complete() {
        let mut f = fixture().await;
        mock_mobile_init(&mut f.server).await;
        let mut session = f
            .signer
            .sign_init_mobile(f.vote_id, Uuid::new_v4(), &[f.options[1].id], PID, PHONE, &mut ())
            .await
            .unwrap();
        mock_mobile_complete(&mut f.server, "signature", &completion(&session.session_hash)).await;

        let state = f.signer.await_signature(&mut session).await.unwrap();
        assert_matches!(state, SessionState::Complete(_));
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let mut f = fixture().await;
        mock_mobile_init(&mut f.server).await;
        let mut session = f
            .signer
            .sign_init_mobile(f.vote_id, Uuid::new_v4(), &[f.options[0].id], PID, PHONE, &mut ())
            .await
            .unwrap();
        // Signed over something else.
        let wrong = completion(&"00".repeat(32));
        mock_mobile_complete(&mut f.server, "signature", &wrong).await;

        let result = f.signer.status_sign(&mut session, None).await;
        assert_matches!(result, Err(Error::SignatureRejected(_)));
        assert_eq!(session.status, SessionStatus::Failed);

        let result = f.signer.finalize_signature(&session, &wrong, &mut ()).await;
        assert_matches!(result, Err(Error::SignatureRejected(_)));
        assert!(f.signer.store().user_container(f.vote_id, PID).await.is_none());
    }

    #[tokio::test]
    async fn edited_vote_is_not_finalized() {
        let mut f = fixture().await;
        mock_mobile_init(&mut f.server).await;
        let session = f
            .signer
            .sign_init_mobile(f.vote_id, Uuid::new_v4(), &[f.options[0].id], PID, PHONE, &mut ())
            .await
            .unwrap();

        f.signer
            .store()
            .insert_file(VoteContainerFile::new(
                f.vote_id,
                "Yes.html",
                "text/html",
                b"changed".to_vec(),
                created(100),
            ))
            .await;

        let result = f
            .signer
            .finalize_signature(&session, &completion(&session.session_hash), &mut ())
            .await;
        assert_matches!(result, Err(Error::ContainerChanged { vote_id }) if vote_id == f.vote_id);
    }

    #[tokio::test]
    async fn invalid_phone_never_reaches_provider() {
        let mut f = fixture().await;
        let mock = f
            .server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let result = f
            .signer
            .sign_init_mobile(f.vote_id, Uuid::new_v4(), &[], PID, "not a phone", &mut ())
            .await;
        assert_matches!(result, Err(Error::InvalidInput(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn mobile_provider_error_propagates() {
        let mut f = fixture().await;
        f.server
            .mock("POST", "/mid-api/certificate")
            .with_body(json!({"result": "OK", "cert": certificate_b64()}).to_string())
            .create_async()
            .await;
        f.server
            .mock("POST", "/mid-api/signature")
            .with_status(400)
            .with_body(r#"{"error": "X"}"#)
            .create_async()
            .await;

        let result = f
            .signer
            .sign_init_mobile(f.vote_id, Uuid::new_v4(), &[f.options[0].id], PID, PHONE, &mut ())
            .await;
        assert_matches!(result, Err(Error::Provider { status: 400, message, .. }) if message == "X");
    }

    #[tokio::test]
    async fn id_card_provider_error_propagates() {
        let mut f = fixture().await;
        f.server
            .mock("POST", "/idcard/signature/prepare")
            .with_status(200)
            .with_body(r#"{"error": "X"}"#)
            .create_async()
            .await;

        let result = f
            .signer
            .sign_init_id_card(f.vote_id, Uuid::new_v4(), &[f.options[0].id], SIGNER_P256_PEM, &mut ())
            .await;
        assert_matches!(result, Err(Error::Provider { status: 200, message, .. }) if message == "X");
    }

    #[tokio::test]
    async fn id_card_session_finalizes_with_card_signature() {
        let mut f = fixture().await;
        let user_id = Uuid::new_v4();
        // The service echoes the digest it was asked to prepare.
        f.server
            .mock("POST", "/idcard/signature/prepare")
            .with_body_from_request(|request| {
                let body: serde_json::Value = serde_json::from_slice(request.body().unwrap()).unwrap();
                json!({"signatureId": "S0", "signedInfoDigest": body["signedInfoDigest"]})
                    .to_string()
                    .into_bytes()
            })
            .create_async()
            .await;

        let session = f
            .signer
            .sign_init_id_card(f.vote_id, user_id, &[f.options[1].id], SIGNER_P256_PEM, &mut ())
            .await
            .unwrap();
        assert_eq!(session.signature_id.as_deref(), Some("S0"));
        assert_eq!(session.protocol, Protocol::IdCard);

        let container = f
            .signer
            .finalize_signature(&session, &completion(&session.session_hash), &mut ())
            .await
            .unwrap();
        assert_eq!(container.pid, PID);
    }

    #[tokio::test]
    async fn mobile_authentication_identifies_user() {
        let mut f = fixture().await;
        f.server
            .mock("POST", "/mid-api/authentication")
            .with_body(r#"{"sessionID": "mid-session"}"#)
            .create_async()
            .await;

        let mut session = f.signer.authenticate_mobile(PID, PHONE).await.unwrap();
        assert_eq!(session.session_type, SessionType::Authentication);
        assert_eq!(session.session_hash.len(), 64);
        assert_eq!(session.challenge_id.len(), 4);
        assert!(session.pending.is_none());

        mock_mobile_complete(&mut f.server, "authentication", &completion(&session.session_hash)).await;
        let status = f.signer.status_auth(&mut session, None).await.unwrap();
        let identity = status.identity.unwrap();
        assert_eq!(identity.pid, PID);
        assert_eq!(identity.country, "EE");
        assert_eq!(session.status, SessionStatus::Complete);

        // A signature session check refuses an authentication session.
        assert_matches!(
            f.signer.status_sign(&mut session, None).await,
            Err(Error::InvalidInput(_))
        );
    }

    #[tokio::test]
    async fn smart_id_signature_with_rsa_certificate() {
        const SMART_ID_PID: &str = "30303039914";
        let mut f = fixture().await;
        let rsa_certificate = Certificate::parse(SIGNER_RSA_PEM).unwrap().to_base64();
        f.server
            .mock("POST", "/v2/certificatechoice/etsi/PNOEE-30303039914")
            .with_body(r#"{"sessionID": "choice"}"#)
            .create_async()
            .await;
        f.server
            .mock("GET", "/v2/session/choice")
            .match_query(Matcher::Any)
            .with_body(
                json!({
                    "state": "COMPLETE",
                    "result": {"endResult": "OK", "documentNumber": "PNOEE-30303039914-MOCK-Q"},
                    "cert": {"value": rsa_certificate, "certificateLevel": "QUALIFIED"},
                })
                .to_string(),
            )
            .create_async()
            .await;
        f.server
            .mock("POST", "/v2/signature/etsi/PNOEE-30303039914")
            .with_body(r#"{"sessionID": "sign"}"#)
            .create_async()
            .await;

        let choice = f
            .signer
            .smart_id_certificate_choice(SMART_ID_PID, "EE")
            .await
            .unwrap();
        let state = f
            .signer
            .session_state(choice.protocol, choice.session_type, &choice.session_id, None)
            .await
            .unwrap();
        let certificate = match state {
            SessionState::CertificateChosen { certificate } => certificate,
            other => panic!("unexpected state {other:?}"),
        };

        let user_id = Uuid::new_v4();
        let mut session = f
            .signer
            .sign_init_smart_id(f.vote_id, user_id, &[f.options[0].id], SMART_ID_PID, "EE", &certificate, &mut ())
            .await
            .unwrap();
        assert_eq!(session.session_id, "sign");
        assert_eq!(session.protocol, Protocol::SmartId);
        let signed_info = session.pending.as_ref().unwrap().template.signed_info().to_string();
        assert!(signed_info.contains("xmldsig-more#rsa-sha256"));

        let signature = BASE64.encode(&sign_rsa(&session.session_hash));
        f.server
            .mock("GET", "/v2/session/sign")
            .match_query(Matcher::Any)
            .with_body(
                json!({
                    "state": "COMPLETE",
                    "result": {"endResult": "OK", "documentNumber": "PNOEE-30303039914-MOCK-Q"},
                    "signature": {"value": signature, "algorithm": "sha256WithRSAEncryption"},
                    "cert": {"value": rsa_certificate, "certificateLevel": "QUALIFIED"},
                })
                .to_string(),
            )
            .create_async()
            .await;

        let state = f.signer.status_sign(&mut session, None).await.unwrap();
        let completion = match state {
            SessionState::Complete(completion) => completion,
            other => panic!("unexpected state {other:?}"),
        };
        assert_eq!(session.status, SessionStatus::Complete);

        let container = f
            .signer
            .finalize_signature(&session, &completion, &mut ())
            .await
            .unwrap();
        assert_eq!(container.pid, SMART_ID_PID);
        assert_eq!(container.user_id, user_id);
    }

    #[tokio::test]
    async fn id_card_has_no_status() {
        let f = fixture().await;
        let result = f
            .signer
            .get_session_status(Protocol::IdCard, SessionType::Signature, "x", None)
            .await;
        assert_matches!(result, Err(Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn configured_timeout_is_default_hint() {
        let mut f = fixture().await;
        let config = f.signer.config().clone().with_status_timeout_ms(2500);
        let store = f.signer.store().clone();
        f.signer = Signer::new(config, store).unwrap();
        let mock = f
            .server
            .mock("GET", "/mid-api/authentication/session/abc")
            .match_query(Matcher::UrlEncoded("timeoutMs".into(), "2500".into()))
            .with_body(r#"{"state": "RUNNING"}"#)
            .create_async()
            .await;

        let state = f
            .signer
            .session_state(Protocol::MobileId, SessionType::Authentication, "abc", None)
            .await
            .unwrap();
        assert_eq!(state, SessionState::Polling);
        mock.assert_async().await;
    }
}
