use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File read by [`SigningConfig::load`], relative to the working directory.
pub const CONFIG_FILE: &str = "Signing.toml";

/// Prefix of environment variables overriding [`CONFIG_FILE`].
/// Nested keys are separated by `__`, e.g. `COS_SIGNING_MOBILE_ID__HOSTNAME`.
pub const ENV_PREFIX: &str = "COS_SIGNING_";

/// Connection details for one remote signing provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    // non-secrets
    #[serde(default = "default_scheme")]
    scheme: String,
    hostname: String,
    port: u16,
    #[serde(default)]
    api_path: String,
    relying_party_uuid: String,
    relying_party_name: String,
    // secrets
    #[serde(default)]
    authorize_token: String,
}

fn default_scheme() -> String {
    "https".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            hostname: "localhost".to_string(),
            port: 443,
            api_path: String::new(),
            relying_party_uuid: "00000000-0000-0000-0000-000000000000".to_string(),
            relying_party_name: "DEMO".to_string(),
            authorize_token: String::new(),
        }
    }
}

impl ProviderConfig {
    pub fn new(
        hostname: impl Into<String>,
        port: u16,
        api_path: impl Into<String>,
        relying_party_uuid: impl Into<String>,
        relying_party_name: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            api_path: api_path.into(),
            relying_party_uuid: relying_party_uuid.into(),
            relying_party_name: relying_party_name.into(),
            ..Default::default()
        }
    }

    /// Point this provider at a complete base URL, e.g. a local mock server.
    pub fn with_base_url(mut self, url: &str) -> Self {
        let (scheme, rest) = url.split_once("://").unwrap_or(("https", url));
        let (authority, path) = match rest.find('/') {
            Some(i) => rest.split_at(i),
            None => (rest, ""),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().unwrap_or(self.port)),
            None => (authority, self.port),
        };
        self.scheme = scheme.to_string();
        self.hostname = host.to_string();
        self.port = port;
        self.api_path = path.trim_end_matches('/').to_string();
        self
    }

    pub fn with_authorize_token(mut self, token: impl Into<String>) -> Self {
        self.authorize_token = token.into();
        self
    }

    /// `scheme://hostname:port` followed by the API path, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme,
            self.hostname,
            self.port,
            self.api_path.trim_end_matches('/')
        )
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn api_path(&self) -> &str {
        &self.api_path
    }

    /// Identifies us to the provider.
    pub fn relying_party_uuid(&self) -> &str {
        &self.relying_party_uuid
    }

    pub fn relying_party_name(&self) -> &str {
        &self.relying_party_name
    }

    /// Bearer token sent with every request. Empty means no `Authorization` header.
    pub fn authorize_token(&self) -> &str {
        &self.authorize_token
    }
}

/// Bounds for the optional caller-side session poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10_000,
        }
    }
}

impl PollConfig {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: initial_backoff.as_millis() as u64,
            max_backoff_ms: max_backoff.as_millis() as u64,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Signing configuration, derived from [`CONFIG_FILE`] and `COS_SIGNING_*`
/// environment variables. Every [`crate::signing::Signer`] owns its own copy,
/// so differently configured signers can coexist in one process.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SigningConfig {
    id_card: ProviderConfig,
    mobile_id: ProviderConfig,
    smart_id: ProviderConfig,
    #[serde(default)]
    display: DisplayConfig,
    #[serde(default)]
    status_timeout_ms: Option<u64>,
    #[serde(default)]
    poll: PollConfig,
}

/// What the signer sees on their phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    language: String,
    display_text: String,
    display_text_format: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            language: "EST".to_string(),
            display_text: "CitizenOS vote".to_string(),
            display_text_format: "GSM-7".to_string(),
        }
    }
}

impl DisplayConfig {
    /// Mobile-ID language code (`EST`, `ENG`, `RUS`, `LIT`).
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    /// `GSM-7` or `UCS-2`.
    pub fn display_text_format(&self) -> &str {
        &self.display_text_format
    }
}

impl SigningConfig {
    pub fn new(id_card: ProviderConfig, mobile_id: ProviderConfig, smart_id: ProviderConfig) -> Self {
        Self {
            id_card,
            mobile_id,
            smart_id,
            ..Default::default()
        }
    }

    /// The layered configuration sources: defaults, then the TOML file, then
    /// the environment.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(SigningConfig::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract the configuration from [`SigningConfig::figment`].
    pub fn load() -> Result<Self> {
        let config = Self::figment().extract::<Self>()?;
        info!(
            "Loaded signing config (Mobile-ID at {}, Smart-ID at {})",
            config.mobile_id.base_url(),
            config.smart_id.base_url()
        );
        Ok(config)
    }

    /// The ID-card signing service.
    pub fn id_card(&self) -> &ProviderConfig {
        &self.id_card
    }

    /// The Mobile-ID REST gateway.
    pub fn mobile_id(&self) -> &ProviderConfig {
        &self.mobile_id
    }

    /// The Smart-ID relying party API.
    pub fn smart_id(&self) -> &ProviderConfig {
        &self.smart_id
    }

    pub fn display(&self) -> &DisplayConfig {
        &self.display
    }

    /// Long-poll hint used when a status call does not give its own.
    pub fn status_timeout_ms(&self) -> Option<u64> {
        self.status_timeout_ms
    }

    pub fn poll(&self) -> &PollConfig {
        &self.poll
    }

    pub fn with_display(mut self, display: DisplayConfig) -> Self {
        self.display = display;
        self
    }

    pub fn with_status_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.status_timeout_ms = Some(timeout_ms);
        self
    }
}
