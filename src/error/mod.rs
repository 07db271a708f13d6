use mongodb::error::Error as DbError;
use reqwest::Error as TransportError;
use thiserror::Error;
use uuid::Uuid;
use zip::result::ZipError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The certificate could not be decoded, or lacks a required field.
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),
    /// A selected vote option sanitizes to an empty file name.
    #[error("Vote option {option_id} has no usable file name")]
    OptionFileNameEmpty { option_id: Uuid },
    #[error(transparent)]
    Storage(#[from] DbError),
    /// A non-MongoDB store failed.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    /// The signing provider answered with an error status or an `error` field.
    #[error("Provider error {status}: {message}")]
    Provider {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// The signing provider could not be reached at all.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    /// The returned signature could not be split into `(r, s)`.
    #[error("Malformed signature: {0}")]
    SignatureFormat(String),
    /// The signature was checked and does not match.
    #[error("Signature rejected: {0}")]
    SignatureRejected(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),
    /// Rebuilding the container produced a different manifest than the one signed.
    #[error("Container for vote {vote_id} changed since the signature was initiated")]
    ContainerChanged { vote_id: Uuid },
    #[error("Signing session {0} has not completed")]
    SessionNotComplete(String),
    #[error(transparent)]
    Packaging(#[from] ZipError),
    #[error("Failed to initialise logging: {0}")]
    Logging(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a provider error from a status code and message.
    pub fn provider(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            code,
            message: message.into(),
        }
    }

    /// Is it worth trying the same call again later?
    ///
    /// Only transport failures and provider-side (5xx) faults qualify. The
    /// decision to actually retry belongs to the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Provider { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
