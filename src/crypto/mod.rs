pub mod certificate;
pub mod digest;
pub mod keys;
pub mod validator;

pub use certificate::{Certificate, PersonalInfo, SubjectField};
pub use digest::{hash, random_session_hash, verification_code, HashAlgorithm};
pub use keys::PublicKey;
pub use validator::{signer, validate, validate_with, SessionCompletion};
