//! Building, signing templates for, and packaging per-voter BDOC containers.

pub mod asice;
pub mod builder;
pub mod sanitize;
pub mod userinfo;
pub mod xades;

pub use asice::package;
pub use builder::{ContainerBuilder, ContainerEntry, ContainerFile};
pub use sanitize::sanitize_file_name;
pub use userinfo::{HtmlUserInfo, UserInfoRenderer};
pub use xades::SignatureTemplate;

/// The topic's document, always included.
pub const TOPIC_FILE_NAME: &str = "document.docx";
/// The vote's description, always included.
pub const METAINFO_FILE_NAME: &str = "__metainfo.html";
/// Generated per voter, always last.
pub const USERINFO_FILE_NAME: &str = "__userinfo.html";
pub const USERINFO_MIME_TYPE: &str = "text/html";

/// Files included whatever the voter chose.
pub fn is_fixed_file(file_name: &str) -> bool {
    file_name == TOPIC_FILE_NAME || file_name == METAINFO_FILE_NAME
}

/// The stored file name for an option with the given sanitized text.
pub fn option_file_name(sanitized: &str) -> String {
    format!("{sanitized}.html")
}
