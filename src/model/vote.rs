use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::mongodb::{serde_binary, serde_uuid};

/// Longest allowed vote option text, in characters.
pub const OPTION_VALUE_MAX_LENGTH: usize = 200;

/// One file of a vote's canonical content: the topic document, the vote
/// metainfo, or the rendering of a single option. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteContainerFile {
    #[serde(with = "serde_uuid")]
    pub vote_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    #[serde(with = "serde_binary")]
    pub content: Vec<u8>,
    /// Files are enumerated in creation order.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl VoteContainerFile {
    pub fn new(
        vote_id: Uuid,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            vote_id,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            content: content.into(),
            created_at,
        }
    }
}

/// A selectable choice in a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOption {
    #[serde(rename = "_id", with = "serde_uuid")]
    pub id: Uuid,
    #[serde(with = "serde_uuid")]
    pub vote_id: Uuid,
    /// Display text.
    pub value: String,
}

impl VoteOption {
    /// Create an option with a fresh ID. The value is trimmed and must be
    /// non-empty and at most [`OPTION_VALUE_MAX_LENGTH`] characters.
    pub fn new(vote_id: Uuid, value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::InvalidInput("vote option value is empty".to_string()));
        }
        if value.chars().count() > OPTION_VALUE_MAX_LENGTH {
            return Err(Error::InvalidInput(format!(
                "vote option value exceeds {OPTION_VALUE_MAX_LENGTH} characters"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            vote_id,
            value: value.to_string(),
        })
    }
}

/// A voter's signed BDOC container, one per `(vote_id, pid)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteUserContainer {
    #[serde(with = "serde_uuid")]
    pub vote_id: Uuid,
    /// Personal identification code of the signer.
    pub pid: String,
    #[serde(with = "serde_uuid")]
    pub user_id: Uuid,
    #[serde(with = "serde_binary")]
    pub container: Vec<u8>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_value_is_trimmed_and_bounded() {
        let vote_id = Uuid::new_v4();
        assert_eq!(VoteOption::new(vote_id, "  Yes \n").unwrap().value, "Yes");
        assert!(VoteOption::new(vote_id, "   ").is_err());
        assert!(VoteOption::new(vote_id, &"x".repeat(OPTION_VALUE_MAX_LENGTH)).is_ok());
        assert!(VoteOption::new(vote_id, &"x".repeat(OPTION_VALUE_MAX_LENGTH + 1)).is_err());
    }
}
