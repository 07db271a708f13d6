use std::collections::HashSet;

use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::digest::{digest_bytes, HashAlgorithm};
use crate::error::{Error, Result};
use crate::model::store::VoteStore;

use super::sanitize::sanitize_file_name;
use super::userinfo::{HtmlUserInfo, UserInfoRenderer};
use super::{is_fixed_file, option_file_name, USERINFO_FILE_NAME, USERINFO_MIME_TYPE};

/// One file of a user container, as listed in the signature manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerEntry {
    pub path: String,
    pub mime_type: String,
    /// Lowercase hex SHA-256 of the content.
    pub digest: String,
}

/// A manifest entry together with the bytes it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFile {
    pub entry: ContainerEntry,
    pub content: Vec<u8>,
}

impl ContainerFile {
    fn new(path: String, mime_type: String, content: Vec<u8>) -> Self {
        let digest = HEXLOWER.encode(&digest_bytes(&content, HashAlgorithm::Sha256));
        Self {
            entry: ContainerEntry {
                path,
                mime_type,
                digest,
            },
            content,
        }
    }

    /// Raw SHA-256 of the content.
    pub fn digest_bytes(&self) -> Vec<u8> {
        digest_bytes(&self.content, HashAlgorithm::Sha256)
    }
}

/// Assembles the file set a voter signs: the vote's fixed files, the files
/// of the options they chose, and a file identifying the voter.
pub struct ContainerBuilder<S, R = HtmlUserInfo> {
    store: S,
    renderer: R,
}

impl<S: VoteStore> ContainerBuilder<S> {
    pub fn new(store: S) -> Self {
        Self::with_renderer(store, HtmlUserInfo)
    }
}

impl<S, R> ContainerBuilder<S, R>
where
    S: VoteStore,
    R: UserInfoRenderer,
{
    pub fn with_renderer(store: S, renderer: R) -> Self {
        Self { store, renderer }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The ordered `{path, mimeType, digest}` manifest for a voter's selection.
    ///
    /// Identical inputs and stored data always give an identical manifest.
    pub async fn build_user_container(
        &self,
        vote_id: Uuid,
        user_id: Uuid,
        selected_options: &[Uuid],
        txn: &mut S::Txn,
    ) -> Result<Vec<ContainerEntry>> {
        let files = self
            .collect_files(vote_id, user_id, selected_options, txn)
            .await?;
        Ok(files.into_iter().map(|file| file.entry).collect())
    }

    /// As [`build_user_container`](Self::build_user_container), keeping the
    /// file contents for packaging.
    pub async fn collect_files(
        &self,
        vote_id: Uuid,
        user_id: Uuid,
        selected_options: &[Uuid],
        txn: &mut S::Txn,
    ) -> Result<Vec<ContainerFile>> {
        let options = self
            .store
            .vote_options(vote_id, selected_options, txn)
            .await?;
        let mut wanted = HashSet::with_capacity(options.len());
        for option in &options {
            let name = sanitize_file_name(&option.value);
            if name.is_empty() {
                return Err(Error::OptionFileNameEmpty {
                    option_id: option.id,
                });
            }
            wanted.insert(option_file_name(&name));
        }

        let mut stored = self.store.container_files(vote_id, txn).await?;
        stored.sort_by_key(|file| file.created_at);

        let (fixed, rest): (Vec<_>, Vec<_>) = stored
            .into_iter()
            .partition(|file| is_fixed_file(&file.file_name));
        let chosen: Vec<_> = rest
            .into_iter()
            .filter(|file| wanted.contains(&file.file_name))
            .collect();
        if chosen.len() != wanted.len() {
            debug!(
                "Vote {vote_id}: {} of {} selected option files found",
                chosen.len(),
                wanted.len()
            );
        }

        let mut files: Vec<ContainerFile> = fixed
            .into_iter()
            .chain(chosen)
            .map(|file| ContainerFile::new(file.file_name, file.mime_type, file.content))
            .collect();

        let user_info = self.renderer.render(user_id)?;
        files.push(ContainerFile::new(
            USERINFO_FILE_NAME.to_string(),
            USERINFO_MIME_TYPE.to_string(),
            user_info,
        ));
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{METAINFO_FILE_NAME, TOPIC_FILE_NAME};
    use crate::model::vote::examples::vote_with_options;
    use crate::model::vote::VoteOption;
    use crate::model::MemoryVoteStore;

    async fn builder_for(
        values: &[&str],
    ) -> (ContainerBuilder<MemoryVoteStore>, Uuid, Vec<VoteOption>) {
        let store = MemoryVoteStore::new();
        let (vote_id, options, files) = vote_with_options(values);
        for file in files {
            store.insert_file(file).await;
        }
        for option in &options {
            store.insert_option(option.clone()).await;
        }
        (ContainerBuilder::new(store), vote_id, options)
    }

    fn paths(entries: &[ContainerEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[tokio::test]
    async fn only_selected_options_included() {
        let (builder, vote_id, options) = builder_for(&["A", "B", "C"]).await;
        let manifest = builder
            .build_user_container(vote_id, Uuid::new_v4(), &[options[1].id], &mut ())
            .await
            .unwrap();
        assert_eq!(
            paths(&manifest),
            [TOPIC_FILE_NAME, METAINFO_FILE_NAME, "B.html", USERINFO_FILE_NAME]
        );
    }

    #[tokio::test]
    async fn options_follow_file_creation_order() {
        let (builder, vote_id, options) = builder_for(&["A", "B", "C"]).await;
        let manifest = builder
            .build_user_container(
                vote_id,
                Uuid::new_v4(),
                &[options[2].id, options[0].id],
                &mut (),
            )
            .await
            .unwrap();
        assert_eq!(
            paths(&manifest),
            [TOPIC_FILE_NAME, METAINFO_FILE_NAME, "A.html", "C.html", USERINFO_FILE_NAME]
        );
    }

    #[tokio::test]
    async fn rebuilding_is_deterministic() {
        let (builder, vote_id, options) = builder_for(&["Yes", "No"]).await;
        let user_id = Uuid::new_v4();
        let first = builder
            .build_user_container(vote_id, user_id, &[options[0].id], &mut ())
            .await
            .unwrap();
        let second = builder
            .build_user_container(vote_id, user_id, &[options[0].id], &mut ())
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn digests_are_sha256_of_content() {
        let (builder, vote_id, options) = builder_for(&["Yes"]).await;
        let files = builder
            .collect_files(vote_id, Uuid::new_v4(), &[options[0].id], &mut ())
            .await
            .unwrap();
        for file in &files {
            assert_eq!(file.entry.digest.len(), 64);
            assert_eq!(file.entry.digest, HEXLOWER.encode(&file.digest_bytes()));
        }
        assert_eq!(files[2].content, b"<html><body>Yes</body></html>");
    }

    #[tokio::test]
    async fn degenerate_option_fails() {
        let (builder, vote_id, _) = builder_for(&["Yes"]).await;
        let bad = VoteOption::new(vote_id, "???").unwrap();
        builder.store().insert_option(bad.clone()).await;

        let result = builder
            .build_user_container(vote_id, Uuid::new_v4(), &[bad.id], &mut ())
            .await;
        assert!(matches!(
            result,
            Err(Error::OptionFileNameEmpty { option_id }) if option_id == bad.id
        ));
    }

    #[tokio::test]
    async fn no_selection_still_has_fixed_files() {
        let (builder, vote_id, _) = builder_for(&["Yes", "No"]).await;
        let manifest = builder
            .build_user_container(vote_id, Uuid::new_v4(), &[], &mut ())
            .await
            .unwrap();
        assert_eq!(
            paths(&manifest),
            [TOPIC_FILE_NAME, METAINFO_FILE_NAME, USERINFO_FILE_NAME]
        );
    }

    struct PlainUserInfo;

    impl UserInfoRenderer for PlainUserInfo {
        fn render(&self, user_id: Uuid) -> Result<Vec<u8>> {
            Ok(user_id.to_string().into_bytes())
        }
    }

    #[tokio::test]
    async fn custom_renderer() {
        let (builder, vote_id, _) = builder_for(&["Yes"]).await;
        let builder = ContainerBuilder::with_renderer(builder.store, PlainUserInfo);
        let user_id = Uuid::new_v4();
        let files = builder
            .collect_files(vote_id, user_id, &[], &mut ())
            .await
            .unwrap();
        let last = files.last().unwrap();
        assert_eq!(last.entry.path, USERINFO_FILE_NAME);
        assert_eq!(last.content, user_id.to_string().into_bytes());
    }
}
