use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::vote::{VoteContainerFile, VoteOption, VoteUserContainer};

/// Persistence the signing pipeline reads vote content from and writes
/// signed containers to.
///
/// Every call takes the caller's transaction so that a container build sees
/// one consistent snapshot of the vote, even while options are being edited
/// or the vote is being closed elsewhere.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// The caller-supplied transaction handle.
    type Txn: Send;

    /// All container files of a vote, in creation order.
    async fn container_files(
        &self,
        vote_id: Uuid,
        txn: &mut Self::Txn,
    ) -> Result<Vec<VoteContainerFile>>;

    /// The options of `vote_id` with the given IDs, in the order requested.
    ///
    /// An ID that is not an option of this vote, or one given more than
    /// once, is an `InvalidInput` error.
    async fn vote_options(
        &self,
        vote_id: Uuid,
        option_ids: &[Uuid],
        txn: &mut Self::Txn,
    ) -> Result<Vec<VoteOption>>;

    /// Insert or replace the signed container for `(vote_id, pid)`.
    async fn save_user_container(
        &self,
        container: &VoteUserContainer,
        txn: &mut Self::Txn,
    ) -> Result<()>;
}

/// Put the found options in the order they were asked for.
pub(crate) fn order_options(
    vote_id: Uuid,
    option_ids: &[Uuid],
    found: Vec<VoteOption>,
) -> Result<Vec<VoteOption>> {
    let mut by_id: HashMap<Uuid, VoteOption> =
        found.into_iter().map(|option| (option.id, option)).collect();
    let mut seen = HashSet::with_capacity(option_ids.len());
    option_ids
        .iter()
        .map(|id| {
            if !seen.insert(*id) {
                return Err(Error::InvalidInput(format!("option {id} selected more than once")));
            }
            by_id.remove(id).ok_or_else(|| {
                Error::InvalidInput(format!("option {id} does not belong to vote {vote_id}"))
            })
        })
        .collect()
}

#[derive(Default)]
struct Tables {
    files: Vec<VoteContainerFile>,
    options: Vec<VoteOption>,
    containers: HashMap<(Uuid, String), VoteUserContainer>,
}

/// A [`VoteStore`] held in process memory, for embedding without a database
/// and for tests. It has no transactions; `Txn` is `()`.
#[derive(Clone, Default)]
pub struct MemoryVoteStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_file(&self, file: VoteContainerFile) {
        self.tables.write().await.files.push(file);
    }

    pub async fn insert_option(&self, option: VoteOption) {
        self.tables.write().await.options.push(option);
    }

    /// The stored container for a voter, if any.
    pub async fn user_container(&self, vote_id: Uuid, pid: &str) -> Option<VoteUserContainer> {
        self.tables
            .read()
            .await
            .containers
            .get(&(vote_id, pid.to_string()))
            .cloned()
    }
}

#[async_trait]
impl VoteStore for MemoryVoteStore {
    type Txn = ();

    async fn container_files(&self, vote_id: Uuid, _txn: &mut ()) -> Result<Vec<VoteContainerFile>> {
        let mut files: Vec<_> = self
            .tables
            .read()
            .await
            .files
            .iter()
            .filter(|file| file.vote_id == vote_id)
            .cloned()
            .collect();
        // Stable, so insertion order breaks ties.
        files.sort_by_key(|file| file.created_at);
        Ok(files)
    }

    async fn vote_options(
        &self,
        vote_id: Uuid,
        option_ids: &[Uuid],
        _txn: &mut (),
    ) -> Result<Vec<VoteOption>> {
        let found = self
            .tables
            .read()
            .await
            .options
            .iter()
            .filter(|option| option.vote_id == vote_id && option_ids.contains(&option.id))
            .cloned()
            .collect();
        order_options(vote_id, option_ids, found)
    }

    async fn save_user_container(&self, container: &VoteUserContainer, _txn: &mut ()) -> Result<()> {
        self.tables
            .write()
            .await
            .containers
            .insert((container.vote_id, container.pid.clone()), container.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::vote::examples::{created, vote_with_options};

    async fn store_with(values: &[&str]) -> (MemoryVoteStore, Uuid, Vec<VoteOption>) {
        let store = MemoryVoteStore::new();
        let (vote_id, options, files) = vote_with_options(values);
        // Insert out of order to check the sort.
        for file in files.into_iter().rev() {
            store.insert_file(file).await;
        }
        for option in &options {
            store.insert_option(option.clone()).await;
        }
        (store, vote_id, options)
    }

    #[tokio::test]
    async fn files_come_back_in_creation_order() {
        let (store, vote_id, _) = store_with(&["Yes", "No"]).await;
        store
            .insert_file(VoteContainerFile::new(
                Uuid::new_v4(),
                "other.html",
                "text/html",
                vec![],
                created(-100),
            ))
            .await;

        let files = store.container_files(vote_id, &mut ()).await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, ["document.docx", "__metainfo.html", "Yes.html", "No.html"]);
    }

    #[tokio::test]
    async fn options_in_requested_order() {
        let (store, vote_id, options) = store_with(&["Yes", "No", "Maybe"]).await;
        let ids = [options[2].id, options[0].id];
        let found = store.vote_options(vote_id, &ids, &mut ()).await.unwrap();
        assert_eq!(found, vec![options[2].clone(), options[0].clone()]);
    }

    #[tokio::test]
    async fn foreign_option_is_rejected() {
        let (store, vote_id, _) = store_with(&["Yes"]).await;
        let (_, foreign, _) = vote_with_options(&["Yes"]);
        store.insert_option(foreign[0].clone()).await;
        let result = store.vote_options(vote_id, &[foreign[0].id], &mut ()).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn repeated_option_is_reported_as_duplicate() {
        let (store, vote_id, options) = store_with(&["Yes", "No"]).await;
        let ids = [options[0].id, options[1].id, options[0].id];
        let result = store.vote_options(vote_id, &ids, &mut ()).await;
        assert!(
            matches!(&result, Err(Error::InvalidInput(message)) if message.contains("more than once")),
            "{result:?}"
        );
    }

    #[tokio::test]
    async fn save_replaces_per_voter() {
        let store = MemoryVoteStore::new();
        let vote_id = Uuid::new_v4();
        let mut container = VoteUserContainer {
            vote_id,
            pid: "38001085718".to_string(),
            user_id: Uuid::new_v4(),
            container: vec![1],
            created_at: created(0),
        };
        store.save_user_container(&container, &mut ()).await.unwrap();
        container.container = vec![2];
        store.save_user_container(&container, &mut ()).await.unwrap();

        let stored = store.user_container(vote_id, "38001085718").await.unwrap();
        assert_eq!(stored.container, vec![2]);
        assert!(store.user_container(vote_id, "00000000000").await.is_none());
    }
}
