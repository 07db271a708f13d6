use async_trait::async_trait;
use mongodb::{
    bson::doc,
    options::{FindOptions, ReplaceOptions},
    Client, ClientSession,
};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    store::{order_options, VoteStore},
    vote::{VoteContainerFile, VoteOption, VoteUserContainer},
};

use super::{errors::is_duplicate_key_error, Coll};

/// A [`VoteStore`] over MongoDB. All reads and writes run in the caller's
/// [`ClientSession`], which may or may not have a transaction started.
#[derive(Clone)]
pub struct MongoVoteStore {
    client: Client,
    files: Coll<VoteContainerFile>,
    options: Coll<VoteOption>,
    containers: Coll<VoteUserContainer>,
}

impl MongoVoteStore {
    /// Store over the database `db_name`, reached through `client`.
    pub fn new(client: &Client, db_name: &str) -> Self {
        let db = client.database(db_name);
        Self {
            client: client.clone(),
            files: Coll::from_db(&db),
            options: Coll::from_db(&db),
            containers: Coll::from_db(&db),
        }
    }

    /// Start a session on the store's client to pass as the transaction.
    pub async fn start_session(&self) -> Result<ClientSession> {
        Ok(self.client.start_session(None).await?)
    }
}

#[async_trait]
impl VoteStore for MongoVoteStore {
    type Txn = ClientSession;

    async fn container_files(
        &self,
        vote_id: Uuid,
        session: &mut ClientSession,
    ) -> Result<Vec<VoteContainerFile>> {
        let filter = doc! { "voteId": vote_id.to_string() };
        let options = FindOptions::builder()
            .sort(doc! { "createdAt": 1, "_id": 1 })
            .build();
        let mut cursor = self
            .files
            .find_with_session(filter, options, session)
            .await?;

        let mut files = Vec::new();
        while let Some(file) = cursor.next(session).await {
            files.push(file?);
        }
        Ok(files)
    }

    async fn vote_options(
        &self,
        vote_id: Uuid,
        option_ids: &[Uuid],
        session: &mut ClientSession,
    ) -> Result<Vec<VoteOption>> {
        let ids: Vec<String> = option_ids.iter().map(Uuid::to_string).collect();
        let filter = doc! {
            "voteId": vote_id.to_string(),
            "_id": { "$in": ids },
        };
        let mut cursor = self
            .options
            .find_with_session(filter, None, session)
            .await?;

        let mut found = Vec::with_capacity(option_ids.len());
        while let Some(option) = cursor.next(session).await {
            found.push(option?);
        }
        order_options(vote_id, option_ids, found)
    }

    async fn save_user_container(
        &self,
        container: &VoteUserContainer,
        session: &mut ClientSession,
    ) -> Result<()> {
        let filter = doc! {
            "voteId": container.vote_id.to_string(),
            "pid": &container.pid,
        };
        let upsert = ReplaceOptions::builder().upsert(true).build();

        let result = self
            .containers
            .replace_one_with_session(filter.clone(), container, upsert.clone(), session)
            .await;
        match result {
            Ok(_) => Ok(()),
            // Lost an upsert race on the unique index; the row now exists.
            Err(err) if is_duplicate_key_error(&err) => {
                debug!("Retrying container upsert after duplicate key");
                self.containers
                    .replace_one_with_session(filter, container, upsert, session)
                    .await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
