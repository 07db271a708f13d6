use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::vote::{VoteContainerFile, VoteOption, VoteUserContainer};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MongoCollection for VoteContainerFile {
    const NAME: &'static str = "vote_container_files";
}

impl MongoCollection for VoteOption {
    const NAME: &'static str = "vote_options";
}

impl MongoCollection for VoteUserContainer {
    const NAME: &'static str = "vote_user_containers";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Container files are always read per vote, in creation order.
    let files_index = IndexModel::builder()
        .keys(doc! {"voteId": 1, "createdAt": 1})
        .build();
    Coll::<VoteContainerFile>::from_db(db)
        .create_index(files_index, None)
        .await?;

    let options_index = IndexModel::builder().keys(doc! {"voteId": 1}).build();
    Coll::<VoteOption>::from_db(db)
        .create_index(options_index, None)
        .await?;

    // One signed container per voter per vote.
    let containers_index = IndexModel::builder()
        .keys(doc! {"voteId": 1, "pid": 1})
        .options(unique)
        .build();
    Coll::<VoteUserContainer>::from_db(db)
        .create_index(containers_index, None)
        .await?;

    Ok(())
}
