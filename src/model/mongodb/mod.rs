mod bson;
mod collection;
mod errors;
mod store;

pub use bson::{serde_binary, serde_uuid};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use errors::is_duplicate_key_error;
pub use store::MongoVoteStore;
