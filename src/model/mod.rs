pub mod mongodb;
pub mod phone;
pub mod store;
pub mod vote;

pub use phone::PhoneNumber;
pub use store::{MemoryVoteStore, VoteStore};
pub use vote::{VoteContainerFile, VoteOption, VoteUserContainer};
