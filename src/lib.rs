//! Per-voter BDOC (ASiC-E) vote containers, signed with an Estonian ID
//! card, Mobile-ID or Smart-ID.
//!
//! A [`Signer`] builds the container for one voter's choices, starts a
//! provider session over its XAdES SignedInfo, checks the signature that
//! comes back, and stores the packaged result through a [`VoteStore`].

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate store_test;

pub mod config;
pub mod container;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod model;
pub mod signing;

pub use config::SigningConfig;
pub use error::{Error, Result};
pub use model::{MemoryVoteStore, VoteStore};
pub use signing::{
    AuthStatus, Protocol, SessionState, SessionStatus, SessionType, Signer, SigningSession,
};
