//! Name-indexed persistence over a versioned mailbox.
//!
//! The remote mailbox only knows four things: find message versions by
//! subject, fetch a version's body, append a new version, and flag a
//! version deleted. [`ObjectStore`] layers `get` / `put` / `delete` by
//! [`Name`](crate::name::Name) on top, caching the current version of each
//! name so repeated lookups skip the search round-trip.

mod mailbox;
mod memory;
mod objects;

pub use mailbox::{Mailbox, Uid};
pub use memory::{MailboxStats, MemoryMailbox};
pub use objects::{CacheConfig, ObjectStore};

/// Transport or protocol failure talking to the mailbox.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("mailbox error: {0}")]
    Mailbox(#[from] object_store::MailboxError),
    #[error("mailbox unavailable: {0}")]
    Unavailable(String),
}
