//! SQLite + Object Storage Mailbox
//!
//! This crate provides the remote message store mailfs persists nodes into:
//! an append-only mailbox whose messages are addressed by subject. SQLite
//! holds the message index (uid, subject, state) and pluggable object
//! storage (S3/MinIO/local filesystem/memory) holds the message bodies.
//!
//! # Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use mailfs_object_store::MailboxStore;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), mailfs_object_store::MailboxError> {
//! let store = MailboxStore::new_local(Path::new("/tmp/mailbox")).await?;
//!
//! let uid = store.append("some-subject", Bytes::from_static(b"body")).await?;
//! assert_eq!(store.search("some-subject").await?, vec![uid]);
//! # Ok(())
//! # }
//! ```

mod database;
mod error;
mod mailbox;
mod storage;

pub use error::{MailboxError, Result};
pub use mailbox::MailboxStore;
pub use storage::ObjectStoreConfig;
