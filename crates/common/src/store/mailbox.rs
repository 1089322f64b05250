use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::MailboxStore;

use super::StoreError;

/// Identifier of one immutable message version inside the mailbox.
///
/// Uids grow with every append, so the largest uid carrying a subject is
/// that subject's current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(pub u64);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The primitives a remote mailbox offers.
#[async_trait]
pub trait Mailbox: Send + Sync + 'static {
    /// Live versions carrying `subject`, oldest first.
    async fn search(&self, subject: &str) -> Result<Vec<Uid>, StoreError>;

    /// Body of a live version, `None` if it is unknown or deleted.
    async fn fetch(&self, uid: Uid) -> Result<Option<Bytes>, StoreError>;

    /// When a live version was appended (IMAP's INTERNALDATE).
    async fn internal_date(&self, uid: Uid) -> Result<Option<SystemTime>, StoreError>;

    /// Append a new version. Returns its uid when the backend reports one.
    async fn append(&self, subject: &str, body: Bytes) -> Result<Option<Uid>, StoreError>;

    /// Flag a version deleted. Unknown uids are ignored.
    async fn mark_deleted(&self, uid: Uid) -> Result<(), StoreError>;

    /// Every live (subject, uid) pair.
    async fn subjects(&self) -> Result<Vec<(String, Uid)>, StoreError>;

    /// Permanently drop versions flagged deleted.
    async fn expunge(&self) -> Result<usize, StoreError>;
}

#[async_trait]
impl Mailbox for MailboxStore {
    async fn search(&self, subject: &str) -> Result<Vec<Uid>, StoreError> {
        let uids = MailboxStore::search(self, subject).await?;
        Ok(uids.into_iter().map(Uid).collect())
    }

    async fn fetch(&self, uid: Uid) -> Result<Option<Bytes>, StoreError> {
        Ok(MailboxStore::fetch(self, uid.0).await?)
    }

    async fn internal_date(&self, uid: Uid) -> Result<Option<SystemTime>, StoreError> {
        let secs = MailboxStore::internal_date(self, uid.0).await?;
        Ok(secs.map(|secs| UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)))
    }

    async fn append(&self, subject: &str, body: Bytes) -> Result<Option<Uid>, StoreError> {
        let uid = MailboxStore::append(self, subject, body).await?;
        Ok(Some(Uid(uid)))
    }

    async fn mark_deleted(&self, uid: Uid) -> Result<(), StoreError> {
        Ok(MailboxStore::mark_deleted(self, uid.0).await?)
    }

    async fn subjects(&self) -> Result<Vec<(String, Uid)>, StoreError> {
        let subjects = MailboxStore::subjects(self).await?;
        Ok(subjects
            .into_iter()
            .map(|(subject, uid)| (subject, Uid(uid)))
            .collect())
    }

    async fn expunge(&self) -> Result<usize, StoreError> {
        Ok(MailboxStore::expunge(self).await?)
    }
}
