//! MailboxStore - versioned messages addressed by subject.
//!
//! Every append creates a brand-new message with a fresh, monotonically
//! increasing uid. Messages are never modified in place: callers retire an
//! old version by flagging it deleted, and `expunge` reclaims the storage.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::database::{Database, MessageState};
use crate::error::{MailboxError, Result};
use crate::storage::{ObjectStoreConfig, Storage};

/// How long a reservation may stay pending before `expunge` treats it as
/// an abandoned append.
const PENDING_GRACE: Duration = Duration::from_secs(60 * 60);

/// Mailbox backed by a SQLite message index and object storage for bodies.
#[derive(Debug, Clone)]
pub struct MailboxStore {
    db: Database,
    storage: Storage,
}

impl MailboxStore {
    /// Create a new MailboxStore with a file-based SQLite index.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `config` - Object storage configuration for message bodies
    pub async fn new(db_path: &Path, config: ObjectStoreConfig) -> Result<Self> {
        let db = Database::new(db_path).await?;
        let storage = Storage::new(config).await?;
        Ok(Self { db, storage })
    }

    /// Create a new MailboxStore with an in-memory SQLite index.
    pub async fn in_memory(config: ObjectStoreConfig) -> Result<Self> {
        let db = Database::in_memory().await?;
        let storage = Storage::new(config).await?;
        Ok(Self { db, storage })
    }

    /// Create a MailboxStore backed by the local filesystem.
    ///
    /// The index lives at `data_dir/mailbox.sqlite`, bodies under `data_dir/messages/`.
    pub async fn new_local(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("mailbox.sqlite");
        let config = ObjectStoreConfig::Local {
            path: data_dir.to_path_buf(),
        };
        Self::new(&db_path, config).await
    }

    /// Create a fully ephemeral MailboxStore (in-memory index + in-memory bodies).
    pub async fn new_ephemeral() -> Result<Self> {
        Self::in_memory(ObjectStoreConfig::Memory).await
    }

    /// Live uids carrying `subject`, oldest first.
    pub async fn search(&self, subject: &str) -> Result<Vec<u64>> {
        let uids = self.db.search_subject(subject).await?;
        Ok(uids.into_iter().map(|uid| uid as u64).collect())
    }

    /// Fetch the body of a live message.
    ///
    /// Returns `None` when the uid is unknown or flagged deleted.
    pub async fn fetch(&self, uid: u64) -> Result<Option<Bytes>> {
        let uid = uid as i64;
        match self.db.get_message(uid).await? {
            Some(meta) if meta.state == MessageState::Live => {}
            _ => return Ok(None),
        }
        match self.storage.get_body(uid).await? {
            Some(body) => Ok(Some(body)),
            None => Err(MailboxError::MissingBody(uid as u64)),
        }
    }

    /// When a live message was appended, in unix seconds.
    pub async fn internal_date(&self, uid: u64) -> Result<Option<i64>> {
        Ok(self
            .db
            .get_message(uid as i64)
            .await?
            .filter(|meta| meta.state == MessageState::Live)
            .map(|meta| meta.created_at))
    }

    /// Append a new message and return its uid.
    pub async fn append(&self, subject: &str, body: Bytes) -> Result<u64> {
        let size = body.len();
        let uid = self.db.reserve_message(subject, size as i64).await?;

        debug!(uid, subject, size, "appending message");

        if let Err(e) = self.storage.put_body(uid, body).await {
            self.discard(uid, false).await;
            return Err(e);
        }
        if let Err(e) = self.db.set_state(uid, MessageState::Live).await {
            self.discard(uid, true).await;
            return Err(e);
        }
        Ok(uid as u64)
    }

    /// Best-effort removal of a failed append's reservation, and of its body
    /// when the upload went through. Whatever is left stays pending and is
    /// reclaimed by `expunge`.
    async fn discard(&self, uid: i64, uploaded: bool) {
        if uploaded {
            if let Err(e) = self.storage.delete_body(uid).await {
                warn!(uid, error = %e, "failed to remove body of abandoned append");
                return;
            }
        }
        if let Err(e) = self.db.delete_message(uid).await {
            warn!(uid, error = %e, "failed to remove reservation of abandoned append");
        }
    }

    /// Remove reservations left pending for longer than `older_than`,
    /// along with any body they uploaded. Returns how many were removed.
    pub async fn reclaim_pending(&self, older_than: Duration) -> Result<usize> {
        let cutoff = chrono::Utc::now().timestamp() - older_than.as_secs() as i64;
        let pending = self.db.list_pending_before(cutoff).await?;
        for uid in &pending {
            self.storage.delete_body(*uid).await?;
            self.db.delete_message(*uid).await?;
        }
        if !pending.is_empty() {
            warn!(count = pending.len(), "reclaimed abandoned appends");
        }
        Ok(pending.len())
    }

    /// Flag a message deleted. Unknown or already deleted uids are ignored.
    pub async fn mark_deleted(&self, uid: u64) -> Result<()> {
        if self.db.set_state(uid as i64, MessageState::Deleted).await? {
            debug!(uid, "message flagged deleted");
        }
        Ok(())
    }

    /// Every live (subject, uid) pair, oldest first.
    pub async fn subjects(&self) -> Result<Vec<(String, u64)>> {
        let live = self.db.list_live().await?;
        Ok(live
            .into_iter()
            .map(|(subject, uid)| (subject, uid as u64))
            .collect())
    }

    /// Permanently remove messages flagged deleted. Returns how many were removed.
    ///
    /// Appends abandoned for longer than an hour are reclaimed as well but
    /// not counted.
    pub async fn expunge(&self) -> Result<usize> {
        self.reclaim_pending(PENDING_GRACE).await?;

        let deleted = self.db.list_deleted().await?;
        for uid in &deleted {
            self.storage.delete_body(*uid).await?;
            self.db.delete_message(*uid).await?;
        }
        if !deleted.is_empty() {
            info!(count = deleted.len(), "expunged deleted messages");
        }
        Ok(deleted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_search_fetch() {
        let store = MailboxStore::new_ephemeral().await.unwrap();

        let uid = store
            .append("subject-a", Bytes::from_static(b"body"))
            .await
            .unwrap();

        assert_eq!(store.search("subject-a").await.unwrap(), vec![uid]);
        assert!(store.search("subject-b").await.unwrap().is_empty());
        assert_eq!(
            store.fetch(uid).await.unwrap(),
            Some(Bytes::from_static(b"body"))
        );

        let appended = store.internal_date(uid).await.unwrap().unwrap();
        assert!((chrono::Utc::now().timestamp() - appended).abs() < 60);
        store.mark_deleted(uid).await.unwrap();
        assert!(store.internal_date(uid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uids_increase_per_append() {
        let store = MailboxStore::new_ephemeral().await.unwrap();

        let first = store.append("s", Bytes::from_static(b"1")).await.unwrap();
        let second = store.append("s", Bytes::from_static(b"2")).await.unwrap();

        assert!(second > first);
        assert_eq!(store.search("s").await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_deleted_messages_are_hidden_then_expunged() {
        let store = MailboxStore::new_ephemeral().await.unwrap();

        let uid = store.append("s", Bytes::from_static(b"x")).await.unwrap();
        store.mark_deleted(uid).await.unwrap();
        // Second delete is a no-op
        store.mark_deleted(uid).await.unwrap();

        assert!(store.search("s").await.unwrap().is_empty());
        assert!(store.fetch(uid).await.unwrap().is_none());
        assert!(store.subjects().await.unwrap().is_empty());

        assert_eq!(store.expunge().await.unwrap(), 1);
        assert_eq!(store.expunge().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_local_store_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();

        let uid = {
            let store = MailboxStore::new_local(temp_dir.path()).await.unwrap();
            store
                .append("persisted", Bytes::from_static(b"still here"))
                .await
                .unwrap()
        };

        let store = MailboxStore::new_local(temp_dir.path()).await.unwrap();
        assert_eq!(store.search("persisted").await.unwrap(), vec![uid]);
        assert_eq!(
            store.fetch(uid).await.unwrap(),
            Some(Bytes::from_static(b"still here"))
        );
    }

    #[tokio::test]
    async fn test_failed_append_leaves_nothing_behind() {
        let temp_dir = tempfile::tempdir().unwrap();
        let bodies = temp_dir.path().join("bodies");
        let store = MailboxStore::new(
            &temp_dir.path().join("mailbox.sqlite"),
            ObjectStoreConfig::Local {
                path: bodies.clone(),
            },
        )
        .await
        .unwrap();

        // A plain file where the body directory should be makes every upload fail
        std::fs::remove_dir_all(&bodies).unwrap();
        std::fs::write(&bodies, b"in the way").unwrap();
        assert!(store
            .append("doomed", Bytes::from_static(b"body"))
            .await
            .is_err());

        std::fs::remove_file(&bodies).unwrap();
        std::fs::create_dir_all(&bodies).unwrap();
        let uid = store
            .append("fine", Bytes::from_static(b"body"))
            .await
            .unwrap();

        // The failed reservation took the uid before this one and is gone
        assert!(store.db.get_message(uid as i64 - 1).await.unwrap().is_none());
        assert!(store.search("doomed").await.unwrap().is_empty());
        assert_eq!(store.reclaim_pending(Duration::ZERO).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reclaim_pending_removes_stuck_reservations() {
        let store = MailboxStore::new_ephemeral().await.unwrap();

        // A reservation whose append never finished
        let stuck = store.db.reserve_message("stuck", 4).await.unwrap();
        let live = store.append("live", Bytes::from_static(b"x")).await.unwrap();

        // Too recent for the grace period used by expunge
        assert_eq!(store.expunge().await.unwrap(), 0);
        assert!(store.db.get_message(stuck).await.unwrap().is_some());

        assert_eq!(store.reclaim_pending(Duration::ZERO).await.unwrap(), 1);
        assert!(store.db.get_message(stuck).await.unwrap().is_none());
        assert_eq!(store.search("live").await.unwrap(), vec![live]);
    }
}
