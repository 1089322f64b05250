use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use moka::sync::Cache;
use tracing::{debug, warn};

use crate::name::Name;

use super::{Mailbox, StoreError, Uid};

/// Configuration for the name -> current version cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of names to remember (default: 10,000)
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
        }
    }
}

/// Content persistence by [`Name`] over a [`Mailbox`].
///
/// The version cache is only ever a shortcut: every entry is dropped
/// before the name is written, deleted, or found missing, and all paths
/// fall back to a mailbox search when it is empty.
#[derive(Clone)]
pub struct ObjectStore {
    mailbox: Arc<dyn Mailbox>,
    versions: Cache<Name, Uid>,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("cached_versions", &self.versions.entry_count())
            .finish()
    }
}

impl ObjectStore {
    /// Create a store over `mailbox` with the default cache config
    pub fn new(mailbox: impl Mailbox) -> Self {
        Self::with_cache_config(Arc::new(mailbox), CacheConfig::default())
    }

    /// Create a store over a shared mailbox with a custom cache config
    pub fn with_cache_config(mailbox: Arc<dyn Mailbox>, config: CacheConfig) -> Self {
        Self {
            mailbox,
            versions: Cache::builder().max_capacity(config.max_entries).build(),
        }
    }

    /// The cached current version of `name`, without touching the mailbox.
    pub fn cached_version(&self, name: &Name) -> Option<Uid> {
        self.versions.get(name)
    }

    /// Resolve the current version of `name`, consulting the cache first.
    pub async fn current_version(&self, name: &Name) -> Result<Option<Uid>, StoreError> {
        if let Some(uid) = self.versions.get(name) {
            return Ok(Some(uid));
        }
        self.search_current(name).await
    }

    /// Search the mailbox for the newest version of `name` and cache it.
    async fn search_current(&self, name: &Name) -> Result<Option<Uid>, StoreError> {
        let uids = self.mailbox.search(&name.subject()).await?;
        match uids.last() {
            Some(uid) => {
                self.versions.insert(*name, *uid);
                Ok(Some(*uid))
            }
            None => {
                self.versions.invalidate(name);
                Ok(None)
            }
        }
    }

    /// Fetch the current content of `name`, or `None` if it has no current version.
    pub async fn get(&self, name: &Name) -> Result<Option<Bytes>, StoreError> {
        let Some(uid) = self.current_version(name).await? else {
            return Ok(None);
        };

        if let Some(body) = self.mailbox.fetch(uid).await? {
            return Ok(Some(body));
        }

        // The cached version went away underneath us. Search once more
        // before reporting the name missing.
        warn!(%name, %uid, "cached version vanished, searching again");
        self.versions.invalidate(name);
        let Some(uid) = self.search_current(name).await? else {
            return Ok(None);
        };
        let body = self.mailbox.fetch(uid).await?;
        if body.is_none() {
            self.versions.invalidate(name);
        }
        Ok(body)
    }

    /// When the current version of `name` was stored, or `None` if it has none.
    pub async fn modified(&self, name: &Name) -> Result<Option<SystemTime>, StoreError> {
        let Some(uid) = self.current_version(name).await? else {
            return Ok(None);
        };
        self.mailbox.internal_date(uid).await
    }

    /// Append `body` as the new current version of `name`.
    ///
    /// Older versions are left in place; retiring them is the caller's job
    /// once the new version is safely stored.
    pub async fn put(&self, name: &Name, body: Bytes) -> Result<(), StoreError> {
        self.versions.invalidate(name);

        let size = body.len();
        let uid = self.mailbox.append(&name.subject(), body).await?;
        if let Some(uid) = uid {
            self.versions.insert(*name, uid);
        }

        debug!(%name, size, uid = ?uid, "stored new version");
        Ok(())
    }

    /// Flag the current version of `name` deleted. No-op if it has none.
    pub async fn delete(&self, name: &Name) -> Result<(), StoreError> {
        let Some(uid) = self.current_version(name).await? else {
            return Ok(());
        };
        self.mailbox.mark_deleted(uid).await?;
        self.versions.invalidate(name);

        debug!(%name, %uid, "deleted current version");
        Ok(())
    }

    /// Flag one specific version deleted and forget any name cached at it.
    pub async fn delete_version(&self, uid: Uid) -> Result<(), StoreError> {
        self.mailbox.mark_deleted(uid).await?;

        let stale: Vec<Name> = self
            .versions
            .iter()
            .filter(|(_, cached)| *cached == uid)
            .map(|(name, _)| *name)
            .collect();
        for name in stale {
            self.versions.invalidate(&name);
        }
        Ok(())
    }

    /// Every live (subject, uid) pair in the mailbox.
    pub async fn versions(&self) -> Result<Vec<(String, Uid)>, StoreError> {
        self.mailbox.subjects().await
    }

    /// Permanently drop deleted versions from the mailbox.
    pub async fn expunge(&self) -> Result<usize, StoreError> {
        self.mailbox.expunge().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryMailbox;

    #[tokio::test]
    async fn test_put_then_get() {
        let mailbox = MemoryMailbox::new();
        let store = ObjectStore::new(mailbox.clone());
        let name = Name::generate();

        store
            .put(&name, Bytes::from_static(b"content"))
            .await
            .unwrap();

        // The append reported a uid so the cache is warm
        assert!(store.cached_version(&name).is_some());
        let searches = mailbox.stats().searches;

        assert_eq!(
            store.get(&name).await.unwrap(),
            Some(Bytes::from_static(b"content"))
        );
        assert_eq!(mailbox.stats().searches, searches);
    }

    #[tokio::test]
    async fn test_put_without_append_uid_leaves_cache_cold() {
        let mailbox = MemoryMailbox::without_append_uids();
        let store = ObjectStore::new(mailbox.clone());
        let name = Name::generate();

        store.put(&name, Bytes::from_static(b"v1")).await.unwrap();
        assert!(store.cached_version(&name).is_none());

        assert_eq!(
            store.get(&name).await.unwrap(),
            Some(Bytes::from_static(b"v1"))
        );
        assert_eq!(mailbox.stats().searches, 1);
        assert!(store.cached_version(&name).is_some());
    }

    #[tokio::test]
    async fn test_get_missing_is_none_and_repeatable() {
        let store = ObjectStore::new(MemoryMailbox::new());
        let name = Name::generate();

        assert!(store.get(&name).await.unwrap().is_none());
        assert!(store.get(&name).await.unwrap().is_none());
        assert!(store.cached_version(&name).is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let mailbox = MemoryMailbox::new();
        let store = ObjectStore::new(mailbox.clone());
        let name = Name::generate();

        store.put(&name, Bytes::from_static(b"x")).await.unwrap();
        store.delete(&name).await.unwrap();
        assert!(store.get(&name).await.unwrap().is_none());

        // Nothing left to delete
        store.delete(&name).await.unwrap();
        assert_eq!(mailbox.live_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_cache_entry_heals() {
        let mailbox = MemoryMailbox::new();
        let store = ObjectStore::new(mailbox.clone());
        let name = Name::generate();

        store.put(&name, Bytes::from_static(b"old")).await.unwrap();
        let old = store.cached_version(&name).unwrap();

        // Another writer replaces the version behind the cache's back
        mailbox.insert_raw(&name.subject(), b"new");
        mailbox.mark_deleted(old).await.unwrap();

        assert_eq!(
            store.get(&name).await.unwrap(),
            Some(Bytes::from_static(b"new"))
        );
        assert_ne!(store.cached_version(&name), Some(old));
    }

    #[tokio::test]
    async fn test_delete_version_forgets_cached_name() {
        let store = ObjectStore::new(MemoryMailbox::new());
        let name = Name::generate();

        store.put(&name, Bytes::from_static(b"x")).await.unwrap();
        let uid = store.cached_version(&name).unwrap();

        store.delete_version(uid).await.unwrap();
        assert!(store.cached_version(&name).is_none());
        assert!(store.get(&name).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_modified_follows_current_version() {
        let store = ObjectStore::new(MemoryMailbox::new());
        let name = Name::generate();
        assert!(store.modified(&name).await.unwrap().is_none());

        let before = SystemTime::now();
        store.put(&name, Bytes::from_static(b"x")).await.unwrap();
        let stamped = store.modified(&name).await.unwrap().unwrap();
        assert!(stamped >= before);

        store.delete(&name).await.unwrap();
        assert!(store.modified(&name).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces() {
        let mailbox = MemoryMailbox::new();
        let store = ObjectStore::new(mailbox.clone());
        mailbox.set_offline(true);

        let result = store.get(&Name::generate()).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
