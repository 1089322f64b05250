use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::blob::Blob;
use crate::name::Name;
use crate::store::{ObjectStore, StoreError};

use super::{NodeError, DIR_MARKER, DIR_TAG};

/// On-store record following the directory marker.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DirectoryBody {
    #[serde(default)]
    mtime: Option<u64>,
    #[serde(default)]
    children: BTreeMap<Name, String>,
}

/// A directory: a child list mapping child names to display names.
///
/// Every mutation re-encodes the record into the backing blob, so the blob
/// is always ready to flush.
#[derive(Debug)]
pub struct Directory {
    blob: Blob,
    body: DirectoryBody,
}

impl Directory {
    /// A new empty directory under a fresh name. Dirty until first flushed.
    pub fn create(store: &ObjectStore) -> Self {
        Self::create_named(store, Name::generate())
    }

    /// A new empty directory under a chosen name. Used for the root.
    pub fn create_named(store: &ObjectStore, name: Name) -> Self {
        let mut dir = Self {
            blob: Blob::create_named(store, name, Vec::new()),
            body: DirectoryBody {
                mtime: Some(unix_secs(SystemTime::now())),
                children: BTreeMap::new(),
            },
        };
        dir.sync();
        dir
    }

    pub fn from_blob(blob: Blob) -> Result<Self, NodeError> {
        let bytes = blob.as_bytes();
        if bytes.first() != Some(&DIR_TAG) {
            return Err(NodeError::Corrupt(format!("{} is not a directory", blob.name())));
        }
        let Some(record) = bytes[1..].strip_prefix(DIR_MARKER) else {
            return Err(NodeError::Corrupt(format!(
                "directory marker mismatch on {}",
                blob.name()
            )));
        };

        let body = if record.is_empty() {
            DirectoryBody::default()
        } else {
            serde_json::from_slice(record).map_err(|e| {
                NodeError::Corrupt(format!("bad directory record on {}: {}", blob.name(), e))
            })?
        };

        Ok(Self { blob, body })
    }

    pub fn name(&self) -> Name {
        self.blob.name()
    }

    /// Link `name` under `display`. Fails if the display name is taken.
    pub fn add_child(&mut self, name: Name, display: &str) -> Result<(), NodeError> {
        if self.child(display).is_some() {
            return Err(NodeError::AlreadyExists(display.to_string()));
        }
        self.body.children.insert(name, display.to_string());
        self.touch();
        Ok(())
    }

    /// Unlink a child by name, returning its display name.
    pub fn remove_child(&mut self, name: &Name) -> Result<String, NodeError> {
        let display = self
            .body
            .children
            .remove(name)
            .ok_or_else(|| NodeError::ChildNotFound(name.to_string()))?;
        self.touch();
        Ok(display)
    }

    /// Unlink a child by display name, returning its name.
    pub fn remove_child_by_display(&mut self, display: &str) -> Result<Name, NodeError> {
        let name = self
            .child(display)
            .ok_or_else(|| NodeError::ChildNotFound(display.to_string()))?;
        self.body.children.remove(&name);
        self.touch();
        Ok(name)
    }

    /// Look up a child by display name.
    pub fn child(&self, display: &str) -> Option<Name> {
        self.body
            .children
            .iter()
            .find(|(_, d)| d.as_str() == display)
            .map(|(name, _)| *name)
    }

    /// Children as (name, display name), in no meaningful order.
    pub fn children(&self) -> impl Iterator<Item = (Name, &str)> {
        self.body
            .children
            .iter()
            .map(|(name, display)| (*name, display.as_str()))
    }

    pub fn len(&self) -> usize {
        self.body.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.children.is_empty()
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        self.body
            .mtime
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
    }

    pub fn set_mtime(&mut self, mtime: SystemTime) {
        self.body.mtime = Some(unix_secs(mtime));
        self.sync();
    }

    pub async fn flush(&mut self) -> Result<(), StoreError> {
        self.blob.flush().await
    }

    pub async fn close(self) -> Result<(), StoreError> {
        self.blob.close().await
    }

    pub(super) fn blob(&self) -> &Blob {
        &self.blob
    }

    fn touch(&mut self) {
        self.body.mtime = Some(unix_secs(SystemTime::now()));
        self.sync();
    }

    fn sync(&mut self) {
        let mut data = Vec::with_capacity(64);
        data.push(DIR_TAG);
        data.extend_from_slice(DIR_MARKER);
        // A map of strings and an integer always serializes
        if let Ok(record) = serde_json::to_vec(&self.body) {
            data.extend_from_slice(&record);
        }
        self.blob.replace(data);
    }
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryMailbox;

    fn store() -> ObjectStore {
        ObjectStore::new(MemoryMailbox::new())
    }

    #[test]
    fn test_new_directory_encoding() {
        let dir = Directory::create(&store());
        let bytes = dir.blob().as_bytes();

        assert!(bytes.starts_with(b"d\r\n"));
        assert!(dir.is_empty());
        assert!(dir.blob().is_dirty());
    }

    #[test]
    fn test_display_names_are_unique() {
        let mut dir = Directory::create(&store());
        let a = Name::generate();

        dir.add_child(a, "a").unwrap();
        let err = dir.add_child(Name::generate(), "a").unwrap_err();
        assert!(matches!(err, NodeError::AlreadyExists(_)));

        assert_eq!(dir.child("a"), Some(a));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_remove_child() {
        let mut dir = Directory::create(&store());
        let a = Name::generate();
        let b = Name::generate();
        dir.add_child(a, "a").unwrap();
        dir.add_child(b, "b").unwrap();

        assert_eq!(dir.remove_child(&a).unwrap(), "a");
        assert_eq!(dir.remove_child_by_display("b").unwrap(), b);
        assert!(dir.is_empty());

        assert!(matches!(
            dir.remove_child(&a),
            Err(NodeError::ChildNotFound(_))
        ));
        assert!(matches!(
            dir.remove_child_by_display("b"),
            Err(NodeError::ChildNotFound(_))
        ));
    }

    #[test]
    fn test_decodes_what_it_encodes() {
        let store = store();
        let mut dir = Directory::create(&store);
        let child = Name::generate();
        dir.add_child(child, "notes.txt").unwrap();

        let copy = Blob::create(&store, dir.blob().as_bytes().to_vec());
        let decoded = Directory::from_blob(copy).unwrap();
        assert_eq!(decoded.child("notes.txt"), Some(child));
        assert_eq!(decoded.mtime(), dir.mtime());
    }

    #[test]
    fn test_bare_marker_is_empty_directory() {
        let blob = Blob::create(&store(), b"d\r\n".to_vec());
        let dir = Directory::from_blob(blob).unwrap();
        assert!(dir.is_empty());
        assert!(dir.mtime().is_none());
    }

    #[test]
    fn test_marker_mismatch_is_corrupt() {
        let store = store();
        for content in [&b"d"[..], b"d\n\r{}", b"dXX", b"d\r\n{not json"] {
            let blob = Blob::create(&store, content.to_vec());
            assert!(
                matches!(Directory::from_blob(blob), Err(NodeError::Corrupt(_))),
                "{:?} should be corrupt",
                content
            );
        }
    }
}
