//! In-memory mirror of one stored object.
//!
//! A [`Blob`] holds the full content of a single name, a cursor, and a dirty
//! flag. Mutations only touch memory until [`Blob::flush`] publishes the
//! whole buffer as a new version and retires the version it replaced.

use std::io::SeekFrom;

use bytes::Bytes;
use tracing::debug;

use crate::name::Name;
use crate::store::{ObjectStore, StoreError};

/// Byte used to pad content grown by truncate or by writes past the end.
///
/// Printable so padded content survives text-safe transports unchanged.
pub const FILLER: u8 = b'.';

/// Largest content a blob may grow to.
pub const MAX_CONTENT_LEN: usize = 1 << 30;

/// A write or resize would take the content past [`MAX_CONTENT_LEN`].
#[derive(Debug, thiserror::Error)]
#[error("{len} bytes at offset {offset} exceed the {MAX_CONTENT_LEN} byte content limit")]
pub struct TooLarge {
    pub offset: u64,
    pub len: u64,
}

pub struct Blob {
    name: Name,
    store: ObjectStore,
    data: Vec<u8>,
    pos: usize,
    dirty: bool,
}

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .field("pos", &self.pos)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Blob {
    /// A fresh blob under a newly allocated name. Starts dirty, since
    /// nothing has been stored yet.
    pub fn create(store: &ObjectStore, data: Vec<u8>) -> Self {
        Self::create_named(store, Name::generate(), data)
    }

    /// A fresh blob under a caller-chosen name. Starts dirty.
    pub fn create_named(store: &ObjectStore, name: Name, data: Vec<u8>) -> Self {
        Self {
            name,
            store: store.clone(),
            data,
            pos: 0,
            dirty: true,
        }
    }

    /// Load the current version of `name`, or `None` if it has none.
    pub async fn open(store: &ObjectStore, name: Name) -> Result<Option<Self>, StoreError> {
        let Some(body) = store.get(&name).await? else {
            return Ok(None);
        };
        Ok(Some(Self {
            name,
            store: store.clone(),
            data: body.to_vec(),
            pos: 0,
            dirty: false,
        }))
    }

    pub fn name(&self) -> Name {
        self.name
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Force the next flush to store a new version even without a content change.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Move the cursor. Positions before the start clamp to zero; positions
    /// past the end are allowed and take effect on the next write.
    pub fn seek(&mut self, pos: SeekFrom) -> usize {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => self.data.len() as i128 + delta as i128,
        };
        self.pos = target.clamp(0, usize::MAX as i128) as usize;
        self.pos
    }

    /// Read from the cursor. `None` reads to the end; a length past the
    /// end returns the bytes that are there.
    pub fn read(&mut self, len: Option<usize>) -> Vec<u8> {
        let start = self.pos.min(self.data.len());
        let end = match len {
            Some(len) => start.saturating_add(len).min(self.data.len()),
            None => self.data.len(),
        };
        let buf = self.data[start..end].to_vec();
        self.pos = start + buf.len();
        buf
    }

    /// Overwrite at the cursor, growing the buffer first if needed.
    ///
    /// Nothing changes when the write would end past [`MAX_CONTENT_LEN`].
    pub fn write(&mut self, buf: &[u8]) -> Result<(), TooLarge> {
        let end = self
            .pos
            .checked_add(buf.len())
            .filter(|end| *end <= MAX_CONTENT_LEN)
            .ok_or(TooLarge {
                offset: self.pos as u64,
                len: buf.len() as u64,
            })?;
        if end > self.data.len() {
            self.data.resize(end, FILLER);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        self.dirty = true;
        Ok(())
    }

    /// Resize the buffer. Shrinking clamps the cursor; growing pads with [`FILLER`].
    pub fn truncate(&mut self, len: usize) -> Result<(), TooLarge> {
        if len > MAX_CONTENT_LEN {
            return Err(TooLarge {
                offset: 0,
                len: len as u64,
            });
        }
        if len < self.data.len() {
            self.data.truncate(len);
            self.pos = self.pos.min(len);
        } else {
            self.data.resize(len, FILLER);
        }
        self.dirty = true;
        Ok(())
    }

    /// Replace the whole content, keeping the cursor in range.
    pub fn replace(&mut self, data: Vec<u8>) {
        self.data = data;
        self.pos = self.pos.min(self.data.len());
        self.dirty = true;
    }

    /// Publish the buffer as a new version, then retire the previous one.
    ///
    /// Does nothing when clean. The new version is stored before the old
    /// one is deleted: a failure in between leaves an extra old version
    /// behind, never a missing object.
    pub async fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }

        debug!(name = %self.name, len = self.data.len(), "flushing blob");

        let previous = self.store.current_version(&self.name).await?;
        self.store
            .put(&self.name, Bytes::copy_from_slice(&self.data))
            .await?;
        if let Some(uid) = previous {
            self.store.delete_version(uid).await?;
        }

        self.dirty = false;
        Ok(())
    }

    /// Flush and release the blob.
    pub async fn close(mut self) -> Result<(), StoreError> {
        self.flush().await
    }
}
