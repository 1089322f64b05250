use std::io::SeekFrom;
use std::time::SystemTime;

use crate::blob::{Blob, TooLarge};
use crate::name::Name;
use crate::store::{ObjectStore, StoreError};

use super::{NodeError, FILE_TAG};

/// Bytes of header in front of the file content.
const HEADER_LEN: usize = 1;

/// A regular file: everything after the tag byte is file content.
///
/// Offsets taken and returned here are file offsets; the header is
/// skipped transparently.
#[derive(Debug)]
pub struct File {
    blob: Blob,
    // The on-store format has no room for it; a reopened file starts from
    // the time its current version was stored.
    mtime: Option<SystemTime>,
}

impl File {
    /// A new empty file under a fresh name. Dirty until first flushed.
    pub fn create(store: &ObjectStore) -> Self {
        let mut blob = Blob::create(store, vec![FILE_TAG]);
        blob.seek(SeekFrom::Start(HEADER_LEN as u64));
        Self {
            blob,
            mtime: Some(SystemTime::now()),
        }
    }

    pub fn from_blob(mut blob: Blob) -> Result<Self, NodeError> {
        if blob.as_bytes().first() != Some(&FILE_TAG) {
            return Err(NodeError::Corrupt(format!("{} is not a file", blob.name())));
        }
        blob.seek(SeekFrom::Start(HEADER_LEN as u64));
        Ok(Self { blob, mtime: None })
    }

    pub fn name(&self) -> Name {
        self.blob.name()
    }

    /// Content length in bytes.
    pub fn len(&self) -> u64 {
        (self.blob.len() - HEADER_LEN) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move the cursor, returning the new file offset. Never lands inside the header.
    pub fn seek(&mut self, pos: SeekFrom) -> u64 {
        let pos = match pos {
            SeekFrom::Start(offset) => SeekFrom::Start(offset.saturating_add(HEADER_LEN as u64)),
            other => other,
        };
        let raw = self.blob.seek(pos).max(HEADER_LEN);
        self.blob.seek(SeekFrom::Start(raw as u64));
        (raw - HEADER_LEN) as u64
    }

    pub fn position(&self) -> u64 {
        (self.blob.position().max(HEADER_LEN) - HEADER_LEN) as u64
    }

    /// Read from the cursor; see [`Blob::read`].
    pub fn read(&mut self, len: Option<usize>) -> Vec<u8> {
        self.blob.read(len)
    }

    /// Write at the cursor, growing the file as needed.
    pub fn write(&mut self, buf: &[u8]) -> Result<(), NodeError> {
        self.blob.write(buf)?;
        self.mtime = Some(SystemTime::now());
        Ok(())
    }

    /// Set the file length, padding growth with the blob filler byte.
    pub fn truncate(&mut self, len: u64) -> Result<(), NodeError> {
        let raw = usize::try_from(len)
            .ok()
            .and_then(|len| len.checked_add(HEADER_LEN))
            .ok_or(TooLarge { offset: 0, len })?;
        self.blob.truncate(raw)?;
        if self.blob.position() < HEADER_LEN {
            self.blob.seek(SeekFrom::Start(HEADER_LEN as u64));
        }
        self.mtime = Some(SystemTime::now());
        Ok(())
    }

    /// The file content, without the header.
    pub fn content(&self) -> &[u8] {
        &self.blob.as_bytes()[HEADER_LEN..]
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        self.mtime
    }

    /// Adopt a modification time recovered from the store. Does not dirty
    /// the file and never replaces one set during this session.
    pub fn restore_mtime(&mut self, mtime: SystemTime) {
        self.mtime.get_or_insert(mtime);
    }

    pub fn set_mtime(&mut self, mtime: SystemTime) {
        self.mtime = Some(mtime);
        self.blob.mark_dirty();
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
}
