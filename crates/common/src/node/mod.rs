//! Typed views over stored content.
//!
//! Every node is one [`Blob`](crate::blob::Blob) whose first byte says what
//! it is:
//!
//! ```text
//! 'f' <file bytes ...>
//! 'd' '\r' '\n' <directory record (JSON)>
//! ```
//!
//! The tag is inspected exactly once, when the blob is decoded into a
//! [`Node`]; after that everything matches on the variant.

mod directory;
mod file;

use std::time::SystemTime;

pub use directory::Directory;
pub use file::File;

use crate::blob::Blob;
use crate::name::Name;
use crate::store::StoreError;

/// First byte of a file's content.
pub const FILE_TAG: u8 = b'f';
/// First byte of a directory's content.
pub const DIR_TAG: u8 = b'd';
/// Fixed bytes following a directory's tag. A mismatch means the content
/// was not decoded correctly.
pub const DIR_MARKER: &[u8] = b"\r\n";
/// Size reported for every directory. Cosmetic.
pub const DIRECTORY_SIZE: u64 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("corrupt node content: {0}")]
    Corrupt(String),
    #[error("entry already exists: {0}")]
    AlreadyExists(String),
    #[error("no such child: {0}")]
    ChildNotFound(String),
    #[error(transparent)]
    TooLarge(#[from] crate::blob::TooLarge),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

#[derive(Debug)]
pub enum Node {
    File(File),
    Directory(Directory),
}

impl Node {
    /// Decode a loaded blob, choosing the variant from its tag byte.
    pub fn from_blob(blob: Blob) -> Result<Self, NodeError> {
        match blob.as_bytes().first() {
            Some(&FILE_TAG) => Ok(Node::File(File::from_blob(blob)?)),
            Some(&DIR_TAG) => Ok(Node::Directory(Directory::from_blob(blob)?)),
            Some(tag) => Err(NodeError::Corrupt(format!(
                "unknown type tag {:#04x} on {}",
                tag,
                blob.name()
            ))),
            None => Err(NodeError::Corrupt(format!("empty content on {}", blob.name()))),
        }
    }

    pub fn name(&self) -> Name {
        self.blob().name()
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::File(_) => NodeKind::File,
            Node::Directory(_) => NodeKind::Directory,
        }
    }

    /// Content length for files, [`DIRECTORY_SIZE`] for directories.
    pub fn size(&self) -> u64 {
        match self {
            Node::File(file) => file.len(),
            Node::Directory(_) => DIRECTORY_SIZE,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        match self {
            Node::File(file) => file.mtime(),
            Node::Directory(dir) => dir.mtime(),
        }
    }

    /// Record a new modification time. Marks the node dirty.
    pub fn set_mtime(&mut self, mtime: SystemTime) {
        match self {
            Node::File(file) => file.set_mtime(mtime),
            Node::Directory(dir) => dir.set_mtime(mtime),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.blob().is_dirty()
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    pub fn as_directory_mut(&mut self) -> Option<&mut Directory> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    pub fn as_file_mut(&mut self) -> Option<&mut File> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    pub async fn flush(&mut self) -> Result<(), StoreError> {
        match self {
            Node::File(file) => file.flush().await,
            Node::Directory(dir) => dir.flush().await,
        }
    }

    /// Flush and release the node.
    pub async fn close(self) -> Result<(), StoreError> {
        match self {
            Node::File(file) => file.close().await,
            Node::Directory(dir) => dir.close().await,
        }
    }

    fn blob(&self) -> &Blob {
        match self {
            Node::File(file) => file.blob(),
            Node::Directory(dir) => dir.blob(),
        }
    }
}
