//! Filesystem calls over a [`Session`].
//!
//! Each call takes the session lock for its whole duration, so calls are
//! applied one at a time and no two of them ever touch the same open node
//! concurrently.
//!
//! Calls that touch more than one object follow one ordering rule: a child
//! is stored before any parent links to it, a parent is flushed right after
//! it changes, and a child's content is deleted only after the parent that
//! linked it has been flushed without it. A crash between steps can leave
//! an unreachable object behind (see [`Dispatcher::sweep`]) but never a
//! link to content that was deleted.

use std::io::SeekFrom;
use std::time::SystemTime;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bootstrap::Presence;
use crate::name::Name;
use crate::node::{Directory, File, Node, NodeError, NodeKind};
use crate::session::{path_leaf, path_parent, Session, SessionError};
use crate::store::{ObjectStore, StoreError};
use crate::sweep::SweepReport;

/// Permission bits reported for directories.
pub const DIRECTORY_PERM: u16 = 0o777;
/// Permission bits reported for files.
pub const FILE_PERM: u16 = 0o666;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    #[error("is a directory: {0}")]
    IsDirectory(String),
    #[error("not a directory: {0}")]
    NotDirectory(String),
    #[error("operation not supported: {0}")]
    NotSupported(String),
    #[error("corrupt node: {0}")]
    Corrupt(String),
    #[error("file too large: {0}")]
    TooLarge(String),
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl From<SessionError> for FsError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(what) => FsError::NotFound(what),
            SessionError::Corrupt { name, reason } => {
                FsError::Corrupt(format!("{}: {}", name, reason))
            }
            SessionError::Store(e) => FsError::Storage(e),
        }
    }
}

impl From<NodeError> for FsError {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::Corrupt(what) => FsError::Corrupt(what),
            NodeError::AlreadyExists(what) => FsError::AlreadyExists(what),
            NodeError::ChildNotFound(what) => FsError::NotFound(what),
            NodeError::TooLarge(e) => FsError::TooLarge(e.to_string()),
        }
    }
}

/// What `attributes` reports for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub kind: NodeKind,
    pub perm: u16,
    pub nlink: u32,
    pub size: u64,
    pub mtime: Option<SystemTime>,
}

impl Attributes {
    fn of(node: &Node) -> Self {
        let (perm, nlink) = match node.kind() {
            NodeKind::Directory => (DIRECTORY_PERM, 2),
            NodeKind::File => (FILE_PERM, 1),
        };
        Self {
            kind: node.kind(),
            perm,
            nlink,
            size: node.size(),
            mtime: node.mtime(),
        }
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    session: Mutex<Session>,
}

impl Dispatcher {
    pub fn new(store: ObjectStore) -> Self {
        Self::from_session(Session::new(store))
    }

    pub fn from_session(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    /// Number of nodes the session holds open.
    pub async fn open_count(&self) -> usize {
        self.session.lock().await.open_count()
    }

    /// A file reopened this session reports when its current version was
    /// stored, since file content carries no timestamp.
    pub async fn attributes(&self, path: &str) -> Result<Attributes, FsError> {
        let mut session = self.session.lock().await;
        let name = session.resolve(path).await?;

        if session.node(&name)?.mtime().is_none() {
            let stored = session.store().modified(&name).await?;
            if let (Some(mtime), Some(file)) = (stored, session.node_mut(&name)?.as_file_mut()) {
                file.restore_mtime(mtime);
            }
        }

        Ok(Attributes::of(session.node(&name)?))
    }

    /// Entry names of a directory, `.` and `..` first.
    ///
    /// Anything that does not resolve to a directory lists as empty.
    pub async fn list(&self, path: &str) -> Result<Vec<String>, FsError> {
        let mut session = self.session.lock().await;
        let node = match session.resolve_path(path).await {
            Ok(node) => node,
            Err(SessionError::Store(e)) => return Err(e.into()),
            Err(_) => return Ok(Vec::new()),
        };
        let Some(dir) = node.as_directory() else {
            return Ok(Vec::new());
        };

        let mut entries = vec![".".to_string(), "..".to_string()];
        entries.extend(dir.children().map(|(_, display)| display.to_string()));
        Ok(entries)
    }

    pub async fn create_directory(&self, path: &str) -> Result<(), FsError> {
        let mut session = self.session.lock().await;
        let (parent, leaf) = vacant_entry(&mut session, path).await?;

        let mut child = Directory::create(session.store());
        child.flush().await?;
        let child = session.insert(Node::Directory(child));

        link(&mut session, parent, child, leaf).await?;
        debug!(path, name = %child, "created directory");
        Ok(())
    }

    pub async fn remove_directory(&self, path: &str) -> Result<(), FsError> {
        let mut session = self.session.lock().await;
        if path_leaf(path).is_empty() {
            return Err(FsError::NotSupported("cannot remove the root".to_string()));
        }

        let child = session.resolve(path).await?;
        match session.node(&child)?.as_directory() {
            None => return Err(FsError::NotDirectory(path.to_string())),
            Some(dir) if !dir.is_empty() => return Err(FsError::NotEmpty(path.to_string())),
            Some(_) => {}
        }
        let parent = session.resolve(path_parent(path)).await?;

        unlink(&mut session, parent, child).await?;
        session.close_node(&child).await?;
        session.store().delete(&child).await?;

        debug!(path, name = %child, "removed directory");
        Ok(())
    }

    /// Create an empty file. The file is stored and closed, not left open.
    pub async fn create_file(&self, path: &str) -> Result<(), FsError> {
        let mut session = self.session.lock().await;
        let (parent, leaf) = vacant_entry(&mut session, path).await?;

        let file = File::create(session.store());
        let child = file.name();
        file.close().await?;

        link(&mut session, parent, child, leaf).await?;
        debug!(path, name = %child, "created file");
        Ok(())
    }

    /// Remove a file. Directories are not found by this call.
    pub async fn remove(&self, path: &str) -> Result<(), FsError> {
        let mut session = self.session.lock().await;

        let name = session.resolve(path).await?;
        if session.node(&name)?.is_dir() {
            return Err(FsError::NotFound(path.to_string()));
        }
        let parent = session.resolve(path_parent(path)).await?;

        unlink(&mut session, parent, name).await?;
        session.forget(&name);
        session.store().delete(&name).await?;

        debug!(path, %name, "removed file");
        Ok(())
    }

    pub async fn set_times(&self, path: &str, mtime: SystemTime) -> Result<(), FsError> {
        let mut session = self.session.lock().await;
        let node = session.resolve_path(path).await?;
        node.set_mtime(mtime);
        node.flush().await?;
        Ok(())
    }

    pub async fn resize(&self, path: &str, len: u64) -> Result<(), FsError> {
        let mut session = self.session.lock().await;
        let node = session.resolve_path(path).await?;
        node.as_file_mut()
            .ok_or_else(|| FsError::IsDirectory(path.to_string()))?
            .truncate(len)?;
        node.flush().await?;
        Ok(())
    }

    /// Read up to `len` bytes at `offset`. Short only at end of content.
    pub async fn read_at(&self, path: &str, len: usize, offset: u64) -> Result<Vec<u8>, FsError> {
        let mut session = self.session.lock().await;
        let file = session
            .resolve_path(path)
            .await?
            .as_file_mut()
            .ok_or_else(|| FsError::IsDirectory(path.to_string()))?;
        file.seek(SeekFrom::Start(offset));
        Ok(file.read(Some(len)))
    }

    /// Write `data` at `offset`. Changes stay in memory until release or flush.
    pub async fn write_at(&self, path: &str, data: &[u8], offset: u64) -> Result<usize, FsError> {
        let mut session = self.session.lock().await;
        let file = session
            .resolve_path(path)
            .await?
            .as_file_mut()
            .ok_or_else(|| FsError::IsDirectory(path.to_string()))?;
        file.seek(SeekFrom::Start(offset));
        file.write(data)?;
        Ok(data.len())
    }

    /// Flush without closing.
    pub async fn flush(&self, path: &str) -> Result<(), FsError> {
        let mut session = self.session.lock().await;
        session.resolve_path(path).await?.flush().await?;
        Ok(())
    }

    /// Flush and close.
    pub async fn release(&self, path: &str) -> Result<(), FsError> {
        let mut session = self.session.lock().await;
        let name = session.resolve(path).await?;
        session.close_node(&name).await?;
        Ok(())
    }

    /// Move `from` to `to`. The destination must not exist.
    ///
    /// Across directories the new link is stored before the old one is
    /// removed, so a crash in between leaves the node linked twice rather
    /// than not at all.
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let mut session = self.session.lock().await;
        if path_leaf(from).is_empty() {
            return Err(FsError::NotSupported("cannot move the root".to_string()));
        }

        let name = session.resolve(from).await?;
        let old_parent = session.resolve(path_parent(from)).await?;
        let (new_parent, leaf) = vacant_entry(&mut session, to).await?;

        // Compared by name, not by path text: the destination's ancestry
        // must not pass through the node being moved.
        let ancestry = session.resolve_chain(path_parent(to)).await?;
        if ancestry.contains(&name) {
            return Err(FsError::NotSupported(format!(
                "cannot move {} inside itself",
                from
            )));
        }

        if old_parent == new_parent {
            let node = session.node_mut(&old_parent)?;
            let dir = node
                .as_directory_mut()
                .ok_or_else(|| FsError::NotDirectory(path_parent(from).to_string()))?;
            dir.remove_child(&name)?;
            dir.add_child(name, leaf)?;
            node.flush().await?;
        } else {
            link(&mut session, new_parent, name, leaf).await?;
            unlink(&mut session, old_parent, name).await?;
        }

        debug!(from, to, %name, "renamed");
        Ok(())
    }

    pub async fn check_filesystem(&self) -> Result<Presence, FsError> {
        let mut session = self.session.lock().await;
        Ok(session.check_filesystem().await?)
    }

    /// Create an empty filesystem. Refuses to overwrite anything stored
    /// under the root name, readable or not.
    pub async fn init_filesystem(&self) -> Result<(), FsError> {
        let mut session = self.session.lock().await;
        match session.check_filesystem().await? {
            Presence::Absent => Ok(session.init_filesystem().await?),
            presence => Err(FsError::AlreadyExists(format!("filesystem is {}", presence))),
        }
    }

    pub async fn sweep(&self, dry_run: bool) -> Result<SweepReport, FsError> {
        let mut session = self.session.lock().await;
        Ok(session.sweep(dry_run).await?)
    }

    /// Flush and close every open node.
    pub async fn shutdown(&self) -> Result<(), FsError> {
        let mut session = self.session.lock().await;
        let open = session.open_count();
        session.shutdown().await?;
        info!(open, "session drained");
        Ok(())
    }
}

/// Resolve the parent of `path` and check that its leaf is free.
async fn vacant_entry<'p>(
    session: &mut Session,
    path: &'p str,
) -> Result<(Name, &'p str), FsError> {
    let leaf = path_leaf(path);
    if leaf.is_empty() {
        return Err(FsError::AlreadyExists(path.to_string()));
    }

    let parent_path = path_parent(path);
    let parent = session.resolve(parent_path).await?;
    let dir = session
        .node(&parent)?
        .as_directory()
        .ok_or_else(|| FsError::NotDirectory(parent_path.to_string()))?;
    if dir.child(leaf).is_some() {
        return Err(FsError::AlreadyExists(path.to_string()));
    }

    Ok((parent, leaf))
}

/// Add `child` to `parent` under `leaf` and flush the parent.
async fn link(session: &mut Session, parent: Name, child: Name, leaf: &str) -> Result<(), FsError> {
    let node = session.node_mut(&parent)?;
    node.as_directory_mut()
        .ok_or_else(|| FsError::NotDirectory(parent.to_string()))?
        .add_child(child, leaf)?;
    node.flush().await?;
    Ok(())
}

/// Drop `child` from `parent` and flush the parent.
async fn unlink(session: &mut Session, parent: Name, child: Name) -> Result<(), FsError> {
    let node = session.node_mut(&parent)?;
    node.as_directory_mut()
        .ok_or_else(|| FsError::NotDirectory(parent.to_string()))?
        .remove_child(&child)?;
    node.flush().await?;
    Ok(())
}
