//! Open-node table and path resolution.
//!
//! A [`Session`] is the only place nodes live in memory. It holds at most
//! one [`Node`] per [`Name`]; every read and write for that name goes
//! through the same instance, which is the only coherence the filesystem
//! has since the mailbox offers no locking.
//!
//! The table starts empty and must be drained with [`Session::shutdown`]
//! before the session is dropped, or unflushed changes are lost.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::blob::Blob;
use crate::name::Name;
use crate::node::Node;
use crate::store::{ObjectStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("corrupt node {name}: {reason}")]
    Corrupt { name: Name, reason: String },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub struct Session {
    store: ObjectStore,
    nodes: HashMap<Name, Node>,
}

impl Session {
    pub fn new(store: ObjectStore) -> Self {
        Self {
            store,
            nodes: HashMap::new(),
        }
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Number of nodes currently open.
    pub fn open_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_open(&self, name: &Name) -> bool {
        self.nodes.contains_key(name)
    }

    /// Names of every open node.
    pub fn open_names(&self) -> Vec<Name> {
        self.nodes.keys().copied().collect()
    }

    /// The open node for `name`, loading and decoding it on first use.
    pub async fn open_node(&mut self, name: Name) -> Result<&mut Node, SessionError> {
        if !self.nodes.contains_key(&name) {
            let blob = Blob::open(&self.store, name)
                .await?
                .ok_or_else(|| SessionError::NotFound(name.to_string()))?;
            let node = Node::from_blob(blob).map_err(|e| SessionError::Corrupt {
                name,
                reason: e.to_string(),
            })?;

            debug!(%name, kind = ?node.kind(), "opened node");
            self.nodes.insert(name, node);
        }

        self.node_mut(&name)
    }

    /// An already open node.
    pub fn node(&self, name: &Name) -> Result<&Node, SessionError> {
        self.nodes
            .get(name)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))
    }

    /// An already open node, mutably.
    pub fn node_mut(&mut self, name: &Name) -> Result<&mut Node, SessionError> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))
    }

    /// Track a freshly created node. Its name must not be open already.
    pub fn insert(&mut self, node: Node) -> Name {
        let name = node.name();
        if self.nodes.insert(name, node).is_some() {
            warn!(%name, "replaced an open node");
        }
        name
    }

    /// Flush `name` and drop it from the table. No-op if it is not open.
    ///
    /// A failed flush leaves the node open so the changes are not lost.
    pub async fn close_node(&mut self, name: &Name) -> Result<(), SessionError> {
        let Some(node) = self.nodes.get_mut(name) else {
            return Ok(());
        };
        node.flush().await?;

        if let Some(node) = self.nodes.remove(name) {
            node.close().await?;
        }
        debug!(%name, "closed node");
        Ok(())
    }

    /// Drop `name` from the table without flushing. Used once its content
    /// has been deleted from the store.
    pub fn forget(&mut self, name: &Name) -> Option<Node> {
        self.nodes.remove(name)
    }

    /// Walk `path` from the root and return the name it ends at.
    ///
    /// Every node on the way is opened. A segment that is missing, or that
    /// passes through a file, resolves to NotFound.
    pub async fn resolve(&mut self, path: &str) -> Result<Name, SessionError> {
        let chain = self.resolve_chain(path).await?;
        Ok(chain.last().copied().unwrap_or(Name::ROOT))
    }

    /// Walk `path` and return every name on the way, root first.
    pub async fn resolve_chain(&mut self, path: &str) -> Result<Vec<Name>, SessionError> {
        let mut current = Name::ROOT;
        self.open_node(current).await?;
        let mut chain = vec![current];

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let dir = self
                .node(&current)?
                .as_directory()
                .ok_or_else(|| SessionError::NotFound(path.to_string()))?;
            current = dir
                .child(segment)
                .ok_or_else(|| SessionError::NotFound(path.to_string()))?;
            self.open_node(current).await?;
            chain.push(current);
        }

        Ok(chain)
    }

    /// Walk `path` and return its open node.
    pub async fn resolve_path(&mut self, path: &str) -> Result<&mut Node, SessionError> {
        let name = self.resolve(path).await?;
        self.node_mut(&name)
    }

    /// Flush and close every open node.
    ///
    /// The table is drained even when a flush fails; the first failure is
    /// returned after the rest have been attempted.
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        let mut first_err = None;
        let nodes: Vec<(Name, Node)> = self.nodes.drain().collect();
        for (name, node) in nodes {
            if let Err(e) = node.close().await {
                warn!(%name, error = %e, "failed to flush node at shutdown");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

fn trim_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Everything before the last `/`. The parent of a top-level entry is `/`.
pub fn path_parent(path: &str) -> &str {
    let path = trim_path(path);
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Everything after the last `/`. Empty for the root.
pub fn path_leaf(path: &str) -> &str {
    let path = trim_path(path);
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
