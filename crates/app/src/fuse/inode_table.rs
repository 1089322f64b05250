//! Inode to path mapping for the FUSE bridge
//!
//! FUSE identifies entries by inode (u64), but the dispatcher works on
//! paths. Inodes are handed out on first sight of a path and live for the
//! duration of the mount.

use std::collections::HashMap;

/// Bidirectional mapping between inodes and paths
#[derive(Debug)]
pub struct InodeTable {
    path_to_inode: HashMap<String, u64>,
    inode_to_path: HashMap<u64, String>,
    next_inode: u64,
}

impl InodeTable {
    /// The root directory is always inode 1
    pub const ROOT_INODE: u64 = 1;

    pub fn new() -> Self {
        let mut table = Self {
            path_to_inode: HashMap::new(),
            inode_to_path: HashMap::new(),
            next_inode: Self::ROOT_INODE + 1,
        };

        table.path_to_inode.insert("/".to_string(), Self::ROOT_INODE);
        table.inode_to_path.insert(Self::ROOT_INODE, "/".to_string());

        table
    }

    /// Path of the entry `name` inside the directory at `parent`
    pub fn child_path(parent: &str, name: &str) -> String {
        if parent == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", parent, name)
        }
    }

    /// Get inode for a path, creating one if it doesn't exist
    pub fn get_or_create(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.path_to_inode.get(path) {
            return ino;
        }

        let ino = self.next_inode;
        self.next_inode += 1;
        self.path_to_inode.insert(path.to_string(), ino);
        self.inode_to_path.insert(ino, path.to_string());
        ino
    }

    /// Get path for an inode
    pub fn get_path(&self, inode: u64) -> Option<&str> {
        self.inode_to_path.get(&inode).map(String::as_str)
    }

    /// Forget a removed path
    pub fn remove_path(&mut self, path: &str) {
        if let Some(ino) = self.path_to_inode.remove(path) {
            self.inode_to_path.remove(&ino);
        }
    }

    /// Move a path and everything below it, keeping their inodes
    pub fn rename(&mut self, from: &str, to: &str) {
        let prefix = format!("{}/", from);
        let moved: Vec<(String, u64)> = self
            .path_to_inode
            .iter()
            .filter(|(path, _)| path.as_str() == from || path.starts_with(&prefix))
            .map(|(path, ino)| (path.clone(), *ino))
            .collect();

        // Whatever was at the destination is gone
        self.remove_path(to);

        for (old, ino) in moved {
            let new = format!("{}{}", to, &old[from.len()..]);
            self.path_to_inode.remove(&old);
            self.path_to_inode.insert(new.clone(), ino);
            self.inode_to_path.insert(ino, new);
        }
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
