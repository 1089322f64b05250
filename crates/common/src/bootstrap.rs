//! Filesystem presence detection and initialization.

use tracing::info;

use crate::name::Name;
use crate::node::{Directory, Node, NodeKind};
use crate::session::{Session, SessionError};

/// What was found under the root name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// The root decodes as a directory.
    Present,
    /// Nothing is stored under the root name.
    Absent,
    /// Something is stored under the root name but it is not a directory
    /// this build can decode.
    Corrupt,
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Presence::Present => write!(f, "present"),
            Presence::Absent => write!(f, "absent"),
            Presence::Corrupt => write!(f, "corrupt"),
        }
    }
}

impl Session {
    /// Probe the root. Storage failures are returned as errors, never
    /// folded into a presence state.
    pub async fn check_filesystem(&mut self) -> Result<Presence, SessionError> {
        let kind = match self.open_node(Name::ROOT).await {
            Ok(node) => node.kind(),
            Err(SessionError::NotFound(_)) => return Ok(Presence::Absent),
            Err(SessionError::Corrupt { .. }) => return Ok(Presence::Corrupt),
            Err(e) => return Err(e),
        };

        match kind {
            NodeKind::Directory => Ok(Presence::Present),
            NodeKind::File => {
                self.forget(&Name::ROOT);
                Ok(Presence::Corrupt)
            }
        }
    }

    /// Store a new empty root directory, superseding whatever was there.
    pub async fn init_filesystem(&mut self) -> Result<(), SessionError> {
        self.forget(&Name::ROOT);

        let mut root = Directory::create_named(self.store(), Name::ROOT);
        root.flush().await?;
        self.insert(Node::Directory(root));

        info!(root = %Name::ROOT, "initialized filesystem");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryMailbox, ObjectStore};

    #[tokio::test]
    async fn test_presence_states() {
        let mailbox = MemoryMailbox::new();
        let mut session = Session::new(ObjectStore::new(mailbox.clone()));
        assert_eq!(session.check_filesystem().await.unwrap(), Presence::Absent);

        session.init_filesystem().await.unwrap();
        assert_eq!(session.check_filesystem().await.unwrap(), Presence::Present);

        // A root stored by something else, or with another key
        let mailbox = MemoryMailbox::new();
        mailbox.insert_raw(&Name::ROOT.subject(), b"d\n\x00garbled");
        let mut session = Session::new(ObjectStore::new(mailbox));
        assert_eq!(session.check_filesystem().await.unwrap(), Presence::Corrupt);
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_absent() {
        let mailbox = MemoryMailbox::new();
        mailbox.set_offline(true);
        let mut session = Session::new(ObjectStore::new(mailbox));
        assert!(matches!(
            session.check_filesystem().await,
            Err(SessionError::Store(_))
        ));
    }
}
