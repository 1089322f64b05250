//! Orphan sweep.
//!
//! Multi-object mutations are not atomic, so an interrupted create can
//! leave an object nothing links to, and an interrupted flush can leave an
//! old version next to the new one. The sweep finds both by walking the
//! tree from the root and comparing against everything in the mailbox.

use std::collections::{BTreeMap, HashSet};

use tracing::{info, warn};

use crate::blob::Blob;
use crate::name::Name;
use crate::node::Node;
use crate::session::{Session, SessionError};
use crate::store::Uid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Names reachable from the root.
    pub reachable: usize,
    /// Child links pointing at names with no stored version.
    pub dangling: usize,
    /// Stored names nothing links to.
    pub orphans: usize,
    /// Superseded versions of reachable names.
    pub stale_versions: usize,
    /// Versions chosen for deletion.
    pub selected: usize,
    /// Versions flagged deleted by this sweep.
    pub deleted: usize,
    /// Versions permanently removed from the mailbox afterwards.
    pub expunged: usize,
}

impl Session {
    /// Delete every stored version that is unreachable or superseded.
    ///
    /// Open nodes are flushed first and always count as reachable. Subjects
    /// that are not node names belong to someone else and are left alone.
    /// With `dry_run` nothing is deleted.
    pub async fn sweep(&mut self, dry_run: bool) -> Result<SweepReport, SessionError> {
        for name in self.open_names() {
            self.node_mut(&name)?.flush().await?;
        }

        let mut report = SweepReport::default();
        let reachable = self.reachable_names(&mut report).await?;
        report.reachable = reachable.len();

        let mut by_subject: BTreeMap<String, Vec<Uid>> = BTreeMap::new();
        for (subject, uid) in self.store().versions().await? {
            by_subject.entry(subject).or_default().push(uid);
        }

        let mut doomed = Vec::new();
        for (subject, mut uids) in by_subject {
            let Ok(name) = subject.parse::<Name>() else {
                continue;
            };
            uids.sort();

            if reachable.contains(&name) || self.is_open(&name) {
                uids.pop();
                report.stale_versions += uids.len();
            } else {
                report.orphans += 1;
            }
            doomed.extend(uids);
        }

        report.selected = doomed.len();
        if !dry_run {
            for uid in doomed {
                self.store().delete_version(uid).await?;
                report.deleted += 1;
            }
            report.expunged = self.store().expunge().await?;
        }

        info!(?report, dry_run, "sweep finished");
        Ok(report)
    }

    /// Names reachable from the root, loading closed directories without
    /// opening them.
    async fn reachable_names(
        &mut self,
        report: &mut SweepReport,
    ) -> Result<HashSet<Name>, SessionError> {
        let mut reachable = HashSet::new();
        let mut pending = vec![Name::ROOT];

        while let Some(name) = pending.pop() {
            if reachable.contains(&name) {
                continue;
            }

            let children: Vec<Name> = if self.is_open(&name) {
                match self.node(&name)?.as_directory() {
                    Some(dir) => dir.children().map(|(child, _)| child).collect(),
                    None => Vec::new(),
                }
            } else {
                let Some(blob) = Blob::open(self.store(), name).await? else {
                    if name.is_root() {
                        return Err(SessionError::NotFound(name.to_string()));
                    }
                    warn!(%name, "dangling child link");
                    report.dangling += 1;
                    continue;
                };
                match Node::from_blob(blob) {
                    Ok(Node::Directory(dir)) => dir.children().map(|(child, _)| child).collect(),
                    Ok(Node::File(_)) => Vec::new(),
                    Err(e) => {
                        warn!(%name, error = %e, "undecodable node kept by sweep");
                        Vec::new()
                    }
                }
            };

            reachable.insert(name);
            pending.extend(children);
        }

        Ok(reachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Directory, File};
    use crate::store::{MemoryMailbox, ObjectStore};

    #[tokio::test]
    async fn test_sweep_removes_unlinked_objects() {
        let mailbox = MemoryMailbox::new();
        let mut session = Session::new(ObjectStore::new(mailbox.clone()));
        session.init_filesystem().await.unwrap();

        // Created and flushed but never linked, as after a crash mid-create
        let mut lost = File::create(session.store());
        lost.write(b"lost").unwrap();
        lost.close().await.unwrap();

        // Foreign mail is not ours to delete
        mailbox.insert_raw("Re: lunch", b"sure");

        let preview = session.sweep(true).await.unwrap();
        assert_eq!(preview.orphans, 1);
        assert_eq!(preview.selected, 1);
        assert_eq!(preview.deleted, 0);
        assert_eq!(mailbox.live_count(), 3);

        let report = session.sweep(false).await.unwrap();
        assert_eq!(report.reachable, 1);
        assert_eq!(report.orphans, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(mailbox.live_count(), 2);
    }

    #[tokio::test]
    async fn test_sweep_retires_stale_versions() {
        let mailbox = MemoryMailbox::new();
        let mut session = Session::new(ObjectStore::new(mailbox.clone()));
        session.init_filesystem().await.unwrap();

        // An old root version left behind by an interrupted flush
        mailbox.insert_raw(&Name::ROOT.subject(), b"d\r\n");
        let mut fresh = Directory::create_named(session.store(), Name::ROOT);
        fresh.flush().await.unwrap();
        session.forget(&Name::ROOT);

        let report = session.sweep(false).await.unwrap();
        assert_eq!(report.stale_versions, 1);
        let live = mailbox
            .versions(&Name::ROOT.subject())
            .into_iter()
            .filter(|(_, deleted)| !deleted)
            .count();
        assert_eq!(live, 1);
    }

    #[tokio::test]
    async fn test_sweep_without_root() {
        let mut session = Session::new(ObjectStore::new(MemoryMailbox::new()));
        assert!(matches!(
            session.sweep(false).await,
            Err(SessionError::NotFound(_))
        ));
    }
}
