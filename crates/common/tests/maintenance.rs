//! Integration tests for presence detection, the orphan sweep, and
//! storage failures

mod common;

use ::common::bootstrap::Presence;
use ::common::dispatch::{Dispatcher, FsError};
use ::common::name::Name;
use ::common::node::File;
use ::common::store::{MemoryMailbox, ObjectStore};

#[tokio::test]
async fn test_presence_detection() {
    let mailbox = MemoryMailbox::new();
    let fs = Dispatcher::new(ObjectStore::new(mailbox.clone()));
    assert_eq!(fs.check_filesystem().await.unwrap(), Presence::Absent);

    fs.init_filesystem().await.unwrap();
    assert_eq!(fs.check_filesystem().await.unwrap(), Presence::Present);

    let fs = common::reopen(fs, &mailbox).await;
    assert_eq!(fs.check_filesystem().await.unwrap(), Presence::Present);
}

#[tokio::test]
async fn test_corrupt_root() {
    let mailbox = MemoryMailbox::new();
    // Content stored under another key decodes to noise
    mailbox.insert_raw(&Name::ROOT.subject(), b"\x8f\x02\xd1\x7a");
    let fs = Dispatcher::new(ObjectStore::new(mailbox.clone()));

    assert_eq!(fs.check_filesystem().await.unwrap(), Presence::Corrupt);
    assert!(matches!(
        fs.init_filesystem().await,
        Err(FsError::AlreadyExists(_))
    ));
    // Ordinary calls cannot report corruption distinctly
    assert!(matches!(fs.attributes("/").await, Err(FsError::Corrupt(_))));
}

#[tokio::test]
async fn test_root_stored_as_file_is_corrupt() {
    let mailbox = MemoryMailbox::new();
    mailbox.insert_raw(&Name::ROOT.subject(), b"fnot a directory");
    let fs = Dispatcher::new(ObjectStore::new(mailbox));
    assert_eq!(fs.check_filesystem().await.unwrap(), Presence::Corrupt);
}

#[tokio::test]
async fn test_sweep_clean_tree() {
    let (fs, _mailbox) = common::setup_test_env().await;
    fs.create_directory("/a").await.unwrap();
    common::write_file(&fs, "/a/f", b"data").await;
    common::write_file(&fs, "/g", b"more").await;
    fs.remove("/g").await.unwrap();

    let report = fs.sweep(false).await.unwrap();
    assert_eq!(report.reachable, 3);
    assert_eq!(report.orphans, 0);
    assert_eq!(report.stale_versions, 0);
    assert_eq!(report.deleted, 0);
}

#[tokio::test]
async fn test_sweep_reclaims_orphans() {
    let (fs, mailbox) = common::setup_test_env().await;
    common::write_file(&fs, "/kept", b"kept").await;

    // A create that stored its child but never linked it
    let mut orphan = File::create(&ObjectStore::new(mailbox.clone()));
    orphan.write(b"orphan").unwrap();
    orphan.close().await.unwrap();
    let live = mailbox.live_count();

    let preview = fs.sweep(true).await.unwrap();
    assert_eq!(preview.orphans, 1);
    assert_eq!(mailbox.live_count(), live);

    let report = fs.sweep(false).await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(mailbox.live_count(), live - 1);
    assert_eq!(common::read_file(&fs, "/kept").await, b"kept");
}

#[tokio::test]
async fn test_sweep_keeps_unflushed_work() {
    let (fs, mailbox) = common::setup_test_env().await;
    fs.create_file("/f").await.unwrap();
    fs.write_at("/f", b"pending", 0).await.unwrap();

    fs.sweep(false).await.unwrap();

    let fs = common::reopen(fs, &mailbox).await;
    assert_eq!(common::read_file(&fs, "/f").await, b"pending");
}

#[tokio::test]
async fn test_storage_failure_is_not_fatal() {
    let (fs, mailbox) = common::setup_test_env().await;
    common::write_file(&fs, "/f", b"data").await;

    mailbox.set_offline(true);
    assert!(matches!(fs.attributes("/f").await, Err(FsError::Storage(_))));
    assert!(matches!(fs.create_file("/g").await, Err(FsError::Storage(_))));

    mailbox.set_offline(false);
    assert_eq!(common::read_file(&fs, "/f").await, b"data");
    fs.create_file("/g").await.unwrap();
}
