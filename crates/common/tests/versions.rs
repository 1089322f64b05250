//! Integration tests for version retirement and the version cache

mod common;

use std::io::SeekFrom;

use bytes::Bytes;
use ::common::name::Name;
use ::common::node::File;
use ::common::store::{MemoryMailbox, ObjectStore};

#[tokio::test]
async fn test_each_flush_replaces_the_version() {
    let mailbox = MemoryMailbox::new();
    let store = ObjectStore::new(mailbox.clone());

    let mut file = File::create(&store);
    file.write(b"first").unwrap();
    file.flush().await.unwrap();

    file.seek(SeekFrom::Start(0));
    file.write(b"FIRST").unwrap();
    file.flush().await.unwrap();

    let versions = mailbox.versions(&file.name().subject());
    assert_eq!(versions.len(), 2);
    assert_ne!(versions[0].0, versions[1].0);
    assert!(versions[0].1, "older version should be deleted");
    assert!(!versions[1].1, "newer version should be live");

    // A fresh cache sees only the newer content
    let cold = ObjectStore::new(mailbox.clone());
    assert_eq!(
        cold.get(&file.name()).await.unwrap(),
        Some(Bytes::from_static(b"fFIRST"))
    );
}

#[tokio::test]
async fn test_versions_without_append_uids() {
    // Same discipline when the mailbox cannot report where an append landed
    let mailbox = MemoryMailbox::without_append_uids();
    let store = ObjectStore::new(mailbox.clone());

    let mut file = File::create(&store);
    file.write(b"v1").unwrap();
    file.flush().await.unwrap();
    file.truncate(0).unwrap();
    file.write(b"v2").unwrap();
    file.flush().await.unwrap();

    let live: Vec<_> = mailbox
        .versions(&file.name().subject())
        .into_iter()
        .filter(|(_, deleted)| !deleted)
        .collect();
    assert_eq!(live.len(), 1);
    assert_eq!(
        store.get(&file.name()).await.unwrap(),
        Some(Bytes::from_static(b"fv2"))
    );
}

#[tokio::test]
async fn test_flush_is_noop_when_clean() {
    let (fs, mailbox) = common::setup_test_env().await;
    fs.create_file("/f").await.unwrap();
    fs.write_at("/f", b"dirty", 0).await.unwrap();

    fs.flush("/f").await.unwrap();
    let after_first = mailbox.stats();
    fs.flush("/f").await.unwrap();

    assert_eq!(mailbox.stats(), after_first);
}

#[tokio::test]
async fn test_missing_name_is_repeatable() {
    let mailbox = MemoryMailbox::new();
    let store = ObjectStore::new(mailbox.clone());
    let name = Name::generate();

    for _ in 0..2 {
        assert!(store.get(&name).await.unwrap().is_none());
        store.delete(&name).await.unwrap();
        assert!(store.cached_version(&name).is_none());
    }
    assert_eq!(mailbox.stats().deletes, 0);
}

#[tokio::test]
async fn test_cache_is_only_a_shortcut() {
    let mailbox = MemoryMailbox::new();
    let warm = ObjectStore::new(mailbox.clone());
    let name = Name::generate();

    warm.put(&name, Bytes::from_static(b"one")).await.unwrap();
    let cold = ObjectStore::new(mailbox.clone());

    assert_eq!(warm.get(&name).await.unwrap(), cold.get(&name).await.unwrap());
    // The cold store had to search, the warm one did not
    assert!(cold.cached_version(&name).is_some());
    assert_eq!(mailbox.stats().searches, 1);
}
