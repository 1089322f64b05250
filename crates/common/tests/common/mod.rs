//! Shared test utilities for filesystem integration tests
#![allow(dead_code)]

use ::common::dispatch::Dispatcher;
use ::common::store::{MemoryMailbox, ObjectStore};
use object_store::MailboxStore;
use tempfile::TempDir;

/// Set up an initialized filesystem over an in-memory mailbox. The mailbox
/// handle shares state with the one the dispatcher uses.
pub async fn setup_test_env() -> (Dispatcher, MemoryMailbox) {
    let mailbox = MemoryMailbox::new();
    let fs = Dispatcher::new(ObjectStore::new(mailbox.clone()));
    fs.init_filesystem().await.unwrap();
    (fs, mailbox)
}

/// Drain `fs` and start a new session over the same mailbox, with cold caches.
pub async fn reopen(fs: Dispatcher, mailbox: &MemoryMailbox) -> Dispatcher {
    fs.shutdown().await.unwrap();
    assert_eq!(fs.open_count().await, 0);
    Dispatcher::new(ObjectStore::new(mailbox.clone()))
}

/// Set up an initialized filesystem over an on-disk mailbox.
pub async fn setup_disk_env() -> (Dispatcher, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let fs = open_disk(&temp_dir).await;
    fs.init_filesystem().await.unwrap();
    (fs, temp_dir)
}

/// Open a filesystem over the on-disk mailbox in `dir`.
pub async fn open_disk(dir: &TempDir) -> Dispatcher {
    let mailbox = MailboxStore::new_local(dir.path()).await.unwrap();
    Dispatcher::new(ObjectStore::new(mailbox))
}

/// Create `path` and fill it with `data`, leaving it closed.
pub async fn write_file(fs: &Dispatcher, path: &str, data: &[u8]) {
    fs.create_file(path).await.unwrap();
    assert_eq!(fs.write_at(path, data, 0).await.unwrap(), data.len());
    fs.release(path).await.unwrap();
}

/// Read the whole content of `path`.
pub async fn read_file(fs: &Dispatcher, path: &str) -> Vec<u8> {
    let size = fs.attributes(path).await.unwrap().size;
    fs.read_at(path, size as usize, 0).await.unwrap()
}
