//! Integration tests for rename

mod common;

use ::common::dispatch::FsError;

#[tokio::test]
async fn test_rename_in_place() {
    let (fs, mailbox) = common::setup_test_env().await;
    common::write_file(&fs, "/old.txt", b"content").await;

    fs.rename("/old.txt", "/new.txt").await.unwrap();

    let fs = common::reopen(fs, &mailbox).await;
    assert_eq!(fs.list("/").await.unwrap(), vec![".", "..", "new.txt"]);
    assert_eq!(common::read_file(&fs, "/new.txt").await, b"content");
}

#[tokio::test]
async fn test_rename_across_directories() {
    let (fs, mailbox) = common::setup_test_env().await;
    fs.create_directory("/src").await.unwrap();
    fs.create_directory("/dst").await.unwrap();
    common::write_file(&fs, "/src/file", b"moved").await;

    fs.rename("/src/file", "/dst/renamed").await.unwrap();

    let fs = common::reopen(fs, &mailbox).await;
    assert_eq!(fs.list("/src").await.unwrap(), vec![".", ".."]);
    assert_eq!(fs.list("/dst").await.unwrap(), vec![".", "..", "renamed"]);
    assert_eq!(common::read_file(&fs, "/dst/renamed").await, b"moved");
}

#[tokio::test]
async fn test_rename_directory_keeps_children() {
    let (fs, _mailbox) = common::setup_test_env().await;
    fs.create_directory("/a").await.unwrap();
    fs.create_directory("/b").await.unwrap();
    common::write_file(&fs, "/a/f", b"x").await;

    fs.rename("/a", "/b/a").await.unwrap();
    assert_eq!(common::read_file(&fs, "/b/a/f").await, b"x");
}

#[tokio::test]
async fn test_rename_does_not_overwrite() {
    let (fs, _mailbox) = common::setup_test_env().await;
    fs.create_file("/a").await.unwrap();
    fs.create_file("/b").await.unwrap();

    assert!(matches!(
        fs.rename("/a", "/b").await,
        Err(FsError::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_rename_errors() {
    let (fs, _mailbox) = common::setup_test_env().await;
    fs.create_directory("/a").await.unwrap();

    assert!(matches!(
        fs.rename("/missing", "/x").await,
        Err(FsError::NotFound(_))
    ));
    assert!(matches!(
        fs.rename("/a", "/nope/a").await,
        Err(FsError::NotFound(_))
    ));
    assert!(matches!(
        fs.rename("/a", "/a/inner").await,
        Err(FsError::NotSupported(_))
    ));
}

#[tokio::test]
async fn test_rename_into_itself_through_odd_paths() {
    let (fs, _mailbox) = common::setup_test_env().await;
    fs.create_directory("/a").await.unwrap();
    fs.create_directory("/a/b").await.unwrap();

    for to in ["//a/b/c", "/a//b/c", "//a/x", "/a/./x"] {
        let result = fs.rename("/a", to).await;
        assert!(
            matches!(result, Err(FsError::NotSupported(_)) | Err(FsError::NotFound(_))),
            "rename to {} should be refused, got {:?}",
            to,
            result
        );
    }

    // Still linked from the root with its subtree intact
    assert_eq!(fs.list("/").await.unwrap(), vec![".", "..", "a"]);
    assert_eq!(fs.list("/a").await.unwrap(), vec![".", "..", "b"]);

    let report = fs.sweep(true).await.unwrap();
    assert_eq!(report.orphans, 0);
}
