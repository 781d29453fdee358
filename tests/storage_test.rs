//! Snapshot file load/save behavior.

mod common;

use common::{did, temp_dir};
use didlist::error::Error;
use didlist::storage::{self, SnapshotFile};

#[tokio::test]
async fn save_then_load_preserves_order() {
    let path = temp_dir().join("pending.txt");
    let ids = vec![did("did:plc:ccc"), did("did:plc:aaa"), did("did:plc:bbb")];

    storage::save(&path, &ids).await.unwrap();
    let loaded = storage::load(&path).await.unwrap();

    assert_eq!(loaded, Some(ids));
}

#[tokio::test]
async fn saved_file_is_newline_joined() {
    let path = temp_dir().join("added.txt");
    storage::save(&path, &[did("did:plc:aaa"), did("did:plc:bbb")])
        .await
        .unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw, "did:plc:aaa\ndid:plc:bbb");
}

#[tokio::test]
async fn empty_snapshot_round_trips() {
    let path = temp_dir().join("pending.txt");
    storage::save(&path, &[]).await.unwrap();
    assert_eq!(storage::load(&path).await.unwrap(), Some(vec![]));
}

#[tokio::test]
async fn missing_file_is_no_snapshot() {
    let path = temp_dir().join("nope.txt");
    assert_eq!(storage::load(&path).await.unwrap(), None);
}

#[tokio::test]
async fn trailing_partial_line_is_kept() {
    let path = temp_dir().join("pending.txt");
    std::fs::write(&path, "did:plc:aaa\ndid:plc:bbb").unwrap();

    let loaded = storage::load(&path).await.unwrap().unwrap();
    assert_eq!(loaded, vec![did("did:plc:aaa"), did("did:plc:bbb")]);
}

#[tokio::test]
async fn trailing_newline_adds_nothing() {
    let path = temp_dir().join("pending.txt");
    std::fs::write(&path, "did:plc:bbb\n").unwrap();

    let loaded = storage::load(&path).await.unwrap().unwrap();
    assert_eq!(loaded, vec![did("did:plc:bbb")]);
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
    let path = temp_dir().join("added.txt");
    std::fs::write(&path, "did:plc:aaa\n\nnot a did\r\ndid:plc:bbb\r\n").unwrap();

    let loaded = storage::load(&path).await.unwrap().unwrap();
    assert_eq!(loaded, vec![did("did:plc:aaa"), did("did:plc:bbb")]);
}

#[tokio::test]
async fn unreadable_snapshot_is_persistence_error() {
    // A directory opens but cannot be read as lines.
    let path = temp_dir().join("added.txt");
    std::fs::create_dir_all(&path).unwrap();

    let result = storage::load(&path).await;
    assert!(matches!(result, Err(Error::Persistence { .. })));
}

#[tokio::test]
async fn invalid_utf8_line_is_skipped() {
    let path = temp_dir().join("pending.txt");
    std::fs::write(&path, b"did:plc:aaa\n\xff\xfe\r\ndid:plc:bbb").unwrap();

    assert_eq!(
        storage::load(&path).await.unwrap(),
        Some(vec![did("did:plc:aaa"), did("did:plc:bbb")])
    );
}

#[tokio::test]
async fn save_overwrites_in_full() {
    let path = temp_dir().join("pending.txt");
    storage::save(&path, &[did("did:plc:aaa"), did("did:plc:bbb"), did("did:plc:ccc")])
        .await
        .unwrap();
    storage::save(&path, &[did("did:plc:zzz")]).await.unwrap();

    assert_eq!(
        storage::load(&path).await.unwrap(),
        Some(vec![did("did:plc:zzz")])
    );
    assert!(!path.with_file_name("pending.txt.tmp").exists());
}

#[tokio::test]
async fn concurrent_saves_to_one_file_do_not_interleave() {
    let file = std::sync::Arc::new(SnapshotFile::new(temp_dir().join("added.txt")));
    let small = vec![did("did:plc:s1")];
    let large: Vec<_> = (0..500).map(|i| did(&format!("did:plc:l{i}"))).collect();

    let (a, b) = tokio::join!(file.save(&large), file.save(&small));
    a.unwrap();
    b.unwrap();

    let loaded = file.load().await.unwrap().unwrap();
    assert!(loaded == small || loaded == large);
}
