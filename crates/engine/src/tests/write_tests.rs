use std::time::Duration;
use tempfile::tempdir;

use crate::tests::helpers::{tiny_options, wait_until};
use crate::Collection;
use config::CollectionOptions;

#[test]
fn many_writes_past_the_memtable_limit_still_all_read_back() {
    let dir = tempdir().unwrap();
    let col = Collection::open(tiny_options(dir.path())).unwrap();
    for i in 0..200u32 {
        let key = format!("key{i:04}").into_bytes();
        col.put(key.clone(), b"v".to_vec(), key).unwrap();
    }
    assert!(wait_until(Duration::from_secs(5), || col.level_file_count(0) > 0 && col.memtable_size() < 256 * 50));
    for i in 0..200u32 {
        let key = format!("key{i:04}").into_bytes();
        assert_eq!(col.get(&key).unwrap(), Some(b"v".to_vec()), "key{i:04} should be readable");
    }
}

#[test]
fn put_and_get_roundtrip() {
    let dir = tempdir().unwrap();
    let col = Collection::open(CollectionOptions { dir_path: dir.path().to_path_buf(), ..Default::default() }).unwrap();
    col.put(b"name".to_vec(), b"alice".to_vec(), b"name".to_vec()).unwrap();
    assert_eq!(col.get(b"name").unwrap(), Some(b"alice".to_vec()));
}

#[test]
fn get_missing_key_is_none() {
    let dir = tempdir().unwrap();
    let col = Collection::open(CollectionOptions { dir_path: dir.path().to_path_buf(), ..Default::default() }).unwrap();
    assert_eq!(col.get(b"nope").unwrap(), None);
}

#[test]
fn delete_shadows_the_live_value() {
    let dir = tempdir().unwrap();
    let col = Collection::open(CollectionOptions { dir_path: dir.path().to_path_buf(), ..Default::default() }).unwrap();
    col.put(b"k".to_vec(), b"v".to_vec(), b"k".to_vec()).unwrap();
    col.delete(b"k".to_vec()).unwrap();
    assert_eq!(col.get(b"k").unwrap(), None);
}

#[test]
fn put_after_delete_resurrects() {
    let dir = tempdir().unwrap();
    let col = Collection::open(CollectionOptions { dir_path: dir.path().to_path_buf(), ..Default::default() }).unwrap();
    col.put(b"k".to_vec(), b"v1".to_vec(), b"k".to_vec()).unwrap();
    col.delete(b"k".to_vec()).unwrap();
    col.put(b"k".to_vec(), b"v2".to_vec(), b"k".to_vec()).unwrap();
    assert_eq!(col.get(b"k").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn overwrite_keeps_the_newest_value() {
    let dir = tempdir().unwrap();
    let col = Collection::open(CollectionOptions { dir_path: dir.path().to_path_buf(), ..Default::default() }).unwrap();
    col.put(b"k".to_vec(), b"v1".to_vec(), b"k".to_vec()).unwrap();
    col.put(b"k".to_vec(), b"v2".to_vec(), b"k".to_vec()).unwrap();
    assert_eq!(col.get(b"k").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn put_rejects_oversized_sort_key() {
    let dir = tempdir().unwrap();
    let col = Collection::open(CollectionOptions { dir_path: dir.path().to_path_buf(), ..Default::default() }).unwrap();
    let big = vec![b'k'; memtable::MAX_SORT_KEY_LEN + 1];
    let err = col.put(big, b"v".to_vec(), b"d".to_vec()).unwrap_err();
    assert!(err.to_string().contains("sort key too large"));
}

#[test]
fn put_rejects_oversized_delete_key() {
    let dir = tempdir().unwrap();
    let col = Collection::open(CollectionOptions { dir_path: dir.path().to_path_buf(), ..Default::default() }).unwrap();
    let big_delete_key = vec![b'd'; memtable::MAX_DELETE_KEY_LEN + 1];
    let err = col.put(b"k".to_vec(), b"v".to_vec(), big_delete_key).unwrap_err();
    assert!(err.to_string().contains("delete key too large"));
}

#[test]
fn range_delete_shadows_matching_delete_keys_immediately() {
    let dir = tempdir().unwrap();
    let col = Collection::open(CollectionOptions { dir_path: dir.path().to_path_buf(), ..Default::default() }).unwrap();
    col.put(b"a".to_vec(), b"1".to_vec(), b"d1".to_vec()).unwrap();
    col.put(b"b".to_vec(), b"2".to_vec(), b"d5".to_vec()).unwrap();
    col.put(b"c".to_vec(), b"3".to_vec(), b"d9".to_vec()).unwrap();

    col.range_delete(b"d0".to_vec(), b"d6".to_vec()).unwrap();

    assert_eq!(col.get(b"a").unwrap(), None);
    assert_eq!(col.get(b"b").unwrap(), None);
    assert_eq!(col.get(b"c").unwrap(), Some(b"3".to_vec()));
}

#[test]
fn range_delete_does_not_shadow_writes_made_after_it() {
    let dir = tempdir().unwrap();
    let col = Collection::open(CollectionOptions { dir_path: dir.path().to_path_buf(), ..Default::default() }).unwrap();
    col.put(b"a".to_vec(), b"1".to_vec(), b"d1".to_vec()).unwrap();
    col.range_delete(b"d0".to_vec(), b"d6".to_vec()).unwrap();
    col.put(b"a".to_vec(), b"2".to_vec(), b"d1".to_vec()).unwrap();

    assert_eq!(col.get(b"a").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn put_after_close_is_rejected() {
    let dir = tempdir().unwrap();
    let col = Collection::open(CollectionOptions { dir_path: dir.path().to_path_buf(), ..Default::default() }).unwrap();
    col.close().unwrap();
    let err = col.put(b"k".to_vec(), b"v".to_vec(), b"k".to_vec()).unwrap_err();
    assert!(matches!(err, crate::EngineError::Closed));
}
