use std::time::Duration;
use tempfile::tempdir;

use crate::tests::helpers::{tiny_options, wait_until};
use crate::Collection;

#[test]
fn memtable_shadows_a_persisted_value() {
    let dir = tempdir().unwrap();
    let col = Collection::open(tiny_options(dir.path())).unwrap();

    col.put(b"key".to_vec(), b"old".to_vec(), b"key".to_vec()).unwrap();
    // Pad past the memtable limit so "key" gets persisted to level 0.
    for i in 0..20u32 {
        let pad = format!("pad{i:04}").into_bytes();
        col.put(pad.clone(), b"x".to_vec(), pad).unwrap();
    }
    assert!(wait_until(Duration::from_secs(5), || col.level_file_count(0) > 0));

    col.put(b"key".to_vec(), b"new".to_vec(), b"key".to_vec()).unwrap();
    assert_eq!(col.get(b"key").unwrap(), Some(b"new".to_vec()));
}

#[test]
fn value_survives_a_round_trip_through_a_persisted_level() {
    let dir = tempdir().unwrap();
    let col = Collection::open(tiny_options(dir.path())).unwrap();

    col.put(b"k1".to_vec(), b"v1".to_vec(), b"k1".to_vec()).unwrap();
    for i in 0..20u32 {
        let pad = format!("pad{i:04}").into_bytes();
        col.put(pad.clone(), b"x".to_vec(), pad).unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || col.get(b"k1").unwrap() == Some(b"v1".to_vec())));
}

#[test]
fn tombstone_persisted_to_a_level_still_hides_the_key() {
    let dir = tempdir().unwrap();
    let col = Collection::open(tiny_options(dir.path())).unwrap();

    col.put(b"dead".to_vec(), b"soon".to_vec(), b"dead".to_vec()).unwrap();
    col.delete(b"dead".to_vec()).unwrap();
    for i in 0..20u32 {
        let pad = format!("pad{i:04}").into_bytes();
        col.put(pad.clone(), b"x".to_vec(), pad).unwrap();
    }
    assert!(wait_until(Duration::from_secs(5), || col.level_file_count(0) > 0));

    assert_eq!(col.get(b"dead").unwrap(), None);
}
