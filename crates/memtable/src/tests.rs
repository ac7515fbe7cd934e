use super::*;

fn put(m: &Memtable, key: &[u8], value: &[u8], seq: u64) {
    m.put(key.to_vec(), value.to_vec(), b"dk".to_vec(), KeyMeta { seq_num: seq, op_type: OpType::Put })
        .unwrap();
}

fn del(m: &Memtable, key: &[u8], seq: u64) {
    m.put(key.to_vec(), Vec::new(), b"dk".to_vec(), KeyMeta { seq_num: seq, op_type: OpType::Del })
        .unwrap();
}

// -------------------- Basic CRUD --------------------

#[test]
fn put_and_get_single_key() {
    let m = Memtable::new();
    put(&m, b"k1", b"v1", 1);
    assert_eq!(m.len(), 1);
    let (meta, val) = m.get(b"k1").unwrap();
    assert_eq!(meta.seq_num, 1);
    assert_eq!(val.unwrap(), b"v1");
}

#[test]
fn put_overwrites_with_newer_seq() {
    let m = Memtable::new();
    put(&m, b"k1", b"v1", 1);
    put(&m, b"k1", b"v2", 2);
    assert_eq!(m.get(b"k1").unwrap().1.unwrap(), b"v2");
}

#[test]
fn put_ignores_stale_seq() {
    let m = Memtable::new();
    put(&m, b"k1", b"v2", 5);
    put(&m, b"k1", b"v-old", 3);
    assert_eq!(m.get(b"k1").unwrap().1.unwrap(), b"v2");
}

#[test]
fn put_ignores_equal_seq() {
    let m = Memtable::new();
    put(&m, b"k", b"first", 1);
    put(&m, b"k", b"second", 1);
    assert_eq!(m.get(b"k").unwrap().1.unwrap(), b"first");
}

#[test]
fn get_missing_key_returns_none() {
    let m = Memtable::new();
    assert!(m.get(b"nonexistent").is_none());
}

#[test]
fn delete_creates_tombstone() {
    let m = Memtable::new();
    put(&m, b"k1", b"v1", 1);
    del(&m, b"k1", 2);
    assert!(m.get_live(b"k1").is_none());
    assert_eq!(m.len(), 1);
}

// -------------------- Oversize / seal --------------------

#[test]
fn seal_if_oversize_returns_none_below_limit() {
    let m = Memtable::new();
    put(&m, b"k", b"v", 1);
    assert!(m.seal_if_oversize(1_000_000).is_none());
}

#[test]
fn seal_if_oversize_empties_and_returns_snapshot() {
    let m = Memtable::new();
    put(&m, b"k1", b"v1", 1);
    put(&m, b"k2", b"v2", 2);
    let before = m.approx_size();
    assert!(before > 0);

    let sealed = m.seal_if_oversize(1).unwrap();
    assert_eq!(sealed.len(), 2);
    assert!(m.is_empty());
    assert_eq!(m.approx_size(), 0);
}

#[test]
fn seal_if_oversize_on_empty_memtable_is_none() {
    let m = Memtable::new();
    assert!(m.seal_if_oversize(0).is_none());
}

#[test]
fn sealed_memtable_accepts_new_writes_after() {
    let m = Memtable::new();
    put(&m, b"old", b"v", 1);
    let _ = m.seal_if_oversize(1).unwrap();
    put(&m, b"new", b"v", 2);
    assert_eq!(m.get_live(b"new").unwrap(), b"v");
    assert!(m.get_live(b"old").is_none());
}

// -------------------- Traverse ordering --------------------

#[test]
fn traverse_yields_sorted_keys() {
    let m = Memtable::new();
    put(&m, b"c", b"3", 3);
    put(&m, b"a", b"1", 1);
    put(&m, b"b", b"2", 2);

    let mut keys = Vec::new();
    m.traverse(|k, _| keys.push(k.to_vec()));
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn traverse_includes_tombstones() {
    let m = Memtable::new();
    put(&m, b"a", b"1", 1);
    del(&m, b"b", 2);
    put(&m, b"c", b"3", 3);

    let mut seen = Vec::new();
    m.traverse(|k, body| seen.push((k.to_vec(), body.meta.op_type)));
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[1].1, OpType::Del);
}

// -------------------- contains_key --------------------

#[test]
fn contains_key_live_value() {
    let m = Memtable::new();
    put(&m, b"k", b"v", 1);
    assert!(m.contains_key(b"k"));
}

#[test]
fn contains_key_tombstone() {
    let m = Memtable::new();
    del(&m, b"k", 1);
    assert!(m.contains_key(b"k"));
}

#[test]
fn contains_key_missing() {
    let m = Memtable::new();
    assert!(!m.contains_key(b"k"));
}

// -------------------- approx_size tracking --------------------

#[test]
fn approx_size_adjusts_on_overwrite() {
    let m = Memtable::new();
    put(&m, b"a", b"aaa", 1);
    let first = m.approx_size();
    put(&m, b"a", b"bb", 2);
    assert!(m.approx_size() < first);
}

#[test]
fn approx_size_stale_write_no_change() {
    let m = Memtable::new();
    put(&m, b"k", b"v", 5);
    let before = m.approx_size();
    put(&m, b"k", b"vvvv", 3);
    assert_eq!(m.approx_size(), before);
}

// -------------------- Sizing errors --------------------

#[test]
fn put_rejects_oversized_sort_key() {
    let m = Memtable::new();
    let key = vec![0u8; MAX_SORT_KEY_LEN + 1];
    let err = m.put(key, b"v".to_vec(), b"dk".to_vec(), KeyMeta { seq_num: 1, op_type: OpType::Put });
    assert!(matches!(err, Err(MemtableError::SortKeyTooLarge(_, _))));
}

#[test]
fn put_rejects_oversized_delete_key() {
    let m = Memtable::new();
    let dk = vec![0u8; MAX_DELETE_KEY_LEN + 1];
    let err = m.put(b"k".to_vec(), b"v".to_vec(), dk, KeyMeta { seq_num: 1, op_type: OpType::Put });
    assert!(matches!(err, Err(MemtableError::DeleteKeyTooLarge(_, _))));
}

// -------------------- len / is_empty --------------------

#[test]
fn len_counts_tombstones() {
    let m = Memtable::new();
    put(&m, b"a", b"1", 1);
    del(&m, b"b", 2);
    assert_eq!(m.len(), 2);
}

#[test]
fn is_empty_on_new() {
    let m = Memtable::new();
    assert!(m.is_empty());
}

// -------------------- Many / stress --------------------

#[test]
fn many_distinct_keys() {
    let m = Memtable::new();
    for i in 0u64..1000 {
        put(&m, format!("key{:04}", i).as_bytes(), b"v", i);
    }
    assert_eq!(m.len(), 1000);
    let mut keys = Vec::new();
    m.traverse(|k, _| keys.push(k.to_vec()));
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn alternating_put_delete() {
    let m = Memtable::new();
    for i in 0..1_000u64 {
        let seq = i * 2 + 1;
        put(&m, b"k", b"v", seq);
        del(&m, b"k", seq + 1);
    }
    assert!(m.get_live(b"k").is_none());
    assert_eq!(m.len(), 1);
}

// -------------------- Immutable queue --------------------

#[test]
fn immutable_queue_newest_shadows_older() {
    let m1 = Memtable::new();
    put(&m1, b"k", b"old", 1);
    let imm1 = std::sync::Arc::new(m1.seal_if_oversize(1).unwrap());

    let m2 = Memtable::new();
    put(&m2, b"k", b"new", 2);
    let imm2 = std::sync::Arc::new(m2.seal_if_oversize(1).unwrap());

    let queue = ImmutableQueue::new();
    queue.push(imm1);
    queue.push(imm2);

    assert_eq!(queue.get(b"k").unwrap().value, b"new");
    assert_eq!(queue.len(), 2);
}

#[test]
fn immutable_queue_pop_front_drains_oldest() {
    let m = Memtable::new();
    put(&m, b"k", b"v", 1);
    let imm = std::sync::Arc::new(m.seal_if_oversize(1).unwrap());

    let queue = ImmutableQueue::new();
    queue.push(imm);
    assert!(queue.pop_front().is_some());
    assert!(queue.is_empty());
}
