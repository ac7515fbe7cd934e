use crate::entry::{Entry, OpType};
use crate::merge::MergeIterator;

fn e(sort_key: &str, seq: u64, op_type: OpType) -> Entry {
    Entry {
        sort_key: sort_key.as_bytes().to_vec(),
        value: format!("v{seq}").into_bytes(),
        delete_key: b"d".to_vec(),
        seq_num: seq,
        op_type,
    }
}

#[test]
fn merges_disjoint_sorted_sources() {
    let a = vec![e("a", 1, OpType::Put), e("c", 2, OpType::Put)];
    let b = vec![e("b", 3, OpType::Put), e("d", 4, OpType::Put)];
    let merged: Vec<_> = MergeIterator::new(vec![a, b]).collect();
    let keys: Vec<_> = merged.iter().map(|e| e.sort_key.clone()).collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
}

#[test]
fn dedups_by_highest_seq_num() {
    let a = vec![e("k", 1, OpType::Put)];
    let b = vec![e("k", 5, OpType::Put)];
    let c = vec![e("k", 3, OpType::Put)];
    let merged: Vec<_> = MergeIterator::new(vec![a, b, c]).collect();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].seq_num, 5);
}

#[test]
fn tombstone_wins_when_newest() {
    let a = vec![e("k", 1, OpType::Put)];
    let b = vec![e("k", 2, OpType::Del)];
    let merged: Vec<_> = MergeIterator::new(vec![a, b]).collect();
    assert_eq!(merged[0].op_type, OpType::Del);
}

#[test]
fn empty_sources_produce_nothing() {
    let merged: Vec<_> = MergeIterator::new(vec![vec![], vec![]]).collect();
    assert!(merged.is_empty());
}

#[test]
fn single_source_passes_through() {
    let a = vec![e("a", 1, OpType::Put), e("b", 2, OpType::Put)];
    let merged: Vec<_> = MergeIterator::new(vec![a.clone()]).collect();
    assert_eq!(merged, a);
}
