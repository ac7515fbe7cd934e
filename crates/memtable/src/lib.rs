//! The mutable, in-memory front door for writes: an ordered map keyed by
//! sort key, each entry carrying the value, the delete key it participates
//! in range-deletes under, and sequencing metadata.
//!
//! Unlike a single-owner map, [`Memtable`] is internally synchronized so
//! that writer threads and the background persistence worker can touch it
//! concurrently: writers insert, the worker seals it into an
//! [`ImmutableMemtable`] once it grows past a size limit.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

pub const MAX_SORT_KEY_LEN: usize = (1 << 16) - 1;
pub const MAX_DELETE_KEY_LEN: usize = (1 << 16) - 1;
pub const MAX_VALUE_LEN: usize = u32::MAX as usize;

/// Fixed per-entry accounting overhead, mirroring the packed sequence
/// number and op type that ride alongside every stored entry.
const META_BYTE_OVERHEAD: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Put,
    Del,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMeta {
    pub seq_num: u64,
    pub op_type: OpType,
}

/// Everything stored in the map alongside the sort key itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryBody {
    pub value: Vec<u8>,
    pub delete_key: Vec<u8>,
    pub meta: KeyMeta,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MemtableError {
    #[error("sort key too large: {0} bytes (max {1})")]
    SortKeyTooLarge(usize, usize),
    #[error("delete key too large: {0} bytes (max {1})")]
    DeleteKeyTooLarge(usize, usize),
    #[error("value too large: {0} bytes (max {1})")]
    ValueTooLarge(usize, usize),
}

fn check_sizes(sort_key: &[u8], value: &[u8], delete_key: &[u8]) -> Result<(), MemtableError> {
    if sort_key.len() > MAX_SORT_KEY_LEN {
        return Err(MemtableError::SortKeyTooLarge(sort_key.len(), MAX_SORT_KEY_LEN));
    }
    if delete_key.len() > MAX_DELETE_KEY_LEN {
        return Err(MemtableError::DeleteKeyTooLarge(delete_key.len(), MAX_DELETE_KEY_LEN));
    }
    if value.len() > MAX_VALUE_LEN {
        return Err(MemtableError::ValueTooLarge(value.len(), MAX_VALUE_LEN));
    }
    Ok(())
}

fn entry_weight(key: &[u8], body: &EntryBody) -> usize {
    key.len() + body.value.len() + body.delete_key.len() + META_BYTE_OVERHEAD
}

struct Inner {
    map: BTreeMap<Vec<u8>, EntryBody>,
    bytes: usize,
}

pub struct Memtable {
    inner: Mutex<Inner>,
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: BTreeMap::new(),
                bytes: 0,
            }),
        }
    }

    /// Inserts or overwrites an entry. Stale writes (seq_num not strictly
    /// greater than what's already stored) are silently ignored, so racing
    /// appliers can never clobber a newer value with an older one.
    pub fn put(
        &self,
        sort_key: Vec<u8>,
        value: Vec<u8>,
        delete_key: Vec<u8>,
        meta: KeyMeta,
    ) -> Result<(), MemtableError> {
        check_sizes(&sort_key, &value, &delete_key)?;
        let body = EntryBody { value, delete_key, meta };
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.map.get(&sort_key) {
            if existing.meta.seq_num >= meta.seq_num {
                return Ok(());
            }
            inner.bytes -= entry_weight(&sort_key, existing);
        }
        inner.bytes += entry_weight(&sort_key, &body);
        inner.map.insert(sort_key, body);
        Ok(())
    }

    pub fn get(&self, sort_key: &[u8]) -> Option<(KeyMeta, Option<Vec<u8>>)> {
        let inner = self.inner.lock().unwrap();
        let body = inner.map.get(sort_key)?;
        match body.meta.op_type {
            OpType::Del => Some((body.meta, None)),
            OpType::Put => Some((body.meta, Some(body.value.clone()))),
        }
    }

    /// Returns the live value only, `None` for tombstones or missing keys.
    pub fn get_live(&self, sort_key: &[u8]) -> Option<Vec<u8>> {
        match self.get(sort_key)? {
            (_, Some(v)) => Some(v),
            (_, None) => None,
        }
    }

    pub fn get_entry(&self, sort_key: &[u8]) -> Option<EntryBody> {
        self.inner.lock().unwrap().map.get(sort_key).cloned()
    }

    pub fn contains_key(&self, sort_key: &[u8]) -> bool {
        self.inner.lock().unwrap().map.contains_key(sort_key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn approx_size(&self) -> usize {
        self.inner.lock().unwrap().bytes
    }

    /// Walks entries in sort-key order under the lock.
    pub fn traverse<F: FnMut(&[u8], &EntryBody)>(&self, mut f: F) {
        let inner = self.inner.lock().unwrap();
        for (k, v) in inner.map.iter() {
            f(k, v);
        }
    }

    /// If the memtable has grown past `limit` bytes, atomically swaps its
    /// contents out for an empty map and returns the old contents sealed
    /// into an [`ImmutableMemtable`]. Otherwise returns `None`.
    pub fn seal_if_oversize(&self, limit: usize) -> Option<ImmutableMemtable> {
        let mut inner = self.inner.lock().unwrap();
        if inner.bytes < limit || inner.map.is_empty() {
            return None;
        }
        let map = std::mem::take(&mut inner.map);
        inner.bytes = 0;
        Some(ImmutableMemtable { map })
    }
}

/// A read-only snapshot of a sealed memtable, queued for persistence.
pub struct ImmutableMemtable {
    map: BTreeMap<Vec<u8>, EntryBody>,
}

impl ImmutableMemtable {
    pub fn get(&self, sort_key: &[u8]) -> Option<&EntryBody> {
        self.map.get(sort_key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &EntryBody)> {
        self.map.iter().map(|(k, v)| (k.as_slice(), v))
    }
}

/// FIFO of sealed memtables awaiting persistence. The tail is the newest
/// arrival; reads walk tail-to-head so the most recent write shadows older
/// ones still sitting in the queue.
pub struct ImmutableQueue {
    inner: Mutex<VecDeque<std::sync::Arc<ImmutableMemtable>>>,
}

impl Default for ImmutableQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ImmutableQueue {
    pub fn new() -> Self {
        Self { inner: Mutex::new(VecDeque::new()) }
    }

    pub fn push(&self, imm: std::sync::Arc<ImmutableMemtable>) {
        self.inner.lock().unwrap().push_back(imm);
    }

    pub fn pop_front(&self) -> Option<std::sync::Arc<ImmutableMemtable>> {
        self.inner.lock().unwrap().pop_front()
    }

    pub fn peek_front(&self) -> Option<std::sync::Arc<ImmutableMemtable>> {
        self.inner.lock().unwrap().front().cloned()
    }

    pub fn get(&self, sort_key: &[u8]) -> Option<EntryBody> {
        let queue = self.inner.lock().unwrap();
        for imm in queue.iter().rev() {
            if let Some(body) = imm.get(sort_key) {
                return Some(body.clone());
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests;
