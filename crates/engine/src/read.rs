//! Read path: point lookups fan out from freshest to oldest -- the live
//! memtable, the sealed-but-not-yet-persisted immutable queue, then every
//! persisted level in order. The first hit wins, except that an active
//! range delete can shadow even a hit that would otherwise win, as long as
//! the range delete postdates it.

use memtable::{EntryBody, MAX_SORT_KEY_LEN};
use sstable::{Entry, OpType as SstOpType};

use crate::error::EngineError;
use crate::level::Level;
use crate::Collection;

impl Collection {
    /// Looks up `sort_key`, returning the live value or `None` if the key
    /// is absent or shadowed by a tombstone (point or range).
    pub fn get(&self, sort_key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        self.ensure_open()?;
        if sort_key.len() > MAX_SORT_KEY_LEN {
            return Err(EngineError::SortKeyTooLarge(sort_key.len(), MAX_SORT_KEY_LEN));
        }
        if let Some(body) = self.inner.memtable.get_entry(sort_key) {
            return Ok(self.resolve_memtable(&body));
        }
        if let Some(body) = self.inner.immutable.get(sort_key) {
            return Ok(self.resolve_memtable(&body));
        }
        let levels = self.inner.levels.read().unwrap().iter().map(Level::files_snapshot).collect::<Vec<_>>();
        for files in &levels {
            for file in files.iter().rev() {
                if let Some(entry) = file.reader.get(sort_key)? {
                    return Ok(self.resolve_entry(&entry));
                }
            }
        }
        Ok(None)
    }

    fn resolve_memtable(&self, body: &EntryBody) -> Option<Vec<u8>> {
        let less = self.inner.options.delete_key_less;
        if self.inner.shadowed_by_tombstone(less, &body.delete_key, body.meta.seq_num) {
            return None;
        }
        match body.meta.op_type {
            memtable::OpType::Del => None,
            memtable::OpType::Put => Some(body.value.clone()),
        }
    }

    fn resolve_entry(&self, entry: &Entry) -> Option<Vec<u8>> {
        let less = self.inner.options.delete_key_less;
        if self.inner.shadowed_by_tombstone(less, &entry.delete_key, entry.seq_num) {
            return None;
        }
        match entry.op_type {
            SstOpType::Del => None,
            SstOpType::Put => Some(entry.value.clone()),
        }
    }
}
