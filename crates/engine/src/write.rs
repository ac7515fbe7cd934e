//! Write path: `put`, `delete`, and `range_delete`. Every mutation is
//! sequenced through the collection's [`Sequencer`](crate::seq::Sequencer)
//! and applied directly to the live memtable -- there is no write-ahead log,
//! so a write is only durable once the memtable sealing it has been
//! persisted to a level-0 file.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use memtable::{KeyMeta, OpType as MemOpType};

use crate::error::EngineError;
use crate::inner::RangeTombstone;
use crate::Collection;

impl Collection {
    /// Inserts or overwrites `sort_key` with `value`, filed under
    /// `delete_key` for range-delete purposes.
    pub fn put(&self, sort_key: Vec<u8>, value: Vec<u8>, delete_key: Vec<u8>) -> Result<(), EngineError> {
        self.ensure_open()?;
        let meta = KeyMeta { seq_num: self.inner.sequencer.next(), op_type: MemOpType::Put };
        self.inner.memtable.put(sort_key, value, delete_key, meta)?;
        self.maybe_seal();
        Ok(())
    }

    /// Writes a point tombstone for `sort_key`, shadowing any older value
    /// with the same sort key regardless of which level it lives in. Unlike
    /// `put`, `delete` takes no delete key -- a tombstone carries an empty
    /// one, matching the reference engine's `Del(key, writeOptions)` (which,
    /// unlike its `Put(key, value, dKey, writeOptions)`, has no delete-key
    /// parameter either).
    pub fn delete(&self, sort_key: Vec<u8>) -> Result<(), EngineError> {
        self.ensure_open()?;
        let meta = KeyMeta { seq_num: self.inner.sequencer.next(), op_type: MemOpType::Del };
        self.inner.memtable.put(sort_key, Vec::new(), Vec::new(), meta)?;
        self.maybe_seal();
        Ok(())
    }

    /// Shadows every entry whose delete key falls in `[low, high]` and
    /// predates this call, including ones not yet persisted. The range
    /// itself is retained until a delete-driven compaction physically
    /// drops the entries it covers.
    pub fn range_delete(&self, low: Vec<u8>, high: Vec<u8>) -> Result<(), EngineError> {
        self.ensure_open()?;
        let seq_num = self.inner.sequencer.next();
        self.inner.range_tombstones.lock().unwrap().push(RangeTombstone { low, high, seq_num });
        Ok(())
    }

    pub(crate) fn ensure_open(&self) -> Result<(), EngineError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    fn maybe_seal(&self) {
        if let Some(imm) = self.inner.memtable.seal_if_oversize(self.inner.options.mem_table_size_limit) {
            self.inner.immutable.push(Arc::new(imm));
            let _ = self.inner.persist_tx.try_send(());
        }
    }
}
