use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::mpsc::SyncSender;
use std::sync::{Mutex, RwLock};

use config::CollectionOptions;
use memtable::{ImmutableQueue, Memtable};

use crate::level::{self, Level};
use crate::seq::Sequencer;

/// A pending compaction on `level_id`. `target_file` is set only for
/// delete-driven tasks, which name the specific file whose tombstone
/// outlived its level's TTL; saturation-driven tasks re-select a file at
/// execution time since the level may have changed since the task was
/// enqueued.
#[derive(Clone, Debug, Default)]
pub struct CompactionTask {
    pub level_id: usize,
    pub target_file: Option<String>,
}

/// A delete-key range delete. Entries whose delete key falls within
/// `[low, high]` and whose sequence number predates `seq_num` are shadowed,
/// whether they already exist or arrive later but out of order.
#[derive(Clone)]
pub struct RangeTombstone {
    pub low: Vec<u8>,
    pub high: Vec<u8>,
    pub seq_num: u64,
}

pub struct Inner {
    pub options: CollectionOptions,
    pub memtable: Memtable,
    pub immutable: ImmutableQueue,
    /// Persisted levels below the memtable. Grows as data sinks past the
    /// last configured level (see `ensure_level_exists`) -- it is never
    /// shrunk, so a level index handed out once stays valid forever.
    pub levels: RwLock<Vec<Level>>,
    pub sequencer: Sequencer,
    pub sst_dir: PathBuf,
    pub range_tombstones: Mutex<Vec<RangeTombstone>>,
    pub closed: AtomicBool,
    pub next_file_id: AtomicU64,
    pub persist_tx: SyncSender<()>,
    pub so_tx: SyncSender<CompactionTask>,
    pub sd_tx: SyncSender<CompactionTask>,
    pub dd_tx: SyncSender<CompactionTask>,
}

/// A level whose tombstone ratio exceeds this fraction prefers the
/// delete-driven SD policy over overlap-driven SO, even before it is
/// oversize enough to force a compaction on size alone.
const SD_TOMBSTONE_RATIO_TRIGGER: f64 = 0.3;

impl Inner {
    pub fn next_file_name(&self) -> String {
        let id = self.next_file_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("{id:020}.kiwi")
    }

    pub fn num_levels(&self) -> usize {
        self.levels.read().unwrap().len()
    }

    /// Grows `levels` until index `level_id` exists, matching the reference
    /// engine's `addNewLevel`: a level's size limit scales by
    /// `level_size_ratio` per depth, and every level's TTL is recomputed
    /// after the append since `compute_ttls` depends on the total level
    /// count. A no-op once `level_id` already exists.
    pub fn ensure_level_exists(&self, level_id: usize) {
        let mut levels = self.levels.write().unwrap();
        if level_id < levels.len() {
            return;
        }
        while level_id >= levels.len() {
            let depth = levels.len();
            let size_limit =
                self.options.mem_table_size_limit as u64 * (self.options.level_size_ratio as u64).pow(depth as u32 + 1);
            levels.push(Level::new(size_limit));
        }
        level::recompute_ttls(&levels, self.options.delete_persist_threshold, self.options.level_size_ratio);
    }

    /// Checks `level_id` against its size limit and tombstone ratio,
    /// enqueuing a compaction task on the appropriate channel if either
    /// threshold is crossed. A full channel means a compaction for this
    /// level is already pending, so the send is simply dropped. When a
    /// threshold is crossed and `level_id` is currently the last level, a
    /// new level is appended first so the compaction has somewhere to
    /// merge into -- the last configured level is never a dead end.
    pub fn maybe_trigger_compaction(&self, level_id: usize) {
        let (total_size, size_limit, tombstone_ratio) = {
            let levels = self.levels.read().unwrap();
            let level = &levels[level_id];
            (level.total_size(), level.size_limit(), level.tombstone_ratio())
        };
        let task = CompactionTask { level_id, target_file: None };
        if total_size > size_limit {
            self.ensure_level_exists(level_id + 1);
            let _ = self.so_tx.try_send(task);
        } else if tombstone_ratio > SD_TOMBSTONE_RATIO_TRIGGER {
            self.ensure_level_exists(level_id + 1);
            let _ = self.sd_tx.try_send(task);
        }
    }

    /// Whether `delete_key` at `seq_num` is shadowed by an active range
    /// delete, i.e. some tombstone covers the key and postdates the entry.
    pub fn shadowed_by_tombstone(&self, less: fn(&[u8], &[u8]) -> bool, delete_key: &[u8], seq_num: u64) -> bool {
        let tombstones = self.range_tombstones.lock().unwrap();
        tombstones
            .iter()
            .any(|t| t.seq_num > seq_num && !less(delete_key, &t.low) && !less(&t.high, delete_key))
    }
}
