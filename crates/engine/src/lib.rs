//! # Engine - key-weaving storage engine
//!
//! The central orchestrator that ties together the [`memtable`],
//! [`config`], and [`sstable`] crates into a complete LSM-tree key-value
//! store laid out with the key-weaving ("KiWi") file format.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌────────────────────────────────────────────────────┐
//! │                    COLLECTION                       │
//! │                                                      │
//! │ write.rs → Memtable insert (no WAL: no replay on     │
//! │             crash, durability comes from persisting) │
//! │              |                                       │
//! │              |  (oversize?) → seal → immutable queue │
//! │              v                                       │
//! │        persist.rs worker → new level-0 KiWi file     │
//! │              |                                       │
//! │              |  (level oversize or delete-heavy?)    │
//! │              v                                       │
//! │      compaction.rs worker → SO / SD / DD merge       │
//! │                                                       │
//! │ read.rs → memtable → immutable queue → levels         │
//! │            (first match wins, range deletes shadow)   │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                              |
//! |----------------|-------------------------------------------------------|
//! | [`lib.rs`]     | `Collection` struct, `open`/`close`, `Debug`, `Drop`   |
//! | [`write`]      | `put()`, `delete()`, `range_delete()`                  |
//! | [`read`]       | `get()`                                                |
//! | [`persist`]    | Background worker draining the immutable queue         |
//! | [`compaction`] | Background worker running the SO/SD/DD merge policies   |
//! | [`timekeeper`] | Minute tick for the sequencer, TTL-expiry scan          |
//! | [`level`]      | Per-level file set, fence overlap, TTL formula          |
//! | [`seq`]        | Process-wide monotone sequence number source            |
//! | [`inner`]      | State shared by every background worker                |
//!
//! ## Crash Safety
//!
//! There is no write-ahead log and no crash-recovery-by-replay: a write is
//! durable only once the memtable sealing it has been persisted to a
//! level-0 file. On restart, every `.kiwi` file found in the data
//! directory is reopened into level 0; it is up to a subsequent
//! compaction pass to re-sort things into deeper, non-overlapping levels.

pub mod compaction;
pub mod error;
pub mod inner;
pub mod level;
pub mod persist;
pub mod read;
pub mod seq;
pub mod timekeeper;
pub mod write;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use config::CollectionOptions;
use memtable::{ImmutableQueue, Memtable};

pub use error::EngineError;

use inner::Inner;
use level::Level;
use seq::Sequencer;

/// A handle to an open collection. Cloning shares the same underlying
/// engine and background workers; the workers are torn down only when the
/// last clone (or an explicit [`Collection::close`]) drops it.
pub struct Collection {
    inner: Arc<Inner>,
    cancel: Arc<AtomicBool>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Collection {
    /// Opens a collection, creating its data directory and spawning the
    /// persistence, compaction, and timekeeper background workers.
    pub fn open(options: CollectionOptions) -> Result<Self, EngineError> {
        options.validate()?;

        if options.create_if_missing {
            std::fs::create_dir_all(&options.dir_path)?;
        }

        let num_levels = options.num_persisted_levels();
        let levels: Vec<Level> = (0..num_levels)
            .map(|i| Level::new(options.mem_table_size_limit as u64 * options.level_size_ratio.pow(i as u32 + 1) as u64))
            .collect();
        level::recompute_ttls(&levels, options.delete_persist_threshold, options.level_size_ratio);
        let levels = std::sync::RwLock::new(levels);

        let (loaded, next_file_id) = load_existing_files(&options.dir_path)?;
        if let Some(level0) = levels.read().unwrap().first() {
            for handle in loaded {
                level0.push(handle);
            }
        }

        let (persist_tx, persist_rx) = sync_channel(options.persist_trigger_buf_len);
        let (so_tx, so_rx) = sync_channel(options.compact_trigger_buf_len);
        let (sd_tx, sd_rx) = sync_channel(options.compact_trigger_buf_len);
        let (dd_tx, dd_rx) = sync_channel(options.compact_trigger_buf_len);

        let inner = Arc::new(Inner {
            sst_dir: options.dir_path.clone(),
            options,
            memtable: Memtable::new(),
            immutable: ImmutableQueue::new(),
            levels,
            sequencer: Sequencer::new(),
            range_tombstones: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            next_file_id: AtomicU64::new(next_file_id),
            persist_tx,
            so_tx,
            sd_tx,
            dd_tx,
        });

        let cancel = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(3);

        {
            let inner = inner.clone();
            let cancel = cancel.clone();
            workers.push(std::thread::spawn(move || persist::run(inner, persist_rx, cancel)));
        }
        {
            let inner = inner.clone();
            let cancel = cancel.clone();
            workers.push(std::thread::spawn(move || compaction::run(inner, so_rx, sd_rx, dd_rx, cancel)));
        }
        {
            let inner = inner.clone();
            let cancel = cancel.clone();
            let dd_tx = inner.dd_tx.clone();
            workers.push(std::thread::spawn(move || timekeeper::run(inner, dd_tx, cancel)));
        }

        Ok(Self { inner, cancel, workers: Arc::new(Mutex::new(workers)) })
    }

    /// Stops the background workers and flushes any remaining memtable
    /// contents out to a level-0 file before returning. Safe to call more
    /// than once; subsequent calls are no-ops.
    pub fn close(&self) -> Result<(), EngineError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(imm) = self.inner.memtable.seal_if_oversize(0) {
            self.inner.immutable.push(Arc::new(imm));
        }
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.inner.persist_tx.try_send(());
        for handle in self.workers.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
        Ok(())
    }

    /// Number of persisted levels below the memtable. May grow over the
    /// collection's lifetime as data sinks past the last configured level.
    pub fn num_levels(&self) -> usize {
        self.inner.num_levels()
    }

    /// Number of files currently resident on `level_id`, for tests and
    /// operational introspection. Panics if `level_id` is out of range.
    pub fn level_file_count(&self, level_id: usize) -> usize {
        self.inner.levels.read().unwrap()[level_id].len()
    }

    /// Approximate live byte size of the in-memory memtable.
    pub fn memtable_size(&self) -> usize {
        self.inner.memtable.approx_size()
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("dir_path", &self.inner.sst_dir)
            .field("memtable_size", &self.inner.memtable.approx_size())
            .field("memtable_entries", &self.inner.memtable.len())
            .field("immutable_queue_len", &self.inner.immutable.len())
            .field("num_levels", &self.inner.num_levels())
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Best-effort flush and worker shutdown on drop. Errors are swallowed
/// because `Drop` cannot propagate them; an explicit [`Collection::close`]
/// is the way to observe failures.
impl Drop for Collection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn load_existing_files(dir: &Path) -> Result<(Vec<Arc<level::SstFileHandle>>, u64), EngineError> {
    if !dir.exists() {
        return Ok((Vec::new(), 0));
    }
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "kiwi").unwrap_or(false))
        .collect();
    paths.sort();

    let mut max_id = 0u64;
    let mut handles = Vec::with_capacity(paths.len());
    for path in &paths {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
        if let Some(id) = name.strip_suffix(".kiwi").and_then(|s| s.parse::<u64>().ok()) {
            max_id = max_id.max(id + 1);
        }
        let desc = Arc::new(sstable::DiskFileDesc::open(dir, &name)?);
        let reader = sstable::KiwiFileReader::open(desc)?;
        let meta = reader.meta().clone();
        handles.push(Arc::new(level::SstFileHandle { meta, reader }));
    }
    Ok((handles, max_id))
}
