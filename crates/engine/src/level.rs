//! A persisted level: an ordered set of files plus the TTL that governs
//! when a tombstone sitting in one of those files becomes eligible for a
//! delete-driven compaction.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sstable::{FileMeta, KiwiFileReader};

pub struct SstFileHandle {
    pub meta: FileMeta,
    pub reader: KiwiFileReader,
}

pub struct Level {
    files: Mutex<Vec<Arc<SstFileHandle>>>,
    ttl: Mutex<Duration>,
    size_limit: u64,
}

impl Level {
    pub fn new(size_limit: u64) -> Self {
        Self {
            files: Mutex::new(Vec::new()),
            ttl: Mutex::new(Duration::from_secs(0)),
            size_limit,
        }
    }

    pub fn size_limit(&self) -> u64 {
        self.size_limit
    }

    pub fn ttl(&self) -> Duration {
        *self.ttl.lock().unwrap()
    }

    pub fn set_ttl(&self, ttl: Duration) {
        *self.ttl.lock().unwrap() = ttl;
    }

    /// Newest file at the tail. Appending is the only way new files enter
    /// a level (persistence into level 0, or a compaction's merged output).
    pub fn push(&self, file: Arc<SstFileHandle>) {
        self.files.lock().unwrap().push(file);
    }

    /// Atomically removes `remove` and appends `insert`, so a reader never
    /// observes a level missing the files being compacted without yet
    /// having the replacement available.
    pub fn replace(&self, remove: &[Arc<SstFileHandle>], insert: Vec<Arc<SstFileHandle>>) {
        let mut files = self.files.lock().unwrap();
        files.retain(|f| !remove.iter().any(|r| Arc::ptr_eq(r, f)));
        files.extend(insert);
    }

    pub fn files_snapshot(&self) -> Vec<Arc<SstFileHandle>> {
        self.files.lock().unwrap().clone()
    }

    pub fn total_size(&self) -> u64 {
        self.files.lock().unwrap().iter().map(|f| f.meta.byte_size).sum()
    }

    /// Fraction of entries across the level's files that are tombstones.
    /// Drives the SD compaction policy, which prioritizes reclaiming space
    /// over minimizing overlap once a level's deletes dominate it.
    pub fn tombstone_ratio(&self) -> f64 {
        let files = self.files.lock().unwrap();
        let (entries, deletes) = files
            .iter()
            .fold((0u64, 0u64), |(e, d), f| (e + f.meta.num_entry, d + f.meta.num_delete));
        if entries == 0 {
            0.0
        } else {
            deletes as f64 / entries as f64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

/// Finds every file on `level` whose sort-key fence overlaps `target`'s.
pub fn find_overlap_files(level: &Level, target: &SstFileHandle) -> Vec<Arc<SstFileHandle>> {
    level
        .files_snapshot()
        .into_iter()
        .filter(|f| overlaps(&f.meta, &target.meta))
        .collect()
}

fn overlaps(a: &FileMeta, b: &FileMeta) -> bool {
    !(a.sort_key_max < b.sort_key_min || b.sort_key_max < a.sort_key_min)
}

/// Per-level tombstone retention TTL: `d_1 = D_th * (T-1) / (T^(L-1) - 1)`,
/// `d_i = d_1 * T^(i-1)`, where `T` is the level size ratio and `L` counts
/// the memtable plus every persisted level. `num_levels` here is the
/// *persisted*-level count, i.e. `L-1`, so the denominator below is
/// `T^num_levels - 1`. Deeper levels accumulate tombstones for longer,
/// matching how long it takes data to sink there.
pub fn compute_ttls(delete_persist_threshold: Duration, level_size_ratio: usize, num_levels: usize) -> Vec<Duration> {
    if num_levels == 0 {
        return Vec::new();
    }
    if num_levels == 1 {
        return vec![delete_persist_threshold];
    }
    let t = level_size_ratio as f64;
    let l = num_levels as f64;
    let d_th = delete_persist_threshold.as_secs_f64();
    let d1 = d_th * (t - 1.0) / (t.powf(l) - 1.0);
    (0..num_levels)
        .map(|i| Duration::from_secs_f64(d1 * t.powi(i as i32)))
        .collect()
}

/// Recomputes and applies the TTL for every level, called whenever a new
/// level is added to the collection.
pub fn recompute_ttls(levels: &[Level], delete_persist_threshold: Duration, level_size_ratio: usize) {
    let ttls = compute_ttls(delete_persist_threshold, level_size_ratio, levels.len());
    for (level, ttl) in levels.iter().zip(ttls) {
        level.set_ttl(ttl);
    }
}
