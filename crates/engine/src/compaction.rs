//! Background compaction worker. Polls three trigger channels -- one per
//! policy -- and merges the selected file(s) down into the next level.
//!
//! - **SO** (saturation-driven, overlap-driven): a level has grown past its
//!   size limit; pick the file with the least sort-key overlap against the
//!   next level to keep write amplification low.
//! - **SD** (saturation-driven, delete-driven): same trigger, but pick the
//!   file with the highest tombstone ratio to reclaim space fastest.
//! - **DD** (delete-driven, delete-driven): a specific file's oldest
//!   tombstone has outlived its level's TTL; compact it regardless of size
//!   pressure. When no file is named, the most TTL-overdue file is picked.
//!
//! Tombstones are dropped for good only when they compact into the last
//! level, and any entry whose delete key falls inside an active range
//! delete is dropped during the merge rather than carried forward.

use std::sync::atomic::Ordering;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use sstable::{build_kiwi_file, DiskFileDesc, FileDesc, KiwiFileReader, MergeIterator, OpType};

use crate::inner::{CompactionTask, Inner};
use crate::level::{find_overlap_files, SstFileHandle};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn run(
    inner: Arc<Inner>,
    so_rx: Receiver<CompactionTask>,
    sd_rx: Receiver<CompactionTask>,
    dd_rx: Receiver<CompactionTask>,
    cancel: Arc<std::sync::atomic::AtomicBool>,
) {
    while !cancel.load(Ordering::SeqCst) {
        if let Ok(task) = so_rx.try_recv() {
            if let Err(e) = run_so(&inner, task.level_id) {
                log::error!("SO compaction on level {} failed: {e:#}", task.level_id);
            }
            continue;
        }
        if let Ok(task) = sd_rx.try_recv() {
            if let Err(e) = run_sd(&inner, task.level_id) {
                log::error!("SD compaction on level {} failed: {e:#}", task.level_id);
            }
            continue;
        }
        if let Ok(task) = dd_rx.try_recv() {
            if let Err(e) = run_dd(&inner, task.level_id, task.target_file.as_deref()) {
                log::error!("DD compaction on level {} failed: {e:#}", task.level_id);
            }
            continue;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn run_so(inner: &Inner, level_id: usize) -> anyhow::Result<()> {
    inner.ensure_level_exists(level_id + 1);
    let levels = inner.levels.read().unwrap();
    let files = levels[level_id].files_snapshot();
    let Some(target) = files.iter().min_by_key(|f| find_overlap_files(&levels[level_id + 1], f).len()).cloned() else {
        return Ok(());
    };
    let overlap = find_overlap_files(&levels[level_id + 1], &target);
    drop(levels);
    merge_and_replace(inner, level_id, vec![target], overlap)
}

fn run_sd(inner: &Inner, level_id: usize) -> anyhow::Result<()> {
    inner.ensure_level_exists(level_id + 1);
    let levels = inner.levels.read().unwrap();
    let files = levels[level_id].files_snapshot();
    let Some(target) = files
        .iter()
        .max_by(|a, b| delete_ratio(a).partial_cmp(&delete_ratio(b)).unwrap())
        .cloned()
    else {
        return Ok(());
    };
    let overlap = find_overlap_files(&levels[level_id + 1], &target);
    drop(levels);
    merge_and_replace(inner, level_id, vec![target], overlap)
}

fn run_dd(inner: &Inner, level_id: usize, target_file: Option<&str>) -> anyhow::Result<()> {
    inner.ensure_level_exists(level_id + 1);
    let levels = inner.levels.read().unwrap();
    let files = levels[level_id].files_snapshot();
    let target = match target_file {
        Some(name) => files.iter().find(|f| f.meta.name == name).cloned(),
        None => files
            .iter()
            .filter(|f| f.meta.age_oldest_tomb.is_some())
            .min_by_key(|f| f.meta.age_oldest_tomb)
            .cloned(),
    };
    let Some(target) = target else {
        return Ok(());
    };
    let overlap = find_overlap_files(&levels[level_id + 1], &target);
    drop(levels);
    merge_and_replace(inner, level_id, vec![target], overlap)
}

fn delete_ratio(f: &Arc<SstFileHandle>) -> f64 {
    if f.meta.num_entry == 0 {
        0.0
    } else {
        f.meta.num_delete as f64 / f.meta.num_entry as f64
    }
}

fn merge_and_replace(
    inner: &Inner,
    src_level: usize,
    src_files: Vec<Arc<SstFileHandle>>,
    dst_files: Vec<Arc<SstFileHandle>>,
) -> anyhow::Result<()> {
    let dst_level = src_level + 1;
    let is_last_level = dst_level == inner.num_levels() - 1;

    let mut sources = Vec::with_capacity(src_files.len() + dst_files.len());
    for f in src_files.iter().chain(dst_files.iter()) {
        sources.push(f.reader.iter_entries()?);
    }
    let merged = MergeIterator::new(sources);

    let less = inner.options.delete_key_less;
    let out: Vec<_> = merged
        .filter(|e| !inner.shadowed_by_tombstone(less, &e.delete_key, e.seq_num))
        .filter(|e| !(is_last_level && e.op_type == OpType::Del))
        .collect();

    let mut inserted = Vec::new();
    if !out.is_empty() {
        let name = inner.next_file_name();
        let desc = Arc::new(DiskFileDesc::create(&inner.sst_dir, &name)?);
        let meta = build_kiwi_file(
            desc.as_ref(),
            out.into_iter(),
            inner.options.standard_page_size,
            inner.options.num_page_per_delete_tile,
        )?;
        desc.finalize()?;
        let reader = KiwiFileReader::open(desc)?;
        inserted.push(Arc::new(SstFileHandle { meta, reader }));
    }

    {
        let levels = inner.levels.read().unwrap();
        levels[src_level].replace(&src_files, Vec::new());
        levels[dst_level].replace(&dst_files, inserted);
    }

    for f in src_files.iter().chain(dst_files.iter()) {
        let _ = std::fs::remove_file(inner.sst_dir.join(&f.meta.name));
    }
    log::debug!(
        "compacted level {src_level} into level {dst_level}, replacing {} overlapping file(s)",
        dst_files.len()
    );
    inner.maybe_trigger_compaction(dst_level);
    Ok(())
}
