//! Background worker that re-synchronizes the sequencer's wall-clock high
//! bits once a minute and scans persisted levels for tombstones that have
//! outlived their level's TTL, handing delete-driven compaction candidates
//! to the compaction worker.

use std::sync::atomic::Ordering;
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::inner::{CompactionTask, Inner};

const TICK_INTERVAL: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(inner: Arc<Inner>, dd_tx: SyncSender<CompactionTask>, cancel: Arc<std::sync::atomic::AtomicBool>) {
    let mut since_last_tick = Duration::ZERO;
    while !cancel.load(Ordering::SeqCst) {
        std::thread::sleep(POLL_INTERVAL);
        since_last_tick += POLL_INTERVAL;
        if since_last_tick < TICK_INTERVAL {
            continue;
        }
        since_last_tick = Duration::ZERO;
        if cancel.load(Ordering::SeqCst) {
            return;
        }
        inner.sequencer.tick();
        scan_for_expired_tombstones(&inner, &dd_tx);
    }
}

fn scan_for_expired_tombstones(inner: &Inner, dd_tx: &SyncSender<CompactionTask>) {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as u32;
    // Snapshot (level_id, ttl, files) first so the level-list lock is not
    // held while sending on `dd_tx`, which may itself need to grow `levels`.
    let snapshot: Vec<_> = {
        let levels = inner.levels.read().unwrap();
        levels.iter().enumerate().map(|(id, level)| (id, level.ttl(), level.files_snapshot())).collect()
    };
    for (level_id, ttl, files) in snapshot {
        let ttl = ttl.as_secs() as u32;
        for file in files {
            if let Some(age) = file.meta.age_oldest_tomb {
                if now.saturating_sub(age) >= ttl {
                    inner.ensure_level_exists(level_id + 1);
                    let _ = dd_tx.try_send(CompactionTask { level_id, target_file: Some(file.meta.name.clone()) });
                }
            }
        }
    }
}
