use std::path::Path;
use std::time::{Duration, Instant};

use config::CollectionOptions;

/// Options tuned for fast tests: tiny memtable and level thresholds so
/// persistence and compaction trigger promptly, and a short tombstone TTL
/// so delete-driven compaction is reachable without waiting real hours.
pub fn tiny_options(dir: &Path) -> CollectionOptions {
    CollectionOptions {
        mem_table_size_limit: 256,
        level_size_ratio: 4,
        delete_persist_threshold: Duration::from_millis(200),
        num_initial_levels: 4,
        standard_page_size: 256,
        num_page_per_delete_tile: 2,
        dir_path: dir.to_path_buf(),
        create_if_missing: true,
        persist_trigger_buf_len: 8,
        compact_trigger_buf_len: 8,
        ..CollectionOptions::default()
    }
}

/// Polls `pred` until it returns `true` or `timeout` elapses, for
/// assertions against state that background workers update asynchronously.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut pred: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if pred() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
