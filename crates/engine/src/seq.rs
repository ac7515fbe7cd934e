//! Process-wide sequence number source. The high 32 bits are wall-clock
//! seconds as of the last minute tick; the low 32 bits are a monotone
//! counter within that minute. A background timekeeper re-synchronizes
//! the high bits once a minute using compare-and-set rather than a plain
//! store, so it never clobbers a counter value a concurrent writer just
//! produced with `next()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct Sequencer {
    cell: AtomicU64,
}

fn unix_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self { cell: AtomicU64::new(unix_seconds() << 32) }
    }

    /// Returns the next sequence number, strictly greater than every value
    /// returned before it.
    pub fn next(&self) -> u64 {
        self.cell.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.cell.load(Ordering::SeqCst)
    }

    /// Called once a minute. Moves the high 32 bits forward to the current
    /// wall-clock second, zeroing the low 32 bits, but only if that would
    /// move the cell forward -- never backward relative to a counter a
    /// writer may have already advanced past the new minute boundary.
    pub fn tick(&self) {
        loop {
            let old = self.cell.load(Ordering::SeqCst);
            let candidate = unix_seconds() << 32;
            if candidate <= old {
                return;
            }
            if self
                .cell
                .compare_exchange(old, candidate, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
        }
    }
}
