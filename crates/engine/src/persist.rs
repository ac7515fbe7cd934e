//! Background worker that drains the immutable memtable queue, writing
//! each sealed memtable out as a key-weaving file on level 0.

use std::sync::atomic::Ordering;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use sstable::{build_kiwi_file, DiskFileDesc, Entry, FileDesc, KiwiFileReader};

use crate::inner::Inner;
use crate::level::SstFileHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(inner: Arc<Inner>, persist_rx: Receiver<()>, cancel: Arc<std::sync::atomic::AtomicBool>) {
    while !cancel.load(Ordering::SeqCst) {
        match persist_rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) | Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
        }
        drain(&inner);
    }
    drain(&inner);
}

fn drain(inner: &Arc<Inner>) {
    while let Some(imm) = inner.immutable.peek_front() {
        match persist_one(inner, &imm) {
            Ok(()) => {
                inner.immutable.pop_front();
            }
            Err(e) => {
                log::error!("persistence worker failed to flush immutable memtable: {e:#}");
                break;
            }
        }
    }
}

fn persist_one(inner: &Arc<Inner>, imm: &memtable::ImmutableMemtable) -> anyhow::Result<()> {
    let name = inner.next_file_name();
    let desc = Arc::new(DiskFileDesc::create(&inner.sst_dir, &name)?);
    let entries = imm.iter().map(|(sort_key, body)| Entry {
        sort_key: sort_key.to_vec(),
        value: body.value.clone(),
        delete_key: body.delete_key.clone(),
        seq_num: body.meta.seq_num,
        op_type: match body.meta.op_type {
            memtable::OpType::Put => sstable::OpType::Put,
            memtable::OpType::Del => sstable::OpType::Del,
        },
    });

    let meta = build_kiwi_file(
        desc.as_ref(),
        entries,
        inner.options.standard_page_size,
        inner.options.num_page_per_delete_tile,
    )?;
    desc.finalize()?;
    let reader = KiwiFileReader::open(desc.clone())?;
    let handle = Arc::new(SstFileHandle { meta, reader });

    inner.levels.read().unwrap()[0].push(handle);
    log::debug!("persisted {name} with {} entries to level 0", imm.len());
    inner.maybe_trigger_compaction(0);
    Ok(())
}
