//! Persisted file layout for the key-weaving storage engine.
//!
//! A file is a sequence of delete-tiles, each a fixed-size group of pages.
//! Pages stay internally sorted by sort key, but the pages inside a tile
//! are written in delete-key order -- the "weave" that lets a delete-key
//! range delete discard a contiguous run of pages at compaction time
//! without touching unrelated sort-key ranges.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ PAGE PAYLOADS (one run of entries per page, sort-key ordered)  │
//! │   pages within a tile are written in delete-key order          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ DIRECTORY                                                      │
//! │   tile_count (u32)                                             │
//! │   per tile: sort/delete key fences, page_count,                │
//! │             per page: offset, size, fences, bloom filter       │
//! │   file-level fences, age_oldest_tomb, num_entry, num_delete,    │
//! │   byte_size                                                    │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (12 bytes): directory_offset (u64 LE) | magic (u32 LE)  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The reader loads the whole directory into memory at open time; page
//! payloads are read from disk on demand during a point lookup or a
//! compaction scan.

pub mod entry;
pub mod filedesc;
pub mod kiwi;
pub mod merge;

pub use entry::{Entry, EntryError, OpType};
pub use filedesc::{DiskFileDesc, FileDesc, MemFileDesc};
pub use kiwi::{build_kiwi_file, FileMeta, KiwiError, KiwiFileReader, PageMeta, TileMeta};
pub use merge::MergeIterator;
