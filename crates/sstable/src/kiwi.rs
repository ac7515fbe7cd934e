//! The key-weaving file layout: a persisted file is a sequence of
//! delete-tiles, each a fixed-size group of pages. Pages stay sorted by
//! sort key internally (so a page-local binary search works), but within
//! a tile the pages themselves are written in *delete-key* order rather
//! than sort-key order -- the "weave" that gives a range-delete on the
//! delete-key dimension a contiguous run of pages to discard.
//!
//! Tiles, in turn, are laid out back to back in strictly increasing
//! sort-key order, so the file as a whole still supports a fast sort-key
//! fence check and a binary search down to the right tile.

use std::io::{self, Cursor};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bloom::BloomFilter;
use thiserror::Error;

use crate::entry::{decode_entry, encode_entry, Entry, EntryError, OpType};
use crate::filedesc::FileDesc;

const MAGIC: u32 = 0x4b49_5731; // "KIW1"
const PAGE_BLOOM_FP_RATE: f64 = 0.01;

#[derive(Debug, Error)]
pub enum KiwiError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Entry(#[from] EntryError),
    #[error("corrupt file: {0}")]
    Corrupt(String),
}

#[derive(Clone)]
pub struct PageMeta {
    pub offset: u64,
    pub size: u32,
    pub sort_key_min: Vec<u8>,
    pub sort_key_max: Vec<u8>,
    pub delete_key_min: Vec<u8>,
    pub delete_key_max: Vec<u8>,
    pub bloom: Arc<BloomFilter>,
}

#[derive(Clone)]
pub struct TileMeta {
    pub sort_key_min: Vec<u8>,
    pub sort_key_max: Vec<u8>,
    pub delete_key_min: Vec<u8>,
    pub delete_key_max: Vec<u8>,
    pub pages: Vec<PageMeta>,
}

#[derive(Clone)]
pub struct FileMeta {
    pub name: String,
    pub sort_key_min: Vec<u8>,
    pub sort_key_max: Vec<u8>,
    pub delete_key_min: Vec<u8>,
    pub delete_key_max: Vec<u8>,
    /// Wall-clock seconds (high bits of the oldest tombstone's sequence
    /// number) of the oldest delete still resident in this file, or `None`
    /// if the file has no tombstones.
    pub age_oldest_tomb: Option<u32>,
    pub num_entry: u64,
    pub num_delete: u64,
    pub byte_size: u64,
}

fn seq_to_wall_seconds(seq: u64) -> u32 {
    (seq >> 32) as u32
}

fn min_vec<'a>(a: &'a [u8], b: &'a [u8]) -> Vec<u8> {
    if a <= b { a.to_vec() } else { b.to_vec() }
}

fn max_vec<'a>(a: &'a [u8], b: &'a [u8]) -> Vec<u8> {
    if a >= b { a.to_vec() } else { b.to_vec() }
}

struct PendingPage {
    entries: Vec<Entry>,
    encoded_len: usize,
}

impl PendingPage {
    fn new() -> Self {
        Self { entries: Vec::new(), encoded_len: 0 }
    }

    fn sort_key_min(&self) -> &[u8] {
        &self.entries.first().expect("non-empty page").sort_key
    }

    fn sort_key_max(&self) -> &[u8] {
        &self.entries.last().expect("non-empty page").sort_key
    }

    fn delete_key_bounds(&self) -> (Vec<u8>, Vec<u8>) {
        let mut min = self.entries[0].delete_key.clone();
        let mut max = self.entries[0].delete_key.clone();
        for e in &self.entries[1..] {
            min = min_vec(&min, &e.delete_key);
            max = max_vec(&max, &e.delete_key);
        }
        (min, max)
    }
}

/// Builds a key-weaving file from a sort-key-ascending stream of entries,
/// writing page payloads to `desc` and returning the in-memory metadata
/// (tile/page directory, file-level fences) the caller persists next.
pub fn build_kiwi_file(
    desc: &dyn FileDesc,
    entries: impl Iterator<Item = Entry>,
    standard_page_size: usize,
    num_page_per_delete_tile: usize,
) -> Result<FileMeta, KiwiError> {
    let mut tiles: Vec<TileMeta> = Vec::new();
    let mut pending_tile: Vec<PendingPage> = Vec::new();
    let mut current = PendingPage::new();

    let mut file_sort_min: Option<Vec<u8>> = None;
    let mut file_sort_max: Option<Vec<u8>> = None;
    let mut file_delete_min: Option<Vec<u8>> = None;
    let mut file_delete_max: Option<Vec<u8>> = None;
    let mut num_entry: u64 = 0;
    let mut num_delete: u64 = 0;
    let mut age_oldest_tomb: Option<u32> = None;
    let mut byte_size: u64 = 0;

    let mut flush_page = |current: &mut PendingPage, pending_tile: &mut Vec<PendingPage>| {
        if current.entries.is_empty() {
            return;
        }
        pending_tile.push(std::mem::replace(current, PendingPage::new()));
    };

    let mut flush_tile = |pending_tile: &mut Vec<PendingPage>, tiles: &mut Vec<TileMeta>| -> Result<(), KiwiError> {
        if pending_tile.is_empty() {
            return Ok(());
        }
        let mut batch = std::mem::take(pending_tile);
        batch.sort_by(|a, b| a.delete_key_bounds().0.cmp(&b.delete_key_bounds().0));

        let mut pages = Vec::with_capacity(batch.len());
        let mut tile_sort_min: Option<Vec<u8>> = None;
        let mut tile_sort_max: Option<Vec<u8>> = None;
        let mut tile_delete_min: Option<Vec<u8>> = None;
        let mut tile_delete_max: Option<Vec<u8>> = None;

        for page in &batch {
            let mut bloom = BloomFilter::new(page.entries.len().max(1), PAGE_BLOOM_FP_RATE);
            let mut buf = Vec::with_capacity(page.encoded_len + 4);
            for e in &page.entries {
                bloom.insert(&e.sort_key);
                buf.extend_from_slice(&encode_entry(e)?);
            }
            let checksum = crc32fast::hash(&buf);
            buf.write_u32::<LittleEndian>(checksum).unwrap();
            let offset = desc.append(&buf)?;
            let (delete_min, delete_max) = page.delete_key_bounds();
            let sort_min = page.sort_key_min().to_vec();
            let sort_max = page.sort_key_max().to_vec();

            tile_sort_min = Some(match tile_sort_min {
                Some(v) => min_vec(&v, &sort_min),
                None => sort_min.clone(),
            });
            tile_sort_max = Some(match tile_sort_max {
                Some(v) => max_vec(&v, &sort_max),
                None => sort_max.clone(),
            });
            tile_delete_min = Some(match tile_delete_min {
                Some(v) => min_vec(&v, &delete_min),
                None => delete_min.clone(),
            });
            tile_delete_max = Some(match tile_delete_max {
                Some(v) => max_vec(&v, &delete_max),
                None => delete_max.clone(),
            });

            pages.push(PageMeta {
                offset,
                size: buf.len() as u32,
                sort_key_min: sort_min,
                sort_key_max: sort_max,
                delete_key_min: delete_min,
                delete_key_max: delete_max,
                bloom: Arc::new(bloom),
            });
        }

        tiles.push(TileMeta {
            sort_key_min: tile_sort_min.unwrap(),
            sort_key_max: tile_sort_max.unwrap(),
            delete_key_min: tile_delete_min.unwrap(),
            delete_key_max: tile_delete_max.unwrap(),
            pages,
        });
        Ok(())
    };

    for entry in entries {
        num_entry += 1;
        if entry.op_type == OpType::Del {
            num_delete += 1;
            let wall = seq_to_wall_seconds(entry.seq_num);
            age_oldest_tomb = Some(match age_oldest_tomb {
                Some(existing) => existing.min(wall),
                None => wall,
            });
        }

        file_sort_min.get_or_insert_with(|| entry.sort_key.clone());
        file_sort_max = Some(entry.sort_key.clone());
        file_delete_min = Some(match file_delete_min.take() {
            Some(v) => min_vec(&v, &entry.delete_key),
            None => entry.delete_key.clone(),
        });
        file_delete_max = Some(match file_delete_max.take() {
            Some(v) => max_vec(&v, &entry.delete_key),
            None => entry.delete_key.clone(),
        });

        let encoded_len = crate::entry::persist_format_len(&entry);
        byte_size += encoded_len as u64;
        current.encoded_len += encoded_len;
        current.entries.push(entry);

        if current.encoded_len >= standard_page_size {
            flush_page(&mut current, &mut pending_tile);
            if pending_tile.len() >= num_page_per_delete_tile {
                flush_tile(&mut pending_tile, &mut tiles)?;
            }
        }
    }
    flush_page(&mut current, &mut pending_tile);
    flush_tile(&mut pending_tile, &mut tiles)?;

    if tiles.is_empty() {
        return Err(KiwiError::Corrupt("cannot build a file from zero entries".into()));
    }

    let meta = FileMeta {
        name: desc.name().to_string(),
        sort_key_min: file_sort_min.unwrap(),
        sort_key_max: file_sort_max.unwrap(),
        delete_key_min: file_delete_min.unwrap(),
        delete_key_max: file_delete_max.unwrap(),
        age_oldest_tomb,
        num_entry,
        num_delete,
        byte_size,
    };

    write_directory(desc, &meta, &tiles)?;
    Ok(meta)
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.write_u32::<LittleEndian>(bytes.len() as u32).unwrap();
    buf.extend_from_slice(bytes);
}

fn write_opt_bytes(buf: &mut Vec<u8>, bytes: Option<&[u8]>) {
    match bytes {
        Some(b) => {
            buf.write_u8(1).unwrap();
            write_bytes(buf, b);
        }
        None => buf.write_u8(0).unwrap(),
    }
}

fn write_directory(desc: &dyn FileDesc, meta: &FileMeta, tiles: &[TileMeta]) -> Result<(), KiwiError> {
    let directory_offset = desc.len()?;
    let mut buf = Vec::new();

    buf.write_u32::<LittleEndian>(tiles.len() as u32).unwrap();
    for tile in tiles {
        write_bytes(&mut buf, &tile.sort_key_min);
        write_bytes(&mut buf, &tile.sort_key_max);
        write_bytes(&mut buf, &tile.delete_key_min);
        write_bytes(&mut buf, &tile.delete_key_max);
        buf.write_u32::<LittleEndian>(tile.pages.len() as u32).unwrap();
        for page in &tile.pages {
            buf.write_u64::<LittleEndian>(page.offset).unwrap();
            buf.write_u32::<LittleEndian>(page.size).unwrap();
            write_bytes(&mut buf, &page.sort_key_min);
            write_bytes(&mut buf, &page.sort_key_max);
            write_bytes(&mut buf, &page.delete_key_min);
            write_bytes(&mut buf, &page.delete_key_max);
            let mut bloom_bytes = Vec::with_capacity(page.bloom.serialized_size());
            page.bloom.write_to(&mut bloom_bytes)?;
            write_bytes(&mut buf, &bloom_bytes);
        }
    }

    write_bytes(&mut buf, &meta.sort_key_min);
    write_bytes(&mut buf, &meta.sort_key_max);
    write_bytes(&mut buf, &meta.delete_key_min);
    write_bytes(&mut buf, &meta.delete_key_max);
    write_opt_bytes(&mut buf, meta.age_oldest_tomb.map(|w| w.to_le_bytes()).as_ref().map(|b| b.as_slice()));
    buf.write_u64::<LittleEndian>(meta.num_entry).unwrap();
    buf.write_u64::<LittleEndian>(meta.num_delete).unwrap();
    buf.write_u64::<LittleEndian>(meta.byte_size).unwrap();

    desc.append(&buf)?;

    let mut footer = Vec::with_capacity(16);
    footer.write_u64::<LittleEndian>(directory_offset).unwrap();
    footer.write_u32::<LittleEndian>(MAGIC).unwrap();
    desc.append(&footer)?;
    desc.sync()?;
    Ok(())
}

fn read_bytes(cur: &mut Cursor<&[u8]>) -> Result<Vec<u8>, KiwiError> {
    let len = cur.read_u32::<LittleEndian>()? as usize;
    let pos = cur.position() as usize;
    let data = cur.get_ref();
    if pos + len > data.len() {
        return Err(KiwiError::Corrupt("directory entry overruns buffer".into()));
    }
    let out = data[pos..pos + len].to_vec();
    cur.set_position((pos + len) as u64);
    Ok(out)
}

fn read_opt_bytes(cur: &mut Cursor<&[u8]>) -> Result<Option<Vec<u8>>, KiwiError> {
    let tag = cur.read_u8()?;
    if tag == 0 {
        Ok(None)
    } else {
        Ok(Some(read_bytes(cur)?))
    }
}

/// An opened, random-access-capable handle on a persisted file. The tile
/// and page directory is fully materialized in memory at open time; page
/// payloads are read from disk on demand.
pub struct KiwiFileReader {
    desc: Arc<dyn FileDesc>,
    meta: FileMeta,
    tiles: Vec<TileMeta>,
}

impl KiwiFileReader {
    pub fn open(desc: Arc<dyn FileDesc>) -> Result<Self, KiwiError> {
        let total_len = desc.len()?;
        if total_len < 12 {
            return Err(KiwiError::Corrupt("file too short for footer".into()));
        }
        let mut footer = [0u8; 12];
        desc.read_at(&mut footer, total_len - 12)?;
        let mut footer_cur = Cursor::new(&footer[..]);
        let directory_offset = footer_cur.read_u64::<LittleEndian>()?;
        let magic = footer_cur.read_u32::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(KiwiError::Corrupt("bad magic in footer".into()));
        }

        let dir_len = (total_len - 12 - directory_offset) as usize;
        let mut dir_buf = vec![0u8; dir_len];
        desc.read_at(&mut dir_buf, directory_offset)?;
        let mut cur = Cursor::new(dir_buf.as_slice());

        let num_tiles = cur.read_u32::<LittleEndian>()? as usize;
        let mut tiles = Vec::with_capacity(num_tiles);
        for _ in 0..num_tiles {
            let sort_key_min = read_bytes(&mut cur)?;
            let sort_key_max = read_bytes(&mut cur)?;
            let delete_key_min = read_bytes(&mut cur)?;
            let delete_key_max = read_bytes(&mut cur)?;
            let num_pages = cur.read_u32::<LittleEndian>()? as usize;
            let mut pages = Vec::with_capacity(num_pages);
            for _ in 0..num_pages {
                let offset = cur.read_u64::<LittleEndian>()?;
                let size = cur.read_u32::<LittleEndian>()?;
                let p_sort_min = read_bytes(&mut cur)?;
                let p_sort_max = read_bytes(&mut cur)?;
                let p_delete_min = read_bytes(&mut cur)?;
                let p_delete_max = read_bytes(&mut cur)?;
                let bloom_bytes = read_bytes(&mut cur)?;
                let bloom = BloomFilter::read_from(&mut Cursor::new(bloom_bytes.as_slice()))?;
                pages.push(PageMeta {
                    offset,
                    size,
                    sort_key_min: p_sort_min,
                    sort_key_max: p_sort_max,
                    delete_key_min: p_delete_min,
                    delete_key_max: p_delete_max,
                    bloom: Arc::new(bloom),
                });
            }
            tiles.push(TileMeta { sort_key_min, sort_key_max, delete_key_min, delete_key_max, pages });
        }

        let sort_key_min = read_bytes(&mut cur)?;
        let sort_key_max = read_bytes(&mut cur)?;
        let delete_key_min = read_bytes(&mut cur)?;
        let delete_key_max = read_bytes(&mut cur)?;
        let age_oldest_tomb = read_opt_bytes(&mut cur)?.map(|b| u32::from_le_bytes(b.try_into().unwrap()));
        let num_entry = cur.read_u64::<LittleEndian>()?;
        let num_delete = cur.read_u64::<LittleEndian>()?;
        let byte_size = cur.read_u64::<LittleEndian>()?;

        let meta = FileMeta {
            name: desc.name().to_string(),
            sort_key_min,
            sort_key_max,
            delete_key_min,
            delete_key_max,
            age_oldest_tomb,
            num_entry,
            num_delete,
            byte_size,
        };

        Ok(Self { desc, meta, tiles })
    }

    pub fn meta(&self) -> &FileMeta {
        &self.meta
    }

    fn admits_sort_key(&self, key: &[u8]) -> bool {
        key >= self.meta.sort_key_min.as_slice() && key <= self.meta.sort_key_max.as_slice()
    }

    fn find_tile(&self, key: &[u8]) -> Option<&TileMeta> {
        if !self.admits_sort_key(key) {
            return None;
        }
        // Tiles are strictly increasing and non-overlapping on sort key.
        let idx = self.tiles.partition_point(|t| t.sort_key_max.as_slice() < key);
        self.tiles.get(idx).filter(|t| key >= t.sort_key_min.as_slice() && key <= t.sort_key_max.as_slice())
    }

    fn read_page(&self, page: &PageMeta) -> Result<Vec<Entry>, KiwiError> {
        let mut buf = vec![0u8; page.size as usize];
        self.desc.read_at(&mut buf, page.offset)?;
        if buf.len() < 4 {
            return Err(KiwiError::Corrupt("page shorter than its checksum trailer".into()));
        }
        let payload_len = buf.len() - 4;
        let expected = u32::from_le_bytes(buf[payload_len..].try_into().unwrap());
        let actual = crc32fast::hash(&buf[..payload_len]);
        if actual != expected {
            return Err(KiwiError::Corrupt(format!(
                "page checksum mismatch at offset {}: expected {expected:#x}, got {actual:#x}",
                page.offset
            )));
        }
        let payload = &buf[..payload_len];
        let mut entries = Vec::new();
        let mut off = 0;
        while off < payload.len() {
            let (entry, consumed) = decode_entry(&payload[off..])?;
            off += consumed;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Point lookup by sort key. Pages within a tile are stored in
    /// delete-key order, so candidate pages are found by a linear scan of
    /// the tile's (small) page list rather than a binary search.
    pub fn get(&self, sort_key: &[u8]) -> Result<Option<Entry>, KiwiError> {
        let Some(tile) = self.find_tile(sort_key) else { return Ok(None) };
        for page in &tile.pages {
            if sort_key < page.sort_key_min.as_slice() || sort_key > page.sort_key_max.as_slice() {
                continue;
            }
            if !page.bloom.may_contain(sort_key) {
                continue;
            }
            let entries = self.read_page(page)?;
            if let Ok(idx) = entries.binary_search_by(|e| e.sort_key.as_slice().cmp(sort_key)) {
                return Ok(Some(entries[idx].clone()));
            }
        }
        Ok(None)
    }

    /// Iterates every entry in the file in ascending sort-key order. Tiles
    /// are already tile-ordered by sort key; within a tile, pages are
    /// re-sorted by sort key (undoing the on-disk delete-key weave) before
    /// being read and decoded.
    pub fn iter_entries(&self) -> Result<Vec<Entry>, KiwiError> {
        let mut out = Vec::with_capacity(self.meta.num_entry as usize);
        for tile in &self.tiles {
            let mut pages: Vec<&PageMeta> = tile.pages.iter().collect();
            pages.sort_by(|a, b| a.sort_key_min.cmp(&b.sort_key_min));
            for page in pages {
                out.extend(self.read_page(page)?);
            }
        }
        Ok(out)
    }
}
