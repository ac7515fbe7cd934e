//! Tunables for opening a collection: size thresholds, level fan-out, and the
//! two key comparators that drive sort-key and delete-key ordering.

use std::path::PathBuf;
use std::time::Duration;

/// A comparator over raw key bytes. Defaults to lexicographic order.
pub type KeyLess = fn(&[u8], &[u8]) -> bool;

fn lexicographic_less(a: &[u8], b: &[u8]) -> bool {
    a < b
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("levelSizeRatio must be greater than 1, got {0}")]
    InvalidLevelSizeRatio(usize),
    #[error("numInitialLevels must be at least 2 (memtable plus one persisted level), got {0}")]
    InvalidNumInitialLevels(usize),
    #[error("standardPageSize must be greater than 0")]
    InvalidPageSize,
    #[error("numPagePerDeleteTile must be greater than 0")]
    InvalidTileSize,
    #[error("memTableSizeLimit must be greater than 0")]
    InvalidMemTableSizeLimit,
}

/// Options controlling how a collection lays out its memtable, levels, and
/// on-disk files. Mirrors the defaults of the system this crate's engine is
/// derived from, adjusted for the key-weaving file layout.
#[derive(Clone)]
pub struct CollectionOptions {
    pub sort_key_less: KeyLess,
    pub delete_key_less: KeyLess,
    pub mem_table_size_limit: usize,
    pub level_size_ratio: usize,
    pub delete_persist_threshold: Duration,
    pub num_initial_levels: usize,
    pub standard_page_size: usize,
    pub num_page_per_delete_tile: usize,
    pub dir_path: PathBuf,
    pub create_if_missing: bool,
    pub persist_trigger_buf_len: usize,
    pub compact_trigger_buf_len: usize,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            sort_key_less: lexicographic_less,
            delete_key_less: lexicographic_less,
            mem_table_size_limit: 4 * 1024 * 1024,
            level_size_ratio: 10,
            delete_persist_threshold: Duration::from_secs(24 * 60 * 60),
            num_initial_levels: 6,
            standard_page_size: 4 * 1024,
            num_page_per_delete_tile: 8,
            dir_path: PathBuf::from("."),
            create_if_missing: true,
            persist_trigger_buf_len: 5,
            compact_trigger_buf_len: 5,
        }
    }
}

impl CollectionOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level_size_ratio <= 1 {
            return Err(ConfigError::InvalidLevelSizeRatio(self.level_size_ratio));
        }
        if self.num_initial_levels < 2 {
            return Err(ConfigError::InvalidNumInitialLevels(self.num_initial_levels));
        }
        if self.standard_page_size == 0 {
            return Err(ConfigError::InvalidPageSize);
        }
        if self.num_page_per_delete_tile == 0 {
            return Err(ConfigError::InvalidTileSize);
        }
        if self.mem_table_size_limit == 0 {
            return Err(ConfigError::InvalidMemTableSizeLimit);
        }
        Ok(())
    }

    /// Number of persisted levels below the memtable, i.e. `numInitialLevels - 1`.
    pub fn num_persisted_levels(&self) -> usize {
        self.num_initial_levels - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        CollectionOptions::default().validate().unwrap();
    }

    #[test]
    fn rejects_degenerate_ratio() {
        let mut opts = CollectionOptions::default();
        opts.level_size_ratio = 1;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn rejects_too_few_levels() {
        let mut opts = CollectionOptions::default();
        opts.num_initial_levels = 1;
        assert!(opts.validate().is_err());
    }
}
