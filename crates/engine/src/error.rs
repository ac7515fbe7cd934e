use memtable::MemtableError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("sort key too large: {0} bytes (max {1})")]
    SortKeyTooLarge(usize, usize),
    #[error("delete key too large: {0} bytes (max {1})")]
    DeleteKeyTooLarge(usize, usize),
    #[error("value too large: {0} bytes (max {1})")]
    ValueTooLarge(usize, usize),
    #[error("key not found")]
    NotFound,
    #[error("collection is closed")]
    Closed,
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl From<MemtableError> for EngineError {
    fn from(e: MemtableError) -> Self {
        match e {
            MemtableError::SortKeyTooLarge(a, b) => EngineError::SortKeyTooLarge(a, b),
            MemtableError::DeleteKeyTooLarge(a, b) => EngineError::DeleteKeyTooLarge(a, b),
            MemtableError::ValueTooLarge(a, b) => EngineError::ValueTooLarge(a, b),
        }
    }
}

impl From<sstable::KiwiError> for EngineError {
    fn from(e: sstable::KiwiError) -> Self {
        EngineError::Io(anyhow::Error::new(e))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(anyhow::Error::new(e))
    }
}
