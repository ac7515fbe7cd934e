//! Polymorphic handle to the byte store backing a persisted file: a real
//! file on disk in production, an in-memory buffer in tests. Both
//! implementations support random-access reads (for point lookups) and
//! sequential appends (for the writer), each append reporting the offset
//! it landed at so the caller can record fence pointers.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait FileDesc: Send + Sync {
    fn name(&self) -> &str;
    fn len(&self) -> io::Result<u64>;
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;
    fn append(&self, buf: &[u8]) -> io::Result<u64>;
    fn sync(&self) -> io::Result<()>;
    fn close(&self) -> io::Result<()>;

    /// Makes a freshly-written file visible under its final name. Called once
    /// after the last `append`, before the file is handed to readers or
    /// registered in a level. A no-op for descriptors with no staging file.
    fn finalize(&self) -> io::Result<()> {
        Ok(())
    }
}

pub struct MemFileDesc {
    name: String,
    buf: Mutex<Vec<u8>>,
}

impl MemFileDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), buf: Mutex::new(Vec::new()) }
    }
}

impl FileDesc for MemFileDesc {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.buf.lock().unwrap().len() as u64)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let data = self.buf.lock().unwrap();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of memory file"));
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn append(&self, buf: &[u8]) -> io::Result<u64> {
        let mut data = self.buf.lock().unwrap();
        let offset = data.len() as u64;
        data.extend_from_slice(buf);
        Ok(offset)
    }

    fn sync(&self) -> io::Result<()> {
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

pub struct DiskFileDesc {
    name: String,
    dir: PathBuf,
    /// Set while the file is still staged under a `.tmp` name; cleared by
    /// `finalize`. `open()` never populates this — only newly created files
    /// go through the staged-then-renamed path.
    tmp_path: Mutex<Option<PathBuf>>,
    file: Mutex<File>,
}

impl DiskFileDesc {
    /// Creates the file under a temporary name so a crash mid-write leaves no
    /// partially-written file under its final name for directory-scan
    /// recovery to pick up. `finalize` renames it into place.
    pub fn create(dir: &Path, name: &str) -> io::Result<Self> {
        let tmp_name = format!("{name}.tmp");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(dir.join(&tmp_name))?;
        Ok(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            tmp_path: Mutex::new(Some(dir.join(&tmp_name))),
            file: Mutex::new(file),
        })
    }

    pub fn open(dir: &Path, name: &str) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(dir.join(name))?;
        Ok(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            tmp_path: Mutex::new(None),
            file: Mutex::new(file),
        })
    }
}

impl FileDesc for DiskFileDesc {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> io::Result<u64> {
        self.file.lock().unwrap().metadata().map(|m| m.len())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    fn append(&self, buf: &[u8]) -> io::Result<u64> {
        let mut file = self.file.lock().unwrap();
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(buf)?;
        Ok(offset)
    }

    fn sync(&self) -> io::Result<()> {
        self.file.lock().unwrap().sync_all()
    }

    fn close(&self) -> io::Result<()> {
        Ok(())
    }

    fn finalize(&self) -> io::Result<()> {
        let mut guard = self.tmp_path.lock().unwrap();
        let Some(tmp_path) = guard.take() else {
            return Ok(());
        };
        self.file.lock().unwrap().sync_all()?;
        let final_path = self.dir.join(&self.name);
        std::fs::rename(&tmp_path, &final_path)?;
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}
