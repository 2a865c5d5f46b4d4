use crate::{Page, PAGE_SIZE};
use common::{DbResult, PageId, StorageError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Synchronous block I/O over the single heap file. Page `p` lives at
/// offset `(p - 1) * PAGE_SIZE`; page 0 is invalid and never stored.
#[derive(Debug)]
pub struct DiskManager {
    file: File,
}

impl DiskManager {
    pub fn open(path: &Path) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { file })
    }

    fn offset(pid: PageId) -> u64 {
        (pid.0 as u64 - 1) * PAGE_SIZE as u64
    }

    pub fn read_page(&mut self, pid: PageId) -> DbResult<Page> {
        if !pid.is_valid() {
            return Err(StorageError::PageAllocationFailed("page id 0 is invalid".into()).into());
        }
        self.file.seek(SeekFrom::Start(Self::offset(pid)))?;
        let mut buf = vec![0u8; PAGE_SIZE];
        self.file.read_exact(&mut buf).map_err(|e| {
            StorageError::PageAllocationFailed(format!("short read of page {}: {e}", pid.0))
        })?;
        Page::deserialize(&buf)
    }

    pub fn write_page(&mut self, page: &Page) -> DbResult<()> {
        let pid = page.id();
        if !pid.is_valid() {
            return Err(StorageError::PageAllocationFailed("page id 0 is invalid".into()).into());
        }
        self.file.seek(SeekFrom::Start(Self::offset(pid)))?;
        self.file.write_all(&page.serialize())?;
        self.file.flush()?;
        Ok(())
    }

    /// Number of whole pages the backing file currently holds.
    pub fn page_capacity(&self) -> DbResult<u64> {
        Ok(self.file.metadata()?.len() / PAGE_SIZE as u64)
    }
}
