use bit_vec::BitVec;
use buffer::{BufferPool, BufferPoolStats};
use common::{DbResult, PageId, StorageError};
use std::path::Path;
use std::sync::Arc;
use storage::{DiskManager, Page, PageKind};

const INITIAL_BITMAP_BITS: usize = 64;

/// Allocates page ids out of a free-page bitmap and serves reads and
/// writes through the buffer pool. Bit 0 stays set forever: page id 0 is
/// the invalid sentinel.
pub struct PageManager {
    pool: BufferPool,
    bitmap: BitVec,
}

impl PageManager {
    pub fn open(heap_path: &Path, pool_capacity: usize) -> DbResult<Self> {
        let disk = DiskManager::open(heap_path)?;
        let pool = BufferPool::new(disk, pool_capacity);
        let mut bitmap = BitVec::from_elem(INITIAL_BITMAP_BITS, false);
        bitmap.set(0, true);
        Ok(Self { pool, bitmap })
    }

    /// Claim the lowest free page id, growing the bitmap geometrically
    /// when every bit is taken. The fresh page is written through so the
    /// heap file always covers every allocated id.
    pub fn allocate(&mut self, kind: PageKind) -> DbResult<PageId> {
        let free = match self.bitmap.iter().position(|taken| !taken) {
            Some(idx) => idx,
            None => {
                let old_len = self.bitmap.len();
                self.bitmap.grow(old_len, false);
                old_len
            }
        };
        self.bitmap.set(free, true);

        let pid = PageId(free as u32);
        let page = Page::new(pid, kind);
        self.pool.put(page)?;
        self.pool.flush(pid)?;
        self.pool.unpin(pid)?;
        Ok(pid)
    }

    /// Return a page id to the free pool and drop any cached copy.
    pub fn deallocate(&mut self, pid: PageId) -> DbResult<()> {
        if !self.exists(pid) {
            return Err(StorageError::PageAllocationFailed(format!(
                "page {} is not allocated",
                pid.0
            ))
            .into());
        }
        self.bitmap.set(pid.0 as usize, false);
        self.pool.discard(pid)
    }

    pub fn exists(&self, pid: PageId) -> bool {
        pid.is_valid() && self.bitmap.get(pid.0 as usize).unwrap_or(false)
    }

    /// Fetch a page, faulting from disk on a miss.
    pub fn read(&self, pid: PageId) -> DbResult<Arc<Page>> {
        if !self.exists(pid) {
            return Err(StorageError::PageAllocationFailed(format!(
                "page {} is not allocated",
                pid.0
            ))
            .into());
        }
        let page = self.pool.get(pid)?;
        self.pool.unpin(pid)?;
        Ok(page)
    }

    /// Update the pool and write the page through to disk.
    pub fn write(&self, page: Page) -> DbResult<()> {
        let pid = page.id();
        self.pool.put(page)?;
        self.pool.flush(pid)?;
        self.pool.unpin(pid)
    }

    pub fn flush(&self, pid: PageId) -> DbResult<()> {
        self.pool.flush(pid)
    }

    pub fn flush_all(&self) -> DbResult<()> {
        self.pool.flush_all()
    }

    pub fn stats(&self) -> BufferPoolStats {
        self.pool.stats()
    }
}
