//! Fixed-capacity buffer pool between the page allocator and the disk.
//!
//! Frames are pinned while a caller holds them; only unpinned frames sit
//! in the LRU recency list and only those are eviction candidates. Dirty
//! frames are written back before they leave the pool. A single mutex
//! guards the whole state so the frame table, the recency list, and the
//! counters always agree.
//!
//! `get` and `put` both pin: the caller releases the pin with `unpin`
//! once it holds the returned `Arc`.


use ahash::RandomState;
use common::{DbResult, PageId, StorageError};
use hashbrown::HashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::sync::Arc;
use storage::{DiskManager, Page};

type Map<K, V> = HashMap<K, V, RandomState>;

/// A resident page plus its pool bookkeeping.
#[derive(Debug)]
struct BufferFrame {
    page: Arc<Page>,
    dirty: bool,
    pin_count: u32,
}

/// Monotonic pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub capacity: usize,
    pub used_frames: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl BufferPoolStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct PoolState {
    disk: DiskManager,
    capacity: usize,
    frames: Map<PageId, BufferFrame>,
    /// Recency list of unpinned frames only; `pop_lru` yields the victim.
    lru: LruCache<PageId, ()>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

pub struct BufferPool {
    state: Mutex<PoolState>,
}

impl BufferPool {
    pub fn new(disk: DiskManager, capacity: usize) -> Self {
        assert!(capacity > 0, "buffer pool needs at least one frame");
        Self {
            state: Mutex::new(PoolState {
                disk,
                capacity,
                frames: Map::default(),
                lru: LruCache::unbounded(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Fetch a page, faulting it in from disk on a miss. The returned
    /// frame is pinned.
    pub fn get(&self, pid: PageId) -> DbResult<Arc<Page>> {
        let mut state = self.state.lock();

        if state.frames.contains_key(&pid) {
            state.hits += 1;
            state.pin_existing(pid);
            return Ok(Arc::clone(&state.frames[&pid].page));
        }

        state.misses += 1;
        state.make_room()?;
        let page = Arc::new(state.disk.read_page(pid)?);
        state.frames.insert(
            pid,
            BufferFrame {
                page: Arc::clone(&page),
                dirty: false,
                pin_count: 1,
            },
        );
        Ok(page)
    }

    /// Insert or replace a page in the pool, marking it dirty and pinned.
    pub fn put(&self, page: Page) -> DbResult<Arc<Page>> {
        let pid = page.id();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let page = Arc::new(page);

        if let Some(frame) = state.frames.get_mut(&pid) {
            frame.page = Arc::clone(&page);
            frame.dirty = true;
            frame.pin_count += 1;
            if frame.pin_count == 1 {
                state.lru.pop(&pid);
            }
            return Ok(page);
        }

        state.make_room()?;
        state.frames.insert(
            pid,
            BufferFrame {
                page: Arc::clone(&page),
                dirty: true,
                pin_count: 1,
            },
        );
        Ok(page)
    }

    pub fn pin(&self, pid: PageId) -> DbResult<()> {
        let mut state = self.state.lock();
        if !state.frames.contains_key(&pid) {
            return Err(StorageError::PageNotResident(pid.0).into());
        }
        state.pin_existing(pid);
        Ok(())
    }

    /// Release one pin. The frame re-enters the recency list at the
    /// most-recently-used end when its pin count reaches zero.
    pub fn unpin(&self, pid: PageId) -> DbResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let frame = state
            .frames
            .get_mut(&pid)
            .ok_or(StorageError::PageNotResident(pid.0))?;
        if frame.pin_count == 0 {
            return Ok(());
        }
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            state.lru.push(pid, ());
        }
        Ok(())
    }

    /// Write a dirty frame through to disk without evicting it.
    pub fn flush(&self, pid: PageId) -> DbResult<()> {
        let mut state = self.state.lock();
        state.flush_frame(pid)
    }

    pub fn flush_all(&self) -> DbResult<()> {
        let mut state = self.state.lock();
        let dirty: Vec<PageId> = state
            .frames
            .iter()
            .filter(|(_, frame)| frame.dirty)
            .map(|(pid, _)| *pid)
            .collect();
        for pid in dirty {
            state.flush_frame(pid)?;
        }
        Ok(())
    }

    /// Evict the least-recently-used unpinned frame. Returns false when
    /// every frame is pinned (or the pool is empty).
    pub fn evict(&self) -> DbResult<bool> {
        let mut state = self.state.lock();
        state.evict_one()
    }

    /// Drop a frame without keeping its contents (the page is being
    /// deallocated). Dirty contents are written back first.
    pub fn discard(&self, pid: PageId) -> DbResult<()> {
        let mut state = self.state.lock();
        if state.frames.contains_key(&pid) {
            state.flush_frame(pid)?;
            state.frames.remove(&pid);
            state.lru.pop(&pid);
        }
        Ok(())
    }

    pub fn contains(&self, pid: PageId) -> bool {
        self.state.lock().frames.contains_key(&pid)
    }

    pub fn stats(&self) -> BufferPoolStats {
        let state = self.state.lock();
        BufferPoolStats {
            capacity: state.capacity,
            used_frames: state.frames.len(),
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    /// Run a closure against the backing disk. Used by the page manager
    /// for operations that bypass caching (bulk loads of fresh pages).
    pub fn with_disk<T>(&self, f: impl FnOnce(&mut DiskManager) -> DbResult<T>) -> DbResult<T> {
        let mut state = self.state.lock();
        f(&mut state.disk)
    }
}

impl PoolState {
    fn pin_existing(&mut self, pid: PageId) {
        let frame = self.frames.get_mut(&pid).expect("frame present");
        frame.pin_count += 1;
        if frame.pin_count == 1 {
            self.lru.pop(&pid);
        }
    }

    /// Make space for one more frame, evicting if at capacity.
    fn make_room(&mut self) -> DbResult<()> {
        while self.frames.len() >= self.capacity {
            if !self.evict_one()? {
                return Err(StorageError::BufferPoolExhausted.into());
            }
        }
        Ok(())
    }

    fn evict_one(&mut self) -> DbResult<bool> {
        let victim = match self.lru.pop_lru() {
            Some((pid, ())) => pid,
            None => return Ok(false),
        };
        let frame = self.frames.remove(&victim).expect("lru entry has a frame");
        debug_assert_eq!(frame.pin_count, 0);
        if frame.dirty {
            self.disk.write_page(&frame.page)?;
        }
        self.evictions += 1;
        tracing::debug!(page = victim.0, dirty = frame.dirty, "evicted frame");
        Ok(true)
    }

    fn flush_frame(&mut self, pid: PageId) -> DbResult<()> {
        if let Some(frame) = self.frames.get_mut(&pid) {
            if frame.dirty {
                let page = Arc::clone(&frame.page);
                frame.dirty = false;
                self.disk.write_page(&page)?;
            }
        }
        Ok(())
    }
}
