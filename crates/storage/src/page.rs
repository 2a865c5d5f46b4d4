use common::{DbResult, PageId, SlotId, StorageError};

pub const PAGE_SIZE: usize = 4096;
pub const PAGE_HEADER_SIZE: usize = 24;

// Header layout, little-endian:
//   0..4   page_id      u32
//   4      kind         u8
//   5..7   slot_count   u16
//   7..9   free_offset  u16
//   9..11  free_size    u16
//   11..15 checksum     u32
//   15..23 lsn          u64
//   23     reserved
const OFF_PAGE_ID: usize = 0;
const OFF_KIND: usize = 4;
const OFF_SLOT_COUNT: usize = 5;
const OFF_FREE_OFFSET: usize = 7;
const OFF_FREE_SIZE: usize = 9;
const OFF_CHECKSUM: usize = 11;
const OFF_LSN: usize = 15;

const SLOT_BYTES: usize = 2;
const LEN_PREFIX: usize = 2;

/// What a page holds. Stored in the header so a raw block is
/// self-describing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageKind {
    Data,
    Index,
    Meta,
}

impl PageKind {
    fn from_u8(raw: u8) -> Option<PageKind> {
        match raw {
            0 => Some(PageKind::Data),
            1 => Some(PageKind::Index),
            2 => Some(PageKind::Meta),
            _ => None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PageKind::Data => 0,
            PageKind::Index => 1,
            PageKind::Meta => 2,
        }
    }
}

/// A slotted page. All state lives in the 4 KiB byte block, so
/// `serialize` is a copy and the checksum covers exactly what hits disk.
#[derive(Clone, Debug)]
pub struct Page {
    data: Vec<u8>,
}

impl Page {
    pub fn new(id: PageId, kind: PageKind) -> Self {
        let mut page = Self {
            data: vec![0u8; PAGE_SIZE],
        };
        page.write_u32(OFF_PAGE_ID, id.0);
        page.data[OFF_KIND] = kind.as_u8();
        page.set_free_offset(PAGE_HEADER_SIZE as u16);
        page.set_free_size((PAGE_SIZE - PAGE_HEADER_SIZE) as u16);
        page.update_checksum();
        page
    }

    pub fn id(&self) -> PageId {
        PageId(self.read_u32(OFF_PAGE_ID))
    }

    pub fn kind(&self) -> PageKind {
        // The constructor and deserialize are the only writers of this
        // byte, and both only store valid kinds.
        PageKind::from_u8(self.data[OFF_KIND]).unwrap_or(PageKind::Data)
    }

    pub fn slot_count(&self) -> u16 {
        self.read_u16(OFF_SLOT_COUNT)
    }

    pub fn lsn(&self) -> u64 {
        u64::from_le_bytes(self.data[OFF_LSN..OFF_LSN + 8].try_into().unwrap())
    }

    pub fn set_lsn(&mut self, lsn: u64) {
        self.data[OFF_LSN..OFF_LSN + 8].copy_from_slice(&lsn.to_le_bytes());
        self.update_checksum();
    }

    pub fn free_space(&self) -> usize {
        self.free_size() as usize
    }

    /// Can a record of `len` payload bytes be inserted? Accounts for the
    /// length prefix and, when no tombstoned slot is reusable, for the
    /// slot directory growing by one entry.
    pub fn can_fit(&self, len: usize) -> bool {
        let needed = len + LEN_PREFIX;
        match self.lowest_tombstone() {
            Some(_) => self.free_space() >= needed,
            None => self.free_space() >= needed + SLOT_BYTES,
        }
    }

    /// Insert a record, reusing the lowest tombstoned slot if one exists.
    pub fn insert_record(&mut self, bytes: &[u8]) -> DbResult<SlotId> {
        let needed = bytes.len() + LEN_PREFIX;
        if bytes.len() > u16::MAX as usize {
            return Err(StorageError::PageFull(bytes.len()).into());
        }

        let slot = match self.lowest_tombstone() {
            Some(slot) => {
                if self.free_space() < needed {
                    return Err(StorageError::PageFull(bytes.len()).into());
                }
                slot
            }
            None => {
                if self.free_space() < needed + SLOT_BYTES {
                    return Err(StorageError::PageFull(bytes.len()).into());
                }
                let slot = self.slot_count();
                self.set_slot_count(slot + 1);
                self.set_free_offset(self.free_offset() + SLOT_BYTES as u16);
                self.set_free_size(self.free_size() - SLOT_BYTES as u16);
                slot
            }
        };

        let offset = self.payload_floor() - needed as u16;
        self.data[offset as usize..offset as usize + LEN_PREFIX]
            .copy_from_slice(&(bytes.len() as u16).to_le_bytes());
        self.data[offset as usize + LEN_PREFIX..offset as usize + needed]
            .copy_from_slice(bytes);
        self.set_slot(slot, offset);
        self.set_free_size(self.free_size() - needed as u16);
        self.update_checksum();
        Ok(slot)
    }

    pub fn get_record(&self, slot: SlotId) -> DbResult<Vec<u8>> {
        let offset = self.live_slot(slot)?;
        let len = self.read_u16(offset as usize) as usize;
        let start = offset as usize + LEN_PREFIX;
        Ok(self.data[start..start + len].to_vec())
    }

    /// Tombstone the slot, then compact the payload region so the free
    /// space is contiguous again.
    pub fn delete_record(&mut self, slot: SlotId) -> DbResult<()> {
        self.live_slot(slot)?;
        self.set_slot(slot, 0);
        self.compact();
        self.update_checksum();
        Ok(())
    }

    /// Delete-and-reinsert on the same slot. If the new payload no longer
    /// fits the page is left unchanged and `PageFull` is returned.
    pub fn update_record(&mut self, slot: SlotId, bytes: &[u8]) -> DbResult<()> {
        let offset = self.live_slot(slot)?;
        let old_len = self.read_u16(offset as usize) as usize;
        let reclaimed = self.free_space() + old_len + LEN_PREFIX;
        if reclaimed < bytes.len() + LEN_PREFIX || bytes.len() > u16::MAX as usize {
            return Err(StorageError::PageFull(bytes.len()).into());
        }

        self.set_slot(slot, 0);
        self.compact();

        let needed = bytes.len() + LEN_PREFIX;
        let offset = self.payload_floor() - needed as u16;
        self.data[offset as usize..offset as usize + LEN_PREFIX]
            .copy_from_slice(&(bytes.len() as u16).to_le_bytes());
        self.data[offset as usize + LEN_PREFIX..offset as usize + needed]
            .copy_from_slice(bytes);
        self.set_slot(slot, offset);
        self.set_free_size(self.free_size() - needed as u16);
        self.update_checksum();
        Ok(())
    }

    /// Live record count (slots minus tombstones).
    pub fn record_count(&self) -> usize {
        (0..self.slot_count())
            .filter(|slot| self.slot_offset(*slot) != 0)
            .count()
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub fn deserialize(bytes: &[u8]) -> DbResult<Page> {
        if bytes.len() != PAGE_SIZE {
            return Err(StorageError::InvalidMetadata(format!(
                "page block must be {PAGE_SIZE} bytes, got {}",
                bytes.len()
            ))
            .into());
        }
        let page = Page {
            data: bytes.to_vec(),
        };
        let stored = page.read_u32(OFF_CHECKSUM);
        if stored != page.compute_checksum() || PageKind::from_u8(page.data[OFF_KIND]).is_none() {
            return Err(StorageError::PageCorrupt(page.id().0).into());
        }
        Ok(page)
    }

    // ---- free-space bookkeeping ----

    fn free_offset(&self) -> u16 {
        self.read_u16(OFF_FREE_OFFSET)
    }

    fn free_size(&self) -> u16 {
        self.read_u16(OFF_FREE_SIZE)
    }

    /// First byte past the hole: the lowest payload offset, or PAGE_SIZE
    /// on an empty page.
    fn payload_floor(&self) -> u16 {
        self.free_offset() + self.free_size()
    }

    fn set_free_offset(&mut self, v: u16) {
        self.write_u16(OFF_FREE_OFFSET, v);
    }

    fn set_free_size(&mut self, v: u16) {
        self.write_u16(OFF_FREE_SIZE, v);
    }

    fn set_slot_count(&mut self, v: u16) {
        self.write_u16(OFF_SLOT_COUNT, v);
    }

    // ---- slots ----

    fn slot_offset(&self, slot: SlotId) -> u16 {
        self.read_u16(PAGE_HEADER_SIZE + slot as usize * SLOT_BYTES)
    }

    fn set_slot(&mut self, slot: SlotId, offset: u16) {
        self.write_u16(PAGE_HEADER_SIZE + slot as usize * SLOT_BYTES, offset);
    }

    fn live_slot(&self, slot: SlotId) -> DbResult<u16> {
        if slot >= self.slot_count() {
            return Err(StorageError::SlotNotFound(slot).into());
        }
        let offset = self.slot_offset(slot);
        if offset == 0 {
            return Err(StorageError::SlotTombstoned(slot).into());
        }
        Ok(offset)
    }

    fn lowest_tombstone(&self) -> Option<SlotId> {
        (0..self.slot_count()).find(|slot| self.slot_offset(*slot) == 0)
    }

    /// Rebuild the payload region by laying the live records back down in
    /// slot order from the page tail. Afterwards the hole between the
    /// slot directory and the payloads is the only free space.
    fn compact(&mut self) {
        let live: Vec<(SlotId, Vec<u8>)> = (0..self.slot_count())
            .filter(|slot| self.slot_offset(*slot) != 0)
            .map(|slot| {
                let offset = self.slot_offset(slot) as usize;
                let len = self.read_u16(offset) as usize;
                (slot, self.data[offset + LEN_PREFIX..offset + LEN_PREFIX + len].to_vec())
            })
            .collect();

        let mut cursor = PAGE_SIZE as u16;
        for (slot, bytes) in live {
            let needed = (bytes.len() + LEN_PREFIX) as u16;
            cursor -= needed;
            self.data[cursor as usize..cursor as usize + LEN_PREFIX]
                .copy_from_slice(&(bytes.len() as u16).to_le_bytes());
            self.data[cursor as usize + LEN_PREFIX..(cursor + needed) as usize]
                .copy_from_slice(&bytes);
            self.set_slot(slot, cursor);
        }
        self.set_free_size(cursor - self.free_offset());
    }

    // ---- checksum ----

    /// CRC32 over every byte except the checksum field itself.
    fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.data[..OFF_CHECKSUM]);
        hasher.update(&[0u8; 4]);
        hasher.update(&self.data[OFF_CHECKSUM + 4..]);
        hasher.finalize()
    }

    fn update_checksum(&mut self) {
        let checksum = self.compute_checksum();
        self.write_u32(OFF_CHECKSUM, checksum);
    }

    // ---- raw field access ----

    fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes(self.data[offset..offset + 2].try_into().unwrap())
    }

    fn write_u16(&mut self, offset: usize, v: u16) {
        self.data[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap())
    }

    fn write_u32(&mut self, offset: usize, v: u32) {
        self.data[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }
}
