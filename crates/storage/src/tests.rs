use super::*;
use common::{DbError, PageId, StorageError};
use proptest::prelude::*;
use tempfile::tempdir;

fn data_page() -> Page {
    Page::new(PageId(1), PageKind::Data)
}

#[test]
fn insert_then_get_returns_exact_bytes() {
    let mut page = data_page();

    let slot_a = page.insert_record(b"alpha").unwrap();
    let slot_b = page.insert_record(b"beta").unwrap();

    assert_eq!(page.get_record(slot_a).unwrap(), b"alpha");
    assert_eq!(page.get_record(slot_b).unwrap(), b"beta");
    assert_eq!(page.slot_count(), 2);
}

#[test]
fn delete_tombstones_and_compacts() {
    let mut page = data_page();
    let initial_free = page.free_space();

    let slot_a = page.insert_record(b"first").unwrap();
    let slot_b = page.insert_record(b"second").unwrap();
    page.delete_record(slot_a).unwrap();

    // The survivor is still readable after compaction.
    assert_eq!(page.get_record(slot_b).unwrap(), b"second");
    assert!(matches!(
        page.get_record(slot_a).unwrap_err(),
        DbError::Storage(StorageError::SlotTombstoned(_))
    ));

    // Deleting the survivor returns the page to its initial free space
    // except for the two (reusable) slot directory entries.
    page.delete_record(slot_b).unwrap();
    assert_eq!(page.free_space(), initial_free - 4);
    assert_eq!(page.record_count(), 0);
}

#[test]
fn insert_reuses_lowest_tombstoned_slot() {
    let mut page = data_page();

    let slot_a = page.insert_record(b"a").unwrap();
    let _slot_b = page.insert_record(b"b").unwrap();
    let slot_c = page.insert_record(b"c").unwrap();

    page.delete_record(slot_c).unwrap();
    page.delete_record(slot_a).unwrap();

    let reused = page.insert_record(b"new").unwrap();
    assert_eq!(reused, slot_a);
    assert_eq!(page.get_record(reused).unwrap(), b"new");
    assert_eq!(page.slot_count(), 3);
}

#[test]
fn update_in_place_preserves_slot() {
    let mut page = data_page();

    let slot = page.insert_record(b"short").unwrap();
    let other = page.insert_record(b"other").unwrap();

    page.update_record(slot, b"a considerably longer payload").unwrap();
    assert_eq!(page.get_record(slot).unwrap(), b"a considerably longer payload");
    assert_eq!(page.get_record(other).unwrap(), b"other");
}

#[test]
fn update_without_room_leaves_page_unchanged() {
    let mut page = data_page();
    let slot = page.insert_record(b"tiny").unwrap();

    let filler = vec![0xAAu8; page.free_space() - 8];
    page.insert_record(&filler).unwrap();

    let before = page.serialize();
    let huge = vec![0xBBu8; 4000];
    let err = page.update_record(slot, &huge).unwrap_err();

    assert!(matches!(err, DbError::Storage(StorageError::PageFull(_))));
    assert_eq!(page.serialize(), before);
    assert_eq!(page.get_record(slot).unwrap(), b"tiny");
}

#[test]
fn insert_fails_when_full() {
    let mut page = data_page();
    let filler = vec![1u8; 1000];
    while page.can_fit(filler.len()) {
        page.insert_record(&filler).unwrap();
    }

    assert!(matches!(
        page.insert_record(&filler).unwrap_err(),
        DbError::Storage(StorageError::PageFull(_))
    ));
}

#[test]
fn serialize_round_trips_all_fields() {
    let mut page = Page::new(PageId(7), PageKind::Index);
    page.insert_record(b"payload one").unwrap();
    let slot = page.insert_record(b"payload two").unwrap();
    page.delete_record(slot).unwrap();
    page.set_lsn(99);

    let restored = Page::deserialize(&page.serialize()).unwrap();
    assert_eq!(restored.id(), PageId(7));
    assert_eq!(restored.kind(), PageKind::Index);
    assert_eq!(restored.slot_count(), page.slot_count());
    assert_eq!(restored.free_space(), page.free_space());
    assert_eq!(restored.lsn(), 99);
    assert_eq!(restored.get_record(0).unwrap(), b"payload one");
}

#[test]
fn corrupt_block_is_rejected() {
    let mut page = data_page();
    page.insert_record(b"payload").unwrap();

    let mut bytes = page.serialize();
    bytes[PAGE_SIZE - 1] ^= 0xFF;

    assert!(matches!(
        Page::deserialize(&bytes).unwrap_err(),
        DbError::Storage(StorageError::PageCorrupt(_))
    ));
}

#[test]
fn get_rejects_out_of_range_slot() {
    let page = data_page();
    assert!(matches!(
        page.get_record(3).unwrap_err(),
        DbError::Storage(StorageError::SlotNotFound(3))
    ));
}

#[test]
fn disk_round_trips_pages() {
    let dir = tempdir().unwrap();
    let mut disk = DiskManager::open(&dir.path().join("heap.db")).unwrap();

    let mut first = Page::new(PageId(1), PageKind::Data);
    first.insert_record(b"page one").unwrap();
    let mut third = Page::new(PageId(3), PageKind::Data);
    third.insert_record(b"page three").unwrap();

    disk.write_page(&first).unwrap();
    disk.write_page(&third).unwrap();

    assert_eq!(disk.page_capacity().unwrap(), 3);
    assert_eq!(disk.read_page(PageId(1)).unwrap().get_record(0).unwrap(), b"page one");
    assert_eq!(disk.read_page(PageId(3)).unwrap().get_record(0).unwrap(), b"page three");
}

#[test]
fn disk_rejects_page_zero() {
    let dir = tempdir().unwrap();
    let mut disk = DiskManager::open(&dir.path().join("heap.db")).unwrap();
    assert!(disk.read_page(PageId(0)).is_err());
}

proptest! {
    // The free-space fields always describe the real hole boundary.
    #[test]
    fn free_space_bookkeeping_holds(payload_lens in proptest::collection::vec(1usize..200, 1..20)) {
        let mut page = data_page();
        let mut slots = Vec::new();

        for (i, len) in payload_lens.iter().enumerate() {
            let bytes = vec![i as u8; *len];
            if !page.can_fit(bytes.len()) {
                break;
            }
            slots.push((page.insert_record(&bytes).unwrap(), bytes));
            if i % 3 == 2 {
                let (slot, _) = slots.remove(0);
                page.delete_record(slot).unwrap();
            }
        }

        for (slot, bytes) in &slots {
            prop_assert_eq!(page.get_record(*slot).unwrap(), bytes.clone());
        }
        let restored = Page::deserialize(&page.serialize()).unwrap();
        prop_assert_eq!(restored.free_space(), page.free_space());
    }
}
