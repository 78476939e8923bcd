//! Tests for PageManager - the stateful facade a serving scheduler drives.

use paged_kv::{PageId, PageManager, PagedKvConfig, PagingError};

fn serving_manager() -> PageManager {
    // 8 usable pages of 4 tokens across 3 slots.
    let config = PagedKvConfig::new(9, 4, 3, 16, 8).unwrap();
    PageManager::new(&config).unwrap()
}

#[test]
fn test_admit_decode_complete_lifecycle() {
    let mgr = serving_manager();

    // Admit two requests.
    let table = mgr.reserve_prefill(0, 6).unwrap();
    assert_eq!(table.pages_for_slot(0), &[PageId(1), PageId(2)]);
    let table = mgr.reserve_prefill(1, 3).unwrap();
    assert_eq!(table.pages_for_slot(1), &[PageId(3)]);

    // Two ticks take slot 1 from 3 to 5 tokens, across its first boundary.
    mgr.reserve_decode_step().unwrap();
    let table = mgr.reserve_decode_step().unwrap();
    assert_eq!(table.seq_length(1), 5);
    assert_eq!(table.pages_for_slot(1), &[PageId(3), PageId(4)]);

    // Slot 0 grew within its second page, no new allocation.
    assert_eq!(table.seq_length(0), 8);
    assert_eq!(table.num_pages_for_slot(0), 2);

    // Completion returns every page to the pool.
    mgr.release_slot(0);
    let table = mgr.release_slot(1);
    assert_eq!(table.used_pages(), 0);
    assert_eq!(mgr.stats().active_slots, 0);
}

#[test]
fn test_stats_track_occupancy() {
    let mgr = serving_manager();
    assert_eq!(mgr.stats().used_pages, 0);

    mgr.reserve_prefill(0, 8).unwrap();
    mgr.reserve_prefill(2, 1).unwrap();

    let stats = mgr.stats();
    assert_eq!(stats.usable_pages, 8);
    assert_eq!(stats.used_pages, 3);
    assert_eq!(stats.free_pages, 5);
    assert_eq!(stats.active_slots, 2);

    mgr.release_slot(0);
    let stats = mgr.stats();
    assert_eq!(stats.used_pages, 1);
    assert_eq!(stats.active_slots, 1);
}

#[test]
fn test_failed_reservation_leaves_manager_state_intact() {
    let mgr = serving_manager();
    mgr.reserve_prefill(0, 8).unwrap();
    let before = mgr.snapshot();

    // 9 tokens need 3 pages, over the prefill budget of 2.
    let err = mgr.reserve_prefill(1, 9).unwrap_err();
    assert!(matches!(err, PagingError::InvalidRequest(_)));
    assert_eq!(mgr.snapshot(), before);
}

#[test]
fn test_exhaustion_reports_occupancy_for_eviction() {
    // Single usable page.
    let config = PagedKvConfig::new(2, 4, 2, 8, 4).unwrap();
    let mgr = PageManager::new(&config).unwrap();

    mgr.reserve_prefill(0, 2).unwrap();
    let err = mgr.reserve_prefill(1, 1).unwrap_err();
    assert_eq!(err, PagingError::PoolExhausted { used: 1, usable: 1 });

    // The caller evicts and retries.
    mgr.release_slot(0);
    assert!(mgr.reserve_prefill(1, 1).is_ok());
}
