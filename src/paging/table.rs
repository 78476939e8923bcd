//! Page table state for the paged KV-cache allocator.
//!
//! The table is a replace-on-write value: every operation takes the previous
//! snapshot by reference and returns a fresh one, so a caller's old snapshot
//! is never aliased by the new version. Mapping rows have a fixed width of
//! `max_pages_per_slot` entries; unused trailing entries hold the sentinel.

use serde::{Deserialize, Serialize};

use crate::config::PagedKvConfig;

/// Physical page index.
///
/// Index 0 is the reserved "no page assigned" sentinel and is never
/// allocated to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub usize);

impl PageId {
    /// Sentinel meaning "no page assigned".
    pub const NONE: PageId = PageId(0);

    /// Raw index into the page pool.
    pub fn index(self) -> usize {
        self.0
    }

    /// Whether this is the sentinel.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page({})", self.0)
    }
}

/// Allocation status of a physical page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageStatus {
    Free,
    Used,
}

/// One snapshot of all allocator state.
///
/// Holds the free/used status of every page, the per-slot page mappings in
/// allocation order, and the per-slot length/position bookkeeping the
/// attention reader consumes.
///
/// Slot accessors panic on an out-of-range slot index; the slot space is
/// fixed at construction and an out-of-range index is a caller bug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTable {
    /// Status per page; index 0 is the sentinel and stays `Free` forever.
    pub(crate) page_status: Vec<PageStatus>,
    /// Per-slot page indices in allocation order, sentinel-padded.
    pub(crate) seq_page_idx_mappings: Vec<Vec<PageId>>,
    /// Per-slot token count; 0 means the slot is empty.
    pub(crate) seq_lengths: Vec<usize>,
    /// Per-slot number of pages currently assigned.
    pub(crate) seq_num_pages: Vec<usize>,
    /// Per-slot most recently allocated page.
    pub(crate) seq_page_indices: Vec<PageId>,
    /// Per-slot offset of the last valid token within the current page.
    pub(crate) seq_page_slice_indices: Vec<usize>,
}

impl PageTable {
    /// Create the zeroed initial table: all slots empty, all pages free.
    pub(crate) fn zeroed(config: &PagedKvConfig) -> Self {
        Self {
            page_status: vec![PageStatus::Free; config.num_pages],
            seq_page_idx_mappings: vec![
                vec![PageId::NONE; config.max_pages_per_slot()];
                config.slots
            ],
            seq_lengths: vec![0; config.slots],
            seq_num_pages: vec![0; config.slots],
            seq_page_indices: vec![PageId::NONE; config.slots],
            seq_page_slice_indices: vec![0; config.slots],
        }
    }

    /// Total pages in the pool, including the sentinel.
    pub fn num_pages(&self) -> usize {
        self.page_status.len()
    }

    /// Number of sequence slots.
    pub fn num_slots(&self) -> usize {
        self.seq_lengths.len()
    }

    /// Status of a page, or `None` if the index is out of range.
    pub fn status(&self, page: PageId) -> Option<PageStatus> {
        self.page_status.get(page.index()).copied()
    }

    /// Pages assigned to `slot`, in allocation order.
    ///
    /// This is the live prefix of the mapping row; the attention reader
    /// gathers cached key/value blocks in exactly this order.
    pub fn pages_for_slot(&self, slot: usize) -> &[PageId] {
        &self.seq_page_idx_mappings[slot][..self.seq_num_pages[slot]]
    }

    /// Current token count of `slot`; 0 means empty.
    pub fn seq_length(&self, slot: usize) -> usize {
        self.seq_lengths[slot]
    }

    /// Number of pages currently assigned to `slot`.
    pub fn num_pages_for_slot(&self, slot: usize) -> usize {
        self.seq_num_pages[slot]
    }

    /// Page most recently allocated to `slot`, or the sentinel if empty.
    pub fn current_page(&self, slot: usize) -> PageId {
        self.seq_page_indices[slot]
    }

    /// Offset of the last valid token within `slot`'s current page.
    pub fn page_slice_index(&self, slot: usize) -> usize {
        self.seq_page_slice_indices[slot]
    }

    /// Whether `slot` holds an in-flight sequence.
    pub fn is_slot_active(&self, slot: usize) -> bool {
        self.seq_lengths[slot] > 0
    }

    /// Number of pages currently marked `Used`.
    pub fn used_pages(&self) -> usize {
        self.page_status
            .iter()
            .filter(|&&s| s == PageStatus::Used)
            .count()
    }

    /// Number of allocatable pages currently free (the sentinel excluded).
    pub fn free_pages(&self) -> usize {
        self.page_status[1..]
            .iter()
            .filter(|&&s| s == PageStatus::Free)
            .count()
    }

    /// Number of slots holding an in-flight sequence.
    pub fn active_slots(&self) -> usize {
        self.seq_lengths.iter().filter(|&&len| len > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PagedKvConfig {
        PagedKvConfig::new(5, 4, 2, 16, 8).unwrap()
    }

    #[test]
    fn test_zeroed_table_shape() {
        let table = PageTable::zeroed(&config());
        assert_eq!(table.num_pages(), 5);
        assert_eq!(table.num_slots(), 2);
        assert_eq!(table.seq_page_idx_mappings[0].len(), 4);
        assert_eq!(table.used_pages(), 0);
        assert_eq!(table.free_pages(), 4);
        assert_eq!(table.active_slots(), 0);
    }

    #[test]
    fn test_empty_slot_accessors() {
        let table = PageTable::zeroed(&config());
        assert!(!table.is_slot_active(0));
        assert_eq!(table.seq_length(0), 0);
        assert_eq!(table.num_pages_for_slot(0), 0);
        assert_eq!(table.current_page(0), PageId::NONE);
        assert_eq!(table.page_slice_index(0), 0);
        assert!(table.pages_for_slot(0).is_empty());
    }

    #[test]
    fn test_status_out_of_range() {
        let table = PageTable::zeroed(&config());
        assert_eq!(table.status(PageId(0)), Some(PageStatus::Free));
        assert_eq!(table.status(PageId(5)), None);
    }

    #[test]
    fn test_sentinel_is_none() {
        assert!(PageId::NONE.is_none());
        assert!(!PageId(3).is_none());
        assert_eq!(PageId(3).to_string(), "page(3)");
    }

    #[test]
    fn test_table_serde_round_trip() {
        let table = PageTable::zeroed(&config());
        let json = serde_json::to_string(&table).unwrap();
        let back: PageTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
