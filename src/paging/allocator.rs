//! The three allocator operations: release, prefill reservation, and
//! decode-step reservation.
//!
//! Each operation is a pure transformation from one [`PageTable`] snapshot
//! to the next. Free pages are always taken in ascending index order and
//! slots are processed in ascending slot order, so replicas running the
//! same inputs derive identical tables. Failed operations commit nothing;
//! the input snapshot stays valid for retry.

use thiserror::Error;

use super::table::{PageId, PageStatus, PageTable};
use crate::config::{ConfigError, PagedKvConfig};

/// Errors for reservation operations. Recoverable: the table passed in
/// remains valid for retry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PagingError {
    /// The request is malformed or exceeds the fixed pool geometry.
    /// Rejecting it leaves the table untouched.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No free page is available to satisfy a required allocation. The
    /// caller should back off, evict a slot, or queue the request.
    #[error("page pool exhausted: {used} of {usable} usable pages in use")]
    PoolExhausted { used: usize, usable: usize },
}

/// Allocates fixed-size KV-cache pages across sequence slots.
///
/// Holds the pool geometry fixed at construction; all state lives in the
/// [`PageTable`] snapshots the operations consume and produce.
#[derive(Debug, Clone)]
pub struct PageAllocator {
    config: PagedKvConfig,
    max_pages_per_slot: usize,
    max_pages_per_prefill: usize,
}

impl PageAllocator {
    /// Create an allocator from a validated configuration.
    pub fn new(config: &PagedKvConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            max_pages_per_slot: config.max_pages_per_slot(),
            max_pages_per_prefill: config.max_pages_per_prefill(),
            config: config.clone(),
        })
    }

    /// The configuration this allocator was built from.
    pub fn config(&self) -> &PagedKvConfig {
        &self.config
    }

    /// Pages that can actually be allocated.
    pub fn usable_pages(&self) -> usize {
        self.config.usable_pages()
    }

    /// Create the zeroed initial table: all slots empty, all pages free.
    pub fn new_table(&self) -> PageTable {
        PageTable::zeroed(&self.config)
    }

    /// Free every page owned by `slot` and reset its bookkeeping.
    ///
    /// Idempotent: releasing an already-empty slot returns an identical
    /// snapshot.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range; the slot space is fixed at
    /// construction and an out-of-range index is a caller bug.
    pub fn release(&self, slot: usize, table: &PageTable) -> PageTable {
        assert!(slot < self.config.slots, "slot {slot} out of range");

        let mut next = table.clone();
        for i in 0..next.seq_num_pages[slot] {
            let page = next.seq_page_idx_mappings[slot][i];
            next.page_status[page.index()] = PageStatus::Free;
            // Clear only the entry being released; trailing entries are
            // already the sentinel.
            next.seq_page_idx_mappings[slot][i] = PageId::NONE;
        }
        next.seq_lengths[slot] = 0;
        next.seq_num_pages[slot] = 0;
        next.seq_page_indices[slot] = PageId::NONE;
        next.seq_page_slice_indices[slot] = 0;
        next
    }

    /// Bulk-allocate pages for a newly arriving sequence of known length.
    ///
    /// The slot is released first, so reserving over a previously occupied
    /// slot is safe. Exactly `ceil(true_length / page_size)` pages are
    /// taken, lowest free index first.
    pub fn reserve_prefill(
        &self,
        slot: usize,
        true_length: usize,
        table: &PageTable,
    ) -> Result<PageTable, PagingError> {
        if slot >= self.config.slots {
            return Err(PagingError::InvalidRequest(format!(
                "slot {} out of range ({} slots)",
                slot, self.config.slots
            )));
        }
        if true_length == 0 {
            return Err(PagingError::InvalidRequest(
                "prefill length must be greater than zero".to_string(),
            ));
        }
        let needed = true_length.div_ceil(self.config.page_size);
        if needed > self.max_pages_per_prefill {
            return Err(PagingError::InvalidRequest(format!(
                "prefill of {} tokens needs {} pages, limit is {}",
                true_length, needed, self.max_pages_per_prefill
            )));
        }

        // Pages the slot already holds are reusable for the new sequence.
        let mut next = self.release(slot, table);

        if next.free_pages() < needed {
            return Err(PagingError::PoolExhausted {
                used: next.used_pages(),
                usable: self.usable_pages(),
            });
        }

        let mut last = PageId::NONE;
        for i in 0..needed {
            let page = lowest_free(&next.page_status).ok_or(PagingError::PoolExhausted {
                used: next.used_pages(),
                usable: self.usable_pages(),
            })?;
            next.page_status[page.index()] = PageStatus::Used;
            next.seq_page_idx_mappings[slot][i] = page;
            last = page;
        }

        next.seq_lengths[slot] = true_length;
        next.seq_num_pages[slot] = needed;
        next.seq_page_indices[slot] = last;
        next.seq_page_slice_indices[slot] = (true_length - 1) % self.config.page_size;
        Ok(next)
    }

    /// Advance every active slot by one generated token.
    ///
    /// Slots with a length of 0 stay empty. A slot that crosses a page
    /// boundary receives exactly one new page; boundary-crossing slots are
    /// served in ascending slot order. The step is all-or-nothing: if any
    /// slot would exceed its page budget or the pool cannot cover every
    /// required page, nothing is committed.
    pub fn reserve_decode_step(&self, table: &PageTable) -> Result<PageTable, PagingError> {
        // Plan over the immutable input so a failed step commits nothing.
        let mut growers = Vec::new();
        for slot in 0..self.config.slots {
            let len = table.seq_lengths[slot];
            if len == 0 {
                continue;
            }
            let new_num_pages = (len + 1).div_ceil(self.config.page_size);
            if new_num_pages > self.max_pages_per_slot {
                return Err(PagingError::InvalidRequest(format!(
                    "slot {} would grow past max_target_length ({} tokens)",
                    slot, self.config.max_target_length
                )));
            }
            if new_num_pages > table.seq_num_pages[slot] {
                growers.push(slot);
            }
        }
        if growers.len() > table.free_pages() {
            return Err(PagingError::PoolExhausted {
                used: table.used_pages(),
                usable: self.usable_pages(),
            });
        }

        let mut next = table.clone();
        for slot in 0..self.config.slots {
            if next.seq_lengths[slot] == 0 {
                continue;
            }
            let new_len = next.seq_lengths[slot] + 1;
            next.seq_lengths[slot] = new_len;
            next.seq_page_slice_indices[slot] = (new_len - 1) % self.config.page_size;
        }
        // A single token crosses at most one boundary, so each grower
        // needs exactly one page.
        for &slot in &growers {
            let page = lowest_free(&next.page_status).ok_or(PagingError::PoolExhausted {
                used: next.used_pages(),
                usable: self.usable_pages(),
            })?;
            next.page_status[page.index()] = PageStatus::Used;
            let new_num_pages = next.seq_num_pages[slot] + 1;
            next.seq_page_idx_mappings[slot][new_num_pages - 1] = page;
            next.seq_page_indices[slot] = page;
            next.seq_num_pages[slot] = new_num_pages;
        }
        Ok(next)
    }
}

/// Lowest-index free page, skipping the sentinel at index 0.
fn lowest_free(status: &[PageStatus]) -> Option<PageId> {
    (1..status.len())
        .find(|&i| status[i] == PageStatus::Free)
        .map(PageId)
}
