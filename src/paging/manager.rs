//! Stateful facade over the pure allocator operations.
//!
//! Owns the current page-table snapshot so a serving scheduler can drive
//! the slot lifecycle without threading snapshots through its own state.
//! Every method applies one pure operation and installs the result; on
//! error the installed snapshot is unchanged.
//!
//! Uses parking_lot::RwLock for fast synchronous locking. No async
//! overhead or runtime requirement.

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::allocator::{PageAllocator, PagingError};
use super::table::PageTable;
use crate::config::{ConfigError, PagedKvConfig};

/// Pool-level occupancy counters for scheduling and eviction decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Pages that can be allocated (the sentinel excluded).
    pub usable_pages: usize,
    /// Pages currently assigned to slots.
    pub used_pages: usize,
    /// Pages currently free.
    pub free_pages: usize,
    /// Slots holding an in-flight sequence.
    pub active_slots: usize,
}

/// Owns the live page table and applies reservations to it.
pub struct PageManager {
    allocator: PageAllocator,
    state: RwLock<PageTable>,
}

impl PageManager {
    /// Create a manager with a zeroed table.
    pub fn new(config: &PagedKvConfig) -> Result<Self, ConfigError> {
        let allocator = PageAllocator::new(config)?;
        let state = RwLock::new(allocator.new_table());
        Ok(Self { allocator, state })
    }

    /// The underlying pure allocator.
    pub fn allocator(&self) -> &PageAllocator {
        &self.allocator
    }

    /// Clone of the current snapshot.
    pub fn snapshot(&self) -> PageTable {
        self.state.read().clone()
    }

    /// Release `slot` and return the resulting snapshot.
    pub fn release_slot(&self, slot: usize) -> PageTable {
        let mut state = self.state.write();
        let freed = state.num_pages_for_slot(slot);
        let next = self.allocator.release(slot, &state);
        debug!(slot, freed, "released slot pages");
        *state = next.clone();
        next
    }

    /// Reserve prefill pages for `slot` and return the resulting snapshot.
    pub fn reserve_prefill(
        &self,
        slot: usize,
        true_length: usize,
    ) -> Result<PageTable, PagingError> {
        let mut state = self.state.write();
        match self.allocator.reserve_prefill(slot, true_length, &state) {
            Ok(next) => {
                debug!(
                    slot,
                    true_length,
                    pages = next.num_pages_for_slot(slot),
                    "reserved prefill pages"
                );
                *state = next.clone();
                Ok(next)
            }
            Err(err) => {
                warn!(slot, true_length, %err, "prefill reservation failed");
                Err(err)
            }
        }
    }

    /// Advance the whole batch by one token and return the new snapshot.
    pub fn reserve_decode_step(&self) -> Result<PageTable, PagingError> {
        let mut state = self.state.write();
        match self.allocator.reserve_decode_step(&state) {
            Ok(next) => {
                *state = next.clone();
                Ok(next)
            }
            Err(err) => {
                warn!(%err, "decode-step reservation failed");
                Err(err)
            }
        }
    }

    /// Current pool occupancy.
    pub fn stats(&self) -> PoolStats {
        let state = self.state.read();
        PoolStats {
            usable_pages: self.allocator.usable_pages(),
            used_pages: state.used_pages(),
            free_pages: state.free_pages(),
            active_slots: state.active_slots(),
        }
    }
}
