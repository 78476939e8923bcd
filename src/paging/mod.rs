//! Paged allocation of KV-cache pages across serving slots.
//!
//! Provides the page-table snapshot type, the pure reservation operations,
//! and a stateful manager that owns the live snapshot.

mod allocator;
mod manager;
mod table;

pub use allocator::{PageAllocator, PagingError};
pub use manager::{PageManager, PoolStats};
pub use table::{PageId, PageStatus, PageTable};
