//! Paged KV-cache page allocator for transformer inference serving.
//!
//! A fixed pool of equally sized memory pages backs attention key/value
//! storage for a fixed number of concurrently served sequence slots. Pages
//! are reserved in bulk when a sequence arrives (prefill), one at a time as
//! it grows past page boundaries (decode), and reclaimed when it completes.
//!
//! # Design
//!
//! - **Replace-on-write**: every operation maps one [`PageTable`] snapshot
//!   to a new one; the caller's old snapshot is never aliased.
//! - **Deterministic**: free pages are taken in ascending index order and
//!   slots are served in ascending slot order, so replicas fed identical
//!   inputs converge on identical tables without cross-worker coordination.
//! - **Sentinel page**: index 0 means "no page assigned" and is never
//!   allocated.
//! - **All-or-nothing**: a failed reservation commits nothing; the prior
//!   table stays valid for retry.

pub mod config;
pub mod paging;

pub use config::{ConfigError, PagedKvConfig};
pub use paging::{PageAllocator, PageId, PageManager, PageStatus, PageTable, PagingError, PoolStats};
