//! Allocator configuration and validation.
//!
//! All parameters can also be loaded from `PAGED_KV_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without
//! crashing; structural violations (lengths not page-aligned) fail
//! construction immediately.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `PAGED_KV_NUM_PAGES` | 1024 | Total pages, including the sentinel |
//! | `PAGED_KV_PAGE_SIZE` | 16 | Tokens stored per page |
//! | `PAGED_KV_SLOTS` | 8 | Concurrently served sequence slots |
//! | `PAGED_KV_MAX_TARGET_LENGTH` | 4096 | Longest sequence a slot may hold |
//! | `PAGED_KV_MAX_PREFILL_LENGTH` | 1024 | Longest bulk prefill reservation |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors. Fatal: surfaced at construction, never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroParameter { field: &'static str },

    #[error("num_pages must be at least 2 (page 0 is the reserved sentinel), got {num_pages}")]
    NoUsablePages { num_pages: usize },

    #[error("{field} ({value}) must be a multiple of page_size ({page_size})")]
    NotPageAligned {
        field: &'static str,
        value: usize,
        page_size: usize,
    },

    #[error("max_prefill_predict_length ({prefill}) exceeds max_target_length ({target})")]
    PrefillExceedsTarget { prefill: usize, target: usize },
}

/// Construction parameters for the page pool.
///
/// Both length limits must be exact multiples of `page_size`; the derived
/// per-slot and per-prefill page budgets are fixed for the allocator's
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedKvConfig {
    /// Total pages in the pool, including the reserved sentinel page 0.
    pub num_pages: usize,
    /// Tokens stored per page.
    pub page_size: usize,
    /// Number of concurrently served sequence slots.
    pub slots: usize,
    /// Longest sequence a slot may ever hold (prefill plus decode).
    pub max_target_length: usize,
    /// Longest initial sequence a prefill reservation may request.
    pub max_prefill_predict_length: usize,
}

impl Default for PagedKvConfig {
    fn default() -> Self {
        Self {
            num_pages: 1024,
            page_size: 16,
            slots: 8,
            max_target_length: 4096,
            max_prefill_predict_length: 1024,
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

impl PagedKvConfig {
    /// Create a validated configuration.
    pub fn new(
        num_pages: usize,
        page_size: usize,
        slots: usize,
        max_target_length: usize,
        max_prefill_predict_length: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            num_pages,
            page_size,
            slots,
            max_target_length,
            max_prefill_predict_length,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `PAGED_KV_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Self::new(
            parse_usize("PAGED_KV_NUM_PAGES", defaults.num_pages),
            parse_usize("PAGED_KV_PAGE_SIZE", defaults.page_size),
            parse_usize("PAGED_KV_SLOTS", defaults.slots),
            parse_usize("PAGED_KV_MAX_TARGET_LENGTH", defaults.max_target_length),
            parse_usize(
                "PAGED_KV_MAX_PREFILL_LENGTH",
                defaults.max_prefill_predict_length,
            ),
        )
    }

    /// Check the structural constraints on the pool geometry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::ZeroParameter { field: "page_size" });
        }
        if self.slots == 0 {
            return Err(ConfigError::ZeroParameter { field: "slots" });
        }
        if self.max_target_length == 0 {
            return Err(ConfigError::ZeroParameter {
                field: "max_target_length",
            });
        }
        if self.max_prefill_predict_length == 0 {
            return Err(ConfigError::ZeroParameter {
                field: "max_prefill_predict_length",
            });
        }
        if self.num_pages < 2 {
            return Err(ConfigError::NoUsablePages {
                num_pages: self.num_pages,
            });
        }
        if self.max_target_length % self.page_size != 0 {
            return Err(ConfigError::NotPageAligned {
                field: "max_target_length",
                value: self.max_target_length,
                page_size: self.page_size,
            });
        }
        if self.max_prefill_predict_length % self.page_size != 0 {
            return Err(ConfigError::NotPageAligned {
                field: "max_prefill_predict_length",
                value: self.max_prefill_predict_length,
                page_size: self.page_size,
            });
        }
        if self.max_prefill_predict_length > self.max_target_length {
            return Err(ConfigError::PrefillExceedsTarget {
                prefill: self.max_prefill_predict_length,
                target: self.max_target_length,
            });
        }
        Ok(())
    }

    /// Maximum pages a single slot can ever hold.
    pub fn max_pages_per_slot(&self) -> usize {
        self.max_target_length / self.page_size
    }

    /// Maximum pages a single prefill reservation can request.
    pub fn max_pages_per_prefill(&self) -> usize {
        self.max_prefill_predict_length / self.page_size
    }

    /// Pages that can actually be allocated; the sentinel is never handed out.
    pub fn usable_pages(&self) -> usize {
        self.num_pages - 1
    }
}
