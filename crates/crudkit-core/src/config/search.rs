//! Search and pagination limits.

use serde::{Deserialize, Serialize};

use crate::types::pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Limits applied at the search boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Page size used when a search input does not name one.
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    /// Largest accepted page size. Larger requests are rejected.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> u64 {
    MAX_PAGE_SIZE
}
