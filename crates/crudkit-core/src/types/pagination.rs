//! Pagination types for search operations.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::result::AppResult;

/// Default page size.
pub const DEFAULT_PAGE_SIZE: u64 = 25;
/// Maximum page size accepted by [`PageRequest::new`].
pub const MAX_PAGE_SIZE: u64 = 100;
/// Largest row offset a page may start at (PostgreSQL `OFFSET` is a
/// `bigint`).
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// A validated page request.
///
/// Zero or oversized values are rejected instead of clamped, so a typo at
/// the caller boundary never turns into a silently different page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number (1-based).
    pub page: u64,
    /// Number of items per page.
    pub page_size: u64,
}

impl PageRequest {
    /// Create a page request bounded by [`MAX_PAGE_SIZE`].
    pub fn new(page: u64, page_size: u64) -> AppResult<Self> {
        Self::bounded(page, page_size, MAX_PAGE_SIZE)
    }

    /// Create a page request bounded by a configured maximum page size.
    pub fn bounded(page: u64, page_size: u64, max_page_size: u64) -> AppResult<Self> {
        if page == 0 {
            return Err(AppError::validation("page must be a positive integer"));
        }
        if page_size == 0 {
            return Err(AppError::validation("page_size must be a positive integer"));
        }
        if page_size > max_page_size {
            return Err(AppError::validation(format!(
                "page_size {page_size} exceeds the maximum of {max_page_size}"
            )));
        }
        let within_range = (page - 1)
            .checked_mul(page_size)
            .is_some_and(|offset| offset <= MAX_OFFSET);
        if !within_range {
            return Err(AppError::validation(format!(
                "page {page} is out of range for page_size {page_size}"
            )));
        }
        Ok(Self { page, page_size })
    }

    /// Calculate the SQL `OFFSET` value. Saturates for hand-built requests
    /// that skipped [`PageRequest::bounded`].
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    /// Return the SQL `LIMIT` value.
    pub fn limit(&self) -> u64 {
        self.page_size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Search result envelope: one page of items plus the total match count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult<T> {
    /// The items on this page.
    pub items: Vec<T>,
    /// Total number of matches across all pages.
    pub total: u64,
    /// Current page number (1-based).
    pub page: u64,
    /// Number of items per page.
    pub page_size: u64,
    /// Total number of pages.
    pub total_pages: u64,
    /// Whether there is a next page.
    pub has_next: bool,
    /// Whether there is a previous page.
    pub has_previous: bool,
}

impl<T> SearchResult<T> {
    /// Create a new result for the given page.
    pub fn new(items: Vec<T>, page: &PageRequest, total: u64) -> Self {
        let total_pages = if total == 0 {
            1
        } else {
            total.div_ceil(page.page_size)
        };
        Self {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
            total_pages,
            has_next: page.page < total_pages,
            has_previous: page.page > 1,
        }
    }

    /// Convert every item, keeping the page metadata.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<SearchResult<U>, E> {
        Ok(SearchResult {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_previous: self.has_previous,
        })
    }
}
