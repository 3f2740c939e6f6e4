//! Query value objects passed from callers to repositories and backends.

use serde::{Deserialize, Serialize};

use super::condition::Condition;
use super::filter::FilterField;
use super::pagination::{DEFAULT_PAGE_SIZE, PageRequest};
use super::sorting::SortField;
use crate::result::AppResult;

/// What to fetch: a filter condition, the relations to load alongside each
/// row, an ordering, and an optional page window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Filter condition. Defaults to "match everything".
    #[serde(default)]
    pub condition: Condition,
    /// Relation properties to load as nested objects.
    #[serde(default)]
    pub relations: Vec<String>,
    /// Ordering, applied in sequence.
    #[serde(default)]
    pub sort: Vec<SortField>,
    /// Page window. `None` fetches every match.
    #[serde(default)]
    pub pagination: Option<PageRequest>,
}

impl SearchQuery {
    /// Create a query for the given condition.
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            ..Self::default()
        }
    }

    /// Load the given relations alongside each row.
    pub fn with_relations<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations = relations.into_iter().map(Into::into).collect();
        self
    }

    /// Append a sort key.
    pub fn sort_by(mut self, sort: SortField) -> Self {
        self.sort.push(sort);
        self
    }

    /// Restrict to one page.
    pub fn paginate(mut self, page: PageRequest) -> Self {
        self.pagination = Some(page);
        self
    }
}

impl From<Condition> for SearchQuery {
    fn from(condition: Condition) -> Self {
        Self::new(condition)
    }
}

impl From<FilterField> for SearchQuery {
    fn from(term: FilterField) -> Self {
        Self::new(Condition::Compare(term))
    }
}

/// Caller-supplied search input: page window, sort keys and extra filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchInput {
    /// Page number (1-based).
    #[serde(default = "default_page")]
    pub page: u64,
    /// Number of items per page. Defaults to [`DEFAULT_PAGE_SIZE`] whatever
    /// the repository's `SearchConfig` says; build inputs with
    /// `GenericRepository::page` to get the configured default instead.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Sort keys. When empty, the query's own ordering applies.
    #[serde(default)]
    pub sort: Vec<SortField>,
    /// Additional filters, ANDed onto the query condition.
    #[serde(default)]
    pub filters: Vec<FilterField>,
}

impl SearchInput {
    /// Create an input for one page with no extra sort or filters.
    pub fn page(page: u64, page_size: u64) -> Self {
        Self {
            page,
            page_size,
            sort: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// Append a sort key.
    pub fn sort_by(mut self, sort: SortField) -> Self {
        self.sort.push(sort);
        self
    }

    /// Append a filter.
    pub fn filter(mut self, filter: FilterField) -> Self {
        self.filters.push(filter);
        self
    }

    /// Validate the page window against a maximum page size.
    pub fn validate(&self, max_page_size: u64) -> AppResult<PageRequest> {
        PageRequest::bounded(self.page, self.page_size, max_page_size)
    }
}

/// First page at [`DEFAULT_PAGE_SIZE`].
impl Default for SearchInput {
    fn default() -> Self {
        Self::page(default_page(), default_page_size())
    }
}

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}
