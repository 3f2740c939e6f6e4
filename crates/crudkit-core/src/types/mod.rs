//! Core type definitions used across the crudkit workspace.

pub mod condition;
pub mod filter;
pub mod pagination;
pub mod query;
pub mod sorting;

pub use condition::Condition;
pub use filter::{FilterField, FilterOp, FilterValue};
pub use pagination::{PageRequest, SearchResult};
pub use query::{SearchInput, SearchQuery};
pub use sorting::{SortDirection, SortField};

/// A persistence-entity-shaped object: property name to JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;
