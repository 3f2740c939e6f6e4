//! # crudkit
//!
//! Metadata-driven CRUD scaffolding. Models declare their fields once with
//! the builders in [`crudkit_entity::field`]; a [`GenericRepository`] then
//! maps them to rows, searches with validated paging, and runs writes
//! through `before_*`/`after_*` hooks, optionally inside a transaction.
//!
//! ```ignore
//! use crudkit::prelude::*;
//!
//! let db: Arc<dyn Database> = Arc::new(PgDatabase::connect(&config.database).await?);
//! let articles = GenericRepository::<Article>::new(db, "articles")?;
//! let saved = articles.create(draft, None).await?;
//! let renamed = articles.update(saved.id, Patch::new().set("title", "New"), None).await?;
//! ```

pub mod telemetry;

pub use crudkit_core;
pub use crudkit_database;
pub use crudkit_entity;

/// Items most applications need.
pub mod prelude {
    pub use std::sync::Arc;

    pub use crudkit_core::config::{CrudConfig, SearchConfig};
    pub use crudkit_core::error::{AppError, ErrorKind};
    pub use crudkit_core::result::AppResult;
    pub use crudkit_core::types::{
        Condition, FilterField, FilterOp, FilterValue, PageRequest, SearchInput, SearchQuery,
        SearchResult, SortDirection, SortField,
    };
    pub use crudkit_database::{
        Database, GenericRepository, MemoryDatabase, NoHooks, PgDatabase, RepositoryHooks,
        Session, transaction,
    };
    pub use crudkit_entity::field::{self, JoinTable, RelationDef};
    pub use crudkit_entity::{Model, ModelSchema, Patch};

    pub use crate::telemetry::init_logging;
}
