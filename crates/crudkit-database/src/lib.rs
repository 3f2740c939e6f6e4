//! # crudkit-database
//!
//! Persistence side of crudkit: the [`Database`]/[`Session`] backend
//! contract with its transaction wrapper, the SQL predicate builder, the
//! search helper, the [`GenericRepository`], and two backends
//! ([`PgDatabase`] on sqlx and the in-process [`MemoryDatabase`]).

pub mod backend;
pub mod memory;
pub mod postgres;
pub mod predicate;
pub mod repository;
pub mod search;

pub use backend::{Database, Session, Transaction, transaction};
pub use memory::MemoryDatabase;
pub use postgres::PgDatabase;
pub use predicate::{Predicate, PredicateBuilder, SqlParam};
pub use repository::{GenericRepository, NoHooks, RepositoryHooks};
