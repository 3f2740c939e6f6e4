//! Backend contract consumed by repositories.
//!
//! A [`Database`] hands out sessions. A plain session runs each call as its
//! own round-trip; a [`Transaction`] groups every call made through it until
//! it is committed or rolled back.

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::warn;

use crudkit_core::result::AppResult;
use crudkit_core::types::{Condition, FilterValue, Record, SearchQuery};
use crudkit_entity::EntityMetadata;

/// Query and write operations on one table, keyed by model properties.
///
/// Records passed in and returned are property keyed; the backend translates
/// to columns through the [`EntityMetadata`].
#[async_trait]
pub trait Session: Send {
    /// Count the records matching a condition.
    async fn count(&mut self, meta: &EntityMetadata, condition: &Condition) -> AppResult<u64>;

    /// Fetch the records matching a query, loading the requested relations.
    async fn fetch(&mut self, meta: &EntityMetadata, query: &SearchQuery) -> AppResult<Vec<Record>>;

    /// Insert (primary key null or absent) or update an entity, returning the
    /// stored record including generated values.
    async fn save(&mut self, meta: &EntityMetadata, entity: Record) -> AppResult<Record>;

    /// Delete by primary key, returning the number of removed records.
    async fn remove(&mut self, meta: &EntityMetadata, id: &FilterValue) -> AppResult<u64>;
}

/// A session whose work becomes visible only on commit.
#[async_trait]
pub trait Transaction: Session {
    /// Borrow as a plain session.
    fn as_session(&mut self) -> &mut dyn Session;

    /// Make the work durable.
    async fn commit(self: Box<Self>) -> AppResult<()>;

    /// Discard the work.
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// A connection source.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// Borrow a non-transactional session.
    async fn session(&self) -> AppResult<Box<dyn Session>>;

    /// Open a transaction.
    async fn begin(&self) -> AppResult<Box<dyn Transaction>>;
}

/// Run `work` inside a transaction: commit when it returns `Ok`, roll back
/// and return its error unchanged otherwise.
///
/// ```ignore
/// let repo = repo.clone();
/// transaction(db.as_ref(), move |tx| {
///     Box::pin(async move { repo.update(1, patch, Some(tx)).await })
/// })
/// .await?;
/// ```
pub async fn transaction<T, F>(db: &dyn Database, work: F) -> AppResult<T>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut dyn Session) -> BoxFuture<'t, AppResult<T>> + Send,
{
    let mut tx = db.begin().await?;
    let outcome = work(tx.as_session()).await;
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            warn!(error = %err, "Rolling back transaction");
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
