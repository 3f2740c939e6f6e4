//! Sessions over a pooled connection or an open transaction.

use std::fmt;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::Postgres;
use tracing::debug;

use crudkit_core::error::{AppError, ErrorKind};
use crudkit_core::result::AppResult;
use crudkit_core::types::{Condition, FilterValue, Record, SearchQuery};
use crudkit_entity::EntityMetadata;

use super::query;
use crate::backend::{Session, Transaction};

/// Auto-committing session on one pooled connection.
#[derive(Debug)]
pub struct PgSession {
    conn: PoolConnection<Postgres>,
}

impl PgSession {
    pub(crate) fn new(conn: PoolConnection<Postgres>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Session for PgSession {
    async fn count(&mut self, meta: &EntityMetadata, condition: &Condition) -> AppResult<u64> {
        query::count(&mut self.conn, meta, condition).await
    }

    async fn fetch(&mut self, meta: &EntityMetadata, query: &SearchQuery) -> AppResult<Vec<Record>> {
        query::fetch(&mut self.conn, meta, query).await
    }

    async fn save(&mut self, meta: &EntityMetadata, entity: Record) -> AppResult<Record> {
        query::save(&mut self.conn, meta, entity).await
    }

    async fn remove(&mut self, meta: &EntityMetadata, id: &FilterValue) -> AppResult<u64> {
        query::remove(&mut self.conn, meta, id).await
    }
}

/// Open PostgreSQL transaction. Dropped without commit, it rolls back.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgTransaction").finish_non_exhaustive()
    }
}

impl PgTransaction {
    pub(crate) fn new(tx: sqlx::Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Session for PgTransaction {
    async fn count(&mut self, meta: &EntityMetadata, condition: &Condition) -> AppResult<u64> {
        query::count(&mut self.tx, meta, condition).await
    }

    async fn fetch(&mut self, meta: &EntityMetadata, query: &SearchQuery) -> AppResult<Vec<Record>> {
        query::fetch(&mut self.tx, meta, query).await
    }

    async fn save(&mut self, meta: &EntityMetadata, entity: Record) -> AppResult<Record> {
        query::save(&mut self.tx, meta, entity).await
    }

    async fn remove(&mut self, meta: &EntityMetadata, id: &FilterValue) -> AppResult<u64> {
        query::remove(&mut self.tx, meta, id).await
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    fn as_session(&mut self) -> &mut dyn Session {
        self
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit transaction", e)
        })?;
        debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        self.tx.rollback().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to roll back transaction", e)
        })?;
        debug!("Transaction rolled back");
        Ok(())
    }
}
