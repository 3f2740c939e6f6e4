//! Generic repository over any described [`Model`].
//!
//! Every write follows the same pipeline: locate (update only), prepare,
//! `before_*` hook, persist, merge generated values, `after_*` hook. When a
//! session is supplied every step runs on it; otherwise each round-trip
//! borrows its own session from the database and no isolation is implied.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crudkit_core::config::SearchConfig;
use crudkit_core::error::AppError;
use crudkit_core::result::AppResult;
use crudkit_core::types::{
    Condition, FilterValue, PageRequest, Record, SearchInput, SearchQuery, SearchResult,
};
use crudkit_entity::{EntityMetadata, Model, Patch, mapper, registry};

use crate::backend::{Database, Session};
use crate::search;

/// Extension points around writes. Every hook is a no-op by default.
///
/// Hooks receive the session the operation runs on, so work they do through
/// it joins the caller's transaction.
#[async_trait]
pub trait RepositoryHooks<M: Model>: Send + Sync + 'static {
    /// Runs before a create (`prev` is `None`) or update is persisted. May
    /// modify the state about to be written.
    async fn before_save(
        &self,
        _session: &mut dyn Session,
        _prev: Option<&M>,
        _next: &mut M,
    ) -> AppResult<()> {
        Ok(())
    }

    /// Runs after a create or update, with generated values merged in.
    async fn after_save(&self, _session: &mut dyn Session, _prev: Option<&M>, _next: &M) -> AppResult<()> {
        Ok(())
    }

    /// Runs before a delete.
    async fn before_delete(&self, _session: &mut dyn Session, _id: &FilterValue) -> AppResult<()> {
        Ok(())
    }

    /// Runs after a delete.
    async fn after_delete(&self, _session: &mut dyn Session, _id: &FilterValue) -> AppResult<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

#[async_trait]
impl<M: Model> RepositoryHooks<M> for NoHooks {}

/// Session used for one repository operation.
enum SessionScope<'s> {
    /// Caller-supplied session, usually a transaction.
    Borrowed(&'s mut dyn Session),
    /// Fresh session per round-trip.
    Auto(Arc<dyn Database>),
}

#[async_trait]
impl<'s> Session for SessionScope<'s> {
    async fn count(&mut self, meta: &EntityMetadata, condition: &Condition) -> AppResult<u64> {
        match self {
            Self::Borrowed(session) => session.count(meta, condition).await,
            Self::Auto(db) => db.session().await?.count(meta, condition).await,
        }
    }

    async fn fetch(&mut self, meta: &EntityMetadata, query: &SearchQuery) -> AppResult<Vec<Record>> {
        match self {
            Self::Borrowed(session) => session.fetch(meta, query).await,
            Self::Auto(db) => db.session().await?.fetch(meta, query).await,
        }
    }

    async fn save(&mut self, meta: &EntityMetadata, entity: Record) -> AppResult<Record> {
        match self {
            Self::Borrowed(session) => session.save(meta, entity).await,
            Self::Auto(db) => db.session().await?.save(meta, entity).await,
        }
    }

    async fn remove(&mut self, meta: &EntityMetadata, id: &FilterValue) -> AppResult<u64> {
        match self {
            Self::Borrowed(session) => session.remove(meta, id).await,
            Self::Auto(db) => db.session().await?.remove(meta, id).await,
        }
    }
}

/// CRUD repository for model `M` stored in one table.
///
/// Holds no per-call state; clones share the database, metadata and hooks.
pub struct GenericRepository<M, H = NoHooks> {
    db: Arc<dyn Database>,
    meta: Arc<EntityMetadata>,
    hooks: Arc<H>,
    search: SearchConfig,
    _model: PhantomData<fn() -> M>,
}

impl<M, H> Clone for GenericRepository<M, H> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            meta: Arc::clone(&self.meta),
            hooks: Arc::clone(&self.hooks),
            search: self.search,
            _model: PhantomData,
        }
    }
}

impl<M, H> fmt::Debug for GenericRepository<M, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericRepository")
            .field("model", &self.meta.model)
            .field("table", &self.meta.table)
            .field("search", &self.search)
            .finish_non_exhaustive()
    }
}

impl<M: Model> GenericRepository<M> {
    /// Create a repository for `M` stored in `table`.
    ///
    /// Fails with `Misconfigured` when `M` has no described fields.
    pub fn new(db: Arc<dyn Database>, table: &'static str) -> AppResult<Self> {
        let meta = EntityMetadata::of::<M>(table)?;
        debug!(model = meta.model, table, "Repository initialized");
        Ok(Self {
            db,
            meta: Arc::new(meta),
            hooks: Arc::new(NoHooks),
            search: SearchConfig::default(),
            _model: PhantomData,
        })
    }
}

impl<M: Model, H: RepositoryHooks<M>> GenericRepository<M, H> {
    /// Replace the hooks.
    pub fn with_hooks<H2: RepositoryHooks<M>>(self, hooks: H2) -> GenericRepository<M, H2> {
        GenericRepository {
            db: self.db,
            meta: self.meta,
            hooks: Arc::new(hooks),
            search: self.search,
            _model: PhantomData,
        }
    }

    /// Replace the search limits.
    pub fn with_search_config(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    /// Structural metadata of the model.
    pub fn metadata(&self) -> &EntityMetadata {
        &self.meta
    }

    /// Installed hooks.
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Search input for one page at the configured default page size.
    pub fn page(&self, page: u64) -> SearchInput {
        SearchInput::page(page, self.search.default_page_size)
    }

    /// Query used by [`update`](Self::update) to load the previous state:
    /// the row with this primary key, plus exactly the declared relations
    /// the patch carries.
    pub fn locate_query(&self, id: &FilterValue, patch: &Patch) -> SearchQuery {
        let relations: Vec<&str> = registry::relation_fields::<M>()
            .into_iter()
            .filter(|name| self.meta.relation(name).is_some() && patch.contains(name))
            .collect();
        SearchQuery::new(Condition::eq(self.meta.primary_key, id.clone())).with_relations(relations)
    }

    /// First model matching a condition or query.
    pub async fn find_one(
        &self,
        query: impl Into<SearchQuery>,
        tx: Option<&mut dyn Session>,
    ) -> AppResult<Option<M>> {
        let mut query = query.into();
        if query.pagination.is_none() {
            query.pagination = Some(PageRequest { page: 1, page_size: 1 });
        }
        let mut scope = self.scope(tx);
        match scope.fetch(&self.meta, &query).await?.into_iter().next() {
            Some(record) => mapper::any_to_model(record).map(Some),
            None => Ok(None),
        }
    }

    /// Every model matching a condition or query.
    pub async fn find_many(
        &self,
        query: impl Into<SearchQuery>,
        tx: Option<&mut dyn Session>,
    ) -> AppResult<Vec<M>> {
        let query = query.into();
        let mut scope = self.scope(tx);
        let records = scope.fetch(&self.meta, &query).await?;
        debug!(table = self.meta.table, count = records.len(), "Fetched records");
        records.into_iter().map(mapper::any_to_model).collect()
    }

    /// One page of models plus the total match count.
    ///
    /// The page window is validated against the configured maximum page
    /// size before anything is queried. Pass the open transaction as `tx`
    /// to see its uncommitted writes.
    pub async fn search(
        &self,
        input: &SearchInput,
        query: impl Into<SearchQuery>,
        tx: Option<&mut dyn Session>,
    ) -> AppResult<SearchResult<M>> {
        input.validate(self.search.max_page_size)?;
        let mut scope = self.scope(tx);
        search::search(&mut scope, &self.meta, input, query.into())
            .await?
            .try_map(mapper::any_to_model)
    }

    /// Insert a new model. Any preset primary key is cleared first.
    pub async fn create(&self, model: M, tx: Option<&mut dyn Session>) -> AppResult<M> {
        let mut scope = self.scope(tx);

        let mut record = mapper::to_record(&model)?;
        record.insert(self.meta.primary_key.to_string(), Value::Null);
        let mut model: M = mapper::any_to_model(record)?;

        self.hooks.before_save(&mut scope, None, &mut model).await?;
        let entity = mapper::model_to_entity(&self.meta, &model)?;
        let saved = scope.save(&self.meta, entity).await?;
        mapper::apply_changes_to_model(&mut model, &saved)?;
        self.hooks.after_save(&mut scope, None, &model).await?;

        let new_id = saved.get(self.meta.primary_key).cloned().unwrap_or_default();
        debug!(table = self.meta.table, id = %new_id, "Created record");
        Ok(model)
    }

    /// Apply a patch to the stored model with the given primary key.
    ///
    /// Fails with `NotFound`, before any hook runs, when no such row exists.
    /// Patched properties replace the previous values wholesale, nested
    /// relation objects included.
    pub async fn update(
        &self,
        id: impl Into<FilterValue>,
        patch: Patch,
        tx: Option<&mut dyn Session>,
    ) -> AppResult<M> {
        let id = id.into();
        let query = self.locate_query(&id, &patch);
        let mut scope = self.scope(tx);

        let prev: M = match scope.fetch(&self.meta, &query).await?.into_iter().next() {
            Some(record) => mapper::any_to_model(record)?,
            None => {
                return Err(AppError::not_found(format!(
                    "{} with {} {} not found",
                    self.meta.table,
                    self.meta.primary_key,
                    id.to_json()
                )));
            }
        };

        let mut next = prev.clone();
        mapper::apply_changes_to_model(&mut next, patch.as_record())?;

        self.hooks.before_save(&mut scope, Some(&prev), &mut next).await?;
        let mut entity = mapper::model_to_entity(&self.meta, &next)?;
        self.retain_patched_relations(&mut entity, &patch);
        let saved = scope.save(&self.meta, entity).await?;
        mapper::apply_changes_to_model(&mut next, &saved)?;
        self.hooks.after_save(&mut scope, Some(&prev), &next).await?;

        debug!(
            table = self.meta.table,
            id = %id.to_json(),
            relations = ?query.relations,
            "Updated record"
        );
        Ok(next)
    }

    /// Delete the row with the given primary key. Deleting a missing row is
    /// not an error.
    pub async fn remove(&self, id: impl Into<FilterValue>, tx: Option<&mut dyn Session>) -> AppResult<()> {
        let id = id.into();
        let mut scope = self.scope(tx);

        self.hooks.before_delete(&mut scope, &id).await?;
        let removed = scope.remove(&self.meta, &id).await?;
        self.hooks.after_delete(&mut scope, &id).await?;

        debug!(table = self.meta.table, id = %id.to_json(), removed, "Removed record");
        Ok(())
    }

    /// Drop relations the update did not load so their stored keys stay as
    /// they are. A relation patched to null clears its id property unless
    /// the patch sets that id too.
    fn retain_patched_relations(&self, entity: &mut Record, patch: &Patch) {
        for relation in &self.meta.relations {
            if !patch.contains(relation.property) {
                entity.remove(relation.property);
                continue;
            }
            if !entity.get(relation.property).is_some_and(Value::is_null) {
                continue;
            }
            for rid in self.meta.relation_ids.iter().filter(|r| r.relation == relation.property) {
                if !patch.contains(rid.property) {
                    entity.insert(rid.property.to_string(), Value::Null);
                }
            }
        }
    }

    fn scope<'s>(&self, tx: Option<&'s mut dyn Session>) -> SessionScope<'s> {
        match tx {
            Some(session) => SessionScope::Borrowed(session),
            None => SessionScope::Auto(Arc::clone(&self.db)),
        }
    }
}
