//! In-process backend keeping every table in memory.
//!
//! Rows are stored column keyed, exactly as the PostgreSQL backend would
//! write them, and conditions are evaluated on the property-keyed view of
//! each row. A transaction holds the store lock for its whole lifetime and
//! works on a copy: commit publishes the copy, rollback drops it. Sessions
//! opened while a transaction is live wait for it to finish, so work inside
//! a transaction must go through the transaction itself.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crudkit_core::error::AppError;
use crudkit_core::result::AppResult;
use crudkit_core::types::{Condition, FilterValue, Record, SearchQuery};
use crudkit_entity::metadata::{RelationMeta, RowWrite};
use crudkit_entity::{EntityMetadata, RelationKind};

use crate::backend::{Database, Session, Transaction};

#[derive(Debug, Clone, Default)]
struct Table {
    rows: Vec<Record>,
    last_id: i64,
}

#[derive(Debug, Clone, Default)]
struct Store {
    tables: HashMap<String, Table>,
    /// Join table name to (owner key, target key) pairs.
    links: HashMap<String, Vec<(Value, Value)>>,
}

/// Shared in-memory database. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    store: Arc<Mutex<Store>>,
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert raw, column-keyed rows into a table.
    ///
    /// Integer `id` columns advance the table's key sequence so later
    /// inserts do not collide with seeded rows.
    pub async fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) -> AppResult<()> {
        let mut store = self.store.lock().await;
        let table = store.tables.entry(table.to_string()).or_default();
        for row in rows {
            let Value::Object(row) = row else {
                return Err(AppError::validation("Seeded rows must be JSON objects"));
            };
            if let Some(id) = row.get("id").and_then(Value::as_i64) {
                table.last_id = table.last_id.max(id);
            }
            table.rows.push(row);
        }
        Ok(())
    }

    /// Add one row to a join table.
    pub async fn link(&self, join_table: &str, owner: impl Into<Value>, target: impl Into<Value>) {
        let mut store = self.store.lock().await;
        store
            .links
            .entry(join_table.to_string())
            .or_default()
            .push((owner.into(), target.into()));
    }

    /// Raw rows of a table, in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Record> {
        let store = self.store.lock().await;
        store
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Target keys linked to `owner` in a join table.
    pub async fn links(&self, join_table: &str, owner: impl Into<Value>) -> Vec<Value> {
        let owner = owner.into();
        let store = self.store.lock().await;
        store.linked(join_table, &owner)
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn session(&self) -> AppResult<Box<dyn Session>> {
        Ok(Box::new(MemorySession {
            store: Arc::clone(&self.store),
        }))
    }

    async fn begin(&self) -> AppResult<Box<dyn Transaction>> {
        let guard = Arc::clone(&self.store).lock_owned().await;
        let work = guard.clone();
        debug!("Memory transaction started");
        Ok(Box::new(MemoryTransaction { guard, work }))
    }
}

/// Auto-committing session: every call locks the store briefly.
#[derive(Debug)]
pub struct MemorySession {
    store: Arc<Mutex<Store>>,
}

#[async_trait]
impl Session for MemorySession {
    async fn count(&mut self, meta: &EntityMetadata, condition: &Condition) -> AppResult<u64> {
        self.store.lock().await.count(meta, condition)
    }

    async fn fetch(&mut self, meta: &EntityMetadata, query: &SearchQuery) -> AppResult<Vec<Record>> {
        self.store.lock().await.fetch(meta, query)
    }

    async fn save(&mut self, meta: &EntityMetadata, entity: Record) -> AppResult<Record> {
        self.store.lock().await.save(meta, entity)
    }

    async fn remove(&mut self, meta: &EntityMetadata, id: &FilterValue) -> AppResult<u64> {
        self.store.lock().await.remove(meta, id)
    }
}

/// Exclusive transaction over a private copy of the store.
#[derive(Debug)]
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Store>,
    work: Store,
}

#[async_trait]
impl Session for MemoryTransaction {
    async fn count(&mut self, meta: &EntityMetadata, condition: &Condition) -> AppResult<u64> {
        self.work.count(meta, condition)
    }

    async fn fetch(&mut self, meta: &EntityMetadata, query: &SearchQuery) -> AppResult<Vec<Record>> {
        self.work.fetch(meta, query)
    }

    async fn save(&mut self, meta: &EntityMetadata, entity: Record) -> AppResult<Record> {
        self.work.save(meta, entity)
    }

    async fn remove(&mut self, meta: &EntityMetadata, id: &FilterValue) -> AppResult<u64> {
        self.work.remove(meta, id)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn as_session(&mut self) -> &mut dyn Session {
        self
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTransaction { mut guard, work } = *self;
        *guard = work;
        debug!("Memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        debug!("Memory transaction rolled back");
        Ok(())
    }
}

impl Store {
    fn table_rows(&self, table: &str) -> &[Record] {
        self.tables.get(table).map(|t| t.rows.as_slice()).unwrap_or(&[])
    }

    fn find_by<'a>(&'a self, table: &str, column: &'a str, value: &'a Value) -> impl Iterator<Item = &'a Record> + 'a {
        self.table_rows(table)
            .iter()
            .filter(move |row| !value.is_null() && row.get(column) == Some(value))
    }

    fn linked(&self, join_table: &str, owner: &Value) -> Vec<Value> {
        self.links
            .get(join_table)
            .map(|pairs| {
                pairs
                    .iter()
                    .filter(|(o, _)| o == owner)
                    .map(|(_, t)| t.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn count(&self, meta: &EntityMetadata, condition: &Condition) -> AppResult<u64> {
        meta.check_filterable(condition.fields())?;
        let total = self
            .table_rows(meta.table)
            .iter()
            .filter(|row| condition.matches(&meta.from_row((*row).clone())))
            .count();
        Ok(total as u64)
    }

    fn fetch(&self, meta: &EntityMetadata, query: &SearchQuery) -> AppResult<Vec<Record>> {
        meta.check_filterable(query.condition.fields())?;
        meta.check_filterable(query.sort.iter().map(|s| s.field.as_str()))?;
        let relations = query
            .relations
            .iter()
            .map(|name| {
                meta.relation(name).ok_or_else(|| {
                    AppError::validation(format!("Unknown relation '{name}' on {}", meta.table))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let mut matched: Vec<(&Record, Record)> = self
            .table_rows(meta.table)
            .iter()
            .map(|row| (row, meta.from_row(row.clone())))
            .filter(|(_, record)| query.condition.matches(record))
            .collect();

        matched.sort_by(|(_, a), (_, b)| {
            for key in &query.sort {
                let ord = key.direction.apply(compare_nullable(a.get(&key.field), b.get(&key.field)));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        let (offset, limit) = match query.pagination {
            Some(page) => (
                usize::try_from(page.offset()).unwrap_or(usize::MAX),
                usize::try_from(page.limit()).unwrap_or(usize::MAX),
            ),
            None => (0, usize::MAX),
        };

        Ok(matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(row, mut record)| {
                for relation in &relations {
                    record.insert(relation.property.to_string(), self.related(meta, relation, row));
                }
                record
            })
            .collect())
    }

    fn related(&self, meta: &EntityMetadata, relation: &RelationMeta, row: &Record) -> Value {
        let def = relation.def;
        let owner = row.get(meta.primary_column()).cloned().unwrap_or(Value::Null);
        match def.kind {
            RelationKind::ManyToOne => {
                let fk = def
                    .join_column
                    .and_then(|column| row.get(column))
                    .cloned()
                    .unwrap_or(Value::Null);
                self.find_by(def.target_table, def.target_key, &fk)
                    .next()
                    .map(|target| Value::Object(target.clone()))
                    .unwrap_or(Value::Null)
            }
            RelationKind::OneToMany => Value::Array(
                def.join_column
                    .map(|column| {
                        self.find_by(def.target_table, column, &owner)
                            .map(|target| Value::Object(target.clone()))
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
            RelationKind::ManyToMany => {
                let keys = def
                    .join_table
                    .map(|jt| self.linked(jt.name, &owner))
                    .unwrap_or_default();
                Value::Array(
                    keys.iter()
                        .filter_map(|key| self.find_by(def.target_table, def.target_key, key).next())
                        .map(|target| Value::Object(target.clone()))
                        .collect(),
                )
            }
        }
    }

    fn save(&mut self, meta: &EntityMetadata, entity: Record) -> AppResult<Record> {
        let RowWrite { row, links } = meta.to_row(&entity);
        let pk = meta.primary_column();
        let table = self.tables.entry(meta.table.to_string()).or_default();
        let key = row.get(pk).cloned().unwrap_or(Value::Null);

        let stored = if key.is_null() {
            table.last_id += 1;
            let mut row = row;
            row.insert(pk.to_string(), Value::from(table.last_id));
            table.rows.push(row.clone());
            row
        } else if let Some(existing) = table.rows.iter_mut().find(|r| r.get(pk) == Some(&key)) {
            existing.extend(row);
            existing.clone()
        } else {
            if let Some(id) = key.as_i64() {
                table.last_id = table.last_id.max(id);
            }
            table.rows.push(row.clone());
            row
        };

        let owner = stored.get(pk).cloned().unwrap_or(Value::Null);
        for (relation, targets) in links {
            let Some(join_table) = relation.def.join_table else {
                continue;
            };
            let pairs = self.links.entry(join_table.name.to_string()).or_default();
            pairs.retain(|(o, _)| o != &owner);
            pairs.extend(targets.into_iter().map(|target| (owner.clone(), target)));
        }

        Ok(meta.from_row(stored))
    }

    fn remove(&mut self, meta: &EntityMetadata, id: &FilterValue) -> AppResult<u64> {
        let key = id.to_json();
        let pk = meta.primary_column();
        let Some(table) = self.tables.get_mut(meta.table) else {
            return Ok(0);
        };
        let before = table.rows.len();
        table.rows.retain(|row| row.get(pk) != Some(&key));
        let removed = (before - table.rows.len()) as u64;

        for relation in &meta.relations {
            if let Some(join_table) = relation.def.join_table {
                if let Some(pairs) = self.links.get_mut(join_table.name) {
                    pairs.retain(|(o, _)| o != &key);
                }
            }
        }
        Ok(removed)
    }
}

/// Order JSON values the way PostgreSQL orders columns: nulls after every
/// value in ascending order.
fn compare_nullable(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .zip(y.as_f64())
                .and_then(|(x, y)| x.partial_cmp(&y))
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => Ordering::Equal,
        },
    }
}
