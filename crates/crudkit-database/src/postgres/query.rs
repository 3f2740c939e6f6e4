//! SQL statements and their execution on one connection.
//!
//! Rows travel as `jsonb`: reads select `to_jsonb(t)` and writes go through
//! `jsonb_populate_record`, so column types are taken from the table itself
//! and no per-model row struct is needed.

use std::collections::HashMap;

use serde_json::Value;
use sqlx::PgConnection;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::QueryScalar;
use tracing::debug;

use crudkit_core::error::{AppError, ErrorKind};
use crudkit_core::result::AppResult;
use crudkit_core::types::{Condition, FilterValue, Record, SearchQuery};
use crudkit_entity::field::JoinTable;
use crudkit_entity::metadata::{RelationMeta, RowWrite};
use crudkit_entity::{EntityMetadata, RelationKind};

use crate::predicate::{PredicateBuilder, quote};

/// A value bound to a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Bind {
    /// Scalar or list parameter.
    Value(FilterValue),
    /// `jsonb` payload.
    Json(Value),
}

/// SQL text with binds in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub sql: String,
    pub binds: Vec<Bind>,
}

const ALIAS: &str = "t";

pub(crate) fn count_sql(meta: &EntityMetadata, condition: &Condition) -> AppResult<Statement> {
    let predicate = PredicateBuilder::new(meta, 1).with_alias(ALIAS).build(condition)?;
    Ok(Statement {
        sql: format!(
            "SELECT COUNT(*) FROM {} AS {ALIAS} WHERE {}",
            quote(meta.table),
            predicate.sql
        ),
        binds: predicate.params.into_iter().map(|p| Bind::Value(p.value)).collect(),
    })
}

pub(crate) fn select_sql(meta: &EntityMetadata, query: &SearchQuery) -> AppResult<Statement> {
    let predicate = PredicateBuilder::new(meta, 1).with_alias(ALIAS).build(&query.condition)?;
    let mut binds: Vec<Bind> = predicate.params.into_iter().map(|p| Bind::Value(p.value)).collect();

    let mut sql = format!(
        "SELECT to_jsonb({ALIAS}) FROM {} AS {ALIAS} WHERE {}",
        quote(meta.table),
        predicate.sql
    );
    let order = PredicateBuilder::order_by(meta, Some(ALIAS), &query.sort)?;
    if !order.is_empty() {
        sql.push_str(&format!(" ORDER BY {order}"));
    }
    if let Some(page) = query.pagination {
        let next = binds.len() + 1;
        sql.push_str(&format!(" LIMIT ${next} OFFSET ${}", next + 1));
        binds.push(Bind::Value(FilterValue::Integer(bigint("LIMIT", page.limit())?)));
        binds.push(Bind::Value(FilterValue::Integer(bigint("OFFSET", page.offset())?)));
    }
    Ok(Statement { sql, binds })
}

fn bigint(clause: &str, value: u64) -> AppResult<i64> {
    i64::try_from(value)
        .map_err(|_| AppError::validation(format!("{clause} {value} exceeds the bigint range")))
}

/// Insert the given columns; the primary key is left to its default when
/// absent.
pub(crate) fn insert_sql(meta: &EntityMetadata, row: &Record) -> Statement {
    let table = quote(meta.table);
    if row.is_empty() {
        return Statement {
            sql: format!("INSERT INTO {table} AS {ALIAS} DEFAULT VALUES RETURNING to_jsonb({ALIAS})"),
            binds: Vec::new(),
        };
    }
    let columns = column_list(row);
    Statement {
        sql: format!(
            "INSERT INTO {table} AS {ALIAS} ({columns}) \
             SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1) \
             RETURNING to_jsonb({ALIAS})"
        ),
        binds: vec![Bind::Json(Value::Object(row.clone()))],
    }
}

/// Overwrite the given columns of the row with this key. With no columns
/// the row is only read back.
pub(crate) fn update_sql(meta: &EntityMetadata, row: &Record, key: &Value) -> Statement {
    let table = quote(meta.table);
    if row.is_empty() {
        return Statement {
            sql: format!(
                "SELECT to_jsonb({ALIAS}) FROM {table} AS {ALIAS} WHERE {}",
                key_match(meta, 1)
            ),
            binds: vec![key_bind(key)],
        };
    }
    let columns = column_list(row);
    Statement {
        sql: format!(
            "UPDATE {table} AS {ALIAS} SET ({columns}) = \
             (SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1)) \
             WHERE {} RETURNING to_jsonb({ALIAS})",
            key_match(meta, 2)
        ),
        binds: vec![Bind::Json(Value::Object(row.clone())), key_bind(key)],
    }
}

pub(crate) fn delete_sql(meta: &EntityMetadata, key: &Value) -> Statement {
    Statement {
        sql: format!(
            "DELETE FROM {} AS {ALIAS} WHERE {} RETURNING 1",
            quote(meta.table),
            key_match(meta, 1)
        ),
        binds: vec![key_bind(key)],
    }
}

fn unlink_sql(join_table: &JoinTable, owner: &Value) -> Statement {
    Statement {
        sql: format!(
            "DELETE FROM {} WHERE CAST({} AS text) = $1 RETURNING 1",
            quote(join_table.name),
            quote(join_table.owner_column)
        ),
        binds: vec![key_bind(owner)],
    }
}

fn link_sql(join_table: &JoinTable, owner: &Value, targets: &[Value]) -> Statement {
    let pairs = targets
        .iter()
        .map(|target| {
            let mut pair = Record::new();
            pair.insert(join_table.owner_column.to_string(), owner.clone());
            pair.insert(join_table.target_column.to_string(), target.clone());
            Value::Object(pair)
        })
        .collect();
    let table = quote(join_table.name);
    let columns = format!(
        "{}, {}",
        quote(join_table.owner_column),
        quote(join_table.target_column)
    );
    Statement {
        sql: format!(
            "INSERT INTO {table} ({columns}) \
             SELECT {columns} FROM jsonb_populate_recordset(NULL::{table}, $1) RETURNING 1"
        ),
        binds: vec![Bind::Json(Value::Array(pairs))],
    }
}

/// One query loading a relation for every owner in `keys`.
///
/// Many-to-one keys are foreign key values, to-many keys are owner primary
/// keys. Many-to-many rows come back as `{"owner": .., "target": ..}`.
fn relation_sql(relation: &RelationMeta, keys: Vec<String>) -> Statement {
    let def = relation.def;
    let target = quote(def.target_table);
    let target_key = quote(def.target_key);
    let sql = match (def.kind, def.join_column, def.join_table) {
        (RelationKind::ManyToMany, _, Some(jt)) => format!(
            "SELECT jsonb_build_object('owner', CAST(j.{owner} AS text), 'target', to_jsonb(r)) \
             FROM {join} AS j JOIN {target} AS r ON r.{target_key} = j.{target_column} \
             WHERE CAST(j.{owner} AS text) = ANY($1) ORDER BY r.{target_key}",
            owner = quote(jt.owner_column),
            join = quote(jt.name),
            target_column = quote(jt.target_column),
        ),
        (RelationKind::OneToMany, Some(column), _) => format!(
            "SELECT to_jsonb(r) FROM {target} AS r WHERE CAST(r.{} AS text) = ANY($1) ORDER BY r.{target_key}",
            quote(column)
        ),
        _ => format!("SELECT to_jsonb(r) FROM {target} AS r WHERE CAST(r.{target_key} AS text) = ANY($1)"),
    };
    Statement {
        sql,
        binds: vec![Bind::Value(FilterValue::List(
            keys.into_iter().map(FilterValue::String).collect(),
        ))],
    }
}

fn column_list(row: &Record) -> String {
    let mut columns: Vec<String> = row.keys().map(|c| quote(c)).collect();
    columns.sort();
    columns.join(", ")
}

fn key_match(meta: &EntityMetadata, index: usize) -> String {
    let column = format!("{ALIAS}.{}", quote(meta.primary_column()));
    match meta.column(meta.primary_key).and_then(|c| c.db_type) {
        Some(db_type) => format!("{column} = CAST(${index} AS {db_type})"),
        None => format!("CAST({column} AS text) = ${index}"),
    }
}

fn key_bind(key: &Value) -> Bind {
    Bind::Value(key_text(key).map(FilterValue::String).unwrap_or(FilterValue::Null))
}

/// Text form of a key, as PostgreSQL prints it.
fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn filter_text(value: &FilterValue) -> Option<String> {
    match value {
        FilterValue::String(s) => Some(s.clone()),
        FilterValue::Integer(i) => Some(i.to_string()),
        FilterValue::Float(f) => Some(f.to_string()),
        FilterValue::Boolean(b) => Some(b.to_string()),
        FilterValue::List(_) | FilterValue::Null => None,
    }
}

fn bind_all<'q, O>(
    mut query: QueryScalar<'q, Postgres, O, PgArguments>,
    binds: &[Bind],
) -> QueryScalar<'q, Postgres, O, PgArguments> {
    for bind in binds {
        query = match bind {
            Bind::Json(value) => query.bind(value.clone()),
            Bind::Value(FilterValue::String(s)) => query.bind(s.clone()),
            Bind::Value(FilterValue::Integer(i)) => query.bind(*i),
            Bind::Value(FilterValue::Float(f)) => query.bind(*f),
            Bind::Value(FilterValue::Boolean(b)) => query.bind(*b),
            Bind::Value(FilterValue::Null) => query.bind(Option::<String>::None),
            Bind::Value(FilterValue::List(items)) => {
                query.bind(items.iter().filter_map(filter_text).collect::<Vec<String>>())
            }
        };
    }
    query
}

fn map_sqlx(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::with_source(ErrorKind::Conflict, format!("{context}: {db_err}"), e)
        }
        _ => AppError::with_source(ErrorKind::Database, format!("{context}: {e}"), e),
    }
}

async fn rows(conn: &mut PgConnection, stmt: &Statement, context: &'static str) -> AppResult<Vec<Value>> {
    debug!(sql = %stmt.sql, binds = stmt.binds.len(), "Executing statement");
    bind_all(sqlx::query_scalar::<_, Value>(&stmt.sql), &stmt.binds)
        .fetch_all(conn)
        .await
        .map_err(map_sqlx(context))
}

async fn affected(conn: &mut PgConnection, stmt: &Statement, context: &'static str) -> AppResult<u64> {
    debug!(sql = %stmt.sql, binds = stmt.binds.len(), "Executing statement");
    bind_all(sqlx::query_scalar::<_, i32>(&stmt.sql), &stmt.binds)
        .fetch_all(conn)
        .await
        .map(|rows| rows.len() as u64)
        .map_err(map_sqlx(context))
}

fn into_record(value: Value) -> AppResult<Record> {
    match value {
        Value::Object(record) => Ok(record),
        other => Err(AppError::internal(format!("Expected a row object, got {other}"))),
    }
}

pub(crate) async fn count(conn: &mut PgConnection, meta: &EntityMetadata, condition: &Condition) -> AppResult<u64> {
    let stmt = count_sql(meta, condition)?;
    debug!(sql = %stmt.sql, binds = stmt.binds.len(), "Executing statement");
    let total = bind_all(sqlx::query_scalar::<_, i64>(&stmt.sql), &stmt.binds)
        .fetch_one(conn)
        .await
        .map_err(map_sqlx("Failed to count records"))?;
    Ok(total as u64)
}

pub(crate) async fn fetch(conn: &mut PgConnection, meta: &EntityMetadata, query: &SearchQuery) -> AppResult<Vec<Record>> {
    let relations = query
        .relations
        .iter()
        .map(|name| {
            meta.relation(name).ok_or_else(|| {
                AppError::validation(format!("Unknown relation '{name}' on {}", meta.table))
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    let stmt = select_sql(meta, query)?;
    let raw = rows(&mut *conn, &stmt, "Failed to fetch records")
        .await?
        .into_iter()
        .map(into_record)
        .collect::<AppResult<Vec<_>>>()?;
    let mut records: Vec<Record> = raw.iter().map(|row| meta.from_row(row.clone())).collect();

    for relation in relations {
        load_relation(&mut *conn, meta, relation, &raw, &mut records).await?;
    }
    Ok(records)
}

async fn load_relation(
    conn: &mut PgConnection,
    meta: &EntityMetadata,
    relation: &RelationMeta,
    raw: &[Record],
    records: &mut [Record],
) -> AppResult<()> {
    let def = relation.def;
    let pk = meta.primary_column();
    let owner_keys: Vec<Option<String>> = raw
        .iter()
        .map(|row| match def.kind {
            RelationKind::ManyToOne => def.join_column.and_then(|c| row.get(c)).and_then(key_text),
            _ => row.get(pk).and_then(key_text),
        })
        .collect();

    let mut keys: Vec<String> = owner_keys.iter().flatten().cloned().collect();
    keys.sort();
    keys.dedup();

    let mut found: HashMap<String, Vec<Value>> = HashMap::new();
    if !keys.is_empty() {
        let stmt = relation_sql(relation, keys);
        for target in rows(conn, &stmt, "Failed to load relation").await? {
            let (owner, target) = match def.kind {
                RelationKind::ManyToOne => (target.get(def.target_key).and_then(key_text), target),
                RelationKind::OneToMany => (
                    def.join_column.and_then(|c| target.get(c)).and_then(key_text),
                    target,
                ),
                RelationKind::ManyToMany => (
                    target.get("owner").and_then(key_text),
                    target.get("target").cloned().unwrap_or(Value::Null),
                ),
            };
            if let Some(owner) = owner {
                found.entry(owner).or_default().push(target);
            }
        }
    }

    for (record, key) in records.iter_mut().zip(owner_keys) {
        let targets = key.and_then(|k| found.get(&k).cloned()).unwrap_or_default();
        let value = if def.is_to_many() {
            Value::Array(targets)
        } else {
            targets.into_iter().next().unwrap_or(Value::Null)
        };
        record.insert(relation.property.to_string(), value);
    }
    Ok(())
}

pub(crate) async fn save(conn: &mut PgConnection, meta: &EntityMetadata, entity: Record) -> AppResult<Record> {
    let RowWrite { mut row, links } = meta.to_row(&entity);
    let pk = meta.primary_column();
    let key = row.remove(pk).unwrap_or(Value::Null);

    let mut stored = None;
    if !key.is_null() {
        let stmt = update_sql(meta, &row, &key);
        stored = rows(&mut *conn, &stmt, "Failed to update record").await?.into_iter().next();
    }
    let stored = match stored {
        Some(stored) => stored,
        None => {
            if !key.is_null() {
                row.insert(pk.to_string(), key);
            }
            let stmt = insert_sql(meta, &row);
            rows(&mut *conn, &stmt, "Failed to insert record")
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| AppError::internal(format!("Insert into {} returned no row", meta.table)))?
        }
    };
    let stored = into_record(stored)?;

    let owner = stored.get(pk).cloned().unwrap_or(Value::Null);
    for (relation, targets) in links {
        let Some(join_table) = relation.def.join_table else {
            continue;
        };
        affected(&mut *conn, &unlink_sql(&join_table, &owner), "Failed to clear relation links").await?;
        if !targets.is_empty() {
            affected(
                &mut *conn,
                &link_sql(&join_table, &owner, &targets),
                "Failed to write relation links",
            )
            .await?;
        }
    }

    Ok(meta.from_row(stored))
}

pub(crate) async fn remove(conn: &mut PgConnection, meta: &EntityMetadata, id: &FilterValue) -> AppResult<u64> {
    let key = id.to_json();
    for relation in &meta.relations {
        if let Some(join_table) = relation.def.join_table {
            affected(&mut *conn, &unlink_sql(&join_table, &key), "Failed to clear relation links").await?;
        }
    }
    affected(conn, &delete_sql(meta, &key), "Failed to delete record").await
}
