//! Translation of [`Condition`] trees into SQL predicates.
//!
//! Each comparison becomes a fragment with positional placeholders (`$n`)
//! and a named parameter. Names are namespaced by the node's path in the
//! tree, so the same field compared at several positions never collides.

use crudkit_core::error::AppError;
use crudkit_core::result::AppResult;
use crudkit_core::types::{Condition, FilterField, FilterOp, FilterValue, SortField};
use crudkit_entity::EntityMetadata;

/// One bound parameter of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParam {
    /// Path-namespaced parameter name, e.g. `p_0_1_title`.
    pub name: String,
    /// Value to bind.
    pub value: FilterValue,
}

/// A rendered predicate: SQL text plus parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// SQL boolean expression.
    pub sql: String,
    /// Parameters; `params[i]` binds placeholder `$(first + i)`.
    pub params: Vec<SqlParam>,
}

/// Renders conditions against one table's columns.
#[derive(Debug)]
pub struct PredicateBuilder<'a> {
    meta: &'a EntityMetadata,
    alias: Option<&'a str>,
    next_index: usize,
    params: Vec<SqlParam>,
}

impl<'a> PredicateBuilder<'a> {
    /// Create a builder whose first placeholder is `$first_index`.
    pub fn new(meta: &'a EntityMetadata, first_index: usize) -> Self {
        Self {
            meta,
            alias: None,
            next_index: first_index,
            params: Vec::new(),
        }
    }

    /// Qualify every column with a table alias.
    pub fn with_alias(mut self, alias: &'a str) -> Self {
        self.alias = Some(alias);
        self
    }

    /// Render a condition tree.
    pub fn build(mut self, condition: &Condition) -> AppResult<Predicate> {
        let sql = self.render(condition, "p")?;
        Ok(Predicate {
            sql,
            params: self.params,
        })
    }

    /// Render an `ORDER BY` list. Unknown sort keys are rejected.
    pub fn order_by(meta: &EntityMetadata, alias: Option<&str>, sort: &[SortField]) -> AppResult<String> {
        let mut parts = Vec::with_capacity(sort.len());
        for key in sort {
            let (column, _) = meta.storage_of(&key.field).ok_or_else(|| {
                AppError::validation(format!("Unknown sort key '{}' on {}", key.field, meta.table))
            })?;
            parts.push(format!("{} {}", qualified(alias, column), key.direction.as_sql()));
        }
        Ok(parts.join(", "))
    }

    fn render(&mut self, condition: &Condition, path: &str) -> AppResult<String> {
        match condition {
            Condition::All(children) => self.join(children, path, " AND ", "TRUE"),
            Condition::Any(children) => self.join(children, path, " OR ", "FALSE"),
            Condition::Not(child) => Ok(format!("NOT ({})", self.render(child, &format!("{path}_0"))?)),
            Condition::Compare(term) => self.compare(term, path),
        }
    }

    fn join(&mut self, children: &[Condition], path: &str, glue: &str, empty: &str) -> AppResult<String> {
        if children.is_empty() {
            return Ok(empty.to_string());
        }
        let mut parts = Vec::with_capacity(children.len());
        for (i, child) in children.iter().enumerate() {
            parts.push(format!("({})", self.render(child, &format!("{path}_{i}"))?));
        }
        Ok(parts.join(glue))
    }

    fn compare(&mut self, term: &FilterField, path: &str) -> AppResult<String> {
        let (column, db_type) = self.meta.storage_of(&term.field).ok_or_else(|| {
            AppError::validation(format!("Unknown field '{}' on {}", term.field, self.meta.table))
        })?;
        let column = qualified(self.alias, column);
        let name = format!("{path}_{}", term.field);

        let sql = match (term.op, &term.value) {
            (FilterOp::IsNull, _) | (FilterOp::Eq, FilterValue::Null) => format!("{column} IS NULL"),
            (FilterOp::IsNotNull, _) | (FilterOp::Ne, FilterValue::Null) => {
                format!("{column} IS NOT NULL")
            }
            (FilterOp::In, FilterValue::List(items)) if items.is_empty() => "FALSE".to_string(),
            (FilterOp::In, value) => {
                let list = match value {
                    FilterValue::List(items) => items.clone(),
                    single => vec![single.clone()],
                };
                let placeholder = self.push(name, FilterValue::List(list));
                let array_type = format!("{}[]", db_type.unwrap_or("text"));
                format!("{column} = ANY(CAST({placeholder} AS {array_type}))")
            }
            (op, value) => {
                let placeholder = self.push(name, value.clone());
                let placeholder = match db_type {
                    Some(db_type) => format!("CAST({placeholder} AS {db_type})"),
                    None => placeholder,
                };
                format!("{column} {} {placeholder}", op.as_sql())
            }
        };
        Ok(sql)
    }

    fn push(&mut self, name: String, value: FilterValue) -> String {
        let placeholder = format!("${}", self.next_index);
        self.next_index += 1;
        self.params.push(SqlParam { name, value });
        placeholder
    }
}

/// Quote an identifier for PostgreSQL.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn qualified(alias: Option<&str>, column: &str) -> String {
    match alias {
        Some(alias) => format!("{}.{}", alias, quote(column)),
        None => quote(column),
    }
}
