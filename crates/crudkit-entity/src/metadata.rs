//! Structural persistence metadata derived from the field store.
//!
//! Backends store rows keyed by column name while models and entities are
//! keyed by property name. [`EntityMetadata`] owns that translation and the
//! foreign-key bookkeeping for relations.

use std::any::type_name;

use serde_json::Value;

use crudkit_core::error::AppError;
use crudkit_core::result::AppResult;
use crudkit_core::types::Record;

use crate::field::{FieldKind, RelationDef, RelationKind};
use crate::model::Model;
use crate::registry;

/// A property stored in its own column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Model property.
    pub property: &'static str,
    /// Table column.
    pub column: &'static str,
    /// Declared column type, if any.
    pub db_type: Option<&'static str>,
}

/// A relation property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMeta {
    /// Model property holding the nested model(s).
    pub property: &'static str,
    /// Persistence shape.
    pub def: RelationDef,
}

/// A property exposing the raw foreign key of a many-to-one relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationIdMeta {
    /// Model property holding the id.
    pub property: &'static str,
    /// Relation property the id belongs to.
    pub relation: &'static str,
    /// Foreign key column on the owner table.
    pub column: &'static str,
    /// Declared column type, if any.
    pub db_type: Option<&'static str>,
}

/// Row produced for a write: owner columns plus join-table links to
/// replace.
#[derive(Debug, Clone, PartialEq)]
pub struct RowWrite {
    /// Owner table columns.
    pub row: Record,
    /// Many-to-many relations present on the entity with their target keys.
    pub links: Vec<(RelationMeta, Vec<Value>)>,
}

/// Table-level description of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadata {
    /// Rust type name of the model, for messages.
    pub model: &'static str,
    /// Table name.
    pub table: &'static str,
    /// Primary key property.
    pub primary_key: &'static str,
    /// Plain columns, primary key included.
    pub columns: Vec<ColumnMeta>,
    /// Relations.
    pub relations: Vec<RelationMeta>,
    /// Relation id properties.
    pub relation_ids: Vec<RelationIdMeta>,
}

impl EntityMetadata {
    /// Derive the metadata of `M` stored in `table`.
    ///
    /// Fails with `Misconfigured` when `M` has no described fields, when the
    /// primary key is not described, or when a relation id points at
    /// something other than a many-to-one relation.
    pub fn of<M: Model>(table: &'static str) -> AppResult<Self> {
        registry::require_described::<M>()?;
        let descriptors = registry::descriptors::<M>();

        let mut meta = Self {
            model: type_name::<M>(),
            table,
            primary_key: M::PRIMARY_KEY,
            columns: Vec::new(),
            relations: Vec::new(),
            relation_ids: Vec::new(),
        };

        for &(property, ref descriptor) in &descriptors {
            match descriptor.kind {
                FieldKind::Relation(def) => meta.relations.push(RelationMeta {
                    property,
                    def,
                }),
                FieldKind::RelationId { .. } => {}
                _ => meta.columns.push(ColumnMeta {
                    property,
                    column: descriptor.plain_name.unwrap_or(property),
                    db_type: descriptor.db_type,
                }),
            }
        }

        for &(property, ref descriptor) in &descriptors {
            let FieldKind::RelationId { relation } = descriptor.kind else {
                continue;
            };
            let def = meta
                .relation(relation)
                .map(|r| r.def)
                .ok_or_else(|| misconfigured(&meta, property, "names an undescribed relation"))?;
            let (RelationKind::ManyToOne, Some(column)) = (def.kind, def.join_column) else {
                return Err(misconfigured(&meta, property, "must belong to a many-to-one relation"));
            };
            meta.relation_ids.push(RelationIdMeta {
                property,
                relation,
                column,
                db_type: descriptor.db_type,
            });
        }

        if meta.column(meta.primary_key).is_none() {
            return Err(misconfigured(&meta, meta.primary_key, "is the primary key but not described"));
        }
        Ok(meta)
    }

    /// Column metadata of a plain property.
    pub fn column(&self, property: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.property == property)
    }

    /// Relation metadata of a relation property.
    pub fn relation(&self, property: &str) -> Option<&RelationMeta> {
        self.relations.iter().find(|r| r.property == property)
    }

    /// Relation id metadata of a relation id property.
    pub fn relation_id(&self, property: &str) -> Option<&RelationIdMeta> {
        self.relation_ids.iter().find(|r| r.property == property)
    }

    /// Column name of the primary key.
    pub fn primary_column(&self) -> &'static str {
        self.column(self.primary_key)
            .map(|c| c.column)
            .unwrap_or(self.primary_key)
    }

    /// Column and declared type that a filterable or sortable property is
    /// stored in. Relation properties are not filterable.
    pub fn storage_of(&self, property: &str) -> Option<(&'static str, Option<&'static str>)> {
        self.column(property)
            .map(|c| (c.column, c.db_type))
            .or_else(|| self.relation_id(property).map(|r| (r.column, r.db_type)))
    }

    /// Fail with `Validation` unless every property can be filtered on.
    pub fn check_filterable<'a>(&self, properties: impl IntoIterator<Item = &'a str>) -> AppResult<()> {
        for property in properties {
            if self.storage_of(property).is_none() {
                return Err(AppError::validation(format!(
                    "Unknown field '{property}' on {}",
                    self.table
                )));
            }
        }
        Ok(())
    }

    /// Convert a stored row (column keyed) into an entity (property keyed).
    ///
    /// Columns with no matching property pass through under their column
    /// name.
    pub fn from_row(&self, mut row: Record) -> Record {
        let mut record = Record::new();
        for column in &self.columns {
            if let Some(value) = row.remove(column.column) {
                record.insert(column.property.to_string(), value);
            }
        }
        for rid in &self.relation_ids {
            if let Some(value) = row.get(rid.column) {
                record.insert(rid.property.to_string(), value.clone());
            }
        }
        for (column, value) in row {
            if !self.relation_ids.iter().any(|r| r.column == column) {
                record.entry(column).or_insert(value);
            }
        }
        record
    }

    /// Convert an entity into the row to write.
    ///
    /// A many-to-one foreign key comes from the nested relation object when
    /// present, otherwise from the relation id property. A null relation
    /// object counts as absent when a relation id property carries the key.
    /// Many-to-many links are replaced only by an array; `[]` clears them and
    /// any other value leaves them untouched. Unknown properties and
    /// one-to-many relations are not written.
    pub fn to_row(&self, entity: &Record) -> RowWrite {
        let mut row = Record::new();
        for column in &self.columns {
            if let Some(value) = entity.get(column.property) {
                row.insert(column.column.to_string(), value.clone());
            }
        }
        for rid in &self.relation_ids {
            if let Some(value) = entity.get(rid.property) {
                row.insert(rid.column.to_string(), value.clone());
            }
        }

        let mut links = Vec::new();
        for relation in &self.relations {
            let Some(value) = entity.get(relation.property) else {
                continue;
            };
            match relation.def.kind {
                RelationKind::ManyToOne => {
                    let has_id_property = self.relation_ids.iter().any(|r| r.relation == relation.property);
                    if value.is_null() && has_id_property {
                        continue;
                    }
                    if let Some(column) = relation.def.join_column {
                        row.insert(column.to_string(), key_of(value, relation.def.target_key));
                    }
                }
                RelationKind::ManyToMany => {
                    let Value::Array(items) = value else {
                        continue;
                    };
                    let keys = items
                        .iter()
                        .map(|item| key_of(item, relation.def.target_key))
                        .filter(|key| !key.is_null())
                        .collect();
                    links.push((relation.clone(), keys));
                }
                RelationKind::OneToMany => {}
            }
        }

        RowWrite { row, links }
    }
}

/// Key of a nested relation object, or the value itself when it is already
/// a bare key.
pub fn key_of(value: &Value, target_key: &str) -> Value {
    match value {
        Value::Object(object) => object.get(target_key).cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}

fn misconfigured(meta: &EntityMetadata, property: &str, reason: &str) -> AppError {
    AppError::misconfigured(format!("Field '{property}' of {} {reason}", meta.model))
}
