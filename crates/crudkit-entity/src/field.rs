//! Field descriptors and the builder functions that create them.
//!
//! Each constructor plays the role of a field decorator: it fixes the
//! semantic kind and sensible type defaults, and the chained setters carry
//! the display and validation options. Descriptors are registered with
//! [`crate::registry::define`] or through a [`crate::registry::ModelSchema`].

use std::borrow::Cow;

use chrono::DateTime;
use serde_json::Value;
use uuid::Uuid;
use validator::ValidationError;

/// Cardinality of a relation between two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Owner row holds a foreign key to one target row.
    ManyToOne,
    /// Target rows hold a foreign key back to the owner.
    OneToMany,
    /// Owner and target are linked through a join table.
    ManyToMany,
}

/// Join table linking owner and target keys for a many-to-many relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTable {
    /// Join table name.
    pub name: &'static str,
    /// Column holding the owner key.
    pub owner_column: &'static str,
    /// Column holding the target key.
    pub target_column: &'static str,
}

/// Persistence shape of a relation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationDef {
    /// Relation cardinality.
    pub kind: RelationKind,
    /// Table holding the related rows.
    pub target_table: &'static str,
    /// Key column of the related table.
    pub target_key: &'static str,
    /// Foreign key column: on the owner for `ManyToOne`, on the target for
    /// `OneToMany`. Unused for `ManyToMany`.
    pub join_column: Option<&'static str>,
    /// Join table for `ManyToMany`.
    pub join_table: Option<JoinTable>,
}

impl RelationDef {
    /// A many-to-one relation through a foreign key on the owner table.
    pub fn many_to_one(target_table: &'static str, join_column: &'static str) -> Self {
        Self {
            kind: RelationKind::ManyToOne,
            target_table,
            target_key: "id",
            join_column: Some(join_column),
            join_table: None,
        }
    }

    /// A one-to-many relation through a foreign key on the target table.
    pub fn one_to_many(target_table: &'static str, inverse_column: &'static str) -> Self {
        Self {
            kind: RelationKind::OneToMany,
            target_table,
            target_key: "id",
            join_column: Some(inverse_column),
            join_table: None,
        }
    }

    /// A many-to-many relation through a join table.
    pub fn many_to_many(target_table: &'static str, join_table: JoinTable) -> Self {
        Self {
            kind: RelationKind::ManyToMany,
            target_table,
            target_key: "id",
            join_column: None,
            join_table: Some(join_table),
        }
    }

    /// Override the key column of the related table.
    pub fn target_key(mut self, key: &'static str) -> Self {
        self.target_key = key;
        self
    }

    /// Whether the relation holds a list of targets.
    pub fn is_to_many(&self) -> bool {
        !matches!(self.kind, RelationKind::ManyToOne)
    }
}

/// Application-level semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Generated primary key.
    PrimaryKey,
    /// Free text.
    Text,
    /// Whole number.
    Integer,
    /// Arbitrary-precision or floating number.
    Decimal,
    /// True/false flag.
    Boolean,
    /// RFC 3339 timestamp.
    DateTime,
    /// UUID string.
    Uuid,
    /// One of a fixed set of strings.
    Enumeration,
    /// Free-form JSON document.
    Json,
    /// Nested related model(s).
    Relation(RelationDef),
    /// Raw identifier of the target of the named relation.
    RelationId {
        /// Name of the relation field this id belongs to.
        relation: &'static str,
    },
}

impl FieldKind {
    /// Whether the repository must consider this field when deciding which
    /// relations to load.
    pub fn is_relational(&self) -> bool {
        matches!(self, Self::Relation(_) | Self::RelationId { .. })
    }

    /// Short name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PrimaryKey => "primary_key",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::DateTime => "date_time",
            Self::Uuid => "uuid",
            Self::Enumeration => "enumeration",
            Self::Json => "json",
            Self::Relation(_) => "relation",
            Self::RelationId { .. } => "relation_id",
        }
    }
}

/// Shape of the JSON value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// JSON string.
    String,
    /// JSON number without fraction.
    Integer,
    /// Any JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON object.
    Object,
    /// Anything.
    Any,
}

impl ValueType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

/// Static metadata attached to one model property.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Semantic type; replaces a decorator name.
    pub kind: FieldKind,
    /// Expected JSON shape.
    pub value_type: ValueType,
    /// Database column type, used to cast bound parameters.
    pub db_type: Option<&'static str>,
    /// Display label.
    pub label: Option<String>,
    /// Longer help text.
    pub hint: Option<String>,
    /// Example value for documentation.
    pub example: Option<Value>,
    /// Default value.
    pub default_value: Option<Value>,
    /// Must be present.
    pub required: bool,
    /// May hold `null`.
    pub nullable: bool,
    /// Holds a list of values.
    pub is_array: bool,
    /// Lower bound: value for numbers, length for strings and arrays.
    pub min: Option<f64>,
    /// Upper bound: value for numbers, length for strings and arrays.
    pub max: Option<f64>,
    /// Allowed values for enumerations.
    pub enum_items: Option<&'static [&'static str]>,
    /// Column name when it differs from the property name.
    pub plain_name: Option<&'static str>,
}

impl FieldDescriptor {
    fn of(kind: FieldKind, value_type: ValueType, db_type: Option<&'static str>) -> Self {
        Self {
            kind,
            value_type,
            db_type,
            label: None,
            hint: None,
            example: None,
            default_value: None,
            required: false,
            nullable: false,
            is_array: false,
            min: None,
            max: None,
            enum_items: None,
            plain_name: None,
        }
    }

    /// Set the display label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the help text.
    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Set the documentation example.
    pub fn example(mut self, example: impl Into<Value>) -> Self {
        self.example = Some(example.into());
        self
    }

    /// Set the default value.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Override the database column type.
    pub fn db_type(mut self, db_type: &'static str) -> Self {
        self.db_type = Some(db_type);
        self
    }

    /// Override the expected JSON shape.
    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Store under a different column name.
    pub fn column(mut self, column: &'static str) -> Self {
        self.plain_name = Some(column);
        self
    }

    /// Mark as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Allow `null` even when required.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark as holding a list.
    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    /// Set the lower bound.
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Set the upper bound.
    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Relation definition, if this is a relation field.
    pub fn relation(&self) -> Option<&RelationDef> {
        match &self.kind {
            FieldKind::Relation(def) => Some(def),
            _ => None,
        }
    }

    /// Check a property value (or its absence) against this descriptor.
    pub fn check(&self, value: Option<&Value>) -> Result<(), ValidationError> {
        let value = match value {
            None => {
                return if self.required {
                    Err(error("required", "value is required"))
                } else {
                    Ok(())
                };
            }
            Some(Value::Null) => {
                return if self.required && !self.nullable {
                    Err(error("null", "value must not be null"))
                } else {
                    Ok(())
                };
            }
            Some(value) => value,
        };

        if self.is_array || matches!(self.kind, FieldKind::Relation(def) if def.is_to_many()) {
            let Value::Array(items) = value else {
                return Err(error("array", "value must be a list"));
            };
            self.check_bounds("length", items.len() as f64)?;
            return items.iter().try_for_each(|item| self.check_scalar(item));
        }

        self.check_scalar(value)?;
        match value {
            Value::Number(n) => self.check_bounds("range", n.as_f64().unwrap_or_default()),
            Value::String(s) => self.check_bounds("length", s.chars().count() as f64),
            _ => Ok(()),
        }
    }

    fn check_scalar(&self, value: &Value) -> Result<(), ValidationError> {
        if let FieldKind::Relation(_) = self.kind {
            return if value.is_object() || !value.is_array() {
                Ok(())
            } else {
                Err(error("type", "relation must be an object or an id"))
            };
        }
        if !self.value_type.accepts(value) {
            let mut err = error("type", "value has the wrong type");
            err.add_param(Cow::Borrowed("expected"), &format!("{:?}", self.value_type));
            return Err(err);
        }
        match (self.kind, value) {
            (FieldKind::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|_| ())
                .map_err(|_| error("type", "value must be an RFC 3339 timestamp")),
            (FieldKind::Uuid, Value::String(s)) => Uuid::parse_str(s)
                .map(|_| ())
                .map_err(|_| error("type", "value must be a UUID")),
            (FieldKind::Enumeration, Value::String(s)) => match self.enum_items {
                Some(items) if !items.contains(&s.as_str()) => {
                    let mut err = error("enum", "value is not one of the allowed items");
                    err.add_param(Cow::Borrowed("allowed"), &items);
                    Err(err)
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    fn check_bounds(&self, code: &'static str, measure: f64) -> Result<(), ValidationError> {
        let below = self.min.is_some_and(|min| measure < min);
        let above = self.max.is_some_and(|max| measure > max);
        if !(below || above) {
            return Ok(());
        }
        let mut err = error(code, "value is out of range");
        if let Some(min) = self.min {
            err.add_param(Cow::Borrowed("min"), &min);
        }
        if let Some(max) = self.max {
            err.add_param(Cow::Borrowed("max"), &max);
        }
        err.add_param(Cow::Borrowed("actual"), &measure);
        Err(err)
    }
}

fn error(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

/// Generated primary key (integer by default).
pub fn primary_key() -> FieldDescriptor {
    FieldDescriptor::of(FieldKind::PrimaryKey, ValueType::Integer, Some("bigint")).label("ID")
}

/// Free text column.
pub fn text() -> FieldDescriptor {
    FieldDescriptor::of(FieldKind::Text, ValueType::String, Some("text"))
}

/// Whole-number column.
pub fn integer() -> FieldDescriptor {
    FieldDescriptor::of(FieldKind::Integer, ValueType::Integer, Some("bigint"))
}

/// Numeric column.
pub fn decimal() -> FieldDescriptor {
    FieldDescriptor::of(FieldKind::Decimal, ValueType::Number, Some("numeric"))
}

/// Boolean column.
pub fn boolean() -> FieldDescriptor {
    FieldDescriptor::of(FieldKind::Boolean, ValueType::Boolean, Some("boolean"))
}

/// Timestamp column holding RFC 3339 strings.
pub fn date_time() -> FieldDescriptor {
    FieldDescriptor::of(FieldKind::DateTime, ValueType::String, Some("timestamptz"))
}

/// UUID column.
pub fn uuid() -> FieldDescriptor {
    FieldDescriptor::of(FieldKind::Uuid, ValueType::String, Some("uuid"))
}

/// Column restricted to a fixed set of strings.
///
/// No database type is assumed: set one with [`FieldDescriptor::db_type`]
/// when the column uses a native enum type.
pub fn enumeration(items: &'static [&'static str]) -> FieldDescriptor {
    let mut descriptor = FieldDescriptor::of(FieldKind::Enumeration, ValueType::String, None);
    descriptor.enum_items = Some(items);
    descriptor
}

/// Free-form JSON column.
pub fn json() -> FieldDescriptor {
    FieldDescriptor::of(FieldKind::Json, ValueType::Any, Some("jsonb"))
}

/// Nested related model(s).
pub fn relation(def: RelationDef) -> FieldDescriptor {
    FieldDescriptor::of(FieldKind::Relation(def), ValueType::Any, None)
}

/// Raw id of the target of a many-to-one relation.
pub fn relation_id(relation: &'static str) -> FieldDescriptor {
    FieldDescriptor::of(FieldKind::RelationId { relation }, ValueType::Integer, Some("bigint"))
}
