//! Process-wide field metadata store.
//!
//! Maps (model type, property name) to a [`FieldDescriptor`] and keeps, per
//! model type, the ordered list of described properties. Both are written
//! by the same call, so a listed property always has a descriptor. The
//! store only grows.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::LazyLock;

use dashmap::DashMap;
use serde_json::Value;
use tracing::trace;
use validator::ValidationErrors;

use crudkit_core::error::{AppError, ErrorKind};
use crudkit_core::result::AppResult;
use crudkit_core::types::Record;

use crate::field::FieldDescriptor;
use crate::model::Model;

/// Fields described for one model type.
#[derive(Debug, Default)]
struct ModelEntry {
    order: Vec<&'static str>,
    fields: HashMap<&'static str, FieldDescriptor>,
}

static FIELDS: LazyLock<DashMap<TypeId, ModelEntry>> = LazyLock::new(DashMap::new);
static DESCRIBED: LazyLock<DashMap<TypeId, &'static str>> = LazyLock::new(DashMap::new);

/// Register (or overwrite) the descriptor of one property of `M`.
///
/// Redefining a property keeps its original position in the field list.
pub fn define<M: 'static>(name: &'static str, descriptor: FieldDescriptor) {
    trace!(model = type_name::<M>(), field = name, kind = descriptor.kind.name(), "Defining field");
    let mut entry = FIELDS.entry(TypeId::of::<M>()).or_default();
    if entry.fields.insert(name, descriptor).is_none() {
        entry.order.push(name);
    }
}

/// Descriptor of one property of `M`, if described.
pub fn get<M: 'static>(name: &str) -> Option<FieldDescriptor> {
    FIELDS
        .get(&TypeId::of::<M>())
        .and_then(|entry| entry.fields.get(name).cloned())
}

/// Described properties of `M` in definition order. Empty when `M` was never
/// described.
pub fn list_fields<M: 'static>() -> Vec<&'static str> {
    FIELDS
        .get(&TypeId::of::<M>())
        .map(|entry| entry.order.clone())
        .unwrap_or_default()
}

/// Whether at least one field of `M` has been described.
pub fn is_fully_described<M: 'static>() -> bool {
    FIELDS
        .get(&TypeId::of::<M>())
        .is_some_and(|entry| !entry.order.is_empty())
}

/// Described properties of `M` whose kind is a relation or a relation id.
pub fn relation_fields<M: 'static>() -> Vec<&'static str> {
    FIELDS
        .get(&TypeId::of::<M>())
        .map(|entry| {
            entry
                .order
                .iter()
                .copied()
                .filter(|name| entry.fields[name].kind.is_relational())
                .collect()
        })
        .unwrap_or_default()
}

/// Every (property, descriptor) pair of `M` in definition order.
pub fn descriptors<M: 'static>() -> Vec<(&'static str, FieldDescriptor)> {
    FIELDS
        .get(&TypeId::of::<M>())
        .map(|entry| {
            entry
                .order
                .iter()
                .map(|name| (*name, entry.fields[name].clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Run the model's own field declarations once per process.
///
/// Concurrent first calls may both run the declarations; definitions are
/// idempotent so the outcome is the same.
pub fn ensure<M: Model>() {
    let id = TypeId::of::<M>();
    if DESCRIBED.contains_key(&id) {
        return;
    }
    M::describe(describe::<M>()).register();
    DESCRIBED.insert(id, type_name::<M>());
}

/// Fail with `Misconfigured` unless `M` has described fields.
pub fn require_described<M: Model>() -> AppResult<()> {
    ensure::<M>();
    if is_fully_described::<M>() {
        Ok(())
    } else {
        Err(AppError::misconfigured(format!(
            "Model {} has no described fields",
            type_name::<M>()
        )))
    }
}

/// Start a fluent schema declaration for `M`.
pub fn describe<M: 'static>() -> ModelSchema<M> {
    ModelSchema {
        fields: Vec::new(),
        _model: PhantomData,
    }
}

/// Fluent declaration of a model's fields, written to the store by
/// [`ModelSchema::register`].
#[derive(Debug)]
pub struct ModelSchema<M> {
    fields: Vec<(&'static str, FieldDescriptor)>,
    _model: PhantomData<fn() -> M>,
}

impl<M: 'static> ModelSchema<M> {
    /// Declare one property.
    pub fn field(mut self, name: &'static str, descriptor: FieldDescriptor) -> Self {
        self.fields.push((name, descriptor));
        self
    }

    /// Copy every field currently described on `B`.
    ///
    /// Inheritance is explicit: later changes to `B` are not seen by `M`.
    pub fn inherit<B: 'static>(mut self) -> Self {
        self.fields.extend(descriptors::<B>());
        self
    }

    /// Write every declared field to the store.
    pub fn register(self) {
        for (name, descriptor) in self.fields {
            define::<M>(name, descriptor);
        }
    }
}

/// Check a record against every descriptor of `M`.
pub fn check_record<M: 'static>(record: &Record) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    for (name, descriptor) in descriptors::<M>() {
        if let Err(err) = descriptor.check(record.get(name)) {
            errors.add(name, err);
        }
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Validate a model against its field descriptors.
pub fn validate<M: Model>(model: &M) -> AppResult<()> {
    require_described::<M>()?;
    let Value::Object(record) = serde_json::to_value(model)? else {
        return Err(AppError::new(
            ErrorKind::Serialization,
            format!("Model {} does not serialize to an object", type_name::<M>()),
        ));
    };
    check_record::<M>(&record).map_err(|errors| {
        AppError::with_source(
            ErrorKind::Validation,
            format!("Model {} failed validation", type_name::<M>()),
            errors,
        )
    })
}
