//! Conversion between domain models and persistence entities.

use serde_json::Value;

use crudkit_core::error::{AppError, ErrorKind};
use crudkit_core::result::AppResult;
use crudkit_core::types::Record;

use crate::field::RelationKind;
use crate::metadata::{EntityMetadata, key_of};
use crate::model::Model;
use crate::registry;

/// Serialize a model into a property map.
pub fn to_record<M: Model>(model: &M) -> AppResult<Record> {
    match serde_json::to_value(model)? {
        Value::Object(record) => Ok(record),
        other => Err(AppError::new(
            ErrorKind::Serialization,
            format!("{} serialized to a non-object value: {other}", meta_name::<M>()),
        )),
    }
}

/// Shape a model into the entity a backend persists.
///
/// Relation properties keep nested objects, with bare ids wrapped as
/// `{target_key: id}`; relation id properties keep raw ids, with nested
/// objects reduced to their key. Everything else passes through. The model
/// itself is not touched.
pub fn model_to_entity<M: Model>(meta: &EntityMetadata, model: &M) -> AppResult<Record> {
    registry::require_described::<M>()?;
    Ok(shape_entity(meta, to_record(model)?))
}

/// Shape an arbitrary property map (for instance a patch) the same way as
/// [`model_to_entity`].
pub fn shape_entity(meta: &EntityMetadata, mut record: Record) -> Record {
    for relation in &meta.relations {
        if let Some(value) = record.get_mut(relation.property) {
            let target_key = relation.def.target_key;
            match (relation.def.kind, value) {
                (RelationKind::ManyToOne, value) => wrap_key(value, target_key),
                (_, Value::Array(items)) => items.iter_mut().for_each(|item| wrap_key(item, target_key)),
                _ => {}
            }
        }
    }
    for rid in &meta.relation_ids {
        let target_key = meta
            .relation(rid.relation)
            .map(|r| r.def.target_key)
            .unwrap_or("id");
        if let Some(value) = record.get_mut(rid.property) {
            if value.is_object() {
                *value = key_of(value, target_key);
            }
        }
    }
    record
}

fn wrap_key(value: &mut Value, target_key: &str) {
    if !(value.is_object() || value.is_null() || value.is_array()) {
        let mut nested = Record::new();
        nested.insert(target_key.to_string(), value.take());
        *value = Value::Object(nested);
    }
}

/// Build a model from an entity or any other property map.
///
/// Permissive: every property is handed to serde, nothing is filtered
/// against the described fields.
pub fn any_to_model<M: Model>(source: impl Into<Value>) -> AppResult<M> {
    serde_json::from_value(source.into()).map_err(|e| {
        AppError::with_source(
            ErrorKind::Serialization,
            format!("Failed to build {} from record: {e}", meta_name::<M>()),
            e,
        )
    })
}

/// Overwrite every property of `target` that is present on `source`.
///
/// Shallow per property: a nested relation object on `source` replaces the
/// one on `target` wholesale.
pub fn apply_changes_to_model<M: Model>(target: &mut M, source: &Record) -> AppResult<()> {
    let mut merged = to_record(target)?;
    for (name, value) in source {
        merged.insert(name.clone(), value.clone());
    }
    *target = any_to_model(merged)?;
    Ok(())
}

fn meta_name<M>() -> &'static str {
    std::any::type_name::<M>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{self, JoinTable, RelationDef};
    use crate::registry::ModelSchema;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Writer {
        id: i64,
        name: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Label {
        id: i64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Story {
        id: Option<i64>,
        title: String,
        summary: Option<String>,
        writer_id: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        writer: Option<Writer>,
        #[serde(skip_serializing_if = "Option::is_none")]
        labels: Option<Vec<Label>>,
    }

    impl Model for Story {
        fn describe(schema: ModelSchema<Self>) -> ModelSchema<Self> {
            schema
                .field("id", field::primary_key())
                .field("title", field::text().required())
                .field("summary", field::text())
                .field("writer", field::relation(RelationDef::many_to_one("writers", "writer_id")))
                .field("writer_id", field::relation_id("writer"))
                .field(
                    "labels",
                    field::relation(RelationDef::many_to_many(
                        "labels",
                        JoinTable {
                            name: "story_labels",
                            owner_column: "story_id",
                            target_column: "label_id",
                        },
                    )),
                )
        }
    }

    fn story() -> Story {
        Story {
            id: Some(4),
            title: "Dune".into(),
            summary: None,
            writer_id: Some(2),
            writer: Some(Writer {
                id: 2,
                name: "Frank".into(),
            }),
            labels: Some(vec![Label { id: 1 }, Label { id: 5 }]),
        }
    }

    fn meta() -> EntityMetadata {
        EntityMetadata::of::<Story>("stories").unwrap()
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let original = story();
        let entity = model_to_entity(&meta(), &original).unwrap();
        let back: Story = any_to_model(entity).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_shape_wraps_bare_ids_and_reduces_objects() {
        let record = json!({
            "writer": 9,
            "writer_id": {"id": 9, "name": "x"},
            "labels": [3, {"id": 4}],
            "extra": "kept"
        });
        let shaped = shape_entity(&meta(), record.as_object().cloned().unwrap());
        assert_eq!(
            Value::Object(shaped),
            json!({
                "writer": {"id": 9},
                "writer_id": 9,
                "labels": [{"id": 3}, {"id": 4}],
                "extra": "kept"
            })
        );
    }

    #[test]
    fn test_model_to_entity_does_not_mutate() {
        let original = story();
        let copy = original.clone();
        let _ = model_to_entity(&meta(), &original).unwrap();
        assert_eq!(original, copy);
    }

    #[test]
    fn test_any_to_model_is_permissive() {
        let record = json!({"id": 1, "title": "t", "summary": null, "writer_id": null, "unknown": 1});
        let model: Story = any_to_model(record).unwrap();
        assert_eq!(model.title, "t");
    }

    #[test]
    fn test_apply_changes_overlays_present_properties_only() {
        let prev = story();
        let mut next = prev.clone();
        let patch = json!({"summary": "Spice", "writer": {"id": 3, "name": "Brian"}});
        apply_changes_to_model(&mut next, patch.as_object().unwrap()).unwrap();

        assert_eq!(next.summary.as_deref(), Some("Spice"));
        assert_eq!(next.writer.as_ref().map(|w| w.name.as_str()), Some("Brian"));
        assert_eq!(next.title, prev.title);
        assert_eq!(next.labels, prev.labels);
        assert_eq!(next.writer_id, prev.writer_id);
    }

    #[test]
    fn test_apply_changes_replaces_relation_wholesale() {
        let mut next = story();
        let patch = json!({"writer": {"id": 2}});
        let err = apply_changes_to_model(&mut next, patch.as_object().unwrap()).unwrap_err();
        // the nested object loses its sibling `name`, so it no longer fits `Writer`
        assert_eq!(err.kind, ErrorKind::Serialization);
    }
}
