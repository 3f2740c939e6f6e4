//! # crudkit-entity
//!
//! Model-side metadata for crudkit. Field descriptors are declared once per
//! model type through [`registry::describe`] (or [`Model::describe`]) and
//! drive validation, the structural [`EntityMetadata`] used by backends,
//! and the model/entity [`mapper`].

pub mod field;
pub mod mapper;
pub mod metadata;
pub mod model;
pub mod registry;

pub use field::{FieldDescriptor, FieldKind, JoinTable, RelationDef, RelationKind, ValueType};
pub use metadata::EntityMetadata;
pub use model::{Model, Patch};
pub use registry::ModelSchema;
