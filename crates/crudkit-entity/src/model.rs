//! Domain model contract and partial-update patches.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crudkit_core::error::{AppError, ErrorKind};
use crudkit_core::result::AppResult;
use crudkit_core::types::Record;

use crate::registry::ModelSchema;

/// A plain data type whose persistence is handled by a repository.
///
/// Relation fields are usually `Option`. An unloaded relation, whether
/// skipped or serialized as `null`, is never written back as a cleared one.
pub trait Model: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Property holding the primary key.
    const PRIMARY_KEY: &'static str = "id";

    /// Declare this model's fields. Run once per process by
    /// [`crate::registry::ensure`].
    fn describe(schema: ModelSchema<Self>) -> ModelSchema<Self> {
        schema
    }
}

/// The properties a caller wants to change, and nothing else.
///
/// Absent properties are left untouched by an update; a property set to
/// `null` is cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Patch(Record);

impl Patch {
    /// An empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a patch from a JSON object.
    pub fn from_value(value: Value) -> AppResult<Self> {
        match value {
            Value::Object(record) => Ok(Self(record)),
            other => Err(AppError::new(
                ErrorKind::Validation,
                format!("A patch must be a JSON object, got {other}"),
            )),
        }
    }

    /// Build a patch from any serializable DTO. `null` properties are
    /// treated as absent, so `Option::None` fields leave data untouched.
    pub fn from_serializable<T: Serialize>(dto: &T) -> AppResult<Self> {
        let mut patch = Self::from_value(serde_json::to_value(dto)?)?;
        patch.0.retain(|_, value| !value.is_null());
        Ok(patch)
    }

    /// Set one property.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Whether the patch carries the given property.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Property names carried by the patch.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Borrow the underlying record.
    pub fn as_record(&self) -> &Record {
        &self.0
    }

    /// Take the underlying record.
    pub fn into_record(self) -> Record {
        self.0
    }
}

impl From<Record> for Patch {
    fn from(record: Record) -> Self {
        Self(record)
    }
}
