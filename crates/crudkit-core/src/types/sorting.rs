//! Sort keys.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Orient an ascending comparison.
    pub fn apply(&self, ascending: Ordering) -> Ordering {
        match self {
            Self::Asc => ascending,
            Self::Desc => ascending.reverse(),
        }
    }
}

/// One sort key: a model property and a direction.
///
/// Parses from the `title` / `-title` shorthand, where a leading `-` means
/// descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortField {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}

impl FromStr for SortField {
    type Err = AppError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let (field, direction) = match key.trim().strip_prefix('-') {
            Some(rest) => (rest, SortDirection::Desc),
            None => (key.trim(), SortDirection::Asc),
        };
        if field.is_empty() {
            return Err(AppError::validation(format!("Invalid sort key '{key}'")));
        }
        Ok(Self::new(field, direction))
    }
}
