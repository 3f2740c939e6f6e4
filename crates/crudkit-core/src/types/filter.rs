//! Filter types for dynamic query building.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::result::AppResult;

/// Filter comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Exact equality.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// SQL `LIKE` pattern match.
    Like,
    /// SQL `ILIKE` case-insensitive pattern match.
    ILike,
    /// SQL `IN` list membership.
    In,
    /// SQL `IS NULL` check.
    IsNull,
    /// SQL `IS NOT NULL` check.
    IsNotNull,
}

impl FilterOp {
    /// Return the SQL operator for binary comparisons.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
            Self::In => "IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }
}

/// A dynamic filter value that can represent various SQL types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// A string value.
    String(String),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
    /// A boolean value.
    Boolean(bool),
    /// A list of values (for the `IN` operator).
    List(Vec<FilterValue>),
    /// Null / no value (for `IS NULL`, `IS NOT NULL`).
    Null,
}

impl FilterValue {
    /// Convert a JSON scalar (or array of scalars) into a filter value.
    ///
    /// Objects cannot be compared and are rejected.
    pub fn from_json(value: &Value) -> AppResult<Self> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => {
                Self::List(items.iter().map(Self::from_json).collect::<AppResult<_>>()?)
            }
            Value::Object(_) => {
                return Err(AppError::validation(
                    "Nested objects cannot be used as filter values",
                ));
            }
        })
    }

    /// Convert this filter value into its JSON representation.
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::Boolean(b) => Value::Bool(*b),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Null => Value::Null,
        }
    }

    /// Whether this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Compare a stored JSON value against this filter value.
    ///
    /// Numbers compare numerically regardless of integer/float encoding and
    /// strings compare lexicographically. Mismatched types are unordered.
    pub fn compare_json(&self, stored: &Value) -> Option<Ordering> {
        match (stored, self) {
            (Value::Number(a), Self::Integer(b)) => a.as_f64()?.partial_cmp(&(*b as f64)),
            (Value::Number(a), Self::Float(b)) => a.as_f64()?.partial_cmp(b),
            (Value::String(a), Self::String(b)) => Some(a.as_str().cmp(b.as_str())),
            (Value::Bool(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Value::Null, Self::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// A single filter condition on a named field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterField {
    /// The model property to filter on.
    pub field: String,
    /// The comparison operator.
    pub op: FilterOp,
    /// The value to compare against.
    #[serde(default = "null_value")]
    pub value: FilterValue,
}

impl FilterField {
    /// Create a new filter field.
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Shorthand for an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    /// Shorthand for a case-insensitive LIKE filter.
    pub fn ilike(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, FilterOp::ILike, FilterValue::String(pattern.into()))
    }

    /// Evaluate this filter against a stored JSON value (`None` when the
    /// property is absent from the record).
    pub fn matches_json(&self, stored: Option<&Value>) -> bool {
        let stored = stored.unwrap_or(&Value::Null);
        match self.op {
            FilterOp::IsNull => stored.is_null(),
            FilterOp::IsNotNull => !stored.is_null(),
            FilterOp::Eq => json_eq(stored, &self.value),
            FilterOp::Ne => !json_eq(stored, &self.value),
            FilterOp::Gt => self.value.compare_json(stored) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                self.value.compare_json(stored),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => self.value.compare_json(stored) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                self.value.compare_json(stored),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::In => match &self.value {
                FilterValue::List(items) => items.iter().any(|item| json_eq(stored, item)),
                other => json_eq(stored, other),
            },
            FilterOp::Like | FilterOp::ILike => match (stored, &self.value) {
                (Value::String(text), FilterValue::String(pattern)) => {
                    if self.op == FilterOp::ILike {
                        like_match(&text.to_lowercase(), &pattern.to_lowercase())
                    } else {
                        like_match(text, pattern)
                    }
                }
                _ => false,
            },
        }
    }
}

fn null_value() -> FilterValue {
    FilterValue::Null
}

fn json_eq(stored: &Value, value: &FilterValue) -> bool {
    value.compare_json(stored) == Some(Ordering::Equal)
}

/// SQL `LIKE` semantics: `%` matches any run, `_` matches one character.
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            p = star_p + 1;
            t = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '%')
}
