//! Boolean condition trees over field comparisons.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Record;
use super::filter::{FilterField, FilterOp, FilterValue};
use crate::result::AppResult;

/// An abstract condition: comparisons combined with conjunction,
/// disjunction and negation.
///
/// The default condition is an empty conjunction, which matches every
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Every child must hold. Empty means `TRUE`.
    All(Vec<Condition>),
    /// At least one child must hold. Empty means `FALSE`.
    Any(Vec<Condition>),
    /// The child must not hold.
    Not(Box<Condition>),
    /// A single field comparison.
    Compare(FilterField),
}

impl Default for Condition {
    fn default() -> Self {
        Self::All(Vec::new())
    }
}

impl Condition {
    /// Build an implicit AND of equalities from a flat field→value map.
    ///
    /// Array values become `IN` lists. `null` becomes `IS NULL`.
    pub fn from_map(map: &Record) -> AppResult<Self> {
        let mut terms = Vec::with_capacity(map.len());
        for (field, value) in map {
            let term = match value {
                Value::Null => FilterField::new(field.clone(), FilterOp::IsNull, FilterValue::Null),
                Value::Array(_) => {
                    FilterField::new(field.clone(), FilterOp::In, FilterValue::from_json(value)?)
                }
                _ => FilterField::eq(field.clone(), FilterValue::from_json(value)?),
            };
            terms.push(Self::Compare(term));
        }
        Ok(Self::All(terms))
    }

    /// A single equality comparison.
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Compare(FilterField::eq(field, value))
    }

    /// A single comparison with an explicit operator.
    pub fn compare(field: impl Into<String>, op: FilterOp, value: impl Into<FilterValue>) -> Self {
        Self::Compare(FilterField::new(field, op, value))
    }

    /// Conjunction of the given conditions.
    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::All(conditions.into_iter().collect())
    }

    /// Disjunction of the given conditions.
    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::Any(conditions.into_iter().collect())
    }

    /// Negation of this condition.
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Conjoin another condition, flattening into an existing `All`.
    pub fn and(self, other: Condition) -> Self {
        match self {
            Self::All(mut terms) => {
                terms.push(other);
                Self::All(terms)
            }
            first => Self::All(vec![first, other]),
        }
    }

    /// Whether this condition is the empty conjunction.
    pub fn is_trivial(&self) -> bool {
        matches!(self, Self::All(terms) if terms.is_empty())
    }

    /// Every field name referenced anywhere in the tree, in visiting order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::All(children) | Self::Any(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Self::Not(child) => child.collect_fields(out),
            Self::Compare(term) => out.push(term.field.as_str()),
        }
    }

    /// Evaluate this condition against an in-memory record.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All(children) => children.iter().all(|c| c.matches(record)),
            Self::Any(children) => children.iter().any(|c| c.matches(record)),
            Self::Not(child) => !child.matches(record),
            Self::Compare(term) => term.matches_json(record.get(&term.field)),
        }
    }
}

impl From<FilterField> for Condition {
    fn from(term: FilterField) -> Self {
        Self::Compare(term)
    }
}
