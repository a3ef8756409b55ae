//! Caller-facing filters over member paths.
//!
//! Paths are dotted member names starting at the queried entity: `"name"`,
//! `"form"`, `"form.owner.name"`. A filter on a relationship compares the
//! whole foreign key tuple, so any of the four relationship value shapes can
//! be used as the operand.

use crate::reference::RelationValue;
use crate::value::KeyTuple;
use sea_query::Value;

/// Operand of an equality filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Scalar(Value),
    Relation(RelationValue),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, FilterValue),
    IsNull(String),
    NotNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Matches every row
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(path.into(), FilterValue::Scalar(value.into()))
    }

    /// Compare a relationship with a reference, loaded instance or key
    pub fn related(path: impl Into<String>, value: impl Into<RelationValue>) -> Self {
        Filter::Eq(path.into(), FilterValue::Relation(value.into()))
    }

    pub fn key(path: impl Into<String>, key: impl Into<KeyTuple>) -> Self {
        Filter::related(path, RelationValue::Key(key.into()))
    }

    pub fn is_null(path: impl Into<String>) -> Self {
        Filter::IsNull(path.into())
    }

    pub fn not_null(path: impl Into<String>) -> Self {
        Filter::NotNull(path.into())
    }

    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut filters) => {
                filters.push(other);
                Filter::And(filters)
            }
            filter => Filter::And(vec![filter, other]),
        }
    }

    #[must_use]
    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut filters) => {
                filters.push(other);
                Filter::Or(filters)
            }
            filter => Filter::Or(vec![filter, other]),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_flattens() {
        let filter = Filter::eq("name", "a")
            .and(Filter::is_null("owner"))
            .and(Filter::not_null("org"));
        match filter {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_key_filter_wraps_relation_value() {
        assert_eq!(
            Filter::key("owner", [1, 1]),
            Filter::Eq(
                "owner".into(),
                FilterValue::Relation(RelationValue::Key(KeyTuple::from([1, 1])))
            )
        );
    }
}
