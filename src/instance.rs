//! Entity instances and member assignments.
//!
//! An [`EntityInstance`] is a plain record: the entity name, the members that
//! have been assigned, and any collections loaded by population. It carries no
//! schema knowledge; validation happens when an operation consumes it.

use crate::reference::{Reference, RelationValue};
use crate::value::KeyTuple;
use indexmap::IndexMap;
use sea_query::Value;

/// Value assigned to one member
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Scalar(Value),
    Relation(RelationValue),
}

impl Assignment {
    /// View as a relationship value; a scalar counts as a single-column key
    pub fn to_relation_value(&self) -> RelationValue {
        match self {
            Assignment::Scalar(value) => RelationValue::Key(KeyTuple::new(vec![value.clone()])),
            Assignment::Relation(value) => value.clone(),
        }
    }
}

/// Ordered member assignments
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Assignments(IndexMap<String, Assignment>);

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, member: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(member, value);
        self
    }

    #[must_use]
    pub fn with_relation(
        mut self,
        member: impl Into<String>,
        value: impl Into<RelationValue>,
    ) -> Self {
        self.relate(member, value);
        self
    }

    pub fn set(&mut self, member: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(member.into(), Assignment::Scalar(value.into()));
        self
    }

    pub fn relate(
        &mut self,
        member: impl Into<String>,
        value: impl Into<RelationValue>,
    ) -> &mut Self {
        self.0
            .insert(member.into(), Assignment::Relation(value.into()));
        self
    }

    pub fn get(&self, member: &str) -> Option<&Assignment> {
        self.0.get(member)
    }

    pub fn remove(&mut self, member: &str) -> Option<Assignment> {
        self.0.shift_remove(member)
    }

    pub fn contains(&self, member: &str) -> bool {
        self.0.contains_key(member)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Assignment)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A record of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInstance {
    entity: String,
    values: Assignments,
    collections: IndexMap<String, Vec<EntityInstance>>,
}

impl EntityInstance {
    pub fn new(entity: impl Into<String>) -> Self {
        Self::from_assignments(entity, Assignments::new())
    }

    pub fn from_assignments(entity: impl Into<String>, values: Assignments) -> Self {
        Self {
            entity: entity.into(),
            values,
            collections: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, member: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.set(member, value);
        self
    }

    #[must_use]
    pub fn with_relation(
        mut self,
        member: impl Into<String>,
        value: impl Into<RelationValue>,
    ) -> Self {
        self.values.relate(member, value);
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn values(&self) -> &Assignments {
        &self.values
    }

    pub fn set(&mut self, member: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.set(member, value);
        self
    }

    pub fn relate(
        &mut self,
        member: impl Into<String>,
        value: impl Into<RelationValue>,
    ) -> &mut Self {
        self.values.relate(member, value);
        self
    }

    /// Clear a relationship; every foreign key column is nulled on flush
    pub fn clear(&mut self, relation: impl Into<String>) -> &mut Self {
        self.values.relate(relation, RelationValue::Null);
        self
    }

    pub fn get(&self, member: &str) -> Option<&Assignment> {
        self.values.get(member)
    }

    /// Scalar value of a field
    pub fn scalar(&self, member: &str) -> Option<&Value> {
        match self.values.get(member) {
            Some(Assignment::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    /// Relationship value, converting a lone scalar into a one-column key
    pub fn relation_value(&self, member: &str) -> Option<RelationValue> {
        self.values.get(member).map(Assignment::to_relation_value)
    }

    /// The instance a to-one relationship was populated with
    pub fn related(&self, relation: &str) -> Option<&EntityInstance> {
        match self.values.get(relation) {
            Some(Assignment::Relation(value)) => value.loaded(),
            _ => None,
        }
    }

    /// Reference held by a to-one relationship that was not populated
    pub fn reference(&self, relation: &str) -> Option<&Reference> {
        match self.values.get(relation) {
            Some(Assignment::Relation(RelationValue::Reference(r))) => Some(r),
            _ => None,
        }
    }

    pub fn collection(&self, relation: &str) -> Option<&[EntityInstance]> {
        self.collections.get(relation).map(Vec::as_slice)
    }

    pub(crate) fn collection_mut(&mut self, relation: &str) -> &mut Vec<EntityInstance> {
        self.collections.entry(relation.to_string()).or_default()
    }
}
