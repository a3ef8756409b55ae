//! Relationship values and their normalization to key tuples.
//!
//! A to-one relationship can be assigned in four shapes:
//!
//! - a [`Reference`] handle (entity name plus key, no loaded state)
//! - a loaded [`EntityInstance`]
//! - a raw [`KeyTuple`]
//! - nothing at all (`Null` / `Unset`)
//!
//! [`normalize`] turns every shape into the same ordered, type-coerced key
//! tuple aligned with the relation's foreign key columns.
//!
//! ```
//! use keystone::reference::{reference, RelationValue};
//!
//! let owner = RelationValue::from(reference("User", [1, 1]));
//! let same_owner = RelationValue::key([1, 1]);
//! # let _ = (owner, same_owner);
//! ```

pub mod normalize;
#[doc(inline)]
pub use normalize::{entity_key, normalize};

use crate::instance::EntityInstance;
use crate::value::KeyTuple;

/// Lightweight handle to an entity identified by its key
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    entity: String,
    key: KeyTuple,
}

impl Reference {
    pub fn new(entity: impl Into<String>, key: impl Into<KeyTuple>) -> Self {
        Self {
            entity: entity.into(),
            key: key.into(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn key(&self) -> &KeyTuple {
        &self.key
    }

    pub fn into_key(self) -> KeyTuple {
        self.key
    }
}

/// Shorthand for [`Reference::new`]
pub fn reference(entity: impl Into<String>, key: impl Into<KeyTuple>) -> Reference {
    Reference::new(entity, key)
}

/// Value held by a to-one relationship
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RelationValue {
    /// Never assigned
    #[default]
    Unset,
    /// Explicitly cleared
    Null,
    Reference(Reference),
    Loaded(Box<EntityInstance>),
    Key(KeyTuple),
}

impl RelationValue {
    /// Raw key tuple value
    pub fn key(key: impl Into<KeyTuple>) -> Self {
        RelationValue::Key(key.into())
    }

    /// `Null` or `Unset`
    pub fn is_empty(&self) -> bool {
        matches!(self, RelationValue::Null | RelationValue::Unset)
    }

    /// Entity named by a reference or loaded instance
    pub fn entity(&self) -> Option<&str> {
        match self {
            RelationValue::Reference(r) => Some(r.entity()),
            RelationValue::Loaded(instance) => Some(instance.entity()),
            _ => None,
        }
    }

    /// The loaded instance, if this relationship was populated
    pub fn loaded(&self) -> Option<&EntityInstance> {
        match self {
            RelationValue::Loaded(instance) => Some(instance),
            _ => None,
        }
    }
}

impl From<Reference> for RelationValue {
    fn from(reference: Reference) -> Self {
        RelationValue::Reference(reference)
    }
}

impl From<EntityInstance> for RelationValue {
    fn from(instance: EntityInstance) -> Self {
        RelationValue::Loaded(Box::new(instance))
    }
}

impl From<KeyTuple> for RelationValue {
    fn from(key: KeyTuple) -> Self {
        RelationValue::Key(key)
    }
}

impl<T: Into<RelationValue>> From<Option<T>> for RelationValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(RelationValue::Null, Into::into)
    }
}
