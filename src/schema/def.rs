//! Normalized entity definitions.
//!
//! These types are produced by [`crate::schema::register`] and never mutated
//! afterwards. Key columns and foreign-key column sets are already resolved.

use crate::key::{ColumnSet, KeyColumn};
use crate::value::ScalarType;
use serde::{Deserialize, Serialize};

/// Cardinality of a relationship, seen from the declaring entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Many-to-one or one-to-one; the owning side stores the foreign key
    #[serde(alias = "many_to_one", alias = "one_to_one")]
    ToOne,
    /// One-to-many inverse collection, resolved through `mapped_by`
    #[serde(alias = "one_to_many")]
    ToMany,
}

/// Action taken on dependents when a referenced row is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteRule {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
}

/// A scalar field mapped to one physical column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub column: String,
    pub scalar: ScalarType,
    pub nullable: bool,
    pub primary: bool,
}

/// A relationship to another entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub name: String,
    pub kind: RelationKind,
    pub target: String,
    /// Whether this side stores the foreign key
    pub owner: bool,
    /// Whether the foreign key is also part of the owner's primary key
    pub primary: bool,
    pub nullable: bool,
    pub on_delete: DeleteRule,
    /// Back-reference on the target for inverse collections
    pub mapped_by: Option<String>,
    /// Rows that lose this parent are deleted instead of following `on_delete`
    pub orphan_removal: bool,
    /// Foreign key columns on the owning table; empty for inverse collections
    pub columns: ColumnSet,
}

impl RelationDef {
    /// To-one relation whose foreign key lives on the declaring table
    pub fn is_owning_to_one(&self) -> bool {
        self.kind == RelationKind::ToOne && self.owner
    }
}

/// One member of a composite primary key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyComponent {
    Field(String),
    Relation(String),
}

impl KeyComponent {
    pub fn name(&self) -> &str {
        match self {
            KeyComponent::Field(name) | KeyComponent::Relation(name) => name,
        }
    }
}

/// Where the value of a physical column comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    Field(String),
    /// Position `position` of the foreign key of `relation`
    Relation { relation: String, position: usize },
}

/// A physical column of an entity table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalColumn {
    pub name: String,
    pub scalar: ScalarType,
    pub nullable: bool,
    pub primary: bool,
    pub source: ColumnSource,
}

/// Borrowed view of a field or relation
#[derive(Debug, Clone, Copy)]
pub enum Member<'a> {
    Field(&'a FieldDef),
    Relation(&'a RelationDef),
}

/// A registered, concrete entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDef {
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldDef>,
    pub relations: Vec<RelationDef>,
    pub key_components: Vec<KeyComponent>,
    /// Primary key columns with their source paths, in key order
    pub primary_key: Vec<KeyColumn>,
    /// All physical columns: key columns first, then fields, then foreign keys
    pub columns: Vec<PhysicalColumn>,
}

impl EntityDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn member(&self, name: &str) -> Option<Member<'_>> {
        self.field(name)
            .map(Member::Field)
            .or_else(|| self.relation(name).map(Member::Relation))
    }

    pub fn column(&self, name: &str) -> Option<&PhysicalColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether the named member is a primary key component
    pub fn is_key_component(&self, name: &str) -> bool {
        self.key_components.iter().any(|c| c.name() == name)
    }

    /// Primary key columns as an ordered column set
    pub fn key_columns(&self) -> ColumnSet {
        ColumnSet::new(self.primary_key.iter().map(|k| k.column.clone()).collect())
    }

    pub fn key_arity(&self) -> usize {
        self.primary_key.len()
    }

    /// Owning to-one relations, in declaration order
    pub fn owning_relations(&self) -> impl Iterator<Item = &RelationDef> + '_ {
        self.relations.iter().filter(|r| r.is_owning_to_one())
    }

    /// Whether an inverse collection of this entity removes orphans reached
    /// through `dependent.back`
    pub fn removes_orphans(&self, dependent: &str, back: &str) -> bool {
        self.relations.iter().any(|r| {
            r.orphan_removal
                && !r.owner
                && r.target == dependent
                && r.mapped_by.as_deref() == Some(back)
        })
    }
}
