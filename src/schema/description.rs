//! Structural entity descriptions, the input of the registry.
//!
//! Descriptions arrive either from code through the builder methods below or
//! from a JSON document (see [`load_descriptions`]). They carry names, column
//! overrides, scalar types, nullability, key roles and cascade rules; the
//! registry turns them into [`crate::schema::EntityDef`]s.
//!
//! # Example
//!
//! ```
//! use keystone::schema::{EntityDescription, FieldDescription, RelationDescription, DeleteRule};
//! use keystone::ScalarType;
//!
//! // A reusable key fragment: every tenant-scoped entity is keyed by (org, id)
//! let common = EntityDescription::fragment("Common")
//!     .primary_key(["org", "id"])
//!     .relation(
//!         RelationDescription::to_one("org", "Organisation")
//!             .primary()
//!             .columns(["org_id"])
//!             .on_delete(DeleteRule::Cascade),
//!     )
//!     .field(FieldDescription::new("id", ScalarType::Integer).primary());
//!
//! let form = EntityDescription::new("Form")
//!     .extends("Common")
//!     .field(FieldDescription::new("name", ScalarType::Text))
//!     .relation(RelationDescription::to_one("owner", "User").nullable());
//! # let _ = (common, form);
//! ```

use crate::error::SchemaError;
use crate::schema::def::{DeleteRule, RelationKind};
use crate::value::ScalarType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Description of one entity or abstract fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescription {
    pub name: String,
    #[serde(default)]
    pub table: Option<String>,
    /// Abstract fragments have no table and are merged into entities that extend them
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDescription>,
    #[serde(default)]
    pub relations: Vec<RelationDescription>,
    /// Explicit key order; defaults to declaration order of primary members
    #[serde(default)]
    pub primary_key: Option<Vec<String>>,
}

/// Description of a scalar field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescription {
    pub name: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(rename = "type")]
    pub scalar: ScalarType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary: bool,
}

/// Description of a relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescription {
    pub name: String,
    pub kind: RelationKind,
    pub target: String,
    /// Defaults to `true` for to-one and `false` for to-many relations
    #[serde(default)]
    pub owner: Option<bool>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub nullable: bool,
    /// Explicit foreign key column names, one per target key column
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub on_delete: DeleteRule,
    #[serde(default)]
    pub mapped_by: Option<String>,
    #[serde(default)]
    pub orphan_removal: bool,
}

impl EntityDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            is_abstract: false,
            extends: None,
            fields: Vec::new(),
            relations: Vec::new(),
            primary_key: None,
        }
    }

    /// Abstract fragment that concrete entities can extend
    pub fn fragment(name: impl Into<String>) -> Self {
        Self {
            is_abstract: true,
            ..Self::new(name)
        }
    }

    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.extends = Some(base.into());
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldDescription) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: RelationDescription) -> Self {
        self.relations.push(relation);
        self
    }

    #[must_use]
    pub fn primary_key<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = Some(members.into_iter().map(Into::into).collect());
        self
    }
}

impl FieldDescription {
    pub fn new(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            column: None,
            scalar,
            nullable: false,
            primary: false,
        }
    }

    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }
}

impl RelationDescription {
    fn with_kind(name: impl Into<String>, kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            owner: None,
            primary: false,
            nullable: false,
            columns: None,
            on_delete: DeleteRule::default(),
            mapped_by: None,
            orphan_removal: false,
        }
    }

    /// Many-to-one relation owning its foreign key
    pub fn to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_kind(name, RelationKind::ToOne, target)
    }

    /// Inverse collection; needs [`RelationDescription::mapped_by`]
    pub fn to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_kind(name, RelationKind::ToMany, target)
    }

    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn on_delete(mut self, rule: DeleteRule) -> Self {
        self.on_delete = rule;
        self
    }

    #[must_use]
    pub fn mapped_by(mut self, relation: impl Into<String>) -> Self {
        self.mapped_by = Some(relation.into());
        self
    }

    #[must_use]
    pub fn orphan_removal(mut self) -> Self {
        self.orphan_removal = true;
        self
    }

    /// Whether this side stores the foreign key
    pub fn is_owner(&self) -> bool {
        self.owner.unwrap_or(self.kind == RelationKind::ToOne)
    }
}

/// Envelope accepted by [`load_descriptions`]: a bare array or `{ "entities": [...] }`
#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptionDocument {
    List(Vec<EntityDescription>),
    Wrapped { entities: Vec<EntityDescription> },
}

/// Parse entity descriptions from a JSON string
pub fn parse_descriptions(json: &str) -> Result<Vec<EntityDescription>, SchemaError> {
    let document: DescriptionDocument =
        serde_json::from_str(json).map_err(|e| SchemaError::Load(e.to_string()))?;
    Ok(match document {
        DescriptionDocument::List(entities) | DescriptionDocument::Wrapped { entities } => entities,
    })
}

/// Read entity descriptions from a JSON file
pub fn load_descriptions(path: impl AsRef<Path>) -> Result<Vec<EntityDescription>, SchemaError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| SchemaError::Load(format!("{}: {e}", path.display())))?;
    let descriptions = parse_descriptions(&contents)?;
    log::debug!(
        "Loaded {} entity description(s) from {}",
        descriptions.len(),
        path.display()
    );
    Ok(descriptions)
}
