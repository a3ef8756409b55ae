//! Recursive primary key and foreign key resolution
//!
//! A primary key is an ordered list of [`KeyComponent`]s. A field component
//! contributes its own column. A relation component contributes the columns of
//! its foreign key, which are as many as the target's primary key has, so the
//! expansion recurses through every primary relation hop:
//!
//! ```text
//! Organisation(id -> org_id)
//! User(org -> Organisation, id)         => [org_id (org.id), id (id)]
//! Form(owner -> User, id)  [primary]    => [owner_org_id (owner.org.id), owner_id (owner.id), id (id)]
//! ```
//!
//! Resolution happens once, at registration. The public functions below read
//! the cached result from the [`SchemaGraph`].

use crate::error::{OrmError, SchemaError};
use crate::key::{ColumnSet, KeyColumn};
use crate::schema::def::{EntityDef, KeyComponent};
use crate::schema::SchemaGraph;
use convert_case::{Case, Casing};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Ordered `(column, source path)` entries of `entity`'s primary key
pub fn resolve_key_columns<'g>(
    graph: &'g SchemaGraph,
    entity: &str,
) -> Result<&'g [KeyColumn], OrmError> {
    Ok(&graph.entity(entity)?.primary_key)
}

/// Ordered foreign key columns of `entity.relation`
///
/// Inverse collections own no columns and yield an empty set.
pub fn resolve_foreign_key_columns<'g>(
    graph: &'g SchemaGraph,
    entity: &str,
    relation: &str,
) -> Result<&'g ColumnSet, OrmError> {
    let def = graph.entity(entity)?;
    def.relation(relation)
        .map(|r| &r.columns)
        .ok_or_else(|| OrmError::unknown_member(entity, relation))
}

/// Registration-time resolver over merged, not yet keyed, entity definitions
pub(crate) struct KeyResolver<'a> {
    entities: &'a IndexMap<String, EntityDef>,
    /// Explicit column names declared on relations, keyed by (entity, relation)
    declared: &'a HashMap<(String, String), Vec<String>>,
    separator: &'a str,
    keys: HashMap<String, Vec<KeyColumn>>,
    foreign_keys: HashMap<(String, String), ColumnSet>,
    in_progress: Vec<String>,
}

impl<'a> KeyResolver<'a> {
    pub(crate) fn new(
        entities: &'a IndexMap<String, EntityDef>,
        declared: &'a HashMap<(String, String), Vec<String>>,
        separator: &'a str,
    ) -> Self {
        Self {
            entities,
            declared,
            separator,
            keys: HashMap::new(),
            foreign_keys: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    /// Resolve the primary key of `entity`, recursing through primary relations
    pub(crate) fn entity_key(&mut self, entity: &str) -> Result<Vec<KeyColumn>, SchemaError> {
        if let Some(cached) = self.keys.get(entity) {
            return Ok(cached.clone());
        }
        if self.in_progress.iter().any(|e| e == entity) {
            return Err(SchemaError::CyclicKey(entity.to_string()));
        }

        let def = self.lookup(entity)?;
        self.in_progress.push(entity.to_string());

        let mut columns = Vec::new();
        for component in &def.key_components {
            match component {
                KeyComponent::Field(name) => {
                    // registry guarantees key components exist
                    if let Some(field) = def.field(name) {
                        columns.push(KeyColumn {
                            column: field.column.clone(),
                            path: vec![field.name.clone()],
                            scalar: field.scalar,
                        });
                    }
                }
                KeyComponent::Relation(name) => {
                    let Some(relation) = def.relation(name) else {
                        continue;
                    };
                    let fk = self.foreign_key(entity, name)?;
                    let target_key = self.entity_key(&relation.target)?;
                    for (column, target_column) in fk.iter().zip(target_key) {
                        let mut path = Vec::with_capacity(target_column.path.len() + 1);
                        path.push(relation.name.clone());
                        path.extend(target_column.path);
                        columns.push(KeyColumn {
                            column: column.to_string(),
                            path,
                            scalar: target_column.scalar,
                        });
                    }
                }
            }
        }

        self.in_progress.pop();
        if columns.is_empty() {
            return Err(SchemaError::EmptyPrimaryKey(entity.to_string()));
        }
        self.keys.insert(entity.to_string(), columns.clone());
        Ok(columns)
    }

    /// Resolve the foreign key columns of an owning to-one relation
    pub(crate) fn foreign_key(
        &mut self,
        entity: &str,
        relation: &str,
    ) -> Result<ColumnSet, SchemaError> {
        let cache_key = (entity.to_string(), relation.to_string());
        if let Some(cached) = self.foreign_keys.get(&cache_key) {
            return Ok(cached.clone());
        }

        let def = self.lookup(entity)?;
        let Some(rel) = def.relation(relation) else {
            return Ok(ColumnSet::default());
        };
        let target_key = self.entity_key(&rel.target)?;

        let columns = match self.declared.get(&cache_key) {
            Some(declared) => {
                if declared.len() != target_key.len() {
                    return Err(SchemaError::ForeignKeyArity {
                        entity: entity.to_string(),
                        relation: relation.to_string(),
                        target: rel.target.clone(),
                        declared: declared.len(),
                        expected: target_key.len(),
                    });
                }
                declared.clone()
            }
            None => {
                let prefix = rel.name.to_case(Case::Snake);
                target_key
                    .iter()
                    .map(|k| format!("{prefix}{}{}", self.separator, k.column))
                    .collect()
            }
        };

        let set = ColumnSet::new(columns);
        self.foreign_keys.insert(cache_key, set.clone());
        Ok(set)
    }

    fn lookup(&self, entity: &str) -> Result<&'a EntityDef, SchemaError> {
        self.entities
            .get(entity)
            .ok_or_else(|| SchemaError::UnknownEntity(entity.to_string()))
    }
}
