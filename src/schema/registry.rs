//! Entity registration.
//!
//! [`register`] validates a set of [`EntityDescription`]s, merges abstract
//! fragments into the entities that extend them, resolves every primary key
//! and foreign key column set, and freezes the result into a [`SchemaGraph`].
//! Any inconsistency aborts registration with a [`SchemaError`].

use crate::config::OrmConfig;
use crate::error::SchemaError;
use crate::key::resolver::KeyResolver;
use crate::key::{ColumnSet, KeyColumn};
use crate::schema::def::{
    ColumnSource, EntityDef, FieldDef, KeyComponent, PhysicalColumn, RelationDef, RelationKind,
};
use crate::schema::description::{EntityDescription, FieldDescription, RelationDescription};
use crate::schema::graph::SchemaGraph;
use convert_case::{Case, Casing};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Register entity descriptions with the default configuration
pub fn register<I>(descriptions: I) -> Result<SchemaGraph, SchemaError>
where
    I: IntoIterator<Item = EntityDescription>,
{
    register_with(descriptions, &OrmConfig::default())
}

/// Register entity descriptions, naming foreign key columns with `config.fk_column_separator`
pub fn register_with<I>(descriptions: I, config: &OrmConfig) -> Result<SchemaGraph, SchemaError>
where
    I: IntoIterator<Item = EntityDescription>,
{
    let mut all: IndexMap<String, EntityDescription> = IndexMap::new();
    for description in descriptions {
        if all.contains_key(&description.name) {
            return Err(SchemaError::DuplicateEntity(description.name));
        }
        all.insert(description.name.clone(), description);
    }

    // Merge fragments and validate members
    let mut merged: IndexMap<String, Merged> = IndexMap::new();
    for description in all.values().filter(|d| !d.is_abstract) {
        merged.insert(description.name.clone(), merge_chain(&all, description)?);
    }
    for entity in merged.values() {
        validate_relations(&all, &merged, entity)?;
    }

    let mut entities: IndexMap<String, EntityDef> = IndexMap::new();
    let mut declared: HashMap<(String, String), Vec<String>> = HashMap::new();
    for entity in merged.values() {
        let def = build_definition(entity)?;
        for relation in &entity.relations {
            if let Some(columns) = &relation.columns {
                declared.insert(
                    (entity.name.clone(), relation.name.clone()),
                    columns.clone(),
                );
            }
        }
        entities.insert(def.name.clone(), def);
    }

    // Resolve keys against the unkeyed definitions, then write the results back
    let mut keys = HashMap::new();
    let mut foreign_keys = HashMap::new();
    {
        let mut resolver = KeyResolver::new(&entities, &declared, &config.fk_column_separator);
        for entity in entities.values() {
            keys.insert(entity.name.clone(), resolver.entity_key(&entity.name)?);
            for relation in entity.owning_relations() {
                foreign_keys.insert(
                    (entity.name.clone(), relation.name.clone()),
                    resolver.foreign_key(&entity.name, &relation.name)?,
                );
            }
        }
    }

    for entity in entities.values_mut() {
        if let Some(key) = keys.get(&entity.name) {
            entity.primary_key = key.clone();
        }
        for relation in entity.relations.iter_mut() {
            if let Some(columns) = foreign_keys.remove(&(entity.name.clone(), relation.name.clone())) {
                relation.columns = columns;
            }
        }
        entity.columns = physical_columns(entity, &keys)?;
        log::debug!(
            "Resolved key of {} ({}): [{}]",
            entity.name,
            entity.table,
            entity
                .primary_key
                .iter()
                .map(|k| format!("{} <- {}", k.column, k.path_string()))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let graph = SchemaGraph::new(entities);
    log::info!(
        "Registered {} entities with {} relationships",
        graph.len(),
        graph.edges().len()
    );
    Ok(graph)
}

/// A concrete entity with its fragment chain folded in
struct Merged {
    name: String,
    table: String,
    fields: Vec<FieldDescription>,
    relations: Vec<RelationDescription>,
    primary_key: Option<Vec<String>>,
}

fn merge_chain(
    all: &IndexMap<String, EntityDescription>,
    description: &EntityDescription,
) -> Result<Merged, SchemaError> {
    // Walk up to the root fragment first so base members come first
    let mut chain = vec![description];
    let mut seen: HashSet<&str> = HashSet::from([description.name.as_str()]);
    let mut current = description;
    while let Some(base_name) = &current.extends {
        let base = all.get(base_name).ok_or_else(|| SchemaError::UnknownBase {
            entity: current.name.clone(),
            base: base_name.clone(),
        })?;
        if !seen.insert(base.name.as_str()) {
            return Err(SchemaError::CyclicInheritance(base.name.clone()));
        }
        if !base.is_abstract {
            return Err(SchemaError::BaseNotAbstract {
                entity: current.name.clone(),
                base: base.name.clone(),
            });
        }
        chain.push(base);
        current = base;
    }

    let mut merged = Merged {
        name: description.name.clone(),
        table: description
            .table
            .clone()
            .unwrap_or_else(|| description.name.to_case(Case::Snake)),
        fields: Vec::new(),
        relations: Vec::new(),
        primary_key: None,
    };
    let mut members: HashSet<String> = HashSet::new();
    for part in chain.iter().rev() {
        for field in &part.fields {
            if !members.insert(field.name.clone()) {
                return Err(duplicate_member(&merged.name, &field.name));
            }
            merged.fields.push(field.clone());
        }
        for relation in &part.relations {
            if !members.insert(relation.name.clone()) {
                return Err(duplicate_member(&merged.name, &relation.name));
            }
            merged.relations.push(relation.clone());
        }
        if part.primary_key.is_some() {
            merged.primary_key = part.primary_key.clone();
        }
    }
    Ok(merged)
}

fn duplicate_member(entity: &str, member: &str) -> SchemaError {
    SchemaError::DuplicateMember {
        entity: entity.to_string(),
        member: member.to_string(),
    }
}

fn validate_relations(
    all: &IndexMap<String, EntityDescription>,
    merged: &IndexMap<String, Merged>,
    entity: &Merged,
) -> Result<(), SchemaError> {
    for relation in &entity.relations {
        let Some(target) = all.get(&relation.target) else {
            return Err(SchemaError::UnknownTarget {
                entity: entity.name.clone(),
                relation: relation.name.clone(),
                target: relation.target.clone(),
            });
        };
        if target.is_abstract {
            return Err(SchemaError::AbstractTarget {
                entity: entity.name.clone(),
                relation: relation.name.clone(),
                target: relation.target.clone(),
            });
        }

        let owning = relation.kind == RelationKind::ToOne && relation.is_owner();
        if relation.primary {
            let reason = if relation.kind != RelationKind::ToOne {
                Some("only to-one relations can be key components")
            } else if !owning {
                Some("the relation does not own its foreign key")
            } else if relation.nullable {
                Some("the relation is nullable")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(SchemaError::InvalidPrimaryRelation {
                    entity: entity.name.clone(),
                    relation: relation.name.clone(),
                    reason,
                });
            }
        }

        if owning {
            continue;
        }
        let invalid = |mapped_by: &str, reason: &'static str| SchemaError::InvalidMappedBy {
            entity: entity.name.clone(),
            relation: relation.name.clone(),
            mapped_by: mapped_by.to_string(),
            reason,
        };
        let Some(mapped_by) = &relation.mapped_by else {
            return Err(invalid("", "inverse relations must name the owning side"));
        };
        // target was checked above and is concrete, so it has been merged
        let back = merged
            .get(&relation.target)
            .and_then(|t| t.relations.iter().find(|r| &r.name == mapped_by))
            .ok_or_else(|| invalid(mapped_by, "no such relation on the target"))?;
        if back.kind != RelationKind::ToOne || !back.is_owner() {
            return Err(invalid(mapped_by, "the named relation does not own a foreign key"));
        }
        if back.target != entity.name {
            return Err(invalid(mapped_by, "the named relation does not point back"));
        }
    }
    Ok(())
}

fn build_definition(entity: &Merged) -> Result<EntityDef, SchemaError> {
    let mut fields: Vec<FieldDef> = entity
        .fields
        .iter()
        .map(|f| FieldDef {
            name: f.name.clone(),
            column: f.column.clone().unwrap_or_else(|| f.name.to_case(Case::Snake)),
            scalar: f.scalar,
            nullable: f.nullable,
            primary: f.primary,
        })
        .collect();
    let mut relations: Vec<RelationDef> = entity
        .relations
        .iter()
        .map(|r| RelationDef {
            name: r.name.clone(),
            kind: r.kind,
            target: r.target.clone(),
            owner: r.kind == RelationKind::ToOne && r.is_owner(),
            primary: r.primary,
            nullable: r.nullable,
            on_delete: r.on_delete,
            mapped_by: r.mapped_by.clone(),
            orphan_removal: r.orphan_removal,
            columns: ColumnSet::default(),
        })
        .collect();

    let key_components = match &entity.primary_key {
        Some(order) => {
            let mut components = Vec::with_capacity(order.len());
            for name in order {
                if let Some(field) = fields.iter_mut().find(|f| &f.name == name) {
                    field.primary = true;
                    components.push(KeyComponent::Field(name.clone()));
                } else if let Some(relation) = relations.iter_mut().find(|r| &r.name == name) {
                    if !relation.is_owning_to_one() || relation.nullable {
                        return Err(SchemaError::InvalidPrimaryRelation {
                            entity: entity.name.clone(),
                            relation: name.clone(),
                            reason: "only owning, non-nullable to-one relations can be key components",
                        });
                    }
                    relation.primary = true;
                    components.push(KeyComponent::Relation(name.clone()));
                } else {
                    return Err(SchemaError::UnknownKeyMember {
                        entity: entity.name.clone(),
                        member: name.clone(),
                    });
                }
            }
            let flagged = entity
                .fields
                .iter()
                .filter(|f| f.primary)
                .map(|f| &f.name)
                .chain(entity.relations.iter().filter(|r| r.primary).map(|r| &r.name));
            for member in flagged {
                if !order.contains(member) {
                    return Err(SchemaError::KeyOrderMismatch {
                        entity: entity.name.clone(),
                        member: member.clone(),
                    });
                }
            }
            components
        }
        // Without an explicit order, inherited scopes come before local fields
        None => relations
            .iter()
            .filter(|r| r.primary)
            .map(|r| KeyComponent::Relation(r.name.clone()))
            .chain(
                fields
                    .iter()
                    .filter(|f| f.primary)
                    .map(|f| KeyComponent::Field(f.name.clone())),
            )
            .collect(),
    };

    if key_components.is_empty() {
        return Err(SchemaError::EmptyPrimaryKey(entity.name.clone()));
    }
    if let Some(field) = fields.iter().find(|f| f.primary && f.nullable) {
        return Err(SchemaError::NullablePrimaryField {
            entity: entity.name.clone(),
            field: field.name.clone(),
        });
    }

    Ok(EntityDef {
        name: entity.name.clone(),
        table: entity.table.clone(),
        fields,
        relations,
        key_components,
        primary_key: Vec::new(),
        columns: Vec::new(),
    })
}

fn physical_columns(
    entity: &EntityDef,
    keys: &HashMap<String, Vec<KeyColumn>>,
) -> Result<Vec<PhysicalColumn>, SchemaError> {
    let mut columns: Vec<PhysicalColumn> = Vec::new();
    for component in &entity.key_components {
        match component {
            KeyComponent::Field(name) => {
                if let Some(field) = entity.field(name) {
                    columns.push(field_column(field));
                }
            }
            KeyComponent::Relation(name) => {
                if let Some(relation) = entity.relation(name) {
                    relation_columns(&mut columns, relation, keys);
                }
            }
        }
    }
    for field in entity.fields.iter().filter(|f| !entity.is_key_component(&f.name)) {
        columns.push(field_column(field));
    }
    for relation in entity
        .owning_relations()
        .filter(|r| !entity.is_key_component(&r.name))
    {
        relation_columns(&mut columns, relation, keys);
    }

    let mut seen = HashSet::new();
    for column in &columns {
        if !seen.insert(column.name.as_str()) {
            return Err(SchemaError::DuplicateColumn {
                entity: entity.name.clone(),
                column: column.name.clone(),
            });
        }
    }
    Ok(columns)
}

/// Foreign key columns typed after the target's key columns
fn relation_columns(
    columns: &mut Vec<PhysicalColumn>,
    relation: &RelationDef,
    keys: &HashMap<String, Vec<KeyColumn>>,
) {
    let target_key = keys.get(&relation.target).map(Vec::as_slice).unwrap_or_default();
    for (position, (name, target)) in relation.columns.iter().zip(target_key).enumerate() {
        columns.push(PhysicalColumn {
            name: name.to_string(),
            scalar: target.scalar,
            nullable: relation.nullable,
            primary: relation.primary,
            source: ColumnSource::Relation {
                relation: relation.name.clone(),
                position,
            },
        });
    }
}

fn field_column(field: &FieldDef) -> PhysicalColumn {
    PhysicalColumn {
        name: field.column.clone(),
        scalar: field.scalar,
        nullable: field.nullable,
        primary: field.primary,
        source: ColumnSource::Field(field.name.clone()),
    }
}
