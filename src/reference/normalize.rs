use crate::error::OrmError;
use crate::instance::{Assignment, EntityInstance};
use crate::reference::RelationValue;
use crate::schema::def::{EntityDef, KeyComponent, RelationDef};
use crate::schema::SchemaGraph;
use crate::value::{is_null, KeyTuple};

/// Normalize a relationship value into the foreign key tuple of `entity.relation`
///
/// The result has one coerced value per foreign key column. `Null`, `Unset`
/// and an all-null tuple produce typed nulls. A tuple that is only partially
/// null fails with [`OrmError::UnresolvedKey`].
pub fn normalize(
    graph: &SchemaGraph,
    entity: &str,
    relation: &str,
    value: &RelationValue,
) -> Result<KeyTuple, OrmError> {
    let owner = graph.entity(entity)?;
    let rel = owning_relation(owner, relation)?;
    normalize_for(graph, owner, rel, value)
}

pub(crate) fn owning_relation<'g>(
    owner: &'g EntityDef,
    relation: &str,
) -> Result<&'g RelationDef, OrmError> {
    let rel = owner
        .relation(relation)
        .ok_or_else(|| OrmError::unknown_member(&owner.name, relation))?;
    if !rel.is_owning_to_one() {
        return Err(OrmError::InvalidAssignment {
            entity: owner.name.clone(),
            member: relation.to_string(),
            reason: "inverse relations hold no foreign key".to_string(),
        });
    }
    Ok(rel)
}

pub(crate) fn normalize_for(
    graph: &SchemaGraph,
    owner: &EntityDef,
    rel: &RelationDef,
    value: &RelationValue,
) -> Result<KeyTuple, OrmError> {
    let target = graph.entity(&rel.target)?;
    let label = format!("{}.{}", owner.name, rel.name);

    let raw = match value {
        RelationValue::Unset | RelationValue::Null => None,
        RelationValue::Reference(reference) => {
            check_target(&label, &rel.target, reference.entity())?;
            Some(reference.key().clone())
        }
        RelationValue::Loaded(instance) => {
            check_target(&label, &rel.target, instance.entity())?;
            Some(extract_key(graph, target, instance)?)
        }
        RelationValue::Key(key) => Some(key.clone()),
    };

    let Some(key) = raw else {
        return Ok(null_key(target));
    };
    if key.arity() != target.key_arity() {
        return Err(OrmError::ReferenceArity {
            relation: label,
            expected: target.key_arity(),
            actual: key.arity(),
        });
    }
    if key.is_null() {
        return Ok(null_key(target));
    }
    if let Some(position) = key.iter().position(is_null) {
        return Err(OrmError::UnresolvedKey {
            entity: target.name.clone(),
            missing: target.primary_key[position].path_string(),
        });
    }

    let values = key
        .into_values()
        .into_iter()
        .zip(rel.columns.iter().zip(&target.primary_key))
        .map(|(value, (column, key_column))| key_column.scalar.coerce(column, value))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(KeyTuple::new(values))
}

/// Primary key tuple of an instance, extracted through its key components
pub fn entity_key(graph: &SchemaGraph, instance: &EntityInstance) -> Result<KeyTuple, OrmError> {
    let def = graph.entity(instance.entity())?;
    extract_key(graph, def, instance)
}

fn extract_key(
    graph: &SchemaGraph,
    def: &EntityDef,
    instance: &EntityInstance,
) -> Result<KeyTuple, OrmError> {
    let unresolved = |missing: &str| OrmError::UnresolvedKey {
        entity: def.name.clone(),
        missing: missing.to_string(),
    };

    let mut key = KeyTuple::default();
    for component in &def.key_components {
        match component {
            KeyComponent::Field(name) => {
                let field = def
                    .field(name)
                    .ok_or_else(|| OrmError::unknown_member(&def.name, name))?;
                let value = match instance.get(name) {
                    Some(Assignment::Scalar(value)) if !is_null(value) => value.clone(),
                    _ => return Err(unresolved(name)),
                };
                key.extend(KeyTuple::new(vec![field.scalar.coerce(&field.column, value)?]));
            }
            KeyComponent::Relation(name) => {
                let rel = owning_relation(def, name)?;
                let value = instance
                    .relation_value(name)
                    .ok_or_else(|| unresolved(name))?;
                let part = normalize_for(graph, def, rel, &value)?;
                if part.is_null() {
                    return Err(unresolved(name));
                }
                key.extend(part);
            }
        }
    }
    Ok(key)
}

fn check_target(relation: &str, expected: &str, actual: &str) -> Result<(), OrmError> {
    if expected == actual {
        Ok(())
    } else {
        Err(OrmError::ReferenceTarget {
            relation: relation.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

fn null_key(target: &EntityDef) -> KeyTuple {
    KeyTuple::new(target.primary_key.iter().map(|k| k.scalar.null_value()).collect())
}
