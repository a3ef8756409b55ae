//! Relationship clearing and change detection.
//!
//! Clearing a composite relationship must null every one of its foreign key
//! columns together; a half-cleared key would point at nothing and still not
//! be NULL. [`apply_nullification`] produces that full set, and [`diff`]
//! reuses it whenever a managed instance drops a relationship.

use crate::error::OrmError;
use crate::instance::{Assignment, Assignments, EntityInstance};
use crate::query::builder::QueryBuilder;
use crate::query::column_map::ColumnValueMap;
use crate::reference::normalize::{normalize_for, owning_relation};
use crate::reference::RelationValue;
use crate::schema::def::{EntityDef, Member};
use crate::schema::SchemaGraph;

/// Typed null for every foreign key column of `entity.relation`
///
/// Fails with [`OrmError::ImmutableKey`] when the relation is part of the
/// primary key and with [`OrmError::NullConstraint`] when it is not nullable.
/// The result does not depend on the relation's current value, so applying it
/// to an already cleared relation yields the same map.
pub fn apply_nullification(
    graph: &SchemaGraph,
    entity: &str,
    relation: &str,
) -> Result<ColumnValueMap, OrmError> {
    let def = graph.entity(entity)?;
    let rel = owning_relation(def, relation)?;
    if rel.primary || def.is_key_component(&rel.name) {
        return Err(OrmError::immutable_key(&def.name, &rel.name));
    }
    if !rel.nullable {
        return Err(OrmError::null_constraint(&def.name, &rel.name));
    }

    let mut values = ColumnValueMap::new();
    for column in rel.columns.iter() {
        let scalar = def
            .column(column)
            .map(|c| c.scalar)
            .ok_or_else(|| OrmError::unknown_member(&def.name, column))?;
        values.insert(column, scalar.null_value());
    }
    log::debug!(
        "Nulling {}.{} ({} column(s))",
        def.name,
        rel.name,
        values.len()
    );
    Ok(values)
}

/// SET columns needed to bring `snapshot` in line with `current`
///
/// Only members assigned on `current` are compared. Relationship values are
/// compared by normalized key, so swapping a reference for the loaded
/// instance it names is not a change. A changed relationship always emits its
/// full foreign key column set.
pub fn diff(
    graph: &SchemaGraph,
    snapshot: &EntityInstance,
    current: &EntityInstance,
) -> Result<ColumnValueMap, OrmError> {
    diff_with(&QueryBuilder::new(graph), snapshot, current)
}

pub(crate) fn diff_with(
    builder: &QueryBuilder<'_>,
    snapshot: &EntityInstance,
    current: &EntityInstance,
) -> Result<ColumnValueMap, OrmError> {
    let changes = changed_members(builder.graph(), snapshot, current)?;
    builder.build_update(current.entity(), &changes)
}

/// Members whose value on `current` differs from `snapshot`
pub(crate) fn changed_members(
    graph: &SchemaGraph,
    snapshot: &EntityInstance,
    current: &EntityInstance,
) -> Result<Assignments, OrmError> {
    if snapshot.entity() != current.entity() {
        return Err(OrmError::InvalidAssignment {
            entity: current.entity().to_string(),
            member: String::new(),
            reason: format!("snapshot belongs to `{}`", snapshot.entity()),
        });
    }
    let def = graph.entity(current.entity())?;

    let mut changes = Assignments::new();
    for (name, assignment) in current.values().iter() {
        let before = snapshot.get(name);
        let changed = match def.member(name) {
            Some(Member::Field(field)) => match (before, assignment) {
                (Some(Assignment::Scalar(old)), Assignment::Scalar(new)) => {
                    let old = field.scalar.coerce(&field.column, old.clone());
                    let new = field.scalar.coerce(&field.column, new.clone());
                    match (old, new) {
                        (Ok(old), Ok(new)) => old != new,
                        _ => true,
                    }
                }
                _ => true,
            },
            Some(Member::Relation(rel)) if rel.is_owning_to_one() => {
                relation_changed(graph, def, name, before, assignment)?
            }
            // inverse collections are written from the owning side
            Some(Member::Relation(_)) => false,
            None => return Err(OrmError::unknown_member(&def.name, name)),
        };
        if !changed {
            continue;
        }
        match assignment {
            Assignment::Scalar(value) => changes.set(name, value.clone()),
            Assignment::Relation(value) => changes.relate(name, value.clone()),
        };
    }
    Ok(changes)
}

fn relation_changed(
    graph: &SchemaGraph,
    def: &EntityDef,
    relation: &str,
    before: Option<&Assignment>,
    after: &Assignment,
) -> Result<bool, OrmError> {
    let rel = owning_relation(def, relation)?;
    let before = before
        .map(Assignment::to_relation_value)
        .unwrap_or(RelationValue::Unset);
    let old = normalize_for(graph, def, rel, &before)?;
    let new = normalize_for(graph, def, rel, &after.to_relation_value())?;
    Ok(old != new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::reference;
    use crate::test_helpers::tenant_schema;
    use sea_query::Value;

    #[test]
    fn test_nullification_covers_every_fk_column() {
        let graph = tenant_schema();
        let values = apply_nullification(&graph, "FormSubmission", "form").unwrap();
        assert_eq!(values.columns().collect::<Vec<_>>(), ["form_org_id", "form_id"]);
        assert!(values.iter().all(|(_, v)| *v == Value::Int(None)));
    }

    #[test]
    fn test_nullification_is_idempotent() {
        let graph = tenant_schema();
        let first = apply_nullification(&graph, "Form", "owner").unwrap();
        let second = apply_nullification(&graph, "Form", "owner").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_nullification_of_key_relation_is_rejected() {
        let graph = tenant_schema();
        assert_eq!(
            apply_nullification(&graph, "Form", "org").unwrap_err(),
            OrmError::ImmutableKey {
                entity: "Form".into(),
                member: "org".into(),
            }
        );
    }

    #[test]
    fn test_nullification_of_required_relation_is_rejected() {
        let graph = tenant_schema();
        assert_eq!(
            apply_nullification(&graph, "Answer", "submission").unwrap_err(),
            OrmError::NullConstraint {
                entity: "Answer".into(),
                member: "submission".into(),
            }
        );
    }

    #[test]
    fn test_diff_ignores_equivalent_relation_shapes() {
        let graph = tenant_schema();
        let snapshot = EntityInstance::new("Form")
            .with_relation("org", reference("Organisation", 1))
            .with("id", 10)
            .with("name", "intake")
            .with_relation("owner", reference("User", [1, 1]));
        let mut current = snapshot.clone();
        current.relate("owner", RelationValue::key([1i64, 1i64]));
        current.set("name", "intake");

        assert!(diff(&graph, &snapshot, &current).unwrap().is_empty());
    }

    #[test]
    fn test_diff_cleared_relation_emits_full_column_set() {
        let graph = tenant_schema();
        let snapshot = EntityInstance::new("Form")
            .with_relation("org", reference("Organisation", 1))
            .with("id", 10)
            .with("name", "intake")
            .with_relation("owner", reference("User", [1, 1]));
        let mut current = snapshot.clone();
        current.clear("owner").set("name", "renamed");

        let values = diff(&graph, &snapshot, &current).unwrap();
        assert_eq!(
            values.columns().collect::<Vec<_>>(),
            ["name", "owner_org_id", "owner_id"]
        );
        assert_eq!(values.get("owner_id"), Some(&Value::Int(None)));
    }

    #[test]
    fn test_diff_rejects_key_change() {
        let graph = tenant_schema();
        let snapshot = EntityInstance::new("Form")
            .with_relation("org", reference("Organisation", 1))
            .with("id", 10);
        let mut current = snapshot.clone();
        current.set("id", 11);
        assert!(matches!(
            diff(&graph, &snapshot, &current),
            Err(OrmError::ImmutableKey { .. })
        ));
    }
}
