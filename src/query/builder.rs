//! Translation of member assignments and filters into column maps and plans.
//!
//! The builder validates everything before producing output: unknown members,
//! value types, key immutability and nullability. A failed build never yields
//! a partial statement.

use crate::config::OrmConfig;
use crate::error::OrmError;
use crate::instance::{Assignment, Assignments};
use crate::propagate::apply_nullification;
use crate::query::column_map::ColumnValueMap;
use crate::query::filter::{Filter, FilterValue};
use crate::query::path::{PathResolver, PathTarget, ROOT_ALIAS};
use crate::query::statement::{ColumnRef, FindPlan, Predicate, Statement};
use crate::reference::normalize::{normalize_for, owning_relation};
use crate::reference::RelationValue;
use crate::schema::def::{EntityDef, FieldDef, Member};
use crate::schema::SchemaGraph;
use crate::value::{is_null, KeyTuple, ScalarType};
use sea_query::Value;

/// Builds column maps, find plans and statements against a [`SchemaGraph`]
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'g> {
    graph: &'g SchemaGraph,
    strict_types: bool,
}

impl<'g> QueryBuilder<'g> {
    pub fn new(graph: &'g SchemaGraph) -> Self {
        Self {
            graph,
            strict_types: true,
        }
    }

    pub fn with_config(graph: &'g SchemaGraph, config: &OrmConfig) -> Self {
        Self {
            graph,
            strict_types: config.strict_types,
        }
    }

    /// When off, scalar values that do not match the field type pass through unchanged
    #[must_use]
    pub fn strict_types(mut self, strict: bool) -> Self {
        self.strict_types = strict;
        self
    }

    pub fn graph(&self) -> &'g SchemaGraph {
        self.graph
    }

    /// Column map for an INSERT, in physical column order
    ///
    /// Members that are not assigned are omitted. Every primary key component
    /// must be assigned and non-null. A relationship assigned `Null` or `Unset`
    /// writes a typed null into each of its foreign key columns.
    pub fn build_insert(
        &self,
        entity: &str,
        assignments: &Assignments,
    ) -> Result<ColumnValueMap, OrmError> {
        let def = self.graph.entity(entity)?;
        check_members(def, assignments)?;

        for component in &def.key_components {
            if !assignments.contains(component.name()) {
                return Err(OrmError::UnresolvedKey {
                    entity: def.name.clone(),
                    missing: component.name().to_string(),
                });
            }
        }

        let mut values = ColumnValueMap::new();
        for field in &def.fields {
            let Some(assignment) = assignments.get(&field.name) else {
                continue;
            };
            let value = self.field_value(def, field, assignment)?;
            if is_null(&value) && def.is_key_component(&field.name) {
                return Err(OrmError::UnresolvedKey {
                    entity: def.name.clone(),
                    missing: field.name.clone(),
                });
            }
            values.insert(field.column.clone(), value);
        }
        for relation in &def.relations {
            let Some(assignment) = assignments.get(&relation.name) else {
                continue;
            };
            let relation = owning_relation(def, &relation.name)?;
            let key = normalize_for(self.graph, def, relation, &assignment.to_relation_value())?;
            if key.is_null() {
                if relation.primary {
                    return Err(OrmError::UnresolvedKey {
                        entity: def.name.clone(),
                        missing: relation.name.clone(),
                    });
                }
                if !relation.nullable {
                    return Err(OrmError::null_constraint(&def.name, &relation.name));
                }
            }
            values.insert_key(relation.columns.iter(), key);
        }

        Ok(in_column_order(def, values))
    }

    /// SET part of an UPDATE
    ///
    /// Primary key components cannot be assigned. Clearing a relationship
    /// nulls every one of its foreign key columns.
    pub fn build_update(
        &self,
        entity: &str,
        assignments: &Assignments,
    ) -> Result<ColumnValueMap, OrmError> {
        let def = self.graph.entity(entity)?;
        check_members(def, assignments)?;

        let mut values = ColumnValueMap::new();
        for (name, assignment) in assignments.iter() {
            if def.is_key_component(name) {
                return Err(OrmError::immutable_key(&def.name, name));
            }
            match def.member(name) {
                Some(Member::Field(field)) => {
                    let value = self.field_value(def, field, assignment)?;
                    values.insert(field.column.clone(), value);
                }
                Some(Member::Relation(_)) => {
                    let relation = owning_relation(def, name)?;
                    let key =
                        normalize_for(self.graph, def, relation, &assignment.to_relation_value())?;
                    if key.is_null() {
                        values.extend(apply_nullification(self.graph, &def.name, name)?);
                    } else {
                        values.insert_key(relation.columns.iter(), key);
                    }
                }
                None => return Err(OrmError::unknown_member(&def.name, name)),
            }
        }
        Ok(values)
    }

    /// Key column to value map identifying one row
    pub fn build_key_filter(&self, entity: &str, key: &KeyTuple) -> Result<ColumnValueMap, OrmError> {
        let def = self.graph.entity(entity)?;
        if key.arity() != def.key_arity() {
            return Err(OrmError::ReferenceArity {
                relation: def.name.clone(),
                expected: def.key_arity(),
                actual: key.arity(),
            });
        }

        let mut filter = ColumnValueMap::new();
        for (key_column, value) in def.primary_key.iter().zip(key.iter()) {
            if is_null(value) {
                return Err(OrmError::UnresolvedKey {
                    entity: def.name.clone(),
                    missing: key_column.path_string(),
                });
            }
            filter.insert(
                key_column.column.clone(),
                key_column.scalar.coerce(&key_column.column, value.clone())?,
            );
        }
        Ok(filter)
    }

    /// Resolve a filter into joins and a flat predicate over physical columns
    pub fn build_find(&self, entity: &str, filter: &Filter) -> Result<FindPlan, OrmError> {
        let def = self.graph.entity(entity)?;
        let mut resolver = PathResolver::new(self.graph, def);
        let predicate = self.translate(&def.name, &mut resolver, filter)?;
        let (joins, distinct) = resolver.into_parts();
        Ok(FindPlan {
            entity: def.name.clone(),
            table: def.table.clone(),
            alias: ROOT_ALIAS.to_string(),
            columns: def.columns.iter().map(|c| c.name.clone()).collect(),
            joins,
            predicate,
            distinct,
            limit: None,
        })
    }

    /// Plan loading every row whose `columns` match one of `keys`
    pub(crate) fn build_find_in(
        &self,
        entity: &str,
        columns: &[String],
        keys: &[KeyTuple],
    ) -> Result<FindPlan, OrmError> {
        let mut plan = self.build_find(entity, &Filter::all())?;
        plan.predicate = Predicate::Any(
            keys.iter()
                .map(|key| {
                    Predicate::key_eq(
                        columns.iter().map(|c| ColumnRef::new(ROOT_ALIAS, c.clone())),
                        key.iter().cloned(),
                    )
                })
                .collect(),
        );
        Ok(plan)
    }

    pub fn insert_statement(
        &self,
        entity: &str,
        assignments: &Assignments,
    ) -> Result<Statement, OrmError> {
        let values = self.build_insert(entity, assignments)?;
        let def = self.graph.entity(entity)?;
        Ok(Statement::Insert {
            entity: def.name.clone(),
            table: def.table.clone(),
            values,
        })
    }

    pub fn update_statement(
        &self,
        entity: &str,
        key: &KeyTuple,
        assignments: &Assignments,
    ) -> Result<Statement, OrmError> {
        let values = self.build_update(entity, assignments)?;
        let filter = self.build_key_filter(entity, key)?;
        let def = self.graph.entity(entity)?;
        Ok(Statement::Update {
            entity: def.name.clone(),
            table: def.table.clone(),
            values,
            filter,
        })
    }

    pub fn build_delete(&self, entity: &str, key: &KeyTuple) -> Result<Statement, OrmError> {
        let filter = self.build_key_filter(entity, key)?;
        let def = self.graph.entity(entity)?;
        Ok(Statement::Delete {
            entity: def.name.clone(),
            table: def.table.clone(),
            filter,
        })
    }

    fn translate(
        &self,
        entity: &str,
        resolver: &mut PathResolver<'g>,
        filter: &Filter,
    ) -> Result<Predicate, OrmError> {
        Ok(match filter {
            Filter::And(parts) => Predicate::All(
                parts
                    .iter()
                    .map(|p| self.translate(entity, resolver, p))
                    .collect::<Result<_, _>>()?,
            ),
            Filter::Or(parts) => Predicate::Any(
                parts
                    .iter()
                    .map(|p| self.translate(entity, resolver, p))
                    .collect::<Result<_, _>>()?,
            ),
            Filter::IsNull(path) => match resolver.resolve(path)? {
                PathTarget::Scalar { column, .. } => Predicate::IsNull(column),
                PathTarget::Relation { columns, .. } => {
                    Predicate::All(columns.into_iter().map(Predicate::IsNull).collect())
                }
            },
            Filter::NotNull(path) => match resolver.resolve(path)? {
                PathTarget::Scalar { column, .. } => Predicate::NotNull(column),
                PathTarget::Relation { columns, .. } => {
                    Predicate::All(columns.into_iter().map(Predicate::NotNull).collect())
                }
            },
            Filter::Eq(path, operand) => match (resolver.resolve(path)?, operand) {
                (PathTarget::Scalar { column, scalar }, FilterValue::Scalar(value)) => {
                    let value = self.coerce(scalar, &column.column, value.clone())?;
                    if is_null(&value) {
                        Predicate::IsNull(column)
                    } else {
                        Predicate::Eq(column, value)
                    }
                }
                (PathTarget::Scalar { .. }, FilterValue::Relation(_)) => {
                    return Err(OrmError::InvalidAssignment {
                        entity: entity.to_string(),
                        member: path.clone(),
                        reason: "a relationship value cannot be compared with a scalar field"
                            .to_string(),
                    });
                }
                (
                    PathTarget::Relation {
                        columns,
                        owner,
                        relation,
                    },
                    operand,
                ) => {
                    let value = match operand {
                        FilterValue::Scalar(value) => {
                            RelationValue::Key(KeyTuple::new(vec![value.clone()]))
                        }
                        FilterValue::Relation(value) => value.clone(),
                    };
                    let key = normalize_for(self.graph, owner, relation, &value)?;
                    if key.is_null() {
                        Predicate::All(columns.into_iter().map(Predicate::IsNull).collect())
                    } else {
                        Predicate::key_eq(columns, key)
                    }
                }
            },
        })
    }

    fn field_value(
        &self,
        def: &EntityDef,
        field: &FieldDef,
        assignment: &Assignment,
    ) -> Result<Value, OrmError> {
        let Assignment::Scalar(value) = assignment else {
            return Err(OrmError::InvalidAssignment {
                entity: def.name.clone(),
                member: field.name.clone(),
                reason: "a relationship value cannot be assigned to a scalar field".to_string(),
            });
        };
        let value = self.coerce(field.scalar, &field.column, value.clone())?;
        if is_null(&value) && !field.nullable {
            return Err(OrmError::null_constraint(&def.name, &field.name));
        }
        Ok(value)
    }

    fn coerce(&self, scalar: ScalarType, column: &str, value: Value) -> Result<Value, OrmError> {
        match scalar.coerce(column, value.clone()) {
            Ok(coerced) => Ok(coerced),
            Err(_) if !self.strict_types => Ok(value),
            Err(e) => Err(e),
        }
    }
}

fn check_members(def: &EntityDef, assignments: &Assignments) -> Result<(), OrmError> {
    match assignments.iter().find(|(name, _)| def.member(name).is_none()) {
        Some((name, _)) => Err(OrmError::unknown_member(&def.name, name)),
        None => Ok(()),
    }
}

fn in_column_order(def: &EntityDef, mut values: ColumnValueMap) -> ColumnValueMap {
    def.columns
        .iter()
        .filter_map(|c| values.remove(&c.name).map(|v| (c.name.clone(), v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::EntityInstance;
    use crate::reference::reference;
    use crate::test_helpers::tenant_schema;

    fn form_assignments(owner: impl Into<RelationValue>) -> Assignments {
        Assignments::new()
            .with_relation("org", reference("Organisation", 1))
            .with("id", 10)
            .with("name", "intake")
            .with_relation("owner", owner)
    }

    #[test]
    fn test_insert_in_physical_column_order() {
        let graph = tenant_schema();
        let builder = QueryBuilder::new(&graph);
        let values = builder
            .build_insert("Form", &form_assignments(reference("User", [1, 1])))
            .unwrap();
        assert_eq!(
            values.columns().collect::<Vec<_>>(),
            ["org_id", "id", "name", "owner_org_id", "owner_id"]
        );
        assert_eq!(values.get("owner_org_id"), Some(&Value::Int(Some(1))));
    }

    #[test]
    fn test_insert_shapes_agree() {
        let graph = tenant_schema();
        let builder = QueryBuilder::new(&graph);
        let user = EntityInstance::new("User")
            .with_relation("org", reference("Organisation", 1))
            .with("id", 1);

        let by_ref = builder
            .build_insert("Form", &form_assignments(reference("User", [1, 1])))
            .unwrap();
        let by_entity = builder.build_insert("Form", &form_assignments(user)).unwrap();
        let by_key = builder
            .build_insert("Form", &form_assignments(RelationValue::key([1i64, 1i64])))
            .unwrap();
        assert_eq!(by_ref, by_entity);
        assert_eq!(by_ref, by_key);
    }

    #[test]
    fn test_insert_requires_key_components() {
        let graph = tenant_schema();
        let builder = QueryBuilder::new(&graph);
        let err = builder
            .build_insert("Form", &Assignments::new().with("id", 10))
            .unwrap_err();
        assert_eq!(
            err,
            OrmError::UnresolvedKey {
                entity: "Form".into(),
                missing: "org".into(),
            }
        );
    }

    #[test]
    fn test_insert_omits_unassigned_and_nulls_explicit_unset() {
        let graph = tenant_schema();
        let builder = QueryBuilder::new(&graph);
        let base = Assignments::new()
            .with_relation("org", reference("Organisation", 1))
            .with("id", 10)
            .with("name", "intake");

        let omitted = builder.build_insert("Form", &base).unwrap();
        assert!(!omitted.contains("owner_org_id"));

        let unset = builder
            .build_insert("Form", &base.clone().with_relation("owner", RelationValue::Unset))
            .unwrap();
        assert_eq!(unset.get("owner_org_id"), Some(&Value::Int(None)));
        assert_eq!(unset.get("owner_id"), Some(&Value::Int(None)));
    }

    #[test]
    fn test_insert_rejects_null_for_required_field() {
        let graph = tenant_schema();
        let builder = QueryBuilder::new(&graph);
        let assignments = Assignments::new()
            .with_relation("org", reference("Organisation", 1))
            .with("id", 10)
            .with("name", Value::String(None));
        assert_eq!(
            builder.build_insert("Form", &assignments).unwrap_err(),
            OrmError::NullConstraint {
                entity: "Form".into(),
                member: "name".into(),
            }
        );
    }

    #[test]
    fn test_update_rejects_key_components() {
        let graph = tenant_schema();
        let builder = QueryBuilder::new(&graph);
        for member in ["id", "org"] {
            let mut assignments = Assignments::new();
            assignments.set(member, 2);
            assert_eq!(
                builder.build_update("Form", &assignments).unwrap_err(),
                OrmError::ImmutableKey {
                    entity: "Form".into(),
                    member: member.into(),
                }
            );
        }
    }

    #[test]
    fn test_update_null_relation_nulls_all_columns() {
        let graph = tenant_schema();
        let builder = QueryBuilder::new(&graph);
        let values = builder
            .build_update(
                "FormSubmission",
                &Assignments::new().with_relation("form", RelationValue::Null),
            )
            .unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values.get("form_org_id"), Some(&Value::Int(None)));
        assert_eq!(values.get("form_id"), Some(&Value::Int(None)));
    }

    #[test]
    fn test_unknown_member() {
        let graph = tenant_schema();
        let builder = QueryBuilder::new(&graph);
        let err = builder
            .build_update("Form", &Assignments::new().with("title", "x"))
            .unwrap_err();
        assert_eq!(err, OrmError::unknown_member("Form", "title"));
    }

    #[test]
    fn test_strict_types_toggle() {
        let graph = tenant_schema();
        let strict = QueryBuilder::new(&graph);
        let lenient = strict.strict_types(false);
        let assignments = Assignments::new().with("name", 42);

        assert!(matches!(
            strict.build_update("Form", &assignments),
            Err(OrmError::InvalidValueType { .. })
        ));
        assert_eq!(
            lenient.build_update("Form", &assignments).unwrap().get("name"),
            Some(&Value::Int(Some(42)))
        );
    }

    #[test]
    fn test_find_by_relation_rewrites_to_fk_columns() {
        let graph = tenant_schema();
        let builder = QueryBuilder::new(&graph);
        let plan = builder
            .build_find("Form", &Filter::related("owner", reference("User", [1, 1])))
            .unwrap();
        assert!(plan.joins.is_empty());
        assert_eq!(
            plan.predicate,
            Predicate::key_eq(
                [ColumnRef::new("e0", "owner_org_id"), ColumnRef::new("e0", "owner_id")],
                [Value::Int(Some(1)), Value::Int(Some(1))],
            )
        );
    }

    #[test]
    fn test_find_null_relation_checks_every_column() {
        let graph = tenant_schema();
        let builder = QueryBuilder::new(&graph);
        let plan = builder
            .build_find("FormSubmission", &Filter::is_null("form"))
            .unwrap();
        assert_eq!(
            plan.predicate,
            Predicate::All(vec![
                Predicate::IsNull(ColumnRef::new("e0", "form_org_id")),
                Predicate::IsNull(ColumnRef::new("e0", "form_id")),
            ])
        );
    }

    #[test]
    fn test_key_filter() {
        let graph = tenant_schema();
        let builder = QueryBuilder::new(&graph);
        let filter = builder.build_key_filter("Form", &KeyTuple::from([1i64, 10i64])).unwrap();
        assert_eq!(filter.project(["org_id", "id"]), Some(KeyTuple::from([1, 10])));

        assert!(matches!(
            builder.build_key_filter("Form", &KeyTuple::from(10)),
            Err(OrmError::ReferenceArity { expected: 2, actual: 1, .. })
        ));
    }
}
