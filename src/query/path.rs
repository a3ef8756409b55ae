//! Resolution of dotted member paths to physical columns.
//!
//! Each relation hop becomes a LEFT JOIN, except when the rest of the path
//! names one of the target's key columns: that value is already stored in the
//! owner's foreign key, so the path is rewritten onto the local FK column.
//!
//! ```text
//! FormSubmission: "form.id"          -> e0.form_id            (no join)
//! FormSubmission: "form.org.id"      -> e0.form_org_id        (no join)
//! FormSubmission: "form.name"        -> e1.name               (JOIN form e1)
//! Form:           "submissions.id"   -> e1.id                 (JOIN form_submission e1, distinct)
//! ```
//!
//! A path that walks the same relationship edge twice is rejected with
//! [`OrmError::CyclicPath`].

use crate::error::OrmError;
use crate::query::statement::{ColumnRef, Join};
use crate::schema::def::{EntityDef, Member, RelationDef, RelationKind};
use crate::schema::SchemaGraph;
use crate::value::ScalarType;
use std::collections::{HashMap, HashSet};

pub(crate) const ROOT_ALIAS: &str = "e0";

/// What a path ends at
#[derive(Debug)]
pub(crate) enum PathTarget<'g> {
    Scalar {
        column: ColumnRef,
        scalar: ScalarType,
    },
    Relation {
        columns: Vec<ColumnRef>,
        owner: &'g EntityDef,
        relation: &'g RelationDef,
    },
}

pub(crate) struct PathResolver<'g> {
    graph: &'g SchemaGraph,
    root: &'g EntityDef,
    joins: Vec<Join>,
    aliases: HashMap<Vec<String>, String>,
    distinct: bool,
}

impl<'g> PathResolver<'g> {
    pub(crate) fn new(graph: &'g SchemaGraph, root: &'g EntityDef) -> Self {
        Self {
            graph,
            root,
            joins: Vec::new(),
            aliases: HashMap::new(),
            distinct: false,
        }
    }

    pub(crate) fn resolve(&mut self, path: &str) -> Result<PathTarget<'g>, OrmError> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(OrmError::unknown_member(&self.root.name, path));
        }

        let mut current = self.root;
        let mut alias = ROOT_ALIAS.to_string();
        let mut visited: HashSet<(&str, &str)> = HashSet::new();

        for (i, segment) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            let member = current
                .member(segment)
                .ok_or_else(|| OrmError::unknown_member(&current.name, segment))?;

            let relation = match member {
                Member::Field(field) if last => {
                    return Ok(PathTarget::Scalar {
                        column: ColumnRef::new(alias, field.column.clone()),
                        scalar: field.scalar,
                    });
                }
                Member::Field(field) => {
                    return Err(OrmError::InvalidAssignment {
                        entity: current.name.clone(),
                        member: field.name.clone(),
                        reason: format!("`{path}` continues past a scalar field"),
                    });
                }
                Member::Relation(relation) => relation,
            };

            if !visited.insert((current.name.as_str(), relation.name.as_str())) {
                return Err(OrmError::CyclicPath {
                    path: path.to_string(),
                    edge: format!("{}.{}", current.name, relation.name),
                });
            }

            if last {
                if !relation.is_owning_to_one() {
                    return Err(OrmError::InvalidAssignment {
                        entity: current.name.clone(),
                        member: relation.name.clone(),
                        reason: "inverse relations cannot be compared; filter on a member of the related entity".to_string(),
                    });
                }
                return Ok(PathTarget::Relation {
                    columns: relation
                        .columns
                        .iter()
                        .map(|c| ColumnRef::new(alias.clone(), c))
                        .collect(),
                    owner: current,
                    relation,
                });
            }

            let target = self.graph.entity(&relation.target)?;
            if relation.is_owning_to_one() {
                let rest = &segments[i + 1..];
                let shortcut = target.primary_key.iter().position(|k| {
                    k.path.len() == rest.len() && k.path.iter().zip(rest).all(|(a, b)| a == b)
                });
                if let Some(position) = shortcut {
                    if let Some(column) = relation.columns.get(position) {
                        return Ok(PathTarget::Scalar {
                            column: ColumnRef::new(alias, column),
                            scalar: target.primary_key[position].scalar,
                        });
                    }
                }
            }

            let prefix: Vec<String> = segments[..=i].iter().map(|s| s.to_string()).collect();
            alias = self.join(prefix, current, &alias, relation, target)?;
            current = target;
        }

        Err(OrmError::unknown_member(&self.root.name, path))
    }

    fn join(
        &mut self,
        prefix: Vec<String>,
        from: &EntityDef,
        from_alias: &str,
        relation: &RelationDef,
        target: &EntityDef,
    ) -> Result<String, OrmError> {
        if let Some(alias) = self.aliases.get(&prefix) {
            return Ok(alias.clone());
        }
        let alias = format!("e{}", self.joins.len() + 1);

        let on = if relation.is_owning_to_one() {
            relation
                .columns
                .iter()
                .zip(&target.primary_key)
                .map(|(fk, key)| {
                    (
                        ColumnRef::new(from_alias, fk),
                        ColumnRef::new(alias.clone(), key.column.clone()),
                    )
                })
                .collect()
        } else {
            let back = relation
                .mapped_by
                .as_deref()
                .and_then(|m| target.relation(m))
                .ok_or_else(|| OrmError::InvalidAssignment {
                    entity: from.name.clone(),
                    member: relation.name.clone(),
                    reason: "inverse relation has no owning side".to_string(),
                })?;
            if relation.kind == RelationKind::ToMany {
                self.distinct = true;
            }
            from.primary_key
                .iter()
                .zip(back.columns.iter())
                .map(|(key, fk)| {
                    (
                        ColumnRef::new(from_alias, key.column.clone()),
                        ColumnRef::new(alias.clone(), fk),
                    )
                })
                .collect()
        };

        self.joins.push(Join {
            alias: alias.clone(),
            entity: target.name.clone(),
            table: target.table.clone(),
            on,
        });
        self.aliases.insert(prefix, alias.clone());
        Ok(alias)
    }

    pub(crate) fn into_parts(self) -> (Vec<Join>, bool) {
        (self.joins, self.distinct)
    }
}
