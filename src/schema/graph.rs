//! The read-only schema graph.
//!
//! Built once by [`crate::schema::register`]; every later operation consults it
//! without locking. Each relationship contributes one directed edge.

use crate::error::OrmError;
use crate::schema::def::{EntityDef, RelationDef, RelationKind};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Directed edge for one relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEdge {
    pub from: String,
    pub relation: String,
    pub to: String,
    pub kind: RelationKind,
    pub owner: bool,
    pub primary: bool,
}

/// Registered entities and the relationship edges between them
#[derive(Debug, Clone)]
pub struct SchemaGraph {
    pub(crate) entities: IndexMap<String, EntityDef>,
    pub(crate) edges: Vec<RelationEdge>,
}

impl SchemaGraph {
    pub(crate) fn new(entities: IndexMap<String, EntityDef>) -> Self {
        let edges = entities
            .values()
            .flat_map(|e| {
                e.relations.iter().map(move |r| RelationEdge {
                    from: e.name.clone(),
                    relation: r.name.clone(),
                    to: r.target.clone(),
                    kind: r.kind,
                    owner: r.owner,
                    primary: r.primary,
                })
            })
            .collect();
        Self { entities, edges }
    }

    /// Look up a registered entity
    pub fn entity(&self, name: &str) -> Result<&EntityDef, OrmError> {
        self.entities
            .get(name)
            .ok_or_else(|| OrmError::UnknownEntity(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Entities in registration order
    pub fn entities(&self) -> impl Iterator<Item = &EntityDef> + '_ {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn edges(&self) -> &[RelationEdge] {
        &self.edges
    }

    /// Owning to-one relations of any entity that point at `target`
    pub fn referencing<'a>(
        &'a self,
        target: &'a str,
    ) -> impl Iterator<Item = (&'a EntityDef, &'a RelationDef)> + 'a {
        self.entities.values().flat_map(move |e| {
            e.owning_relations()
                .filter(move |r| r.target == target)
                .map(move |r| (e, r))
        })
    }

    /// Number of relation hops the deepest primary key column of `entity` travels
    pub fn key_depth(&self, entity: &str) -> Result<usize, OrmError> {
        Ok(self
            .entity(entity)?
            .primary_key
            .iter()
            .map(|k| k.depth())
            .max()
            .unwrap_or(0))
    }

    /// Entities ordered so that every referenced entity precedes its dependents
    ///
    /// Only owning to-one edges count. Self references are ignored. Entities
    /// caught in a cycle of nullable references are appended in registration
    /// order.
    pub fn dependency_order(&self) -> Vec<&str> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for entity in self.entities.values() {
            let deps: HashSet<&str> = entity
                .owning_relations()
                .map(|r| r.target.as_str())
                .filter(|t| *t != entity.name)
                .collect();
            in_degree.insert(entity.name.as_str(), deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(entity.name.as_str());
            }
        }

        // registration order keeps the result deterministic
        let mut queue: Vec<&str> = self
            .entities
            .keys()
            .map(String::as_str)
            .filter(|name| in_degree.get(name).copied() == Some(0))
            .collect();
        queue.reverse();

        let mut result = Vec::with_capacity(self.entities.len());
        while let Some(current) = queue.pop() {
            result.push(current);
            if let Some(children) = dependents.get(current) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.insert(0, child);
                        }
                    }
                }
            }
        }

        if result.len() != self.entities.len() {
            log::warn!("Circular foreign key references; falling back to registration order for the remainder");
            for name in self.entities.keys() {
                if !result.contains(&name.as_str()) {
                    result.push(name.as_str());
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{register, EntityDescription, FieldDescription, RelationDescription};
    use crate::test_helpers::tenant_schema;
    use crate::value::ScalarType;

    fn keyed(name: &str) -> EntityDescription {
        EntityDescription::new(name).field(FieldDescription::new("id", ScalarType::Integer).primary())
    }

    #[test]
    fn test_dependency_order_puts_referenced_entities_first() {
        let graph = tenant_schema();
        assert_eq!(
            graph.dependency_order(),
            ["Organisation", "User", "Form", "FormSubmission", "Answer"]
        );
    }

    #[test]
    fn test_dependency_order_appends_cycles_in_registration_order() {
        let graph = register(vec![
            keyed("A").relation(RelationDescription::to_one("b", "B").nullable()),
            keyed("B").relation(RelationDescription::to_one("a", "A").nullable()),
            keyed("C"),
            keyed("D").relation(RelationDescription::to_one("c", "C")),
        ])
        .unwrap();
        assert_eq!(graph.dependency_order(), ["C", "D", "A", "B"]);
    }

    #[test]
    fn test_self_reference_does_not_block_ordering() {
        let graph = register(vec![
            keyed("Node").relation(RelationDescription::to_one("parent", "Node").nullable())
        ])
        .unwrap();
        assert_eq!(graph.dependency_order(), ["Node"]);
    }

    #[test]
    fn test_edges_and_referencing() {
        let graph = tenant_schema();
        assert_eq!(graph.edges().len(), 9);
        let forms = graph
            .edges()
            .iter()
            .find(|e| e.from == "User" && e.relation == "forms")
            .unwrap();
        assert_eq!(forms.kind, RelationKind::ToMany);
        assert!(!forms.owner);

        let referencing: Vec<(&str, &str)> = graph
            .referencing("Form")
            .map(|(e, r)| (e.name.as_str(), r.name.as_str()))
            .collect();
        assert_eq!(referencing, [("FormSubmission", "form")]);
        assert!(matches!(
            graph.entity("Common"),
            Err(OrmError::UnknownEntity(name)) if name == "Common"
        ));
    }
}
