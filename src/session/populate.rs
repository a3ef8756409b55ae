//! Population requests and their expansion into a relation tree.

use crate::error::OrmError;
use crate::schema::def::EntityDef;
use crate::schema::SchemaGraph;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Which relationships [`crate::Session::find`] loads alongside the results
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Populate {
    #[default]
    None,
    /// Dotted relation paths, e.g. `"form.owner"` or `"owner.forms"`
    Paths(Vec<String>),
    /// Every owning to-one relationship reachable from the root, each edge once
    All,
}

impl From<()> for Populate {
    fn from(_: ()) -> Self {
        Populate::None
    }
}

impl From<&str> for Populate {
    fn from(path: &str) -> Self {
        Populate::Paths(vec![path.to_string()])
    }
}

impl From<String> for Populate {
    fn from(path: String) -> Self {
        Populate::Paths(vec![path])
    }
}

impl From<Vec<String>> for Populate {
    fn from(paths: Vec<String>) -> Self {
        Populate::Paths(paths)
    }
}

impl From<Vec<&str>> for Populate {
    fn from(paths: Vec<&str>) -> Self {
        Populate::Paths(paths.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Populate {
    fn from(paths: [&str; N]) -> Self {
        Populate::Paths(paths.iter().map(|p| p.to_string()).collect())
    }
}

/// Relation name to nested relations, in request order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PopulateTree(pub(crate) IndexMap<String, PopulateTree>);

impl PopulateTree {
    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &PopulateTree)> + '_ {
        self.0.iter().map(|(name, child)| (name.as_str(), child))
    }
}

/// Expand a request against `root` into a validated tree
pub(crate) fn expand(
    graph: &SchemaGraph,
    root: &EntityDef,
    populate: &Populate,
) -> Result<PopulateTree, OrmError> {
    match populate {
        Populate::None => Ok(PopulateTree::default()),
        Populate::Paths(paths) => {
            let mut tree = PopulateTree::default();
            for path in paths {
                insert_path(graph, root, path, &mut tree)?;
            }
            Ok(tree)
        }
        Populate::All => {
            let mut visited = HashSet::new();
            Ok(expand_all(graph, root, &mut visited))
        }
    }
}

fn insert_path(
    graph: &SchemaGraph,
    root: &EntityDef,
    path: &str,
    tree: &mut PopulateTree,
) -> Result<(), OrmError> {
    let mut def = root;
    let mut node = tree;
    let mut edges: HashSet<String> = HashSet::new();

    for segment in path.split('.') {
        let relation = def.relation(segment).ok_or_else(|| {
            if def.field(segment).is_some() {
                OrmError::InvalidAssignment {
                    entity: def.name.clone(),
                    member: segment.to_string(),
                    reason: format!("`{path}` populates a scalar field"),
                }
            } else {
                OrmError::unknown_member(&def.name, segment)
            }
        })?;
        let edge = format!("{}.{}", def.name, relation.name);
        if !edges.insert(edge.clone()) {
            return Err(OrmError::CyclicPath {
                path: path.to_string(),
                edge,
            });
        }
        def = graph.entity(&relation.target)?;
        node = node.0.entry(segment.to_string()).or_default();
    }
    Ok(())
}

fn expand_all(graph: &SchemaGraph, def: &EntityDef, visited: &mut HashSet<String>) -> PopulateTree {
    let mut tree = PopulateTree::default();
    for relation in def.owning_relations() {
        if !visited.insert(format!("{}.{}", def.name, relation.name)) {
            continue;
        }
        let child = graph
            .get(&relation.target)
            .map(|target| expand_all(graph, target, visited))
            .unwrap_or_default();
        tree.0.insert(relation.name.clone(), child);
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::tenant_schema;

    fn names(tree: &PopulateTree) -> Vec<&str> {
        tree.iter().map(|(name, _)| name).collect()
    }

    #[test]
    fn test_paths_share_prefixes() {
        let graph = tenant_schema();
        let root = graph.entity("FormSubmission").unwrap();
        let tree = expand(
            &graph,
            root,
            &Populate::from(["form", "form.owner", "form.owner.org"]),
        )
        .unwrap();
        assert_eq!(names(&tree), ["form"]);
        let form = &tree.0["form"];
        assert_eq!(names(form), ["owner"]);
        assert_eq!(names(&form.0["owner"]), ["org"]);
    }

    #[test]
    fn test_repeated_edge_is_cyclic() {
        let graph = tenant_schema();
        let root = graph.entity("Form").unwrap();
        let err = expand(&graph, root, &Populate::from("owner.forms.owner")).unwrap_err();
        assert_eq!(
            err,
            OrmError::CyclicPath {
                path: "owner.forms.owner".into(),
                edge: "Form.owner".into(),
            }
        );
    }

    #[test]
    fn test_scalar_and_unknown_segments() {
        let graph = tenant_schema();
        let root = graph.entity("Form").unwrap();
        assert!(matches!(
            expand(&graph, root, &Populate::from("name")),
            Err(OrmError::InvalidAssignment { .. })
        ));
        assert!(matches!(
            expand(&graph, root, &Populate::from("creator")),
            Err(OrmError::UnknownMember { .. })
        ));
    }

    #[test]
    fn test_all_visits_each_edge_once() {
        let graph = tenant_schema();
        let root = graph.entity("Answer").unwrap();
        let tree = expand(&graph, root, &Populate::All).unwrap();
        assert_eq!(names(&tree), ["org", "submission"]);
        let submission = &tree.0["submission"];
        // FormSubmission.org is a different edge from Answer.org
        assert_eq!(names(submission), ["org", "form"]);
        assert!(submission.0["org"].is_empty());
        let form = &submission.0["form"];
        assert_eq!(names(form), ["org", "owner"]);
        assert_eq!(names(&form.0["owner"]), ["org"]);
    }
}
