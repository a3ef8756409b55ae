//! Reports behind the `keystone` command line tool.
//!
//! Each command renders plain text so the binary only adds colour and exit
//! codes on top.

use anyhow::Context;
use keystone::schema::{load_descriptions, register_with, RelationKind};
use keystone::{Dialect, OrmConfig, SchemaGraph};
use std::fmt::Write;
use std::path::Path;

/// Register the descriptions in `file`, or in the configured entities file
pub fn load_graph(file: Option<&Path>, config: &OrmConfig) -> anyhow::Result<SchemaGraph> {
    let path = file
        .or(config.entities_file.as_deref())
        .context("no entity description file: pass --file or set orm.entities_file")?;
    let descriptions = load_descriptions(path)?;
    let graph = register_with(descriptions, config)
        .with_context(|| format!("invalid entity descriptions in {}", path.display()))?;
    Ok(graph)
}

/// Key columns and foreign key columns of one entity, or of all of them
pub fn columns_report(graph: &SchemaGraph, entity: Option<&str>) -> anyhow::Result<String> {
    let entities = match entity {
        Some(name) => vec![graph.entity(name)?],
        None => graph.entities().collect(),
    };

    let mut out = String::new();
    for def in entities {
        writeln!(out, "{} ({})", def.name, def.table)?;
        let width = def.primary_key.iter().map(|k| k.column.len()).max().unwrap_or(0);
        for key in &def.primary_key {
            writeln!(
                out,
                "  key  {:width$}  <- {} ({})",
                key.column,
                key.path_string(),
                key.scalar.name()
            )?;
        }
        for relation in &def.relations {
            match relation.kind {
                RelationKind::ToOne if relation.owner => writeln!(
                    out,
                    "  fk   {} -> {}: {}",
                    relation.name,
                    relation.target,
                    relation.columns.as_slice().join(", ")
                )?,
                _ => writeln!(
                    out,
                    "  inv  {} -> {} (mapped by {})",
                    relation.name,
                    relation.target,
                    relation.mapped_by.as_deref().unwrap_or("?")
                )?,
            }
        }
    }
    Ok(out)
}

/// One line per entity: key arity and relationship depth
pub fn check_report(graph: &SchemaGraph) -> anyhow::Result<String> {
    let mut out = String::new();
    for def in graph.entities() {
        writeln!(
            out,
            "{}: {}-column key, depth {}, {} column(s)",
            def.name,
            def.key_arity(),
            graph.key_depth(&def.name)?,
            def.columns.len()
        )?;
    }
    Ok(out)
}

/// CREATE TABLE statements in dependency order
pub fn ddl_report(graph: &SchemaGraph, dialect: Dialect) -> String {
    keystone::schema::create_table_sql(graph, dialect)
        .into_iter()
        .map(|sql| format!("{sql};\n"))
        .collect()
}
