//! CREATE TABLE statements for a registered schema.
//!
//! Tables come out in [`SchemaGraph::dependency_order`], each with a composite
//! primary key and one composite foreign key per owning to-one relation.

use crate::config::Dialect;
use crate::schema::def::{DeleteRule, EntityDef};
use crate::schema::SchemaGraph;
use crate::value::ScalarType;
use sea_query::{
    Alias, ColumnDef, ForeignKey, ForeignKeyAction, Index, MysqlQueryBuilder,
    PostgresQueryBuilder, SqliteQueryBuilder, Table, TableCreateStatement,
};

/// One `TableCreateStatement` per entity, parents first
pub fn create_table_statements(graph: &SchemaGraph) -> Vec<TableCreateStatement> {
    graph
        .dependency_order()
        .into_iter()
        .filter_map(|name| graph.get(name))
        .map(|entity| create_table(graph, entity))
        .collect()
}

/// Render every CREATE TABLE statement for `dialect`
pub fn create_table_sql(graph: &SchemaGraph, dialect: Dialect) -> Vec<String> {
    create_table_statements(graph)
        .iter()
        .map(|stmt| match dialect {
            Dialect::Postgres => stmt.to_string(PostgresQueryBuilder),
            Dialect::Sqlite => stmt.to_string(SqliteQueryBuilder),
            Dialect::Mysql => stmt.to_string(MysqlQueryBuilder),
        })
        .collect()
}

pub fn create_table(graph: &SchemaGraph, entity: &EntityDef) -> TableCreateStatement {
    let mut table = Table::create();
    table.table(Alias::new(entity.table.clone())).if_not_exists();

    for column in &entity.columns {
        let mut def = ColumnDef::new(Alias::new(column.name.clone()));
        apply_scalar_type(column.scalar, &mut def);
        if column.nullable {
            def.null();
        } else {
            def.not_null();
        }
        table.col(&mut def);
    }

    let mut pk = Index::create();
    for key in &entity.primary_key {
        pk.col(Alias::new(key.column.clone()));
    }
    table.primary_key(&mut pk);

    for relation in entity.owning_relations() {
        let Some(target) = graph.get(&relation.target) else {
            continue;
        };
        let mut fk = ForeignKey::create();
        fk.name(format!("fk_{}_{}", entity.table, relation.name))
            .from_tbl(Alias::new(entity.table.clone()))
            .to_tbl(Alias::new(target.table.clone()));
        for (column, target_key) in relation.columns.iter().zip(&target.primary_key) {
            fk.from_col(Alias::new(column.to_string()))
                .to_col(Alias::new(target_key.column.clone()));
        }
        if let Some(action) = foreign_key_action(relation.on_delete) {
            fk.on_delete(action);
        }
        table.foreign_key(&mut fk);
    }

    table.to_owned()
}

fn foreign_key_action(rule: DeleteRule) -> Option<ForeignKeyAction> {
    match rule {
        DeleteRule::NoAction => None,
        DeleteRule::Restrict => Some(ForeignKeyAction::Restrict),
        DeleteRule::Cascade => Some(ForeignKeyAction::Cascade),
        DeleteRule::SetNull => Some(ForeignKeyAction::SetNull),
    }
}

fn apply_scalar_type(scalar: ScalarType, def: &mut ColumnDef) {
    match scalar {
        ScalarType::Boolean => def.boolean(),
        ScalarType::SmallInteger => def.small_integer(),
        ScalarType::Integer => def.integer(),
        ScalarType::BigInteger => def.big_integer(),
        ScalarType::Float => def.float(),
        ScalarType::Double => def.double(),
        ScalarType::Text => def.text(),
        ScalarType::Bytes => def.binary(),
        ScalarType::Json => def.json(),
        ScalarType::Uuid => def.uuid(),
        ScalarType::Timestamp => def.timestamp(),
        ScalarType::Decimal => def.decimal(),
    };
}
