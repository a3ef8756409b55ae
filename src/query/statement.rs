//! Built statements and find plans, and their rendering through sea-query.
//!
//! Everything in here is plain data: the query builder produces it, the
//! executor consumes it, and [`Statement::to_sql`] / [`FindPlan::to_sql`]
//! render it for a [`Dialect`] when an executor talks to a real database.

use crate::config::Dialect;
use crate::error::OrmError;
use crate::query::column_map::ColumnValueMap;
use sea_query::{
    Alias, Condition, DeleteStatement, Expr, ExprTrait, InsertStatement, JoinType,
    MysqlQueryBuilder, PostgresQueryBuilder, Query, SelectStatement, SqliteQueryBuilder,
    UpdateStatement, Value, Values,
};
use std::fmt;

macro_rules! build_for {
    ($stmt:expr, $dialect:expr) => {
        match $dialect {
            Dialect::Postgres => $stmt.build(PostgresQueryBuilder),
            Dialect::Sqlite => $stmt.build(SqliteQueryBuilder),
            Dialect::Mysql => $stmt.build(MysqlQueryBuilder),
        }
    };
}

/// Column qualified by a table alias of a [`FindPlan`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            column: column.into(),
        }
    }

    fn expr(&self) -> Expr {
        Expr::col((Alias::new(self.alias.clone()), Alias::new(self.column.clone())))
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.column)
    }
}

/// Flat predicate over physical columns
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Eq(ColumnRef, Value),
    IsNull(ColumnRef),
    NotNull(ColumnRef),
}

impl Predicate {
    /// Conjunction of per-column equalities
    pub fn key_eq(columns: impl IntoIterator<Item = ColumnRef>, values: impl IntoIterator<Item = Value>) -> Self {
        Predicate::All(
            columns
                .into_iter()
                .zip(values)
                .map(|(column, value)| Predicate::Eq(column, value))
                .collect(),
        )
    }

    pub fn to_condition(&self) -> Condition {
        match self {
            Predicate::All(parts) => parts
                .iter()
                .fold(Condition::all(), |cond, p| cond.add(p.to_condition())),
            Predicate::Any(parts) => parts
                .iter()
                .fold(Condition::any(), |cond, p| cond.add(p.to_condition())),
            Predicate::Eq(column, value) => Condition::all().add(column.expr().eq(value.clone())),
            Predicate::IsNull(column) => Condition::all().add(column.expr().is_null()),
            Predicate::NotNull(column) => Condition::all().add(column.expr().is_not_null()),
        }
    }
}

/// LEFT JOIN of one relationship hop
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub alias: String,
    pub entity: String,
    pub table: String,
    /// `(already joined side, this side)` column pairs
    pub on: Vec<(ColumnRef, ColumnRef)>,
}

/// Resolved find: root table, joins, and a flat predicate
#[derive(Debug, Clone, PartialEq)]
pub struct FindPlan {
    pub entity: String,
    pub table: String,
    pub alias: String,
    /// Root columns selected, in physical column order
    pub columns: Vec<String>,
    pub joins: Vec<Join>,
    pub predicate: Predicate,
    /// Set when a to-many join can repeat root rows
    pub distinct: bool,
    pub limit: Option<u64>,
}

impl FindPlan {
    pub fn select_statement(&self) -> SelectStatement {
        let mut select = Query::select();
        for column in &self.columns {
            select.column((
                Alias::new(self.alias.clone()),
                Alias::new(column.clone()),
            ));
        }
        select.from_as(Alias::new(self.table.clone()), Alias::new(self.alias.clone()));
        for join in &self.joins {
            let on = join.on.iter().fold(Condition::all(), |cond, (left, right)| {
                cond.add(left.expr().equals((
                    Alias::new(right.alias.clone()),
                    Alias::new(right.column.clone()),
                )))
            });
            select.join_as(
                JoinType::LeftJoin,
                Alias::new(join.table.clone()),
                Alias::new(join.alias.clone()),
                on,
            );
        }
        select.cond_where(self.predicate.to_condition());
        if self.distinct {
            select.distinct();
        }
        if let Some(limit) = self.limit {
            select.limit(limit);
        }
        select.to_owned()
    }

    pub fn to_sql(&self, dialect: Dialect) -> (String, Values) {
        build_for!(self.select_statement(), dialect)
    }
}

/// A write statement produced by the query builder or the null propagator
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert {
        entity: String,
        table: String,
        values: ColumnValueMap,
    },
    Update {
        entity: String,
        table: String,
        values: ColumnValueMap,
        /// Primary key column values of the row to update
        filter: ColumnValueMap,
    },
    Delete {
        entity: String,
        table: String,
        filter: ColumnValueMap,
    },
}

impl Statement {
    pub fn entity(&self) -> &str {
        match self {
            Statement::Insert { entity, .. }
            | Statement::Update { entity, .. }
            | Statement::Delete { entity, .. } => entity,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Statement::Insert { table, .. }
            | Statement::Update { table, .. }
            | Statement::Delete { table, .. } => table,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Insert { .. } => "INSERT",
            Statement::Update { .. } => "UPDATE",
            Statement::Delete { .. } => "DELETE",
        }
    }

    /// Render SQL and bound values for `dialect`
    pub fn to_sql(&self, dialect: Dialect) -> Result<(String, Values), OrmError> {
        match self {
            Statement::Insert { table, values, .. } => {
                let stmt = insert_statement(table, values)?;
                Ok(build_for!(stmt, dialect))
            }
            Statement::Update {
                table,
                values,
                filter,
                ..
            } => {
                let stmt = update_statement(table, values, filter);
                Ok(build_for!(stmt, dialect))
            }
            Statement::Delete { table, filter, .. } => {
                let stmt = delete_statement(table, filter);
                Ok(build_for!(stmt, dialect))
            }
        }
    }
}

fn insert_statement(table: &str, values: &ColumnValueMap) -> Result<InsertStatement, OrmError> {
    let (columns, values) = values.clone().into_parts();
    let mut insert = Query::insert();
    insert
        .into_table(Alias::new(table.to_string()))
        .columns(columns.into_iter().map(Alias::new))
        .values(values.into_iter().map(Expr::val))
        .map_err(|e| OrmError::Sql(e.to_string()))?;
    Ok(insert.to_owned())
}

fn update_statement(table: &str, values: &ColumnValueMap, filter: &ColumnValueMap) -> UpdateStatement {
    let mut update = Query::update();
    update.table(Alias::new(table.to_string())).values(
        values
            .iter()
            .map(|(column, value)| (Alias::new(column.to_string()), Expr::val(value.clone()))),
    );
    for (column, value) in filter.iter() {
        update.and_where(Expr::col(Alias::new(column.to_string())).eq(value.clone()));
    }
    update.to_owned()
}

fn delete_statement(table: &str, filter: &ColumnValueMap) -> DeleteStatement {
    let mut delete = Query::delete();
    delete.from_table(Alias::new(table.to_string()));
    for (column, value) in filter.iter() {
        delete.and_where(Expr::col(Alias::new(column.to_string())).eq(value.clone()));
    }
    delete.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form_filter() -> ColumnValueMap {
        let mut filter = ColumnValueMap::new();
        filter.insert("org_id", Value::Int(Some(1)));
        filter.insert("id", Value::Int(Some(10)));
        filter
    }

    #[test]
    fn test_insert_sql() {
        let mut values = form_filter();
        values.insert("owner_org_id", Value::Int(Some(1)));
        values.insert("owner_id", Value::Int(Some(1)));
        let stmt = Statement::Insert {
            entity: "Form".into(),
            table: "form".into(),
            values,
        };
        let (sql, values) = stmt.to_sql(Dialect::Postgres).unwrap();
        assert_eq!(
            sql,
            r#"INSERT INTO "form" ("org_id", "id", "owner_org_id", "owner_id") VALUES ($1, $2, $3, $4)"#
        );
        assert_eq!(values.0.len(), 4);
    }

    #[test]
    fn test_update_nulls_every_fk_column() {
        let mut values = ColumnValueMap::new();
        values.insert("form_org_id", Value::Int(None));
        values.insert("form_id", Value::Int(None));
        let stmt = Statement::Update {
            entity: "FormSubmission".into(),
            table: "form_submission".into(),
            values,
            filter: form_filter(),
        };
        let (sql, _) = stmt.to_sql(Dialect::Postgres).unwrap();
        assert_eq!(
            sql,
            r#"UPDATE "form_submission" SET "form_org_id" = $1, "form_id" = $2 WHERE "org_id" = $3 AND "id" = $4"#
        );
    }

    #[test]
    fn test_delete_sql_sqlite() {
        let stmt = Statement::Delete {
            entity: "Form".into(),
            table: "form".into(),
            filter: form_filter(),
        };
        let (sql, _) = stmt.to_sql(Dialect::Sqlite).unwrap();
        assert_eq!(sql, r#"DELETE FROM "form" WHERE "org_id" = ? AND "id" = ?"#);
    }

    #[test]
    fn test_find_plan_with_join() {
        let plan = FindPlan {
            entity: "FormSubmission".into(),
            table: "form_submission".into(),
            alias: "e0".into(),
            columns: vec!["org_id".into(), "id".into()],
            joins: vec![Join {
                alias: "e1".into(),
                entity: "Form".into(),
                table: "form".into(),
                on: vec![
                    (ColumnRef::new("e0", "form_org_id"), ColumnRef::new("e1", "org_id")),
                    (ColumnRef::new("e0", "form_id"), ColumnRef::new("e1", "id")),
                ],
            }],
            predicate: Predicate::All(vec![Predicate::Eq(
                ColumnRef::new("e1", "name"),
                Value::from("intake"),
            )]),
            distinct: false,
            limit: Some(1),
        };
        let (sql, _) = plan.to_sql(Dialect::Postgres);
        assert!(sql.starts_with(r#"SELECT "e0"."org_id", "e0"."id" FROM "form_submission" AS "e0""#), "{sql}");
        assert!(sql.contains(r#"LEFT JOIN "form" AS "e1" ON "e0"."form_org_id" = "e1"."org_id" AND "e0"."form_id" = "e1"."id""#), "{sql}");
        assert!(sql.contains(r#"WHERE "e1"."name" = $1"#), "{sql}");
        assert!(sql.ends_with("LIMIT $2"), "{sql}");
    }
}
