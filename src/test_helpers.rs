//! Test tooling: an in-memory executor and a multi-tenant fixture schema.
//!
//! [`MemoryExecutor`] stores rows per table and enforces what a relational
//! backend would: primary key uniqueness, NOT NULL, foreign key existence and
//! ON DELETE rules. Orphan removal declared on an inverse collection deletes
//! the children of a deleted parent regardless of their ON DELETE rule. Every
//! statement is applied atomically.

use crate::error::{StorageError, StorageErrorKind};
use crate::executor::{Row, StatementExecutor};
use crate::propagate::apply_nullification;
use crate::query::statement::{ColumnRef, FindPlan, Predicate, Statement};
use crate::schema::def::EntityDef;
use crate::schema::{
    register, DeleteRule, EntityDescription, FieldDescription, RelationDescription, SchemaGraph,
};
use crate::value::{is_null, KeyTuple, ScalarType};
use sea_query::Value;
use std::collections::HashMap;
use std::sync::Mutex;

type Tables = HashMap<String, Vec<Row>>;

/// In-memory [`StatementExecutor`]
pub struct MemoryExecutor {
    graph: SchemaGraph,
    tables: Mutex<Tables>,
    executed: Mutex<Vec<String>>,
    fail_next: Mutex<Option<StorageError>>,
}

impl MemoryExecutor {
    pub fn new(graph: &SchemaGraph) -> Self {
        Self {
            graph: graph.clone(),
            tables: Mutex::new(HashMap::new()),
            executed: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
        }
    }

    /// Stored rows of `table`, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.tables)
            .ok()
            .and_then(|tables| tables.get(table).cloned())
            .unwrap_or_default()
    }

    /// `"INSERT form"`-style log of every statement that was applied
    pub fn executed(&self) -> Vec<String> {
        lock(&self.executed).map(|log| log.clone()).unwrap_or_default()
    }

    /// Make the next `execute` call fail with `error`
    pub fn fail_next(&self, error: StorageError) {
        if let Ok(mut slot) = lock(&self.fail_next) {
            *slot = Some(error);
        }
    }

    fn apply(&self, tables: &mut Tables, statement: &Statement) -> Result<u64, StorageError> {
        let def = self.definition(statement.entity())?;
        match statement {
            Statement::Insert { values, .. } => {
                let mut row = Row::new();
                for column in &def.columns {
                    let value = values
                        .get(&column.name)
                        .cloned()
                        .unwrap_or_else(|| column.scalar.null_value());
                    row.insert(column.name.clone(), value);
                }
                self.check_row(tables, def, &row)?;
                let key = key_of(def, &row);
                let table = tables.entry(def.table.clone()).or_default();
                if table.iter().any(|existing| key_of(def, existing) == key) {
                    return Err(StorageError::constraint(format!(
                        "duplicate key value violates unique constraint \"{}_pkey\"",
                        def.table
                    )));
                }
                table.push(row);
                Ok(1)
            }
            Statement::Update { values, filter, .. } => {
                let mut updated = Vec::new();
                if let Some(rows) = tables.get_mut(&def.table) {
                    for row in rows.iter_mut().filter(|r| matches_filter(r, filter)) {
                        for (column, value) in values.iter() {
                            row.insert(column, value.clone());
                        }
                        updated.push(row.clone());
                    }
                }
                for row in &updated {
                    self.check_row(tables, def, row)?;
                }
                Ok(updated.len() as u64)
            }
            Statement::Delete { filter, .. } => {
                let keys: Vec<KeyTuple> = tables
                    .get(&def.table)
                    .map(|rows| {
                        rows.iter()
                            .filter(|r| matches_filter(r, filter))
                            .map(|r| key_of(def, r))
                            .collect()
                    })
                    .unwrap_or_default();
                for key in &keys {
                    self.delete_row(tables, def, key)?;
                }
                Ok(keys.len() as u64)
            }
        }
    }

    fn delete_row(&self, tables: &mut Tables, def: &EntityDef, key: &KeyTuple) -> Result<(), StorageError> {
        if let Some(rows) = tables.get_mut(&def.table) {
            rows.retain(|r| &key_of(def, r) != key);
        }

        for (dependent, relation) in self.graph.referencing(&def.name) {
            let columns: Vec<&str> = relation.columns.iter().collect();
            let referencing: Vec<KeyTuple> = tables
                .get(&dependent.table)
                .map(|rows| {
                    rows.iter()
                        .filter(|r| r.project(columns.iter().copied()).as_ref() == Some(key))
                        .map(|r| key_of(dependent, r))
                        .collect()
                })
                .unwrap_or_default();
            if referencing.is_empty() {
                continue;
            }

            let rule = if def.removes_orphans(&dependent.name, &relation.name) {
                DeleteRule::Cascade
            } else {
                relation.on_delete
            };
            match rule {
                DeleteRule::NoAction | DeleteRule::Restrict => {
                    return Err(StorageError::constraint(format!(
                        "update or delete on table \"{}\" violates foreign key constraint \"fk_{}_{}\" on table \"{}\"",
                        def.table, dependent.table, relation.name, dependent.table
                    )));
                }
                DeleteRule::Cascade => {
                    for dependent_key in &referencing {
                        self.delete_row(tables, dependent, dependent_key)?;
                    }
                }
                DeleteRule::SetNull => {
                    let nulls = apply_nullification(&self.graph, &dependent.name, &relation.name)
                        .map_err(|e| StorageError::constraint(e.to_string()))?;
                    if let Some(rows) = tables.get_mut(&dependent.table) {
                        for row in rows
                            .iter_mut()
                            .filter(|r| referencing.contains(&key_of(dependent, r)))
                        {
                            for (column, value) in nulls.iter() {
                                row.insert(column, value.clone());
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn check_row(&self, tables: &Tables, def: &EntityDef, row: &Row) -> Result<(), StorageError> {
        for column in def.columns.iter().filter(|c| !c.nullable) {
            if row.get(&column.name).map_or(true, is_null) {
                return Err(StorageError::constraint(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    column.name, def.table
                )));
            }
        }

        for relation in def.owning_relations() {
            let Some(fk) = row.project(relation.columns.iter()) else {
                continue;
            };
            if fk.is_null() {
                continue;
            }
            let target = self.definition(&relation.target)?;
            let exists = tables
                .get(&target.table)
                .is_some_and(|rows| rows.iter().any(|r| key_of(target, r) == fk));
            if !exists {
                return Err(StorageError::constraint(format!(
                    "insert or update on table \"{}\" violates foreign key constraint \"fk_{}_{}\"",
                    def.table, def.table, relation.name
                )));
            }
        }
        Ok(())
    }

    fn definition(&self, entity: &str) -> Result<&EntityDef, StorageError> {
        self.graph
            .entity(entity)
            .map_err(|e| StorageError::new(StorageErrorKind::Other, e.to_string()))
    }
}

impl StatementExecutor for MemoryExecutor {
    fn execute(&self, statement: &Statement) -> Result<u64, StorageError> {
        if let Some(error) = lock(&self.fail_next)?.take() {
            return Err(error);
        }
        let mut tables = lock(&self.tables)?;
        // work on a copy so a failed statement leaves no trace
        let mut staged = tables.clone();
        let affected = self.apply(&mut staged, statement)?;
        *tables = staged;
        lock(&self.executed)?.push(format!("{} {}", statement.kind(), statement.table()));
        Ok(affected)
    }

    fn query(&self, plan: &FindPlan) -> Result<Vec<Row>, StorageError> {
        let tables = lock(&self.tables)?;

        let mut combos: Vec<HashMap<&str, Option<&Row>>> = rows_of(&tables, &plan.table)
            .iter()
            .map(|row| HashMap::from([(plan.alias.as_str(), Some(row))]))
            .collect();

        for join in &plan.joins {
            let candidates = rows_of(&tables, &join.table);
            let mut next = Vec::new();
            for combo in combos {
                let matches: Vec<&Row> = candidates
                    .iter()
                    .filter(|candidate| {
                        join.on.iter().all(|(left, right)| {
                            match (lookup(&combo, left), candidate.get(&right.column)) {
                                (Some(l), Some(r)) => !is_null(l) && l == r,
                                _ => false,
                            }
                        })
                    })
                    .collect();
                if matches.is_empty() {
                    let mut combo = combo;
                    combo.insert(join.alias.as_str(), None);
                    next.push(combo);
                } else {
                    for matched in matches {
                        let mut combo = combo.clone();
                        combo.insert(join.alias.as_str(), Some(matched));
                        next.push(combo);
                    }
                }
            }
            combos = next;
        }

        let mut result: Vec<Row> = Vec::new();
        for combo in combos.iter().filter(|c| evaluate(&plan.predicate, c)) {
            let Some(Some(root)) = combo.get(plan.alias.as_str()) else {
                continue;
            };
            let row: Row = plan
                .columns
                .iter()
                .map(|c| (c.clone(), root.get(c).cloned().unwrap_or(Value::Int(None))))
                .collect();
            if plan.distinct && result.contains(&row) {
                continue;
            }
            result.push(row);
            if plan.limit.is_some_and(|limit| result.len() as u64 >= limit) {
                break;
            }
        }
        Ok(result)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, StorageError> {
    mutex.lock().map_err(|_| {
        StorageError::new(StorageErrorKind::Other, "memory executor lock poisoned")
    })
}

fn rows_of<'t>(tables: &'t Tables, table: &str) -> &'t [Row] {
    tables.get(table).map(Vec::as_slice).unwrap_or(&[])
}

fn key_of(def: &EntityDef, row: &Row) -> KeyTuple {
    KeyTuple::new(
        def.primary_key
            .iter()
            .map(|k| row.get(&k.column).cloned().unwrap_or_else(|| k.scalar.null_value()))
            .collect(),
    )
}

fn matches_filter(row: &Row, filter: &Row) -> bool {
    filter.iter().all(|(column, value)| row.get(column) == Some(value))
}

fn lookup<'r>(combo: &HashMap<&str, Option<&'r Row>>, column: &ColumnRef) -> Option<&'r Value> {
    combo
        .get(column.alias.as_str())
        .copied()
        .flatten()
        .and_then(|row| row.get(&column.column))
}

fn evaluate(predicate: &Predicate, combo: &HashMap<&str, Option<&Row>>) -> bool {
    match predicate {
        Predicate::All(parts) => parts.iter().all(|p| evaluate(p, combo)),
        Predicate::Any(parts) => parts.iter().any(|p| evaluate(p, combo)),
        Predicate::Eq(column, value) => {
            lookup(combo, column).is_some_and(|v| !is_null(v) && v == value)
        }
        Predicate::IsNull(column) => lookup(combo, column).map_or(true, is_null),
        Predicate::NotNull(column) => lookup(combo, column).is_some_and(|v| !is_null(v)),
    }
}

/// Multi-tenant fixture: every tenant-scoped entity is keyed by `(org, id)`
///
/// ```text
/// Organisation(id)
/// User(org, id)            forms -> Form.owner (orphan removal)
/// Form(org, id)            owner -> User (nullable, SET NULL), submissions -> FormSubmission.form
/// FormSubmission(org, id)  form -> Form (nullable, SET NULL)
/// Answer(org, id)          submission -> FormSubmission (required, CASCADE)
/// ```
pub fn tenant_descriptions() -> Vec<EntityDescription> {
    vec![
        EntityDescription::new("Organisation")
            .field(FieldDescription::new("id", ScalarType::Integer).primary())
            .field(FieldDescription::new("name", ScalarType::Text).nullable()),
        EntityDescription::fragment("Common")
            .primary_key(["org", "id"])
            .relation(
                RelationDescription::to_one("org", "Organisation")
                    .primary()
                    .on_delete(DeleteRule::Cascade),
            )
            .field(FieldDescription::new("id", ScalarType::Integer).primary()),
        EntityDescription::new("User")
            .extends("Common")
            .field(FieldDescription::new("name", ScalarType::Text))
            .relation(
                RelationDescription::to_many("forms", "Form")
                    .mapped_by("owner")
                    .orphan_removal(),
            ),
        EntityDescription::new("Form")
            .extends("Common")
            .field(FieldDescription::new("name", ScalarType::Text))
            .relation(
                RelationDescription::to_one("owner", "User")
                    .nullable()
                    .on_delete(DeleteRule::SetNull),
            )
            .relation(
                RelationDescription::to_many("submissions", "FormSubmission").mapped_by("form"),
            ),
        EntityDescription::new("FormSubmission")
            .extends("Common")
            .field(FieldDescription::new("answer", ScalarType::Text).nullable())
            .relation(
                RelationDescription::to_one("form", "Form")
                    .nullable()
                    .on_delete(DeleteRule::SetNull),
            ),
        EntityDescription::new("Answer")
            .extends("Common")
            .field(FieldDescription::new("value", ScalarType::Text).nullable())
            .relation(
                RelationDescription::to_one("submission", "FormSubmission")
                    .on_delete(DeleteRule::Cascade),
            ),
    ]
}

/// Registered [`tenant_descriptions`]
pub fn tenant_schema() -> SchemaGraph {
    register(tenant_descriptions()).expect("tenant fixture schema is valid")
}
