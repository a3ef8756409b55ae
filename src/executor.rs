//! Statement execution seam.
//!
//! The core never talks to a database. It hands [`Statement`]s and
//! [`FindPlan`]s to a [`StatementExecutor`], which renders them for its
//! backend (see [`Statement::to_sql`]) and reports failures as
//! [`StorageError`]. Those errors reach the caller unmodified.

use crate::error::StorageError;
use crate::query::column_map::ColumnValueMap;
use crate::query::statement::{FindPlan, Statement};
use std::sync::Arc;

/// One stored row: physical column name to value
pub type Row = ColumnValueMap;

/// Trait for executing built statements
///
/// Implementations decide how statements reach storage: a pooled connection,
/// a transaction, or the in-memory store in [`crate::test_helpers`].
///
/// # Example
///
/// ```
/// use keystone::executor::{Row, StatementExecutor};
/// use keystone::query::{FindPlan, Statement};
/// use keystone::{Dialect, StorageError};
///
/// struct SqlLog(std::sync::Mutex<Vec<String>>);
///
/// impl StatementExecutor for SqlLog {
///     fn execute(&self, statement: &Statement) -> Result<u64, StorageError> {
///         let (sql, _) = statement
///             .to_sql(Dialect::Postgres)
///             .map_err(|e| StorageError::new(keystone::StorageErrorKind::Other, e.to_string()))?;
///         self.0.lock().unwrap().push(sql);
///         Ok(1)
///     }
///
///     fn query(&self, plan: &FindPlan) -> Result<Vec<Row>, StorageError> {
///         self.0.lock().unwrap().push(plan.to_sql(Dialect::Postgres).0);
///         Ok(Vec::new())
///     }
/// }
/// ```
pub trait StatementExecutor {
    /// Execute a write statement and return the number of rows affected
    fn execute(&self, statement: &Statement) -> Result<u64, StorageError>;

    /// Run a find plan and return the root entity's rows
    fn query(&self, plan: &FindPlan) -> Result<Vec<Row>, StorageError>;
}

impl<E: StatementExecutor + ?Sized> StatementExecutor for &E {
    fn execute(&self, statement: &Statement) -> Result<u64, StorageError> {
        (**self).execute(statement)
    }

    fn query(&self, plan: &FindPlan) -> Result<Vec<Row>, StorageError> {
        (**self).query(plan)
    }
}

impl<E: StatementExecutor + ?Sized> StatementExecutor for Box<E> {
    fn execute(&self, statement: &Statement) -> Result<u64, StorageError> {
        (**self).execute(statement)
    }

    fn query(&self, plan: &FindPlan) -> Result<Vec<Row>, StorageError> {
        (**self).query(plan)
    }
}

impl<E: StatementExecutor + ?Sized> StatementExecutor for Arc<E> {
    fn execute(&self, statement: &Statement) -> Result<u64, StorageError> {
        (**self).execute(statement)
    }

    fn query(&self, plan: &FindPlan) -> Result<Vec<Row>, StorageError> {
        (**self).query(plan)
    }
}
