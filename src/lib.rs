//! # Keystone
//!
//! Composite-key aware entity mapping and query building for relational ORMs.
//!
//! Entities are registered once from structural descriptions into an
//! immutable [`SchemaGraph`]. Primary keys may be tuples of columns, some of
//! them inherited through a parent relationship, and every foreign key to such
//! an entity carries the full tuple. Relationships can be assigned as a
//! [`Reference`], a loaded [`EntityInstance`], a raw [`KeyTuple`] or nothing,
//! and all four produce the same columns.
//!
//! Statements are handed to a [`StatementExecutor`]; this crate never opens a
//! connection itself.

pub mod config;
pub mod error;
pub mod executor;
pub mod instance;
pub mod key;
pub mod propagate;
pub mod query;
pub mod reference;
pub mod schema;
pub mod session;
pub mod test_helpers;
pub mod value;

#[cfg(feature = "tracing")]
mod tracing_helpers;

pub use config::{Dialect, OrmConfig};
pub use error::{OrmError, SchemaError, StorageError, StorageErrorKind};
pub use executor::{Row, StatementExecutor};
pub use instance::{Assignment, Assignments, EntityInstance};
pub use key::{resolve_foreign_key_columns, resolve_key_columns, ColumnSet, KeyColumn};
pub use propagate::{apply_nullification, diff};
pub use query::{ColumnValueMap, Filter, FindPlan, QueryBuilder, Statement};
pub use reference::{entity_key, normalize, reference, Reference, RelationValue};
pub use schema::{register, register_with, EntityDescription, SchemaGraph};
pub use session::{FlushSummary, Populate, Session};
pub use value::{KeyTuple, ScalarType};
