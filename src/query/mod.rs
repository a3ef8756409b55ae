//! Query building over composite keys.
//!
//! # Architecture
//!
//! - **Builder**: [`QueryBuilder`] turns assignments into INSERT / UPDATE
//!   column maps and filters into [`FindPlan`]s
//! - **Filter**: caller-facing [`Filter`] trees over dotted member paths
//! - **Path**: path resolution, join rewriting and cycle detection
//! - **Statement**: [`Statement`] / [`FindPlan`] data and sea-query rendering
//! - **Column map**: the ordered [`ColumnValueMap`] shared by all of the above
//!
//! # Example
//!
//! ```
//! use keystone::query::{Filter, QueryBuilder};
//! use keystone::reference::reference;
//! use keystone::test_helpers::tenant_schema;
//!
//! let graph = tenant_schema();
//! let builder = QueryBuilder::new(&graph);
//!
//! // Comparing a relationship with a reference touches only local FK columns
//! let plan = builder
//!     .build_find("Form", &Filter::related("owner", reference("User", [1, 1])))
//!     .unwrap();
//! assert!(plan.joins.is_empty());
//! ```

pub mod builder;
pub mod column_map;
pub mod filter;
pub(crate) mod path;
pub mod statement;

#[doc(inline)]
pub use builder::QueryBuilder;
#[doc(inline)]
pub use column_map::ColumnValueMap;
#[doc(inline)]
pub use filter::{Filter, FilterValue};
#[doc(inline)]
pub use statement::{ColumnRef, FindPlan, Join, Predicate, Statement};
