//! Entity metadata: descriptions in, an immutable [`SchemaGraph`] out.
//!
//! - **Description**: caller-facing input types ([`EntityDescription`] and friends)
//! - **Registry**: [`register`] validates and resolves descriptions
//! - **Graph**: the read-only result shared by every operation
//! - **DDL**: CREATE TABLE statements with composite keys

pub mod ddl;
pub mod def;
pub mod description;
pub mod graph;
pub mod registry;

#[doc(inline)]
pub use ddl::{create_table_sql, create_table_statements};
#[doc(inline)]
pub use def::{
    ColumnSource, DeleteRule, EntityDef, FieldDef, KeyComponent, Member, PhysicalColumn,
    RelationDef, RelationKind,
};
#[doc(inline)]
pub use description::{
    load_descriptions, parse_descriptions, EntityDescription, FieldDescription,
    RelationDescription,
};
#[doc(inline)]
pub use graph::{RelationEdge, SchemaGraph};
#[doc(inline)]
pub use registry::{register, register_with};
