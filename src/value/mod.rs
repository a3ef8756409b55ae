//! Column values: scalar types, typed nulls, coercion, and key tuples.

pub mod types;
pub mod tuple;

pub use tuple::KeyTuple;
pub use types::{is_null, value_type_name, ScalarType};
