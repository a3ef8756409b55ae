//! Key resolution for single and composite keys.
//!
//! - **Identity**: [`ColumnSet`], the ordered physical columns of a key
//! - **Resolver**: recursive expansion of primary keys through primary
//!   relations, and foreign-key column naming

pub mod identity;
#[doc(inline)]
pub use identity::ColumnSet;

pub mod resolver;
#[doc(inline)]
pub use resolver::{resolve_foreign_key_columns, resolve_key_columns};

use crate::value::ScalarType;
use serde::Serialize;

/// One physical column of a primary key
///
/// `path` names the members walked from the owning entity down to the scalar
/// field that supplies the value: `Form.id` is `["id"]`, while the
/// organisation id inherited through `Form.org` is `["org", "id"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct KeyColumn {
    pub column: String,
    pub path: Vec<String>,
    pub scalar: ScalarType,
}

impl KeyColumn {
    /// Dotted source path, e.g. `org.id`
    pub fn path_string(&self) -> String {
        self.path.join(".")
    }

    /// Number of relation hops this column travels through
    pub fn depth(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}
