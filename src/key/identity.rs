//! Ordered physical column sets for primary and foreign keys
//!
//! A [`ColumnSet`] lists the physical columns that make up a key, in the order
//! fixed at registration. Single-column keys are a set of arity one; composite
//! keys carry every column, including columns inherited through a primary
//! relation.

use serde::Serialize;

/// Ordered list of physical column names belonging to one key
///
/// # Example
///
/// ```
/// use keystone::key::ColumnSet;
///
/// let fk = ColumnSet::from(["form_org_id", "form_id"]);
/// assert_eq!(fk.arity(), 2);
/// assert!(fk.contains("form_id"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct ColumnSet(Vec<String>);

impl ColumnSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self(columns)
    }

    /// Number of physical columns in this key
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(String::as_str)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.0.iter().position(|c| c == column)
    }

    /// Check if this set contains a specific column
    pub fn contains(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for ColumnSet {
    fn from(columns: Vec<String>) -> Self {
        Self(columns)
    }
}

impl<const N: usize> From<[&str; N]> for ColumnSet {
    fn from(columns: [&str; N]) -> Self {
        Self(columns.iter().map(|c| (*c).to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_set_arity() {
        assert_eq!(ColumnSet::from(["id"]).arity(), 1);
        assert_eq!(ColumnSet::from(["org_id", "id"]).arity(), 2);
        assert_eq!(ColumnSet::default().arity(), 0);
        assert!(ColumnSet::default().is_empty());
    }

    #[test]
    fn test_column_set_preserves_order() {
        let set = ColumnSet::from(["owner_org_id", "owner_id"]);
        let columns: Vec<&str> = set.iter().collect();
        assert_eq!(columns, vec!["owner_org_id", "owner_id"]);
        assert_eq!(set.position("owner_id"), Some(1));
        assert_eq!(set.get(0), Some("owner_org_id"));
    }
}
