//! Ordered physical column to value map.

use crate::value::KeyTuple;
use indexmap::IndexMap;
use sea_query::Value;

/// Physical column name to value, in insertion order
///
/// Produced by the query builder for INSERT and UPDATE statements, by the null
/// propagator, and used as the row type returned by executors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnValueMap(IndexMap<String, Value>);

impl ColumnValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a column value, keeping the original position on replace
    pub fn insert(&mut self, column: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(column.into(), value)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.shift_remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.keys().map(String::as_str)
    }

    /// Pair each column with the matching key value, in order
    pub fn insert_key<'c>(&mut self, columns: impl IntoIterator<Item = &'c str>, key: KeyTuple) {
        for (column, value) in columns.into_iter().zip(key) {
            self.insert(column, value);
        }
    }

    /// Values of `columns`, in that order; `None` if any is absent
    pub fn project<'c>(&self, columns: impl IntoIterator<Item = &'c str>) -> Option<KeyTuple> {
        columns
            .into_iter()
            .map(|c| self.0.get(c).cloned())
            .collect::<Option<Vec<_>>>()
            .map(KeyTuple::new)
    }

    /// Merge `other` into `self`, later values winning
    pub fn extend(&mut self, other: ColumnValueMap) {
        self.0.extend(other.0);
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Value>) {
        self.0.into_iter().unzip()
    }
}

impl FromIterator<(String, Value)> for ColumnValueMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ColumnValueMap {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_keeps_position() {
        let mut map = ColumnValueMap::new();
        map.insert("org_id", Value::Int(Some(1)));
        map.insert("name", Value::from("a"));
        map.insert("org_id", Value::Int(Some(2)));
        assert_eq!(map.columns().collect::<Vec<_>>(), ["org_id", "name"]);
        assert_eq!(map.get("org_id"), Some(&Value::Int(Some(2))));
    }

    #[test]
    fn test_project_key() {
        let mut map = ColumnValueMap::new();
        map.insert_key(["form_org_id", "form_id"], KeyTuple::from([1, 10]));
        assert_eq!(map.project(["form_org_id", "form_id"]), Some(KeyTuple::from([1, 10])));
        assert_eq!(map.project(["form_org_id", "missing"]), None);
    }
}
