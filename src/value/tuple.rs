//! `KeyTuple`: the ordered values of a (possibly composite) key.
//!
//! A key tuple is position-aligned with the key's physical columns as resolved
//! by [`crate::key::resolver`]. Tuples can be built from arrays, Rust tuples, or
//! single scalars:
//!
//! ```
//! use keystone::KeyTuple;
//!
//! let single = KeyTuple::from(1);
//! let pair = KeyTuple::from([1, 1]);
//! let mixed = KeyTuple::from((1, "eu-west"));
//! assert_eq!(single.arity(), 1);
//! assert_eq!(pair.arity(), 2);
//! assert_eq!(mixed.arity(), 2);
//! ```

use crate::value::types::is_null;
use sea_query::Value;

/// Ordered key values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyTuple(Vec<Value>);

impl KeyTuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Number of values in this tuple
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    /// Every component is NULL (an empty tuple counts as null too)
    pub fn is_null(&self) -> bool {
        self.0.iter().all(is_null)
    }

    /// Some, but not all, components are NULL
    pub fn is_partial(&self) -> bool {
        let nulls = self.0.iter().filter(|v| is_null(v)).count();
        nulls > 0 && nulls < self.0.len()
    }

    /// Append the values of `other`
    pub fn extend(&mut self, other: KeyTuple) {
        self.0.extend(other.0);
    }
}

impl From<Vec<Value>> for KeyTuple {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for KeyTuple {
    fn from(values: [T; N]) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for KeyTuple {
    fn from(value: (A, B)) -> Self {
        Self(vec![value.0.into(), value.1.into()])
    }
}

impl<A: Into<Value>, B: Into<Value>, C: Into<Value>> From<(A, B, C)> for KeyTuple {
    fn from(value: (A, B, C)) -> Self {
        Self(vec![value.0.into(), value.1.into(), value.2.into()])
    }
}

impl<A: Into<Value>, B: Into<Value>, C: Into<Value>, D: Into<Value>> From<(A, B, C, D)>
    for KeyTuple
{
    fn from(value: (A, B, C, D)) -> Self {
        Self(vec![
            value.0.into(),
            value.1.into(),
            value.2.into(),
            value.3.into(),
        ])
    }
}

macro_rules! single_value_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for KeyTuple {
                fn from(value: $ty) -> Self {
                    Self(vec![Value::from(value)])
                }
            }
        )*
    };
}

single_value_key!(i16, i32, i64, u16, u32, u64, bool, String, &str);

impl From<Value> for KeyTuple {
    fn from(value: Value) -> Self {
        Self(vec![value])
    }
}

impl IntoIterator for KeyTuple {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_tuple_from_array_and_tuple_agree() {
        let from_array = KeyTuple::from([1, 20]);
        let from_tuple = KeyTuple::from((1, 20));
        assert_eq!(from_array, from_tuple);
        assert_eq!(from_array.values(), &[Value::Int(Some(1)), Value::Int(Some(20))]);
    }

    #[test]
    fn test_key_tuple_nullness() {
        let null = KeyTuple::new(vec![Value::Int(None), Value::Int(None)]);
        assert!(null.is_null());
        assert!(!null.is_partial());

        let partial = KeyTuple::new(vec![Value::Int(Some(1)), Value::Int(None)]);
        assert!(!partial.is_null());
        assert!(partial.is_partial());

        let set = KeyTuple::from([1, 2]);
        assert!(!set.is_null());
        assert!(!set.is_partial());
    }

    #[test]
    fn test_key_tuple_extend_keeps_order() {
        let mut key = KeyTuple::from(1);
        key.extend(KeyTuple::from([2, 3]));
        assert_eq!(key, KeyTuple::from([1, 2, 3]));
    }
}
