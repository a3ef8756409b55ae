//! Error types for registration and per-operation failures.
//!
//! Two layers:
//! - [`SchemaError`] is raised while building the schema graph and aborts startup.
//! - [`OrmError`] is raised per operation. The operation is abandoned before any
//!   statement reaches the executor, so a failed build never leaves a partial write.

use std::fmt;

/// Errors raised by [`crate::schema::register`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("entity `{0}` is not registered")]
    UnknownEntity(String),
    #[error("entity `{0}` is declared more than once")]
    DuplicateEntity(String),
    #[error("entity `{entity}` declares member `{member}` more than once")]
    DuplicateMember { entity: String, member: String },
    #[error("entity `{entity}` maps column `{column}` more than once")]
    DuplicateColumn { entity: String, column: String },
    #[error("entity `{entity}` extends unknown entity `{base}`")]
    UnknownBase { entity: String, base: String },
    #[error("entity `{entity}` extends `{base}`, which is not abstract")]
    BaseNotAbstract { entity: String, base: String },
    #[error("inheritance cycle through entity `{0}`")]
    CyclicInheritance(String),
    #[error("relation `{entity}.{relation}` targets unregistered entity `{target}`")]
    UnknownTarget {
        entity: String,
        relation: String,
        target: String,
    },
    #[error("relation `{entity}.{relation}` targets abstract entity `{target}`")]
    AbstractTarget {
        entity: String,
        relation: String,
        target: String,
    },
    #[error("entity `{0}` has no primary key components")]
    EmptyPrimaryKey(String),
    #[error("primary key of `{entity}` names unknown member `{member}`")]
    UnknownKeyMember { entity: String, member: String },
    #[error("member `{entity}.{member}` is flagged primary but missing from the explicit key order")]
    KeyOrderMismatch { entity: String, member: String },
    #[error("relation `{entity}.{relation}` cannot be a primary key component: {reason}")]
    InvalidPrimaryRelation {
        entity: String,
        relation: String,
        reason: &'static str,
    },
    #[error("field `{entity}.{field}` is a primary key component and cannot be nullable")]
    NullablePrimaryField { entity: String, field: String },
    #[error("relation `{entity}.{relation}` has invalid mappedBy `{mapped_by}`: {reason}")]
    InvalidMappedBy {
        entity: String,
        relation: String,
        mapped_by: String,
        reason: &'static str,
    },
    #[error("relation `{entity}.{relation}` declares {declared} column(s) but `{target}` has a {expected}-column key")]
    ForeignKeyArity {
        entity: String,
        relation: String,
        target: String,
        declared: usize,
        expected: usize,
    },
    #[error("primary key of `{0}` includes itself through relation hops")]
    CyclicKey(String),
    #[error("failed to load entity descriptions: {0}")]
    Load(String),
}

/// Failure reported by the statement execution collaborator
///
/// The core never retries; the error is surfaced unmodified inside
/// [`OrmError::Storage`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

/// Classification of a [`StorageError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// Primary key, foreign key, NOT NULL or RESTRICT violation
    ConstraintViolation,
    /// The backend could not be reached
    Connectivity,
    Other,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageErrorKind::ConstraintViolation => write!(f, "constraint violation"),
            StorageErrorKind::Connectivity => write!(f, "connectivity failure"),
            StorageErrorKind::Other => write!(f, "storage error"),
        }
    }
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::ConstraintViolation, message)
    }
}

/// Per-operation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrmError {
    #[error("unknown entity `{0}`")]
    UnknownEntity(String),
    #[error("entity `{entity}` has no member `{member}`")]
    UnknownMember { entity: String, member: String },
    #[error("invalid assignment to `{entity}.{member}`: {reason}")]
    InvalidAssignment {
        entity: String,
        member: String,
        reason: String,
    },
    #[error("invalid value type for column {column}: expected {expected}, got {actual}")]
    InvalidValueType {
        column: String,
        expected: String,
        actual: String,
    },
    #[error("relation `{relation}` expects a key of {expected} value(s), got {actual}")]
    ReferenceArity {
        relation: String,
        expected: usize,
        actual: usize,
    },
    #[error("relation `{relation}` targets `{expected}`, got a value for `{actual}`")]
    ReferenceTarget {
        relation: String,
        expected: String,
        actual: String,
    },
    #[error("key of `{entity}` is not resolvable: {missing} is not assigned")]
    UnresolvedKey { entity: String, missing: String },
    #[error("path `{path}` traverses `{edge}` more than once")]
    CyclicPath { path: String, edge: String },
    #[error("`{entity}.{member}` is part of the primary key and cannot change after creation")]
    ImmutableKey { entity: String, member: String },
    #[error("`{entity}.{member}` is not nullable")]
    NullConstraint { entity: String, member: String },
    #[error("stored row of `{entity}` holds a partially null key for `{relation}`")]
    MalformedKey { entity: String, relation: String },
    #[error("failed to render SQL: {0}")]
    Sql(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl OrmError {
    pub(crate) fn unknown_member(entity: &str, member: &str) -> Self {
        OrmError::UnknownMember {
            entity: entity.to_string(),
            member: member.to_string(),
        }
    }

    pub(crate) fn immutable_key(entity: &str, member: &str) -> Self {
        OrmError::ImmutableKey {
            entity: entity.to_string(),
            member: member.to_string(),
        }
    }

    pub(crate) fn null_constraint(entity: &str, member: &str) -> Self {
        OrmError::NullConstraint {
            entity: entity.to_string(),
            member: member.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_passes_through() {
        let storage = StorageError::constraint("duplicate key value violates unique constraint");
        let err: OrmError = storage.clone().into();
        assert_eq!(err, OrmError::Storage(storage));
        assert_eq!(
            err.to_string(),
            "constraint violation: duplicate key value violates unique constraint"
        );
    }

    #[test]
    fn test_schema_error_display() {
        let err = SchemaError::ForeignKeyArity {
            entity: "Form".into(),
            relation: "owner".into(),
            target: "User".into(),
            declared: 1,
            expected: 2,
        };
        assert_eq!(
            err.to_string(),
            "relation `Form.owner` declares 1 column(s) but `User` has a 2-column key"
        );
    }
}
