//! Core error types.

use std::fmt;

use thiserror::Error;

use crate::metadata::{ConfigurationError, ListenerKind};

/// Core engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid entity metadata, detected while building the registry.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Error reported by the database driver, surfaced unchanged.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Result rows did not have the expected shape.
    #[error(transparent)]
    Hydration(#[from] HydrationError),

    /// A lifecycle listener failed.
    #[error("{event} listener of entity {entity} failed: {message}")]
    LifecycleHook {
        entity: String,
        event: ListenerKind,
        message: String,
    },

    /// Entity name not present in the registry.
    #[error("entity {0} is not registered")]
    UnknownEntity(String),

    /// Relation property not declared on the entity.
    #[error("entity {entity} has no relation {relation}")]
    UnknownRelation { entity: String, relation: String },

    /// Query alias was never declared.
    #[error("alias {0} is not declared in this query")]
    UnknownAlias(String),

    /// Alias declared twice in one query.
    #[error("alias {0} is declared more than once")]
    DuplicateAlias(String),

    /// Alias is empty or contains a reserved separator.
    #[error("alias {0} is not valid, aliases may not be empty or contain \"__\" or \".\"")]
    InvalidAlias(String),

    /// Alias path does not name a column of the aliased entity.
    #[error("{alias} has no column or join column {property}")]
    UnknownProperty { alias: String, property: String },

    /// Operation requires a primary key the entity does not have.
    #[error("entity {entity} has no primary key value")]
    MissingPrimaryKey { entity: String },

    /// Lookup by a single id on an entity with a composite key.
    #[error("entity {entity} has a composite primary key")]
    CompositePrimaryKey { entity: String },

    /// Tree operation on an entity that is not a closure-table tree.
    #[error("entity {0} is not a closure-table tree")]
    NotATree(String),

    /// New entities reference each other through non-nullable foreign keys.
    #[error("cannot order inserts, non-nullable foreign keys form a cycle between {}", .entities.join(", "))]
    CyclicDependency { entities: Vec<String> },

    /// Removal would leave loaded children behind with a non-nullable key.
    #[error("cannot remove {entity}, children in {relation} reference it through a non-nullable key")]
    RemoveRestricted { entity: String, relation: String },

    /// Commit or rollback without an active transaction.
    #[error("no transaction is active")]
    TransactionNotActive,

    /// Schema file could not be parsed.
    #[error("schema error: {0}")]
    Schema(#[from] serde_json::Error),

    /// Value conversion failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ormflow_proto::Error),
}

/// Category of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Unique, foreign-key, not-null or check constraint violated.
    Constraint,
    /// Connection could not be opened or was lost.
    Connection,
    /// Statement failed to prepare or execute.
    Query,
    /// Anything else.
    Other,
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverErrorKind::Constraint => "constraint",
            DriverErrorKind::Connection => "connection",
            DriverErrorKind::Query => "query",
            DriverErrorKind::Other => "driver",
        };
        f.write_str(name)
    }
}

/// Error raised by a [`Driver`](crate::driver::Driver).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} error: {message}")]
pub struct DriverError {
    /// Failure category.
    pub kind: DriverErrorKind,
    /// Message from the database.
    pub message: String,
}

impl DriverError {
    /// Create a driver error.
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Constraint violation.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Constraint, message)
    }

    /// Connection failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Connection, message)
    }

    /// Statement failure.
    pub fn query(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Query, message)
    }

    /// Check if this is a constraint violation.
    pub fn is_constraint(&self) -> bool {
        self.kind == DriverErrorKind::Constraint
    }
}

/// Result rows did not match the compiled select list.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HydrationError {
    /// Expected column label missing from a row.
    #[error("result row has no column {label}")]
    MissingColumn { label: String },

    /// Primary key of the root alias was null.
    #[error("root alias {alias} returned a row without a primary key")]
    NullRootKey { alias: String },
}

impl Error {
    /// Check if this error came from a driver constraint violation.
    pub fn is_constraint(&self) -> bool {
        matches!(self, Error::Driver(err) if err.is_constraint())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::constraint("UNIQUE constraint failed: category.name");
        assert_eq!(
            err.to_string(),
            "constraint error: UNIQUE constraint failed: category.name"
        );
        assert!(Error::from(err).is_constraint());
    }

    #[test]
    fn test_cyclic_dependency_display() {
        let err = Error::CyclicDependency {
            entities: vec!["Husband".into(), "Wife".into()],
        };
        assert_eq!(
            err.to_string(),
            "cannot order inserts, non-nullable foreign keys form a cycle between Husband, Wife"
        );
    }
}
