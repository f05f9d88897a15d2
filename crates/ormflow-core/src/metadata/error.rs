//! Metadata build errors.

use thiserror::Error;

/// Invalid metadata, reported when the registry is built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Using JoinColumn on {entity}#{property} is wrong. You can use JoinColumn only on one-to-one and many-to-one relations.")]
    UsingJoinColumnIsNotAllowed { entity: String, property: String },

    #[error("Using JoinTable on {entity}#{property} is wrong. You can use JoinTable only on many-to-many relations.")]
    UsingJoinTableIsNotAllowed { entity: String, property: String },

    #[error("Naming strategy \"{strategy}\" was not found. Looks like this naming strategy does not exist or it was not registered in current \"{connection}\" connection?")]
    NamingStrategyNotFound { strategy: String, connection: String },

    #[error("entity {0} is declared more than once")]
    DuplicateEntity(String),

    #[error("table {table} is used by both {first} and {second}")]
    DuplicateTable {
        table: String,
        first: String,
        second: String,
    },

    #[error("column {column} of entity {entity} is mapped more than once")]
    DuplicateColumn { entity: String, column: String },

    #[error("entity {0} has no primary column")]
    MissingPrimaryColumn(String),

    #[error("relation {entity}#{property} targets unknown entity {target}")]
    UnknownRelationTarget {
        entity: String,
        property: String,
        target: String,
    },

    #[error("relation {entity}#{property} names inverse side {inverse} which is not a matching relation on {target}")]
    InvalidInverseSide {
        entity: String,
        property: String,
        target: String,
        inverse: String,
    },

    #[error("one-to-many relation {entity}#{property} has no many-to-one counterpart on {target}")]
    MissingInverseSide {
        entity: String,
        property: String,
        target: String,
    },

    #[error("both sides of {entity}#{property} declare the join, only one side may own it")]
    AmbiguousOwningSide { entity: String, property: String },

    #[error("relation {entity}#{property} references {target} which has a composite primary key, name the referenced column explicitly")]
    CompositeKeyReference {
        entity: String,
        property: String,
        target: String,
    },

    #[error("tree entity {0} has no tree-parent relation")]
    MissingTreeParent(String),

    #[error("entity {entity} has no column {column}")]
    UnknownColumn { entity: String, column: String },

    #[error("driver \"{0}\" is not supported")]
    UnsupportedDriver(String),
}
