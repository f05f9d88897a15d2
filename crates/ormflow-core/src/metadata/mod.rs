//! Entity metadata registry.
//!
//! Descriptors go in, an immutable graph of entities, columns and relations
//! comes out. The registry is shared read-only by every query and
//! persistence call of a connection.

mod builder;
mod column;
mod descriptor;
mod entity;
mod error;
mod listener;
mod naming;
mod registry;
mod relation;
mod schema;
mod types;

pub use builder::MetadataBuilder;
pub use column::ColumnMetadata;
pub use descriptor::{
    ColumnDescriptor, EntityDescriptor, JoinColumnOptions, JoinTableOptions, RelationDescriptor,
};
pub use entity::{ClosureTableMetadata, EntityKey, EntityMetadata};
pub use error::ConfigurationError;
pub use listener::{HookContext, ListenerFn, ListenerKind, Listeners};
pub use naming::{
    DefaultNamingStrategy, NamingStrategy, NamingStrategyRegistry, SnakeCaseNamingStrategy,
    DEFAULT_NAMING_STRATEGY,
};
pub use registry::MetadataRegistry;
pub use relation::{JoinColumnMetadata, JoinTableMetadata, RelationMetadata};
pub use schema::{ColumnSchema, EntitySchema, JoinSpec, RelationSchema, TableSchema};
pub use types::{CascadeFlags, ColumnType, RelationKind, TreeRole, TreeType};
