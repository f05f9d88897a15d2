//! ormflow core - metadata registry, query builder and cascading persister.
//!
//! This crate holds the engine behind the `ormflow` façade. It never talks
//! to a database directly; every statement goes through a [`Driver`].

pub mod driver;
pub mod entity;
pub mod error;
pub mod manager;
pub mod metadata;
pub mod query;
pub mod reporter;
pub mod resolver;
pub mod tree;

mod persistence;

#[cfg(test)]
pub(crate) mod testing;

pub use driver::{normalize_value, Driver, DriverResult, LoggingOptions, QueryLogger};
pub use entity::{EntityData, EntityRef, LazyRelation, LazyState, Related, RelationValue};
pub use error::{DriverError, DriverErrorKind, Error, HydrationError, Result};
pub use manager::EntityManager;
pub use metadata::{
    CascadeFlags, ColumnDescriptor, ColumnType, ConfigurationError, EntityDescriptor,
    EntityMetadata, EntitySchema, HookContext, ListenerKind, MetadataBuilder, MetadataRegistry,
    NamingStrategy, NamingStrategyRegistry, RelationDescriptor, RelationKind,
};
pub use query::{CompiledQuery, FindOptions, JoinKind, QueryBuilder};
pub use reporter::{MemoryReporter, ReportEntry, Reporter, TracingReporter};
pub use resolver::{JoinPath, LoadMode, PhysicalRelation, RelationResolver, RelationStorage};
pub use tree::ClosureTableManager;

pub use ormflow_proto as proto;
