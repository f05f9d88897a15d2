//! ormflow - an object-relational mapper for async Rust.
//!
//! Entities are described once, as [`EntityDescriptor`] values or JSON
//! schema files. A [`Connection`] turns them into metadata, opens a driver
//! and hands out repositories that query, persist and remove instances.
//!
//! # Quick Start
//!
//! ```ignore
//! use ormflow::{
//!     ColumnDescriptor, ColumnType, Connection, ConnectionOptions, EntityDescriptor, FindOptions,
//! };
//!
//! #[tokio::main]
//! async fn main() -> ormflow::Result<()> {
//!     let connection = Connection::builder(ConnectionOptions::sqlite_memory())
//!         .with_entity(
//!             EntityDescriptor::new("Author")
//!                 .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
//!                 .with_column(ColumnDescriptor::new("name", ColumnType::String)),
//!         )
//!         .connect()
//!         .await?;
//!
//!     let authors = connection.repository("Author")?;
//!     let author = authors.create()?.with("name", "Umed");
//!     authors.persist(&author).await?;
//!
//!     println!("{} authors", authors.count(FindOptions::new()).await?);
//!     connection.close().await
//! }
//! ```

pub mod connection;
pub mod error;
pub mod options;
pub mod repository;

pub use connection::{Connection, ConnectionBuilder};
pub use error::{Error, Result};
pub use options::{ConnectionOptions, DriverKind, DriverOptions};
pub use repository::{Repository, TreeRepository};

pub use ormflow_core::{
    CascadeFlags, ColumnDescriptor, ColumnType, ConfigurationError, Driver, DriverError,
    DriverErrorKind, EntityDescriptor, EntityManager, EntityRef, EntitySchema, FindOptions,
    HookContext, LazyRelation, LazyState, ListenerKind, LoggingOptions, MemoryReporter,
    NamingStrategy, QueryBuilder, Related, RelationDescriptor, Reporter, TracingReporter,
};
pub use ormflow_sqlite::SqliteDriver;

/// Re-export of the engine crate.
pub use ormflow_core as core;
/// Re-export of the shared value and predicate types.
pub use ormflow_proto as proto;
pub use ormflow_proto::{FilterExpr, OrderSpec, Value};
