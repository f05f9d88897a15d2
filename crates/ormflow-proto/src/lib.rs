//! ormflow shared types.
//!
//! This crate defines the plain data exchanged between the entity layer, the
//! query builder and database drivers.
//!
//! # Modules
//!
//! - [`value`] - Runtime values for columns, parameters and result cells
//! - [`query`] - Where-predicate tree, ordering and pagination
//! - [`row`] - Flat result rows returned by drivers
//! - [`error`] - Value conversion errors

pub mod error;
pub mod query;
pub mod row;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use query::{FilterExpr, OrderDirection, OrderSpec, Pagination};
pub use row::Row;
pub use value::{KeyValue, Value};
