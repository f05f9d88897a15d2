//! SQLite driver for ormflow.
//!
//! Wraps one `rusqlite` connection. Statements run on the calling task; the
//! engine never issues two at once on the same driver.

pub mod driver;
pub mod error;
mod value;

pub use driver::SqliteDriver;
pub use error::Error;
