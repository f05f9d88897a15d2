//! Façade error types.

use ormflow_core::{ConfigurationError, DriverError};
use thiserror::Error;

/// Errors returned by connections and repositories.
#[derive(Debug, Error)]
pub enum Error {
    /// Error raised by the engine.
    #[error(transparent)]
    Core(#[from] ormflow_core::Error),

    /// Connection options could not be parsed.
    #[error("invalid connection options: {0}")]
    Options(#[from] serde_json::Error),

    /// The connection was closed.
    #[error("connection {0} is closed")]
    Closed(String),
}

impl From<ConfigurationError> for Error {
    fn from(err: ConfigurationError) -> Self {
        Error::Core(err.into())
    }
}

impl From<DriverError> for Error {
    fn from(err: DriverError) -> Self {
        Error::Core(err.into())
    }
}

impl Error {
    /// Engine error, if this is one.
    pub fn as_core(&self) -> Option<&ormflow_core::Error> {
        match self {
            Error::Core(err) => Some(err),
            _ => None,
        }
    }

    /// Check if the database rejected a statement on a constraint.
    pub fn is_constraint(&self) -> bool {
        matches!(self, Error::Core(ormflow_core::Error::Driver(err)) if err.is_constraint())
    }
}

/// Result type for façade operations.
pub type Result<T> = std::result::Result<T, Error>;
