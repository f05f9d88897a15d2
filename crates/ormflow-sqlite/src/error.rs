//! SQLite driver errors.

use ormflow_core::DriverError;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors raised inside the SQLite driver.
#[derive(Debug, Error)]
pub enum Error {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection is not open")]
    NotConnected,

    #[error("a transaction is already active")]
    TransactionActive,

    #[error("no transaction is active")]
    NoTransaction,
}

impl From<Error> for DriverError {
    fn from(err: Error) -> Self {
        match &err {
            Error::Sqlite(inner) => match inner.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => DriverError::constraint(err.to_string()),
                Some(ErrorCode::CannotOpen) | Some(ErrorCode::NotADatabase) => {
                    DriverError::connection(err.to_string())
                }
                _ => DriverError::query(err.to_string()),
            },
            Error::NotConnected => DriverError::connection(err.to_string()),
            Error::TransactionActive | Error::NoTransaction => DriverError::query(err.to_string()),
        }
    }
}
