//! Value conversion errors.

use thiserror::Error;

/// Errors raised when a [`Value`](crate::Value) cannot be read as the
/// requested Rust type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The value holds a different type than requested.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// The value does not fit into the requested type.
    #[error("value out of range for {target}: {value}")]
    OutOfRange { target: &'static str, value: String },
}
