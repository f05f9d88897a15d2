//! Statement logging shared by driver implementations.

use std::fmt;

use ormflow_proto::Value;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Which statements a driver logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingOptions {
    /// Log every statement.
    pub log_queries: bool,
    /// Log statements only when they fail.
    pub log_only_failed_queries: bool,
    /// Include the database error when logging a failed statement.
    pub log_failed_query_error: bool,
}

impl LoggingOptions {
    /// Log every statement and every failure.
    pub fn all() -> Self {
        Self {
            log_queries: true,
            log_only_failed_queries: false,
            log_failed_query_error: true,
        }
    }
}

/// Logs statements according to [`LoggingOptions`].
///
/// Statements always go to `debug!`; the options decide what is promoted to
/// `info!` and `warn!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryLogger {
    options: LoggingOptions,
}

impl QueryLogger {
    /// Create a logger.
    pub fn new(options: LoggingOptions) -> Self {
        Self { options }
    }

    /// Logging options in effect.
    pub fn options(&self) -> LoggingOptions {
        self.options
    }

    /// Log a statement about to run.
    pub fn log_query(&self, sql: &str, params: &[Value]) {
        if self.options.log_queries && !self.options.log_only_failed_queries {
            info!(target: "ormflow::query", sql, params = %Params(params), "executing query");
        } else {
            debug!(target: "ormflow::query", sql, params = %Params(params), "executing query");
        }
    }

    /// Log a statement that failed.
    pub fn log_failed_query(&self, sql: &str, params: &[Value], error: &dyn fmt::Display) {
        if !(self.options.log_queries || self.options.log_only_failed_queries) {
            debug!(target: "ormflow::query", sql, %error, "query failed");
            return;
        }
        if self.options.log_failed_query_error {
            warn!(target: "ormflow::query", sql, params = %Params(params), %error, "query failed");
        } else {
            warn!(target: "ormflow::query", sql, params = %Params(params), "query failed");
        }
    }
}

struct Params<'a>(&'a [Value]);

impl fmt::Display for Params<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str("]")
    }
}
