//! Connection options.

use std::fmt;

use ormflow_core::LoggingOptions;
use serde::Deserialize;

use crate::error::Result;

/// Connection name used when none is given.
pub const DEFAULT_CONNECTION_NAME: &str = "default";

/// In-memory SQLite database.
pub const MEMORY_DATABASE: &str = ":memory:";

/// Database engine behind a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    #[default]
    Sqlite,
    Mysql,
    Postgres,
}

impl DriverKind {
    /// Name used in option files.
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Sqlite => "sqlite",
            DriverKind::Mysql => "mysql",
            DriverKind::Postgres => "postgres",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how to reach the database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DriverOptions {
    #[serde(rename = "type")]
    pub kind: DriverKind,
    pub url: Option<String>,
    /// Database file path, or `:memory:`.
    pub database: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl DriverOptions {
    /// SQLite database file.
    pub fn sqlite(database: impl Into<String>) -> Self {
        Self {
            kind: DriverKind::Sqlite,
            database: Some(database.into()),
            ..Self::default()
        }
    }

    /// Private in-memory SQLite database.
    pub fn sqlite_memory() -> Self {
        Self::sqlite(MEMORY_DATABASE)
    }

    /// Database to open: `database` if set, else the path part of `url`,
    /// else an in-memory database.
    pub fn database_path(&self) -> String {
        if let Some(database) = &self.database {
            return database.clone();
        }
        match &self.url {
            Some(url) => url
                .strip_prefix("sqlite://")
                .or_else(|| url.strip_prefix("sqlite:"))
                .unwrap_or(url)
                .to_string(),
            None => MEMORY_DATABASE.to_string(),
        }
    }
}

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionOptions {
    /// Connection name, used in errors and logs.
    pub name: String,
    pub driver: DriverOptions,
    /// Registered naming strategy. `None` selects the default one.
    pub naming_strategy: Option<String>,
    pub logging: LoggingOptions,
}

impl ConnectionOptions {
    /// Options for the given driver.
    pub fn new(driver: DriverOptions) -> Self {
        Self {
            name: DEFAULT_CONNECTION_NAME.to_string(),
            driver,
            naming_strategy: None,
            logging: LoggingOptions::default(),
        }
    }

    /// Options for a private in-memory SQLite database.
    pub fn sqlite_memory() -> Self {
        Self::new(DriverOptions::sqlite_memory())
    }

    /// Parse options from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the connection name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Select a registered naming strategy.
    pub fn with_naming_strategy(mut self, name: impl Into<String>) -> Self {
        self.naming_strategy = Some(name.into());
        self
    }

    /// Set the statement logging options.
    pub fn with_logging(mut self, logging: LoggingOptions) -> Self {
        self.logging = logging;
        self
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::sqlite_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_options() {
        let options = ConnectionOptions::default();
        assert_eq!(options.name, DEFAULT_CONNECTION_NAME);
        assert_eq!(options.driver.kind, DriverKind::Sqlite);
        assert_eq!(options.driver.database_path(), MEMORY_DATABASE);
        assert_eq!(options.naming_strategy, None);
        assert!(!options.logging.log_queries);
    }

    #[test]
    fn test_options_from_json() {
        let options = ConnectionOptions::from_json(
            r#"{
                "name": "blog",
                "driver": { "type": "sqlite", "database": "blog.sqlite" },
                "namingStrategy": "snake_case",
                "logging": { "logQueries": true, "logFailedQueryError": true }
            }"#,
        )
        .unwrap();

        assert_eq!(options.name, "blog");
        assert_eq!(options.driver.database_path(), "blog.sqlite");
        assert_eq!(options.naming_strategy.as_deref(), Some("snake_case"));
        assert!(options.logging.log_queries);
        assert!(options.logging.log_failed_query_error);
        assert!(!options.logging.log_only_failed_queries);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options = ConnectionOptions::from_json(r#"{ "driver": { "type": "postgres", "port": 5432 } }"#)
            .unwrap();
        assert_eq!(options.name, DEFAULT_CONNECTION_NAME);
        assert_eq!(options.driver.kind, DriverKind::Postgres);
        assert_eq!(options.driver.port, Some(5432));
    }

    #[test]
    fn test_invalid_json_is_an_options_error() {
        let err = ConnectionOptions::from_json(r#"{ "driver": { "type": "oracle" } }"#).unwrap_err();
        assert!(matches!(err, crate::Error::Options(_)));
    }

    #[test]
    fn test_database_from_url() {
        let driver = DriverOptions {
            url: Some("sqlite:///tmp/app.db".into()),
            ..DriverOptions::default()
        };
        assert_eq!(driver.database_path(), "/tmp/app.db");
    }

    #[test]
    fn test_builder() {
        let options = ConnectionOptions::new(DriverOptions::sqlite("app.db"))
            .with_name("app")
            .with_naming_strategy("snake_case")
            .with_logging(LoggingOptions::all());
        assert_eq!(options.name, "app");
        assert_eq!(options.naming_strategy.as_deref(), Some("snake_case"));
        assert_eq!(options.logging, LoggingOptions::all());
    }
}
