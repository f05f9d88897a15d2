//! [`Driver`] implementation over `rusqlite`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use ormflow_core::driver::{Driver, DriverResult, LoggingOptions, QueryLogger};
use ormflow_proto::{Row, Value};
use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

use crate::error::Error;
use crate::value::{from_sql, Param};

const MEMORY: &str = ":memory:";

/// SQLite database reached through one connection.
#[derive(Debug)]
pub struct SqliteDriver {
    database: PathBuf,
    conn: Mutex<Option<Connection>>,
    in_transaction: AtomicBool,
    logger: QueryLogger,
}

impl SqliteDriver {
    /// Driver for a private in-memory database.
    pub fn memory() -> Self {
        Self::open(MEMORY)
    }

    /// Driver for a database file, created on connect if missing.
    pub fn open(database: impl AsRef<Path>) -> Self {
        Self {
            database: database.as_ref().to_path_buf(),
            conn: Mutex::new(None),
            in_transaction: AtomicBool::new(false),
            logger: QueryLogger::default(),
        }
    }

    /// Set the statement logging options.
    pub fn with_logging(mut self, options: LoggingOptions) -> Self {
        self.logger = QueryLogger::new(options);
        self
    }

    /// Database file, or `:memory:`.
    pub fn database(&self) -> &Path {
        &self.database
    }

    /// Run a batch of semicolon-separated statements, e.g. a schema script.
    pub fn execute_script(&self, sql: &str) -> DriverResult<()> {
        self.with_connection(sql, &[], |conn| Ok(conn.execute_batch(sql)?))
    }

    fn with_connection<T>(
        &self,
        sql: &str,
        params: &[Value],
        f: impl FnOnce(&Connection) -> Result<T, Error>,
    ) -> DriverResult<T> {
        self.logger.log_query(sql, params);
        let guard = self.conn.lock();
        let result = match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(Error::NotConnected),
        };
        result.map_err(|err| {
            self.logger.log_failed_query(sql, params, &err);
            err.into()
        })
    }

    fn transaction_statement(&self, sql: &str, begin: bool) -> DriverResult<()> {
        let active = self.in_transaction.load(Ordering::SeqCst);
        if begin && active {
            return Err(Error::TransactionActive.into());
        }
        if !begin && !active {
            return Err(Error::NoTransaction.into());
        }
        self.with_connection(sql, &[], |conn| Ok(conn.execute_batch(sql)?))?;
        self.in_transaction.store(begin, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn connect(&self) -> DriverResult<()> {
        let mut guard = self.conn.lock();
        if guard.is_some() {
            return Ok(());
        }
        let conn = if self.database.as_os_str() == MEMORY {
            Connection::open_in_memory()
        } else {
            Connection::open(&self.database)
        }
        .map_err(Error::from)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(Error::from)?;
        *guard = Some(conn);
        info!(database = %self.database.display(), "sqlite connection opened");
        Ok(())
    }

    async fn disconnect(&self) -> DriverResult<()> {
        let conn = self.conn.lock().take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, err)| Error::from(err))?;
            self.in_transaction.store(false, Ordering::SeqCst);
            info!(database = %self.database.display(), "sqlite connection closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    async fn query(&self, sql: &str, params: &[Value]) -> DriverResult<Vec<Row>> {
        self.with_connection(sql, params, |conn| {
            let mut stmt = conn.prepare(sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query(params_from_iter(params.iter().map(Param)))?;

            let mut result = Vec::new();
            while let Some(row) = rows.next()? {
                let mut out = Row::new();
                for (index, name) in names.iter().enumerate() {
                    out.push(name.clone(), from_sql(row.get_ref(index)?));
                }
                result.push(out);
            }
            Ok(result)
        })
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> DriverResult<u64> {
        let affected = self.with_connection(sql, params, |conn| {
            Ok(conn.execute(sql, params_from_iter(params.iter().map(Param)))?)
        })?;
        Ok(affected as u64)
    }

    async fn insert(
        &self,
        table: &str,
        values: &[(String, Value)],
        generated_column: Option<&str>,
    ) -> DriverResult<Option<Value>> {
        let sql = if values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.escape(table))
        } else {
            let columns: Vec<String> = values.iter().map(|(c, _)| self.escape(c)).collect();
            let placeholders: Vec<String> =
                (1..=values.len()).map(|i| self.placeholder(i)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.escape(table),
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        let params: Vec<Value> = values.iter().map(|(_, v)| v.clone()).collect();

        let id = self.with_connection(&sql, &params, |conn| {
            conn.execute(&sql, params_from_iter(params.iter().map(Param)))?;
            Ok(conn.last_insert_rowid())
        })?;
        debug!(table, id, "inserted row");
        Ok(generated_column.map(|_| Value::Int64(id)))
    }

    async fn begin_transaction(&self) -> DriverResult<()> {
        self.transaction_statement("BEGIN", true)
    }

    async fn commit_transaction(&self) -> DriverResult<()> {
        self.transaction_statement("COMMIT", false)
    }

    async fn rollback_transaction(&self) -> DriverResult<()> {
        self.transaction_statement("ROLLBACK", false)
    }

    fn is_transaction_active(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormflow_core::DriverErrorKind;
    use pretty_assertions::assert_eq;

    async fn connected() -> SqliteDriver {
        let driver = SqliteDriver::memory();
        driver.connect().await.unwrap();
        driver
            .execute_script(
                "CREATE TABLE author (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL UNIQUE);",
            )
            .unwrap();
        driver
    }

    #[tokio::test]
    async fn test_insert_returns_generated_id() {
        let driver = connected().await;
        let id = driver
            .insert("author", &[("name".into(), Value::String("Umed".into()))], Some("id"))
            .await
            .unwrap();
        assert_eq!(id, Some(Value::Int64(1)));

        let rows = driver
            .query("SELECT \"id\", \"name\" FROM \"author\" WHERE \"id\" = ?", &[Value::Int32(1)])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::String("Umed".into())));
    }

    #[tokio::test]
    async fn test_constraint_violation_is_classified() {
        let driver = connected().await;
        let values = [("name".to_string(), Value::String("Umed".into()))];
        driver.insert("author", &values, Some("id")).await.unwrap();

        let err = driver.insert("author", &values, Some("id")).await.unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Constraint);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let driver = connected().await;
        driver.begin_transaction().await.unwrap();
        assert!(driver.is_transaction_active());
        assert!(driver.begin_transaction().await.is_err());
        driver
            .insert("author", &[("name".into(), Value::String("Umed".into()))], Some("id"))
            .await
            .unwrap();
        driver.rollback_transaction().await.unwrap();

        let rows = driver.query("SELECT * FROM \"author\"", &[]).await.unwrap();
        assert!(rows.is_empty());
        assert!(driver.commit_transaction().await.is_err());
    }

    #[tokio::test]
    async fn test_statements_need_a_connection() {
        let driver = SqliteDriver::memory();
        let err = driver.query("SELECT 1", &[]).await.unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Connection);

        driver.connect().await.unwrap();
        driver.disconnect().await.unwrap();
        assert!(!driver.is_connected());
    }

    #[tokio::test]
    async fn test_file_database_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blog.sqlite");

        let driver = SqliteDriver::open(&path);
        driver.connect().await.unwrap();
        driver
            .execute_script("CREATE TABLE tag (code TEXT PRIMARY KEY);")
            .unwrap();
        driver
            .insert("tag", &[("code".into(), Value::String("rs".into()))], None)
            .await
            .unwrap();
        driver.disconnect().await.unwrap();

        let reopened = SqliteDriver::open(&path);
        reopened.connect().await.unwrap();
        let rows = reopened.query("SELECT code FROM tag", &[]).await.unwrap();
        assert_eq!(rows[0].get("code"), Some(&Value::String("rs".into())));
    }
}
