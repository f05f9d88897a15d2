//! Database driver boundary.
//!
//! The engine never talks to a database directly. Everything goes through a
//! [`Driver`]: compiled statements with bound parameters, table-level
//! insert/update/delete, transaction control and identifier escaping.

mod logger;

use std::fmt;

use async_trait::async_trait;
use ormflow_proto::{Row, Value};

pub use logger::{LoggingOptions, QueryLogger};

use crate::error::DriverError;
use crate::metadata::{ClosureTableMetadata, ColumnType};

/// Result type of driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Connection to one SQL database.
///
/// Implementations execute one statement at a time; the engine never issues
/// a second call before the previous one completed.
#[async_trait]
pub trait Driver: Send + Sync + fmt::Debug {
    /// Driver name, e.g. `"sqlite"`.
    fn name(&self) -> &str;

    /// Open the connection.
    async fn connect(&self) -> DriverResult<()>;

    /// Close the connection.
    async fn disconnect(&self) -> DriverResult<()>;

    /// Check if the connection is open.
    fn is_connected(&self) -> bool;

    /// Run a statement returning rows.
    async fn query(&self, sql: &str, params: &[Value]) -> DriverResult<Vec<Row>>;

    /// Run a statement returning the number of affected rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> DriverResult<u64>;

    /// Insert one row. Returns the value the database generated for
    /// `generated_column`, if one was named.
    async fn insert(
        &self,
        table: &str,
        values: &[(String, Value)],
        generated_column: Option<&str>,
    ) -> DriverResult<Option<Value>>;

    /// Update rows matching every condition.
    async fn update(
        &self,
        table: &str,
        values: &[(String, Value)],
        conditions: &[(String, Value)],
    ) -> DriverResult<u64> {
        let mut params = Vec::with_capacity(values.len() + conditions.len());
        let assignments = values
            .iter()
            .map(|(column, value)| {
                params.push(value.clone());
                format!("{} = {}", self.escape(column), self.placeholder(params.len()))
            })
            .collect::<Vec<_>>()
            .join(", ");
        let filter = self.condition_sql(conditions, &mut params);
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.escape(table),
            assignments,
            filter
        );
        self.execute(&sql, &params).await
    }

    /// Delete rows matching every condition.
    async fn delete(&self, table: &str, conditions: &[(String, Value)]) -> DriverResult<u64> {
        let mut params = Vec::with_capacity(conditions.len());
        let filter = self.condition_sql(conditions, &mut params);
        let sql = format!("DELETE FROM {} WHERE {}", self.escape(table), filter);
        self.execute(&sql, &params).await
    }

    /// Begin a transaction.
    async fn begin_transaction(&self) -> DriverResult<()>;

    /// Commit the active transaction.
    async fn commit_transaction(&self) -> DriverResult<()>;

    /// Roll back the active transaction.
    async fn rollback_transaction(&self) -> DriverResult<()>;

    /// Check if a transaction is active.
    fn is_transaction_active(&self) -> bool;

    /// Quote an identifier.
    fn escape(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    /// Placeholder for the `index`-th (1-based) bound parameter.
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// `LIMIT`/`OFFSET` clause, including its leading space.
    fn limit_clause(&self, limit: Option<u32>, offset: u32) -> String {
        match (limit, offset) {
            (None, 0) => String::new(),
            (Some(limit), 0) => format!(" LIMIT {limit}"),
            (Some(limit), offset) => format!(" LIMIT {limit} OFFSET {offset}"),
            (None, offset) => format!(" LIMIT -1 OFFSET {offset}"),
        }
    }

    /// Convert an entity value into what the database stores for the column.
    fn prepare_persistent_value(&self, value: Value, column_type: ColumnType) -> Value {
        normalize_value(value, column_type)
    }

    /// Convert a value read from the database into the entity representation.
    fn prepare_hydrated_value(&self, value: Value, column_type: ColumnType) -> Value {
        normalize_value(value, column_type)
    }

    /// Write the closure rows of a newly inserted tree node: one per ancestor
    /// of `parent`, plus the self row at depth 0. Returns the node's depth.
    async fn insert_into_closure_table(
        &self,
        closure: &ClosureTableMetadata,
        descendant: &Value,
        parent: Option<&Value>,
    ) -> DriverResult<u32> {
        let table = self.escape(&closure.table);
        let ancestor_col = self.escape(&closure.ancestor_column);
        let descendant_col = self.escape(&closure.descendant_column);
        let depth_col = closure.depth_column.as_deref().map(|d| self.escape(d));

        let self_row = match &depth_col {
            Some(depth) => format!(
                "INSERT INTO {table} ({ancestor_col}, {descendant_col}, {depth}) VALUES ({}, {}, 0)",
                self.placeholder(1),
                self.placeholder(2)
            ),
            None => format!(
                "INSERT INTO {table} ({ancestor_col}, {descendant_col}) VALUES ({}, {})",
                self.placeholder(1),
                self.placeholder(2)
            ),
        };
        self.execute(&self_row, &[descendant.clone(), descendant.clone()])
            .await?;

        let Some(parent) = parent else {
            return Ok(0);
        };

        let ancestor_rows = match &depth_col {
            Some(depth) => format!(
                "INSERT INTO {table} ({ancestor_col}, {descendant_col}, {depth}) \
                 SELECT {ancestor_col}, {}, {depth} + 1 FROM {table} WHERE {descendant_col} = {}",
                self.placeholder(1),
                self.placeholder(2)
            ),
            None => format!(
                "INSERT INTO {table} ({ancestor_col}, {descendant_col}) \
                 SELECT {ancestor_col}, {} FROM {table} WHERE {descendant_col} = {}",
                self.placeholder(1),
                self.placeholder(2)
            ),
        };
        let ancestors = self
            .execute(&ancestor_rows, &[descendant.clone(), parent.clone()])
            .await?;
        Ok(u32::try_from(ancestors).unwrap_or(u32::MAX))
    }

    /// `a = ? AND b = ?` for the given conditions, pushing their values.
    fn condition_sql(&self, conditions: &[(String, Value)], params: &mut Vec<Value>) -> String {
        if conditions.is_empty() {
            return "1 = 1".to_string();
        }
        conditions
            .iter()
            .map(|(column, value)| {
                if value.is_null() {
                    format!("{} IS NULL", self.escape(column))
                } else {
                    params.push(value.clone());
                    format!("{} = {}", self.escape(column), self.placeholder(params.len()))
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// Coerce a value to the representation of a column type.
pub fn normalize_value(value: Value, column_type: ColumnType) -> Value {
    match (column_type, value) {
        (ColumnType::Bool, Value::Int32(i)) => Value::Bool(i != 0),
        (ColumnType::Bool, Value::Int64(i)) => Value::Bool(i != 0),
        (ColumnType::Int32, Value::Int64(i)) => match i32::try_from(i) {
            Ok(narrow) => Value::Int32(narrow),
            Err(_) => Value::Int64(i),
        },
        (ColumnType::Int32, Value::Bool(b)) => Value::Int32(i32::from(b)),
        (ColumnType::Int64, Value::Int32(i)) => Value::Int64(i64::from(i)),
        (ColumnType::Float64, Value::Int32(i)) => Value::Float64(f64::from(i)),
        (ColumnType::Float64, Value::Int64(i)) => Value::Float64(i as f64),
        (ColumnType::Timestamp, Value::Int64(t)) => Value::Timestamp(t),
        (ColumnType::Timestamp, Value::Int32(t)) => Value::Timestamp(i64::from(t)),
        (_, value) => value,
    }
}
