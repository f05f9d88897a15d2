//! Shared fixtures for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ormflow_proto::{Row, Value};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::driver::{Driver, DriverResult};
use crate::error::DriverError;
use crate::manager::EntityManager;
use crate::metadata::{
    CascadeFlags, ColumnDescriptor, ColumnType, EntityDescriptor, MetadataRegistry,
    RelationDescriptor,
};

#[derive(Debug, Default)]
struct Recorded {
    statements: Vec<(String, Vec<Value>)>,
    transactions: Vec<&'static str>,
    results: VecDeque<Vec<Row>>,
    ids: HashMap<String, i64>,
    fail_on: Option<String>,
}

/// Driver that records every statement, answers queries from a queue of
/// canned row sets and hands out sequential ids per table.
#[derive(Debug, Default)]
pub(crate) struct RecordingDriver {
    state: Mutex<Recorded>,
    in_transaction: AtomicBool,
    paused: AtomicBool,
    resumed: Notify,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the rows returned by the next query.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.state.lock().results.push_back(rows);
    }

    /// Fail every statement containing `fragment` with a constraint error.
    pub fn fail_on(&self, fragment: &str) {
        self.state.lock().fail_on = Some(fragment.to_string());
    }

    /// Hold queries after recording them until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resumed.notify_waiters();
    }

    async fn wait_while_paused(&self) {
        loop {
            let resumed = self.resumed.notified();
            if !self.paused.load(Ordering::SeqCst) {
                return;
            }
            resumed.await;
        }
    }

    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().statements.clone()
    }

    /// Recorded statements other than selects.
    pub fn writes(&self) -> Vec<(String, Vec<Value>)> {
        self.statements()
            .into_iter()
            .filter(|(sql, _)| !sql.starts_with("SELECT"))
            .collect()
    }

    pub fn transaction_log(&self) -> Vec<&'static str> {
        self.state.lock().transactions.clone()
    }

    fn record(&self, sql: String, params: &[Value]) -> DriverResult<()> {
        let mut state = self.state.lock();
        let failed = state
            .fail_on
            .as_deref()
            .is_some_and(|fragment| sql.contains(fragment));
        state.statements.push((sql.clone(), params.to_vec()));
        if failed {
            return Err(DriverError::constraint(format!("rejected: {sql}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    fn name(&self) -> &str {
        "recording"
    }

    async fn connect(&self) -> DriverResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> DriverResult<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn query(&self, sql: &str, params: &[Value]) -> DriverResult<Vec<Row>> {
        self.record(sql.to_string(), params)?;
        self.wait_while_paused().await;
        Ok(self.state.lock().results.pop_front().unwrap_or_default())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> DriverResult<u64> {
        self.record(sql.to_string(), params)?;
        Ok(1)
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
            let columns: Vec<_> = values.iter().map(|(c, _)| self.escape(c)).collect();
            let placeholders = vec!["?"; values.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                self.escape(table),
                columns.join(", ")
            )
        };
        let params: Vec<Value> = values.iter().map(|(_, v)| v.clone()).collect();
        self.record(sql, &params)?;

        if generated_column.is_none() {
            return Ok(None);
        }
        let mut state = self.state.lock();
        let id = state.ids.entry(table.to_string()).or_insert(0);
        *id += 1;
        Ok(Some(Value::Int64(*id)))
    }

    async fn begin_transaction(&self) -> DriverResult<()> {
        if self.in_transaction.swap(true, Ordering::SeqCst) {
            return Err(DriverError::query("transaction already active"));
        }
        self.state.lock().transactions.push("BEGIN");
        Ok(())
    }

    async fn commit_transaction(&self) -> DriverResult<()> {
        if !self.in_transaction.swap(false, Ordering::SeqCst) {
            return Err(DriverError::query("no transaction is active"));
        }
        self.state.lock().transactions.push("COMMIT");
        Ok(())
    }

    async fn rollback_transaction(&self) -> DriverResult<()> {
        if !self.in_transaction.swap(false, Ordering::SeqCst) {
            return Err(DriverError::query("no transaction is active"));
        }
        self.state.lock().transactions.push("ROLLBACK");
        Ok(())
    }

    fn is_transaction_active(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }
}

pub(crate) fn blog_descriptors() -> Vec<EntityDescriptor> {
    let insert_only = CascadeFlags {
        insert: true,
        ..CascadeFlags::none()
    };
    vec![
        EntityDescriptor::new("Post")
            .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
            .with_column(ColumnDescriptor::new("title", ColumnType::String))
            .with_column(ColumnDescriptor::new("text", ColumnType::String).nullable())
            .with_relation(
                RelationDescriptor::many_to_one("author", "Author")
                    .with_inverse("posts")
                    .with_cascade(CascadeFlags::persist()),
            )
            .with_relation(
                RelationDescriptor::many_to_many("categories", "Category")
                    .with_inverse("posts")
                    .with_cascade(insert_only)
                    .join_table(),
            ),
        EntityDescriptor::new("Author")
            .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
            .with_column(ColumnDescriptor::new("name", ColumnType::String))
            .with_relation(
                RelationDescriptor::one_to_many("posts", "Post")
                    .with_inverse("author")
                    .with_cascade(CascadeFlags::persist()),
            ),
        EntityDescriptor::new("Category")
            .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
            .with_column(ColumnDescriptor::new("name", ColumnType::String))
            .with_relation(
                RelationDescriptor::many_to_many("posts", "Post").with_inverse("categories"),
            ),
    ]
}

/// Post, Author and Category: a many-to-one with cascades, its one-to-many
/// inverse, and a many-to-many cascading inserts only.
pub(crate) fn blog_registry() -> MetadataRegistry {
    MetadataRegistry::build(&blog_descriptors()).expect("blog registry")
}

pub(crate) fn blog_manager(driver: RecordingDriver) -> (EntityManager, Arc<RecordingDriver>) {
    let driver = Arc::new(driver);
    let manager = EntityManager::new(driver.clone(), Arc::new(blog_registry()));
    (manager, driver)
}

/// Husband and Wife each holding a foreign key to the other.
pub(crate) fn couple_registry(nullable: bool) -> MetadataRegistry {
    let link = |property: &str, target: &str| {
        let relation = RelationDescriptor::many_to_one(property, target)
            .with_cascade(CascadeFlags::persist());
        if nullable {
            relation
        } else {
            relation.not_nullable()
        }
    };
    MetadataRegistry::build(&[
        EntityDescriptor::new("Husband")
            .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
            .with_column(ColumnDescriptor::new("name", ColumnType::String))
            .with_relation(link("wife", "Wife")),
        EntityDescriptor::new("Wife")
            .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
            .with_column(ColumnDescriptor::new("name", ColumnType::String))
            .with_relation(link("husband", "Husband")),
    ])
    .expect("couple registry")
}

/// Folder stored as a closure-table tree.
pub(crate) fn tree_manager(driver: RecordingDriver) -> (EntityManager, Arc<RecordingDriver>) {
    let registry = MetadataRegistry::build(&[EntityDescriptor::new("Folder")
        .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
        .with_column(ColumnDescriptor::new("name", ColumnType::String))
        .with_relation(
            RelationDescriptor::tree_parent("parent", "Folder").with_cascade(CascadeFlags::persist()),
        )
        .with_relation(RelationDescriptor::tree_children("children", "Folder", "parent"))
        .with_closure_tree()])
    .expect("tree registry");
    let driver = Arc::new(driver);
    let manager = EntityManager::new(driver.clone(), Arc::new(registry));
    (manager, driver)
}
