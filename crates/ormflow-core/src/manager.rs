//! Entity manager: the single entry point to queries, persistence and trees
//! of one connection.

use std::future::Future;
use std::sync::Arc;

use convert_case::{Case, Casing};
use ormflow_proto::{FilterExpr, Value};
use tracing::{debug, warn};

use crate::driver::Driver;
use crate::entity::{EntityRef, Related};
use crate::error::{Error, Result};
use crate::metadata::{EntityMetadata, HookContext, ListenerKind, MetadataRegistry};
use crate::persistence::Persister;
use crate::query::{FindOptions, QueryBuilder};
use crate::reporter::{Reporter, TracingReporter};
use crate::tree::ClosureTableManager;

struct ManagerInner {
    driver: Arc<dyn Driver>,
    registry: Arc<MetadataRegistry>,
    reporter: Arc<dyn Reporter>,
}

/// Shared handle to a driver, a metadata registry and a reporter.
///
/// Cheap to clone; lazy relations keep one to load themselves later.
#[derive(Clone)]
pub struct EntityManager {
    inner: Arc<ManagerInner>,
}

impl EntityManager {
    /// Create a manager reporting listener output to `tracing`.
    pub fn new(driver: Arc<dyn Driver>, registry: Arc<MetadataRegistry>) -> Self {
        Self::with_reporter(driver, registry, Arc::new(TracingReporter))
    }

    /// Create a manager with a custom listener reporter.
    pub fn with_reporter(
        driver: Arc<dyn Driver>,
        registry: Arc<MetadataRegistry>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                driver,
                registry,
                reporter,
            }),
        }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.inner.driver
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.inner.registry
    }

    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.inner.reporter
    }

    /// New, unsaved instance of an entity.
    pub fn create(&self, entity: &str) -> Result<EntityRef> {
        let meta = self.registry().entity(entity)?;
        Ok(EntityRef::new(meta.name.clone()))
    }

    /// Query builder rooted at `entity` under `alias`.
    pub fn query_builder(&self, entity: &str, alias: &str) -> Result<QueryBuilder> {
        let meta = self.registry().entity(entity)?;
        Ok(QueryBuilder::new(self.clone(), meta.name.clone(), alias))
    }

    fn find_builder(&self, entity: &str, options: FindOptions) -> Result<QueryBuilder> {
        let meta = self.registry().entity(entity)?;
        let alias = options
            .alias
            .clone()
            .unwrap_or_else(|| meta.name.to_case(Case::Snake));
        let mut builder = QueryBuilder::new(self.clone(), meta.name.clone(), alias.clone());

        let mut joined = Vec::new();
        for (kind, path, join_alias) in options.joins {
            joined.push(path.clone());
            builder = match kind {
                crate::query::JoinKind::Inner => builder.inner_join_and_select(path, join_alias),
                crate::query::JoinKind::Left => builder.left_join_and_select(path, join_alias),
            };
        }
        if !options.skip_eager {
            for relation in meta.relations.iter().filter(|r| r.eager && !r.lazy) {
                let path = format!("{alias}.{}", relation.property_name);
                if !joined.contains(&path) {
                    builder = builder.left_join_and_select(
                        path,
                        format!("{alias}_{}", relation.property_name),
                    );
                }
            }
        }

        if let Some(filter) = options.filter {
            builder = builder.where_(filter);
        }
        for order in options.order {
            builder = builder.add_order_by(order);
        }
        if let Some(limit) = options.pagination.limit {
            builder = builder.take(limit);
        }
        Ok(builder.skip(options.pagination.offset))
    }

    /// Entities matching the options.
    pub async fn find(&self, entity: &str, options: FindOptions) -> Result<Vec<EntityRef>> {
        self.find_builder(entity, options)?.get_results().await
    }

    /// First entity matching the options.
    pub async fn find_one(&self, entity: &str, options: FindOptions) -> Result<Option<EntityRef>> {
        self.find_builder(entity, options)?.get_one().await
    }

    /// Number of entities matching the options, ignoring pagination.
    pub async fn count(&self, entity: &str, options: FindOptions) -> Result<u64> {
        self.find_builder(entity, options)?.get_count().await
    }

    fn single_primary<'m>(&self, meta: &'m EntityMetadata) -> Result<&'m str> {
        let mut primary = meta.primary_columns();
        match (primary.next(), primary.next()) {
            (Some(column), None) => Ok(&column.property_name),
            (None, _) => Err(Error::MissingPrimaryKey {
                entity: meta.name.clone(),
            }),
            (Some(_), Some(_)) => Err(Error::CompositePrimaryKey {
                entity: meta.name.clone(),
            }),
        }
    }

    /// Entity with the given primary key.
    pub async fn find_one_by_id(
        &self,
        entity: &str,
        id: impl Into<Value>,
    ) -> Result<Option<EntityRef>> {
        let meta = self.registry().entity(entity)?;
        let alias = meta.name.to_case(Case::Snake);
        let property = self.single_primary(meta)?;
        let options = FindOptions::new()
            .with_alias(alias.clone())
            .with_filter(FilterExpr::eq(format!("{alias}.{property}"), id));
        self.find_one(entity, options).await
    }

    /// Entities with any of the given primary keys.
    pub async fn find_by_ids(&self, entity: &str, ids: Vec<Value>) -> Result<Vec<EntityRef>> {
        let meta = self.registry().entity(entity)?;
        let alias = meta.name.to_case(Case::Snake);
        let property = self.single_primary(meta)?;
        let options = FindOptions::new()
            .with_alias(alias.clone())
            .with_filter(FilterExpr::in_values(format!("{alias}.{property}"), ids));
        self.find(entity, options).await
    }

    /// Check if every primary-key column of an instance is set.
    pub fn has_id(&self, entity: &EntityRef) -> Result<bool> {
        let data = entity.read();
        Ok(self.registry().entity(data.entity_name())?.has_id(&data))
    }

    /// Primary-key value of an instance with a single-column key.
    pub fn get_id(&self, entity: &EntityRef) -> Result<Option<Value>> {
        let data = entity.read();
        let meta = self.registry().entity(data.entity_name())?;
        let property = self.single_primary(meta)?;
        Ok(data.get(property).filter(|value| !value.is_null()).cloned())
    }

    /// Insert or update an entity and everything its cascades reach.
    pub async fn persist(&self, entity: &EntityRef) -> Result<EntityRef> {
        Persister::new(self)
            .persist(std::slice::from_ref(entity))
            .await?;
        Ok(entity.clone())
    }

    /// Persist several entities in one unit of work.
    pub async fn persist_all(&self, entities: &[EntityRef]) -> Result<Vec<EntityRef>> {
        Persister::new(self).persist(entities).await?;
        Ok(entities.to_vec())
    }

    /// Delete an entity and everything its remove cascades reach.
    pub async fn remove(&self, entity: &EntityRef) -> Result<()> {
        Persister::new(self)
            .remove(std::slice::from_ref(entity))
            .await?;
        Ok(())
    }

    /// Delete several entities in one unit of work.
    pub async fn remove_all(&self, entities: &[EntityRef]) -> Result<()> {
        Persister::new(self).remove(entities).await?;
        Ok(())
    }

    /// Run `work` inside a transaction.
    ///
    /// Commits when `work` succeeds and rolls back when it fails. If a
    /// transaction is already active, `work` joins it and the outer owner
    /// decides.
    pub async fn transaction<F, Fut, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce(EntityManager) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let driver = self.driver();
        if driver.is_transaction_active() {
            return work(self.clone()).await;
        }

        driver.begin_transaction().await?;
        match work(self.clone()).await {
            Ok(value) => {
                driver.commit_transaction().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = driver.rollback_transaction().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Closure-table operations of a tree entity.
    pub fn tree(&self, entity: &str) -> Result<ClosureTableManager> {
        ClosureTableManager::new(self.clone(), entity)
    }

    /// Load one relation of one owner, as a lazy relation does on first
    /// access. Runs the same join a query would.
    pub(crate) async fn load_relation(
        &self,
        entity: &str,
        relation: &str,
        owner_id: &[Value],
    ) -> Result<Related> {
        let meta = self.registry().entity(entity)?;
        let relation_meta = self.registry().relation(entity, relation)?;
        let empty = if relation_meta.is_to_many() {
            Related::Many(Vec::new())
        } else {
            Related::One(None)
        };

        let filter = FilterExpr::and(
            meta.primary_columns()
                .zip(owner_id)
                .map(|(column, value)| {
                    FilterExpr::eq(format!("owner.{}", column.property_name), value.clone())
                })
                .collect(),
        );
        let owner = self
            .query_builder(entity, "owner")?
            .left_join_and_select(format!("owner.{relation}"), "related")
            .where_(filter)
            .quiet_root()
            .get_one()
            .await?;

        debug!(entity, relation, found = owner.is_some(), "loaded relation");
        Ok(owner
            .and_then(|owner| owner.relation(relation))
            .and_then(|value| value.resolved())
            .unwrap_or(empty))
    }

    /// Run the listeners bound to `kind` on one instance.
    pub(crate) fn run_listeners(
        &self,
        meta: &EntityMetadata,
        entity: &EntityRef,
        kind: ListenerKind,
    ) -> Result<()> {
        if !meta.listeners.has(kind) {
            return Ok(());
        }
        let ctx = HookContext::new(&meta.name, kind, self.reporter().as_ref());
        let mut data = entity.write();
        meta.listeners
            .run(kind, &mut data, &ctx)
            .map_err(|message| Error::LifecycleHook {
                entity: meta.name.clone(),
                event: kind,
                message,
            })
    }
}

impl std::fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager")
            .field("driver", &self.inner.driver.name())
            .field("entities", &self.inner.registry.entity_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{blog_manager, RecordingDriver};
    use ormflow_proto::Row;

    #[tokio::test]
    async fn test_transaction_commits_and_rolls_back() {
        let (manager, driver) = blog_manager(RecordingDriver::new());

        let value = manager.transaction(|_| async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(driver.transaction_log(), vec!["BEGIN", "COMMIT"]);

        let err = manager
            .transaction(|_| async { Err::<(), _>(Error::TransactionNotActive) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransactionNotActive));
        assert_eq!(
            driver.transaction_log(),
            vec!["BEGIN", "COMMIT", "BEGIN", "ROLLBACK"]
        );
    }

    #[tokio::test]
    async fn test_nested_transaction_joins_outer() {
        let (manager, driver) = blog_manager(RecordingDriver::new());
        manager
            .transaction(|outer| async move {
                outer.transaction(|_| async { Ok(()) }).await
            })
            .await
            .unwrap();
        assert_eq!(driver.transaction_log(), vec!["BEGIN", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_find_one_by_id_filters_on_primary_key() {
        let driver = RecordingDriver::new();
        driver.push_rows(vec![Row::new()
            .with("author__id", 4)
            .with("author__name", "Umed")]);
        let (manager, driver) = blog_manager(driver);

        let author = manager.find_one_by_id("Author", 4).await.unwrap().unwrap();
        assert_eq!(author.get("name"), Some(Value::String("Umed".into())));
        let (sql, params) = &driver.statements()[0];
        assert!(sql.ends_with("WHERE \"author\".\"id\" = ?"));
        assert_eq!(params, &vec![Value::Int32(4)]);

        assert!(manager.has_id(&author).unwrap());
        assert_eq!(manager.get_id(&author).unwrap(), Some(Value::Int32(4)));
        assert!(!manager.has_id(&manager.create("Author").unwrap()).unwrap());
    }

    #[tokio::test]
    async fn test_unknown_entity() {
        let (manager, _driver) = blog_manager(RecordingDriver::new());
        assert!(matches!(
            manager.create("Nope"),
            Err(Error::UnknownEntity(name)) if name == "Nope"
        ));
    }
}
