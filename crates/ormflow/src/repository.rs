//! Per-entity repositories.

use ormflow_core::{ClosureTableManager, EntityManager, EntityRef, FindOptions, QueryBuilder};
use ormflow_proto::Value;

use crate::error::Result;

/// Find, persist and remove instances of one entity.
#[derive(Debug, Clone)]
pub struct Repository {
    manager: EntityManager,
    entity: String,
}

impl Repository {
    pub(crate) fn new(manager: EntityManager, entity: &str) -> Result<Self> {
        let name = manager.registry().entity(entity)?.name.clone();
        Ok(Self {
            manager,
            entity: name,
        })
    }

    /// Entity this repository manages.
    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    pub fn manager(&self) -> &EntityManager {
        &self.manager
    }

    /// New, unsaved instance.
    pub fn create(&self) -> Result<EntityRef> {
        Ok(self.manager.create(&self.entity)?)
    }

    /// Instances matching `options`. Eager relations are joined one level deep.
    pub async fn find(&self, options: FindOptions) -> Result<Vec<EntityRef>> {
        Ok(self.manager.find(&self.entity, options).await?)
    }

    /// First instance matching `options`.
    pub async fn find_one(&self, options: FindOptions) -> Result<Option<EntityRef>> {
        Ok(self.manager.find_one(&self.entity, options).await?)
    }

    /// Instance with the given primary key.
    pub async fn find_one_by_id(&self, id: impl Into<Value>) -> Result<Option<EntityRef>> {
        Ok(self.manager.find_one_by_id(&self.entity, id).await?)
    }

    /// Instances with any of the given primary keys.
    pub async fn find_by_ids(&self, ids: Vec<Value>) -> Result<Vec<EntityRef>> {
        Ok(self.manager.find_by_ids(&self.entity, ids).await?)
    }

    /// Number of instances matching `options`.
    pub async fn count(&self, options: FindOptions) -> Result<u64> {
        Ok(self.manager.count(&self.entity, options).await?)
    }

    /// Insert or update `entity` and whatever its cascades reach.
    pub async fn persist(&self, entity: &EntityRef) -> Result<EntityRef> {
        Ok(self.manager.persist(entity).await?)
    }

    pub async fn persist_all(&self, entities: &[EntityRef]) -> Result<Vec<EntityRef>> {
        Ok(self.manager.persist_all(entities).await?)
    }

    /// Delete `entity` and whatever its remove cascades reach.
    pub async fn remove(&self, entity: &EntityRef) -> Result<()> {
        Ok(self.manager.remove(entity).await?)
    }

    pub async fn remove_all(&self, entities: &[EntityRef]) -> Result<()> {
        Ok(self.manager.remove_all(entities).await?)
    }

    /// Query builder rooted at this entity.
    pub fn create_query_builder(&self, alias: &str) -> Result<QueryBuilder> {
        Ok(self.manager.query_builder(&self.entity, alias)?)
    }

    /// Check if every primary-key column of `entity` is set.
    pub fn has_id(&self, entity: &EntityRef) -> Result<bool> {
        Ok(self.manager.has_id(entity)?)
    }

    pub fn get_id(&self, entity: &EntityRef) -> Result<Option<Value>> {
        Ok(self.manager.get_id(entity)?)
    }
}

/// Repository of a closure-table tree entity.
///
/// Dereferences to the plain [`Repository`] for the non-tree operations.
#[derive(Debug, Clone)]
pub struct TreeRepository {
    repository: Repository,
    tree: ClosureTableManager,
}

impl TreeRepository {
    pub(crate) fn new(manager: EntityManager, entity: &str) -> Result<Self> {
        let tree = manager.tree(entity)?;
        Ok(Self {
            repository: Repository::new(manager, entity)?,
            tree,
        })
    }

    /// Nodes without a parent.
    pub async fn find_roots(&self) -> Result<Vec<EntityRef>> {
        Ok(self.tree.find_roots().await?)
    }

    /// `node` and every node below it, flat.
    pub async fn find_descendants(&self, node: &EntityRef) -> Result<Vec<EntityRef>> {
        Ok(self.tree.find_descendants(node).await?)
    }

    /// `node` with its `children` filled in recursively.
    pub async fn find_descendants_tree(&self, node: &EntityRef) -> Result<EntityRef> {
        Ok(self.tree.find_descendants_tree(node).await?)
    }

    /// `node` and every node above it, flat.
    pub async fn find_ancestors(&self, node: &EntityRef) -> Result<Vec<EntityRef>> {
        Ok(self.tree.find_ancestors(node).await?)
    }

    /// `node` with its `parent` chain filled in up to the root.
    pub async fn find_ancestors_tree(&self, node: &EntityRef) -> Result<EntityRef> {
        Ok(self.tree.find_ancestors_tree(node).await?)
    }

    pub async fn count_descendants(&self, node: &EntityRef) -> Result<u64> {
        Ok(self.tree.count_descendants(node).await?)
    }

    pub async fn count_ancestors(&self, node: &EntityRef) -> Result<u64> {
        Ok(self.tree.count_ancestors(node).await?)
    }

    /// Query over `node` and its descendants, with the closure table joined
    /// as `closure_alias`.
    pub fn create_descendants_query_builder(
        &self,
        alias: &str,
        closure_alias: &str,
        node: &EntityRef,
    ) -> Result<QueryBuilder> {
        Ok(self
            .tree
            .create_descendants_query_builder(alias, closure_alias, node)?)
    }

    /// Query over `node` and its ancestors.
    pub fn create_ancestors_query_builder(
        &self,
        alias: &str,
        closure_alias: &str,
        node: &EntityRef,
    ) -> Result<QueryBuilder> {
        Ok(self
            .tree
            .create_ancestors_query_builder(alias, closure_alias, node)?)
    }
}

impl std::ops::Deref for TreeRepository {
    type Target = Repository;

    fn deref(&self) -> &Repository {
        &self.repository
    }
}
