//! Closure-table trees.
//!
//! Every node of a tree entity has one closure row per ancestor, itself
//! included at depth 0. The rows are written by the persister when the node
//! is inserted; this module only reads them.

use std::collections::HashMap;

use convert_case::{Case, Casing};
use ormflow_proto::{FilterExpr, KeyValue, Value};
use tracing::debug;

use crate::entity::{EntityRef, Related, RelationValue};
use crate::error::{Error, Result};
use crate::manager::EntityManager;
use crate::metadata::{ClosureTableMetadata, ColumnMetadata, EntityMetadata, RelationMetadata};
use crate::query::QueryBuilder;

/// Ancestor and descendant queries over one closure-table entity.
#[derive(Debug, Clone)]
pub struct ClosureTableManager {
    manager: EntityManager,
    entity: String,
}

impl ClosureTableManager {
    pub(crate) fn new(manager: EntityManager, entity: &str) -> Result<Self> {
        let meta = manager.registry().entity(entity)?;
        if meta.closure_table.is_none() {
            return Err(Error::NotATree(entity.to_string()));
        }
        let entity = meta.name.clone();
        Ok(Self { manager, entity })
    }

    /// Tree entity name.
    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    fn meta(&self) -> Result<&EntityMetadata> {
        self.manager.registry().entity(&self.entity)
    }

    fn closure(&self) -> Result<&ClosureTableMetadata> {
        self.meta()?
            .closure_table
            .as_ref()
            .ok_or_else(|| Error::NotATree(self.entity.clone()))
    }

    fn primary(&self) -> Result<&ColumnMetadata> {
        let meta = self.meta()?;
        meta.primary_columns()
            .next()
            .ok_or_else(|| Error::MissingPrimaryKey {
                entity: meta.name.clone(),
            })
    }

    fn parent_relation(&self) -> Result<&RelationMetadata> {
        let meta = self.meta()?;
        meta.tree_parent_relation()
            .ok_or_else(|| Error::NotATree(meta.name.clone()))
    }

    fn children_relation(&self) -> Result<&RelationMetadata> {
        let meta = self.meta()?;
        meta.tree_children_relation()
            .ok_or_else(|| Error::UnknownRelation {
                entity: meta.name.clone(),
                relation: "tree children".to_string(),
            })
    }

    fn default_alias(&self) -> String {
        self.entity.to_case(Case::Snake)
    }

    fn node_id(&self, node: &EntityRef) -> Result<Value> {
        let primary = self.primary()?;
        node.get(&primary.property_name)
            .filter(|value| !value.is_null())
            .ok_or_else(|| Error::MissingPrimaryKey {
                entity: self.entity.clone(),
            })
    }

    /// Nodes without a parent.
    pub async fn find_roots(&self) -> Result<Vec<EntityRef>> {
        let alias = self.default_alias();
        let parent = self.parent_relation()?;
        self.manager
            .query_builder(&self.entity, &alias)?
            .where_(FilterExpr::is_null(format!(
                "{alias}.{}",
                parent.property_name
            )))
            .get_results()
            .await
    }

    /// Query over `node` and every node below it. The closure table is
    /// joined as `closure_alias`.
    pub fn create_descendants_query_builder(
        &self,
        alias: &str,
        closure_alias: &str,
        node: &EntityRef,
    ) -> Result<QueryBuilder> {
        let closure = self.closure()?;
        let id = self.node_id(node)?;
        let primary = &self.primary()?.property_name;
        Ok(self
            .manager
            .query_builder(&self.entity, alias)?
            .inner_join_table(
                closure.table.clone(),
                closure_alias,
                FilterExpr::column_eq(
                    format!("{closure_alias}.{}", closure.descendant_column),
                    format!("{alias}.{primary}"),
                ),
            )
            .where_(FilterExpr::eq(
                format!("{closure_alias}.{}", closure.ancestor_column),
                id,
            )))
    }

    /// Query over `node` and every node above it.
    pub fn create_ancestors_query_builder(
        &self,
        alias: &str,
        closure_alias: &str,
        node: &EntityRef,
    ) -> Result<QueryBuilder> {
        let closure = self.closure()?;
        let id = self.node_id(node)?;
        let primary = &self.primary()?.property_name;
        Ok(self
            .manager
            .query_builder(&self.entity, alias)?
            .inner_join_table(
                closure.table.clone(),
                closure_alias,
                FilterExpr::column_eq(
                    format!("{closure_alias}.{}", closure.ancestor_column),
                    format!("{alias}.{primary}"),
                ),
            )
            .where_(FilterExpr::eq(
                format!("{closure_alias}.{}", closure.descendant_column),
                id,
            )))
    }

    /// `node` and all its descendants, flat. `node` itself comes back as a
    /// freshly loaded instance.
    pub async fn find_descendants(&self, node: &EntityRef) -> Result<Vec<EntityRef>> {
        self.create_descendants_query_builder(&self.default_alias(), "closure", node)?
            .get_results()
            .await
    }

    /// `node` with its descendants nested into the children relation.
    pub async fn find_descendants_tree(&self, node: &EntityRef) -> Result<EntityRef> {
        let descendants = self.find_descendants(node).await?;
        let children = self.children_relation()?;
        let parent = self.parent_relation()?;

        let mut by_parent: HashMap<KeyValue, Vec<EntityRef>> = HashMap::new();
        for descendant in &descendants {
            let parent_key = descendant
                .read()
                .foreign_key(&parent.property_name)
                .and_then(Value::to_key);
            if let Some(parent_key) = parent_key {
                by_parent.entry(parent_key).or_default().push(descendant.clone());
            }
        }

        for instance in descendants.iter().chain(std::iter::once(node)) {
            let key = self.node_id(instance)?.to_key();
            let nested = key
                .and_then(|key| by_parent.get(&key).cloned())
                .unwrap_or_default();
            instance.write().set_relation(
                children.property_name.clone(),
                RelationValue::loaded(Related::Many(nested), children.lazy),
            );
        }
        debug!(entity = %self.entity, nodes = descendants.len(), "built descendants tree");
        Ok(node.clone())
    }

    /// `node` and all its ancestors, flat.
    pub async fn find_ancestors(&self, node: &EntityRef) -> Result<Vec<EntityRef>> {
        self.create_ancestors_query_builder(&self.default_alias(), "closure", node)?
            .get_results()
            .await
    }

    /// `node` with its ancestors chained through the parent relation.
    pub async fn find_ancestors_tree(&self, node: &EntityRef) -> Result<EntityRef> {
        let ancestors = self.find_ancestors(node).await?;
        let parent = self.parent_relation()?;

        let mut by_key: HashMap<KeyValue, EntityRef> = HashMap::new();
        for ancestor in &ancestors {
            if let Some(key) = self.node_id(ancestor)?.to_key() {
                by_key.insert(key, ancestor.clone());
            }
        }

        let link = |instance: &EntityRef, source: &EntityRef| {
            let above = source
                .read()
                .foreign_key(&parent.property_name)
                .and_then(Value::to_key)
                .and_then(|key| by_key.get(&key).cloned());
            instance.write().set_relation(
                parent.property_name.clone(),
                RelationValue::loaded(Related::One(above), parent.lazy),
            );
        };
        for ancestor in &ancestors {
            link(ancestor, ancestor);
        }
        let loaded = self
            .node_id(node)?
            .to_key()
            .and_then(|key| by_key.get(&key).cloned());
        if let Some(loaded) = loaded.filter(|loaded| !loaded.ptr_eq(node)) {
            link(node, &loaded);
        }
        Ok(node.clone())
    }

    /// Number of nodes in the subtree of `node`, itself included.
    pub async fn count_descendants(&self, node: &EntityRef) -> Result<u64> {
        self.create_descendants_query_builder(&self.default_alias(), "closure", node)?
            .get_count()
            .await
    }

    /// Number of nodes on the path from the root to `node`, itself included.
    pub async fn count_ancestors(&self, node: &EntityRef) -> Result<u64> {
        self.create_ancestors_query_builder(&self.default_alias(), "closure", node)?
            .get_count()
            .await
    }
}
