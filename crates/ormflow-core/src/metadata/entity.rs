//! Entity metadata.

use ormflow_proto::{KeyValue, Value};

use super::column::ColumnMetadata;
use super::listener::Listeners;
use super::relation::RelationMetadata;
use super::types::{TreeRole, TreeType};
use crate::entity::EntityData;

/// Closure table of a tree entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureTableMetadata {
    /// Closure table name.
    pub table: String,
    /// Ancestor key column.
    pub ancestor_column: String,
    /// Descendant key column.
    pub descendant_column: String,
    /// Depth column, if the table stores depth.
    pub depth_column: Option<String>,
}

/// Primary-key identity of an entity instance.
pub type EntityKey = Vec<KeyValue>;

/// Metadata of one entity type. Immutable once the registry is built.
#[derive(Debug, Clone)]
pub struct EntityMetadata {
    /// Entity name.
    pub name: String,
    /// Physical table name.
    pub table_name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnMetadata>,
    /// Relations in declaration order.
    pub relations: Vec<RelationMetadata>,
    /// Tree storage.
    pub tree: Option<TreeType>,
    /// Closure table, for closure-table trees.
    pub closure_table: Option<ClosureTableMetadata>,
    /// Lifecycle listeners.
    pub listeners: Listeners,
}

impl EntityMetadata {
    /// Get a column by property name.
    pub fn column(&self, property: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.property_name == property)
    }

    /// Get a column by physical name.
    pub fn column_by_name(&self, column: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.column_name == column)
    }

    /// Get a relation by property name.
    pub fn relation(&self, property: &str) -> Option<&RelationMetadata> {
        self.relations.iter().find(|r| r.property_name == property)
    }

    /// Primary-key columns, in declaration order.
    pub fn primary_columns(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter().filter(|c| c.primary)
    }

    /// The generated primary column, if the key is database-assigned.
    pub fn generated_primary_column(&self) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.primary && c.generated)
    }

    /// Relations that hold a foreign-key column on this entity's table.
    pub fn join_column_relations(&self) -> impl Iterator<Item = &RelationMetadata> {
        self.relations.iter().filter(|r| r.join_column.is_some())
    }

    /// The tree-parent relation.
    pub fn tree_parent_relation(&self) -> Option<&RelationMetadata> {
        self.relations
            .iter()
            .find(|r| r.tree_role == Some(TreeRole::Parent))
    }

    /// The tree-children relation.
    pub fn tree_children_relation(&self) -> Option<&RelationMetadata> {
        self.relations
            .iter()
            .find(|r| r.tree_role == Some(TreeRole::Children))
    }

    /// Primary-key values of an instance, `None` if any part is unset.
    pub fn primary_values(&self, data: &EntityData) -> Option<Vec<Value>> {
        self.primary_columns()
            .map(|column| match data.get(&column.property_name) {
                Some(value) if !value.is_null() => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Hashable primary-key identity of an instance.
    pub fn entity_key(&self, data: &EntityData) -> Option<EntityKey> {
        self.primary_columns()
            .map(|column| data.get(&column.property_name).and_then(Value::to_key))
            .collect()
    }

    /// Check if every primary-key column of an instance is set.
    pub fn has_id(&self, data: &EntityData) -> bool {
        self.entity_key(data).is_some()
    }
}
