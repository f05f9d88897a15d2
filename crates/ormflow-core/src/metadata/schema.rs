//! JSON entity schema files.
//!
//! A schema file describes one entity:
//!
//! ```json
//! {
//!   "name": "User",
//!   "table": { "name": "user" },
//!   "columns": {
//!     "id": { "type": "int", "primary": true, "generated": true },
//!     "firstName": { "type": "varchar" }
//!   },
//!   "relations": {
//!     "profile": { "target": "Profile", "type": "one-to-one", "joinColumn": true, "lazy": true }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

use super::descriptor::{
    ColumnDescriptor, EntityDescriptor, JoinColumnOptions, JoinTableOptions, RelationDescriptor,
};
use super::types::{CascadeFlags, ColumnType, RelationKind, TreeRole, TreeType};
use crate::error::Result;

/// Entity description loaded from JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySchema {
    pub name: String,
    #[serde(default)]
    pub table: Option<TableSchema>,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnSchema>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationSchema>,
    #[serde(default)]
    pub tree: Option<TreeType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableSchema {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub generated: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationSchema {
    pub target: String,
    #[serde(rename = "type")]
    pub kind: RelationKind,
    #[serde(default)]
    pub inverse_side: Option<String>,
    #[serde(default)]
    pub cascade: CascadeFlags,
    #[serde(default)]
    pub lazy: bool,
    #[serde(default)]
    pub eager: bool,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub join_column: Option<JoinSpec<JoinColumnOptions>>,
    #[serde(default)]
    pub join_table: Option<JoinSpec<JoinTableOptions>>,
    #[serde(default)]
    pub tree: Option<TreeRole>,
}

/// `true` for a default-named join, or an options object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JoinSpec<T> {
    Flag(bool),
    Options(T),
}

impl<T: Default> JoinSpec<T> {
    fn into_options(self) -> Option<T> {
        match self {
            JoinSpec::Flag(true) => Some(T::default()),
            JoinSpec::Flag(false) => None,
            JoinSpec::Options(options) => Some(options),
        }
    }
}

fn default_nullable() -> bool {
    true
}

impl EntitySchema {
    /// Parse a schema from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Normalise into a descriptor.
    pub fn into_descriptor(self) -> EntityDescriptor {
        let mut descriptor = EntityDescriptor::new(self.name);
        descriptor.table = self.table.and_then(|t| t.name);
        descriptor.tree = self.tree;

        for (property, column) in self.columns {
            descriptor.columns.push(ColumnDescriptor {
                property,
                name: column.name,
                column_type: column.column_type,
                nullable: column.nullable,
                primary: column.primary || column.generated,
                generated: column.generated,
            });
        }

        for (property, relation) in self.relations {
            descriptor.relations.push(RelationDescriptor {
                property,
                kind: relation.kind,
                target: relation.target,
                inverse_side: relation.inverse_side,
                cascade: relation.cascade,
                lazy: relation.lazy,
                eager: relation.eager,
                nullable: relation.nullable,
                join_column: relation.join_column.and_then(JoinSpec::into_options),
                join_table: relation.join_table.and_then(JoinSpec::into_options),
                tree: relation.tree,
            });
        }

        descriptor
    }
}

impl From<EntitySchema> for EntityDescriptor {
    fn from(schema: EntitySchema) -> Self {
        schema.into_descriptor()
    }
}
