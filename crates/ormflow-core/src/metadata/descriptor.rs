//! Declarative entity descriptors.
//!
//! Descriptors are what application code hands to the registry builder,
//! either through the builder methods below or through a JSON
//! [`EntitySchema`](super::EntitySchema). Names left unset here are filled in
//! by the naming strategy when the registry is built.

use serde::Deserialize;

use super::listener::{HookContext, ListenerKind, Listeners};
use super::types::{CascadeFlags, ColumnType, RelationKind, TreeRole, TreeType};
use crate::entity::EntityData;

/// Declaration of one entity type.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    /// Entity name (unique within a registry).
    pub name: String,
    /// Explicit table name.
    pub table: Option<String>,
    /// Column declarations.
    pub columns: Vec<ColumnDescriptor>,
    /// Relation declarations.
    pub relations: Vec<RelationDescriptor>,
    /// Tree storage, if this is a hierarchical entity.
    pub tree: Option<TreeType>,
    /// Lifecycle listeners.
    pub listeners: Listeners,
}

impl EntityDescriptor {
    /// Create a new entity descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            columns: Vec::new(),
            relations: Vec::new(),
            tree: None,
            listeners: Listeners::new(),
        }
    }

    /// Set the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add a column.
    pub fn with_column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// Add multiple columns.
    pub fn with_columns(mut self, columns: impl IntoIterator<Item = ColumnDescriptor>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Add a relation.
    pub fn with_relation(mut self, relation: RelationDescriptor) -> Self {
        self.relations.push(relation);
        self
    }

    /// Store this entity as a closure-table tree.
    pub fn with_closure_tree(mut self) -> Self {
        self.tree = Some(TreeType::ClosureTable);
        self
    }

    /// Bind a lifecycle listener.
    pub fn with_listener<F>(mut self, kind: ListenerKind, listener: F) -> Self
    where
        F: Fn(&mut EntityData, &HookContext<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.listeners.add(kind, listener);
        self
    }
}

/// Declaration of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Property name on the entity.
    pub property: String,
    /// Explicit column name.
    pub name: Option<String>,
    /// Column type.
    pub column_type: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Part of the primary key.
    pub primary: bool,
    /// Value assigned by the database on insert.
    pub generated: bool,
}

impl ColumnDescriptor {
    /// Create a non-nullable column.
    pub fn new(property: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            property: property.into(),
            name: None,
            column_type,
            nullable: false,
            primary: false,
            generated: false,
        }
    }

    /// Create a primary column whose value the application assigns.
    pub fn primary(property: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            primary: true,
            ..Self::new(property, column_type)
        }
    }

    /// Create an auto-increment primary column.
    pub fn generated(property: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            primary: true,
            generated: true,
            ..Self::new(property, column_type)
        }
    }

    /// Set the column name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Allow NULL.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Single-foreign-key join descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinColumnOptions {
    /// Foreign-key column name.
    pub name: Option<String>,
    /// Property of the target entity the key references.
    pub referenced_column_name: Option<String>,
}

/// Junction-table descriptor for many-to-many relations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTableOptions {
    /// Junction table name.
    pub name: Option<String>,
    /// Column referencing the owning side.
    pub join_column: Option<String>,
    /// Column referencing the inverse side.
    pub inverse_join_column: Option<String>,
}

/// Declaration of one relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    /// Property name on the entity.
    pub property: String,
    /// Relation kind.
    pub kind: RelationKind,
    /// Target entity name.
    pub target: String,
    /// Property on the target pointing back at this entity.
    pub inverse_side: Option<String>,
    /// Cascade flags.
    pub cascade: CascadeFlags,
    /// Load on first access instead of on query.
    pub lazy: bool,
    /// Joined automatically by repository finds.
    pub eager: bool,
    /// Whether the foreign key may be NULL.
    pub nullable: bool,
    /// Join column, for one-to-one and many-to-one.
    pub join_column: Option<JoinColumnOptions>,
    /// Junction table, for many-to-many.
    pub join_table: Option<JoinTableOptions>,
    /// Role in a tree entity.
    pub tree: Option<TreeRole>,
}

impl RelationDescriptor {
    /// Create a relation of the given kind.
    pub fn new(property: impl Into<String>, kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            kind,
            target: target.into(),
            inverse_side: None,
            cascade: CascadeFlags::none(),
            lazy: false,
            eager: false,
            nullable: true,
            join_column: None,
            join_table: None,
            tree: None,
        }
    }

    /// Create a one-to-one relation.
    pub fn one_to_one(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property, RelationKind::OneToOne, target)
    }

    /// Create a many-to-one relation.
    pub fn many_to_one(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property, RelationKind::ManyToOne, target)
    }

    /// Create a one-to-many relation.
    pub fn one_to_many(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property, RelationKind::OneToMany, target)
    }

    /// Create a many-to-many relation.
    pub fn many_to_many(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property, RelationKind::ManyToMany, target)
    }

    /// Create the parent link of a tree entity.
    pub fn tree_parent(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            tree: Some(TreeRole::Parent),
            ..Self::new(property, RelationKind::ManyToOne, target)
        }
    }

    /// Create the children link of a tree entity.
    pub fn tree_children(
        property: impl Into<String>,
        target: impl Into<String>,
        parent_property: impl Into<String>,
    ) -> Self {
        Self {
            tree: Some(TreeRole::Children),
            inverse_side: Some(parent_property.into()),
            ..Self::new(property, RelationKind::OneToMany, target)
        }
    }

    /// Set the inverse-side property.
    pub fn with_inverse(mut self, inverse_side: impl Into<String>) -> Self {
        self.inverse_side = Some(inverse_side.into());
        self
    }

    /// Set the cascade flags.
    pub fn with_cascade(mut self, cascade: CascadeFlags) -> Self {
        self.cascade = cascade;
        self
    }

    /// Cascade insert, update and remove.
    pub fn cascade_all(self) -> Self {
        self.with_cascade(CascadeFlags::all())
    }

    /// Load on first access.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Join automatically on repository finds.
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    /// Disallow a NULL foreign key.
    pub fn not_nullable(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Attach a join column with default naming.
    pub fn join_column(self) -> Self {
        self.with_join_column(JoinColumnOptions::default())
    }

    /// Attach a join column.
    pub fn with_join_column(mut self, options: JoinColumnOptions) -> Self {
        self.join_column = Some(options);
        self
    }

    /// Attach a junction table with default naming.
    pub fn join_table(self) -> Self {
        self.with_join_table(JoinTableOptions::default())
    }

    /// Attach a junction table.
    pub fn with_join_table(mut self, options: JoinTableOptions) -> Self {
        self.join_table = Some(options);
        self
    }
}
