//! Relation metadata.

use super::types::{CascadeFlags, RelationKind, TreeRole};

/// Foreign-key column held by the owning side of a one-to-one or
/// many-to-one relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinColumnMetadata {
    /// Foreign-key column on the owner's table.
    pub name: String,
    /// Target property the key references.
    pub referenced_property: String,
    /// Target column the key references.
    pub referenced_column: String,
}

/// Junction table held by the owning side of a many-to-many relation.
///
/// "Owner" columns reference the entity declaring the junction, "inverse"
/// columns reference the relation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTableMetadata {
    /// Junction table name.
    pub name: String,
    /// Junction column referencing the owner.
    pub owner_column: String,
    /// Owner property the junction references.
    pub owner_referenced_property: String,
    /// Owner column the junction references.
    pub owner_referenced_column: String,
    /// Junction column referencing the target.
    pub inverse_column: String,
    /// Target property the junction references.
    pub inverse_referenced_property: String,
    /// Target column the junction references.
    pub inverse_referenced_column: String,
}

/// One navigational property between two entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMetadata {
    /// Entity declaring the property.
    pub entity: String,
    /// Property name.
    pub property_name: String,
    /// Relation kind.
    pub kind: RelationKind,
    /// Target entity name.
    pub target: String,
    /// Property on the target pointing back, for bidirectional relations.
    pub inverse_property: Option<String>,
    /// Cascade flags.
    pub cascade: CascadeFlags,
    /// Resolved on first access.
    pub lazy: bool,
    /// Joined automatically by repository finds.
    pub eager: bool,
    /// Whether the foreign key may be NULL.
    pub nullable: bool,
    /// This side carries the physical join.
    pub owning: bool,
    /// Foreign key, on the owning side of one-to-one and many-to-one.
    pub join_column: Option<JoinColumnMetadata>,
    /// Junction table, on the owning side of many-to-many.
    pub join_table: Option<JoinTableMetadata>,
    /// Role in a tree entity.
    pub tree_role: Option<TreeRole>,
}

impl RelationMetadata {
    /// Check if the relation holds a collection.
    pub fn is_to_many(&self) -> bool {
        self.kind.is_to_many()
    }

    /// Check if this side holds a foreign-key column.
    pub fn has_join_column(&self) -> bool {
        self.join_column.is_some()
    }

    /// `Entity#property`, as used in messages.
    pub fn path(&self) -> String {
        format!("{}#{}", self.entity, self.property_name)
    }
}
