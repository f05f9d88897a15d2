//! Core type definitions for entity metadata.

use std::fmt;

use serde::Deserialize;

/// Column data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Boolean value.
    #[serde(alias = "boolean")]
    Bool,
    /// 32-bit signed integer.
    #[serde(alias = "int", alias = "integer")]
    Int32,
    /// 64-bit signed integer.
    #[serde(alias = "bigint")]
    Int64,
    /// 64-bit floating point.
    #[serde(alias = "float", alias = "double", alias = "number")]
    Float64,
    /// UTF-8 string.
    #[serde(alias = "text", alias = "varchar")]
    String,
    /// Binary data.
    #[serde(alias = "blob")]
    Bytes,
    /// Timestamp (microseconds since Unix epoch).
    #[serde(alias = "datetime", alias = "date")]
    Timestamp,
}

impl ColumnType {
    /// SQL type name used in generated column definitions.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Bool => "BOOLEAN",
            ColumnType::Int32 => "INTEGER",
            ColumnType::Int64 => "BIGINT",
            ColumnType::Float64 => "DOUBLE PRECISION",
            ColumnType::String => "VARCHAR",
            ColumnType::Bytes => "BLOB",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    /// Check if this type is an integer.
    pub fn is_integer(&self) -> bool {
        matches!(self, ColumnType::Int32 | ColumnType::Int64)
    }
}

/// Kind of a navigational property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    /// One-to-one (foreign key on the owning side).
    OneToOne,
    /// Many-to-one (foreign key on this side).
    ManyToOne,
    /// One-to-many (foreign key on the inverse many-to-one side).
    OneToMany,
    /// Many-to-many (junction table).
    ManyToMany,
}

impl RelationKind {
    /// Check if the relation holds a collection.
    pub fn is_to_many(&self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }

    /// Check if a single-foreign-key join descriptor may be attached.
    pub fn allows_join_column(&self) -> bool {
        matches!(self, RelationKind::OneToOne | RelationKind::ManyToOne)
    }

    /// Relation kind the other side of a bidirectional relation must have.
    pub fn inverse(&self) -> RelationKind {
        match self {
            RelationKind::OneToOne => RelationKind::OneToOne,
            RelationKind::ManyToOne => RelationKind::OneToMany,
            RelationKind::OneToMany => RelationKind::ManyToOne,
            RelationKind::ManyToMany => RelationKind::ManyToMany,
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationKind::OneToOne => "one-to-one",
            RelationKind::ManyToOne => "many-to-one",
            RelationKind::OneToMany => "one-to-many",
            RelationKind::ManyToMany => "many-to-many",
        };
        f.write_str(name)
    }
}

/// Which operations propagate through a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct CascadeFlags {
    /// Insert related entities that have no primary key yet.
    pub insert: bool,
    /// Update related entities that already have a primary key.
    pub update: bool,
    /// Remove related entities together with the owner.
    pub remove: bool,
}

impl CascadeFlags {
    /// No cascades.
    pub fn none() -> Self {
        Self::default()
    }

    /// Cascade insert, update and remove.
    pub fn all() -> Self {
        Self {
            insert: true,
            update: true,
            remove: true,
        }
    }

    /// Cascade insert and update.
    pub fn persist() -> Self {
        Self {
            insert: true,
            update: true,
            remove: false,
        }
    }

    /// Check if any flag is set.
    pub fn any(&self) -> bool {
        self.insert || self.update || self.remove
    }
}

/// Hierarchy storage of a tree entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TreeType {
    /// Ancestor/descendant pairs in a dedicated closure table.
    ClosureTable,
}

/// Role a relation plays in a tree entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TreeRole {
    /// Many-to-one link to the parent node.
    Parent,
    /// One-to-many link to the child nodes.
    Children,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_kind_inverse() {
        assert_eq!(RelationKind::ManyToOne.inverse(), RelationKind::OneToMany);
        assert_eq!(RelationKind::ManyToMany.inverse(), RelationKind::ManyToMany);
        assert!(RelationKind::OneToOne.allows_join_column());
        assert!(!RelationKind::ManyToMany.allows_join_column());
        assert!(RelationKind::OneToMany.is_to_many());
    }

    #[test]
    fn test_column_type_aliases() {
        let ty: ColumnType = serde_json::from_str("\"varchar\"").unwrap();
        assert_eq!(ty, ColumnType::String);
        let ty: ColumnType = serde_json::from_str("\"int\"").unwrap();
        assert_eq!(ty, ColumnType::Int32);
        let kind: RelationKind = serde_json::from_str("\"many-to-one\"").unwrap();
        assert_eq!(kind, RelationKind::ManyToOne);
    }

    #[test]
    fn test_cascade_flags() {
        assert!(!CascadeFlags::none().any());
        assert!(CascadeFlags::all().remove);
        assert!(!CascadeFlags::persist().remove);
    }
}
