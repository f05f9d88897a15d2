//! Column metadata.

use super::types::ColumnType;

/// One entity property mapped to one physical column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    /// Property name on the entity.
    pub property_name: String,
    /// Physical column name.
    pub column_name: String,
    /// Column type.
    pub column_type: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Part of the primary key.
    pub primary: bool,
    /// Value assigned by the database on insert.
    pub generated: bool,
}

impl ColumnMetadata {
    /// Whether the persister writes this column on insert.
    pub fn is_insertable(&self) -> bool {
        !self.generated
    }

    /// Whether the persister writes this column on update.
    pub fn is_updatable(&self) -> bool {
        !self.generated && !self.primary
    }
}
