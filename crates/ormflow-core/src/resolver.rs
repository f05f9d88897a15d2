//! Physical representation of relations.
//!
//! Pure functions over the registry: which side owns a relation, where the
//! join lives in the database and how a query walks from one side to the
//! other.

use crate::error::{Error, Result};
use crate::metadata::{
    CascadeFlags, EntityMetadata, MetadataRegistry, RelationKind, RelationMetadata,
};

/// Where a relation is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationStorage {
    /// Foreign-key column `table.column` referencing `referenced_table.referenced_column`.
    ForeignKey {
        table: String,
        column: String,
        referenced_table: String,
        referenced_column: String,
    },
    /// Junction table. `owner_column` references the owning entity.
    JoinTable {
        table: String,
        owner_column: String,
        inverse_column: String,
    },
    /// Ancestor/descendant pairs of a tree entity.
    ClosureTable {
        table: String,
        ancestor_column: String,
        descendant_column: String,
        depth_column: Option<String>,
    },
}

/// How a relation is loaded by repository finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Joined into the owner's query.
    Eager,
    /// Deferred until first access.
    Lazy,
    /// Only loaded when a query joins it.
    Explicit,
}

/// Physical description of one relation.
#[derive(Debug, Clone)]
pub struct PhysicalRelation<'a> {
    /// Entity whose table (or junction) carries the join.
    pub owned_by: &'a str,
    /// Relation metadata of the owning side.
    pub owning: &'a RelationMetadata,
    /// Storage of the join.
    pub storage: RelationStorage,
    /// Cascade flags of the relation asked about.
    pub cascade: CascadeFlags,
    /// Load mode of the relation asked about.
    pub load: LoadMode,
}

/// Walk from a parent alias to a relation's target alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinPath {
    /// `target.target_column = parent.parent_column`
    Direct {
        parent_column: String,
        target_column: String,
    },
    /// `junction.junction_parent_column = parent.parent_column` then
    /// `target.target_column = junction.junction_target_column`
    Junction {
        table: String,
        parent_column: String,
        junction_parent_column: String,
        junction_target_column: String,
        target_column: String,
    },
}

/// Resolves relations against a registry.
#[derive(Debug, Clone, Copy)]
pub struct RelationResolver<'a> {
    registry: &'a MetadataRegistry,
}

impl<'a> RelationResolver<'a> {
    /// Create a resolver.
    pub fn new(registry: &'a MetadataRegistry) -> Self {
        Self { registry }
    }

    /// The side of `relation` that carries the physical join.
    pub fn owning_side(&self, relation: &'a RelationMetadata) -> Result<&'a RelationMetadata> {
        if relation.owning {
            return Ok(relation);
        }
        self.registry
            .inverse_of(relation)
            .filter(|inverse| inverse.owning)
            .ok_or_else(|| Error::UnknownRelation {
                entity: relation.target.clone(),
                relation: relation
                    .inverse_property
                    .clone()
                    .unwrap_or_else(|| relation.property_name.clone()),
            })
    }

    /// Physical representation of a relation.
    pub fn physical_representation(
        &self,
        relation: &'a RelationMetadata,
    ) -> Result<PhysicalRelation<'a>> {
        let owning = self.owning_side(relation)?;
        let owner = self.registry.entity(&owning.entity)?;
        let target = self.registry.target_of(owning)?;

        let storage = match (&owning.join_column, &owning.join_table) {
            (Some(join), _) => RelationStorage::ForeignKey {
                table: owner.table_name.clone(),
                column: join.name.clone(),
                referenced_table: target.table_name.clone(),
                referenced_column: join.referenced_column.clone(),
            },
            (None, Some(table)) => RelationStorage::JoinTable {
                table: table.name.clone(),
                owner_column: table.owner_column.clone(),
                inverse_column: table.inverse_column.clone(),
            },
            (None, None) => {
                return Err(Error::UnknownRelation {
                    entity: owning.entity.clone(),
                    relation: owning.property_name.clone(),
                })
            }
        };

        let load = if relation.lazy {
            LoadMode::Lazy
        } else if relation.eager {
            LoadMode::Eager
        } else {
            LoadMode::Explicit
        };

        Ok(PhysicalRelation {
            owned_by: &owner.name,
            owning,
            storage,
            cascade: relation.cascade,
            load,
        })
    }

    /// Closure-table storage of a tree entity, independent of its relations.
    pub fn closure_table(&self, entity: &EntityMetadata) -> Option<RelationStorage> {
        entity
            .closure_table
            .as_ref()
            .map(|closure| RelationStorage::ClosureTable {
                table: closure.table.clone(),
                ancestor_column: closure.ancestor_column.clone(),
                descendant_column: closure.descendant_column.clone(),
                depth_column: closure.depth_column.clone(),
            })
    }

    /// Join path from the relation's entity to its target.
    pub fn join_path(&self, relation: &'a RelationMetadata) -> Result<JoinPath> {
        let owning = self.owning_side(relation)?;
        let from_owner = relation.owning;

        if let Some(join) = &owning.join_column {
            return Ok(if from_owner {
                JoinPath::Direct {
                    parent_column: join.name.clone(),
                    target_column: join.referenced_column.clone(),
                }
            } else {
                JoinPath::Direct {
                    parent_column: join.referenced_column.clone(),
                    target_column: join.name.clone(),
                }
            });
        }

        match &owning.join_table {
            Some(table) if from_owner => Ok(JoinPath::Junction {
                table: table.name.clone(),
                parent_column: table.owner_referenced_column.clone(),
                junction_parent_column: table.owner_column.clone(),
                junction_target_column: table.inverse_column.clone(),
                target_column: table.inverse_referenced_column.clone(),
            }),
            Some(table) => Ok(JoinPath::Junction {
                table: table.name.clone(),
                parent_column: table.inverse_referenced_column.clone(),
                junction_parent_column: table.inverse_column.clone(),
                junction_target_column: table.owner_column.clone(),
                target_column: table.owner_referenced_column.clone(),
            }),
            None => Err(Error::UnknownRelation {
                entity: relation.entity.clone(),
                relation: relation.property_name.clone(),
            }),
        }
    }

    /// Check whether the foreign key of this relation lives on the target's table.
    pub fn key_on_target(&self, relation: &RelationMetadata) -> bool {
        !relation.owning
            && matches!(relation.kind, RelationKind::OneToMany | RelationKind::OneToOne)
    }
}
