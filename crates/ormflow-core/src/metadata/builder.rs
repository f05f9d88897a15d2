//! Two-phase registry build.
//!
//! Phase one registers every entity shell (table and columns) by name.
//! Phase two resolves relation targets and inverse sides against the shells,
//! so a relation may target an entity declared after it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use super::column::ColumnMetadata;
use super::descriptor::{EntityDescriptor, RelationDescriptor};
use super::entity::{ClosureTableMetadata, EntityMetadata};
use super::error::ConfigurationError;
use super::naming::NamingStrategy;
use super::registry::MetadataRegistry;
use super::relation::{JoinColumnMetadata, JoinTableMetadata, RelationMetadata};
use super::types::{RelationKind, TreeRole, TreeType};

type BuildResult<T> = Result<T, ConfigurationError>;

/// Closure-table column names.
const ANCESTOR_COLUMN: &str = "ancestor";
const DESCENDANT_COLUMN: &str = "descendant";
const DEPTH_COLUMN: &str = "depth";

struct EntityShell {
    table: String,
    columns: Vec<ColumnMetadata>,
}

impl EntityShell {
    fn single_primary(&self) -> Option<&ColumnMetadata> {
        let mut primaries = self.columns.iter().filter(|c| c.primary);
        match (primaries.next(), primaries.next()) {
            (Some(column), None) => Some(column),
            _ => None,
        }
    }
}

/// Builds a [`MetadataRegistry`] from descriptors.
pub struct MetadataBuilder {
    naming: Arc<dyn NamingStrategy>,
}

impl MetadataBuilder {
    /// Create a builder using the given naming strategy.
    pub fn new(naming: Arc<dyn NamingStrategy>) -> Self {
        Self { naming }
    }

    /// Build the registry. Identical descriptors always yield identical metadata.
    pub fn build(&self, descriptors: &[EntityDescriptor]) -> BuildResult<MetadataRegistry> {
        let mut by_name: HashMap<&str, usize> = HashMap::new();
        let mut by_table: HashMap<String, usize> = HashMap::new();
        let mut shells = Vec::with_capacity(descriptors.len());

        for (index, descriptor) in descriptors.iter().enumerate() {
            if by_name.insert(&descriptor.name, index).is_some() {
                return Err(ConfigurationError::DuplicateEntity(descriptor.name.clone()));
            }
            let shell = self.build_shell(descriptor)?;
            if let Some(&first) = by_table.get(&shell.table) {
                return Err(ConfigurationError::DuplicateTable {
                    table: shell.table,
                    first: descriptors[first].name.clone(),
                    second: descriptor.name.clone(),
                });
            }
            by_table.insert(shell.table.clone(), index);
            shells.push(shell);
        }

        let mut entities = Vec::with_capacity(descriptors.len());
        for (index, descriptor) in descriptors.iter().enumerate() {
            let mut relations = Vec::with_capacity(descriptor.relations.len());
            for relation_index in 0..descriptor.relations.len() {
                relations.push(self.build_relation(
                    descriptors,
                    &shells,
                    &by_name,
                    index,
                    relation_index,
                )?);
            }

            let shell = &shells[index];
            let mut physical: HashSet<&str> =
                shell.columns.iter().map(|c| c.column_name.as_str()).collect();
            for join in relations.iter().filter_map(|r| r.join_column.as_ref()) {
                if !physical.insert(&join.name) {
                    return Err(ConfigurationError::DuplicateColumn {
                        entity: descriptor.name.clone(),
                        column: join.name.clone(),
                    });
                }
            }

            let closure_table = match descriptor.tree {
                Some(TreeType::ClosureTable) => {
                    Some(self.build_closure_table(descriptor, shell, &relations)?)
                }
                None => None,
            };

            entities.push(EntityMetadata {
                name: descriptor.name.clone(),
                table_name: shell.table.clone(),
                columns: shell.columns.clone(),
                relations,
                tree: descriptor.tree,
                closure_table,
                listeners: descriptor.listeners.clone(),
            });
        }

        debug!(
            entities = entities.len(),
            naming = self.naming.name(),
            "built metadata registry"
        );
        Ok(MetadataRegistry::from_parts(entities, self.naming.clone()))
    }

    fn build_shell(&self, descriptor: &EntityDescriptor) -> BuildResult<EntityShell> {
        let table = self
            .naming
            .table_name(&descriptor.name, descriptor.table.as_deref());

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(descriptor.columns.len());
        for column in &descriptor.columns {
            let column_name = self
                .naming
                .column_name(&column.property, column.name.as_deref());
            if !seen.insert(column_name.clone()) {
                return Err(ConfigurationError::DuplicateColumn {
                    entity: descriptor.name.clone(),
                    column: column_name,
                });
            }
            columns.push(ColumnMetadata {
                property_name: column.property.clone(),
                column_name,
                column_type: column.column_type,
                nullable: column.nullable && !column.primary,
                primary: column.primary,
                generated: column.generated,
            });
        }

        if !columns.iter().any(|c| c.primary) {
            return Err(ConfigurationError::MissingPrimaryColumn(
                descriptor.name.clone(),
            ));
        }

        Ok(EntityShell { table, columns })
    }

    fn build_relation(
        &self,
        descriptors: &[EntityDescriptor],
        shells: &[EntityShell],
        by_name: &HashMap<&str, usize>,
        entity_index: usize,
        relation_index: usize,
    ) -> BuildResult<RelationMetadata> {
        let owner = &descriptors[entity_index];
        let descriptor = &owner.relations[relation_index];

        if descriptor.join_column.is_some() && !descriptor.kind.allows_join_column() {
            return Err(ConfigurationError::UsingJoinColumnIsNotAllowed {
                entity: owner.name.clone(),
                property: descriptor.property.clone(),
            });
        }
        if descriptor.join_table.is_some() && descriptor.kind != RelationKind::ManyToMany {
            return Err(ConfigurationError::UsingJoinTableIsNotAllowed {
                entity: owner.name.clone(),
                property: descriptor.property.clone(),
            });
        }

        let target_index = *by_name.get(descriptor.target.as_str()).ok_or_else(|| {
            ConfigurationError::UnknownRelationTarget {
                entity: owner.name.clone(),
                property: descriptor.property.clone(),
                target: descriptor.target.clone(),
            }
        })?;
        let target = &descriptors[target_index];

        let inverse = find_inverse(owner, descriptor, target, entity_index, relation_index, target_index)?;

        if descriptor.kind == RelationKind::OneToMany && inverse.is_none() {
            return Err(ConfigurationError::MissingInverseSide {
                entity: owner.name.clone(),
                property: descriptor.property.clone(),
                target: target.name.clone(),
            });
        }

        let declared_first = match inverse {
            Some((inverse_index, _)) => (entity_index, relation_index) < (target_index, inverse_index),
            None => true,
        };
        let owning = match descriptor.kind {
            RelationKind::ManyToOne => true,
            RelationKind::OneToMany => false,
            RelationKind::OneToOne => decide_owner(
                owner,
                descriptor,
                descriptor.join_column.is_some(),
                inverse.map(|(_, r)| r.join_column.is_some()),
                declared_first,
            )?,
            RelationKind::ManyToMany => decide_owner(
                owner,
                descriptor,
                descriptor.join_table.is_some(),
                inverse.map(|(_, r)| r.join_table.is_some()),
                declared_first,
            )?,
        };

        let owner_shell = &shells[entity_index];
        let target_shell = &shells[target_index];

        let join_column = if owning && descriptor.kind.allows_join_column() {
            Some(self.build_join_column(owner, descriptor, target, target_shell)?)
        } else {
            None
        };
        let join_table = if owning && descriptor.kind == RelationKind::ManyToMany {
            Some(self.build_join_table(owner, descriptor, target, owner_shell, target_shell)?)
        } else {
            None
        };

        Ok(RelationMetadata {
            entity: owner.name.clone(),
            property_name: descriptor.property.clone(),
            kind: descriptor.kind,
            target: target.name.clone(),
            inverse_property: inverse.map(|(_, r)| r.property.clone()),
            cascade: descriptor.cascade,
            lazy: descriptor.lazy,
            eager: descriptor.eager,
            nullable: descriptor.nullable,
            owning,
            join_column,
            join_table,
            tree_role: descriptor.tree,
        })
    }

    fn build_join_column(
        &self,
        owner: &EntityDescriptor,
        descriptor: &RelationDescriptor,
        target: &EntityDescriptor,
        target_shell: &EntityShell,
    ) -> BuildResult<JoinColumnMetadata> {
        let options = descriptor.join_column.clone().unwrap_or_default();
        let referenced = match options.referenced_column_name.as_deref() {
            Some(property) => target_shell
                .columns
                .iter()
                .find(|c| c.property_name == property)
                .ok_or_else(|| ConfigurationError::UnknownColumn {
                    entity: target.name.clone(),
                    column: property.to_string(),
                })?,
            None => target_shell.single_primary().ok_or_else(|| {
                ConfigurationError::CompositeKeyReference {
                    entity: owner.name.clone(),
                    property: descriptor.property.clone(),
                    target: target.name.clone(),
                }
            })?,
        };

        let name = options.name.unwrap_or_else(|| {
            self.naming
                .join_column_name(&descriptor.property, &referenced.column_name)
        });

        Ok(JoinColumnMetadata {
            name,
            referenced_property: referenced.property_name.clone(),
            referenced_column: referenced.column_name.clone(),
        })
    }

    fn build_join_table(
        &self,
        owner: &EntityDescriptor,
        descriptor: &RelationDescriptor,
        target: &EntityDescriptor,
        owner_shell: &EntityShell,
        target_shell: &EntityShell,
    ) -> BuildResult<JoinTableMetadata> {
        let composite = || ConfigurationError::CompositeKeyReference {
            entity: owner.name.clone(),
            property: descriptor.property.clone(),
            target: target.name.clone(),
        };
        let owner_key = owner_shell.single_primary().ok_or_else(composite)?;
        let target_key = target_shell.single_primary().ok_or_else(composite)?;
        let options = descriptor.join_table.clone().unwrap_or_default();

        let name = options.name.unwrap_or_else(|| {
            self.naming
                .join_table_name(&owner_shell.table, &target_shell.table, &descriptor.property)
        });
        let owner_column = options.join_column.unwrap_or_else(|| {
            self.naming
                .join_table_column_name(&owner_shell.table, &owner_key.column_name)
        });
        let mut inverse_column = options.inverse_join_column.unwrap_or_else(|| {
            self.naming
                .join_table_column_name(&target_shell.table, &target_key.column_name)
        });
        if inverse_column == owner_column {
            // self-referencing junction
            inverse_column = self.naming.join_table_column_name(
                &format!("{}_inverse", target_shell.table),
                &target_key.column_name,
            );
        }

        Ok(JoinTableMetadata {
            name,
            owner_column,
            owner_referenced_property: owner_key.property_name.clone(),
            owner_referenced_column: owner_key.column_name.clone(),
            inverse_column,
            inverse_referenced_property: target_key.property_name.clone(),
            inverse_referenced_column: target_key.column_name.clone(),
        })
    }

    fn build_closure_table(
        &self,
        descriptor: &EntityDescriptor,
        shell: &EntityShell,
        relations: &[RelationMetadata],
    ) -> BuildResult<ClosureTableMetadata> {
        let parent = relations
            .iter()
            .find(|r| {
                r.tree_role == Some(TreeRole::Parent)
                    && r.kind == RelationKind::ManyToOne
                    && r.target == descriptor.name
            })
            .ok_or_else(|| ConfigurationError::MissingTreeParent(descriptor.name.clone()))?;

        if shell.single_primary().is_none() {
            return Err(ConfigurationError::CompositeKeyReference {
                entity: descriptor.name.clone(),
                property: parent.property_name.clone(),
                target: descriptor.name.clone(),
            });
        }

        Ok(ClosureTableMetadata {
            table: self.naming.closure_table_name(&shell.table),
            ancestor_column: ANCESTOR_COLUMN.to_string(),
            descendant_column: DESCENDANT_COLUMN.to_string(),
            depth_column: Some(DEPTH_COLUMN.to_string()),
        })
    }
}

/// Find the other side of a relation, by the inverse name given on either side.
fn find_inverse<'a>(
    owner: &EntityDescriptor,
    descriptor: &RelationDescriptor,
    target: &'a EntityDescriptor,
    entity_index: usize,
    relation_index: usize,
    target_index: usize,
) -> BuildResult<Option<(usize, &'a RelationDescriptor)>> {
    let is_self = |index: usize| target_index == entity_index && index == relation_index;
    let points_back = |r: &RelationDescriptor| {
        r.target == owner.name && r.kind == descriptor.kind.inverse()
    };

    match &descriptor.inverse_side {
        Some(name) => target
            .relations
            .iter()
            .enumerate()
            .find(|(index, r)| &r.property == name && !is_self(*index) && points_back(*r))
            .map(Some)
            .ok_or_else(|| ConfigurationError::InvalidInverseSide {
                entity: owner.name.clone(),
                property: descriptor.property.clone(),
                target: target.name.clone(),
                inverse: name.clone(),
            }),
        None => Ok(target.relations.iter().enumerate().find(|(index, r)| {
            !is_self(*index)
                && points_back(*r)
                && r.inverse_side.as_deref() == Some(descriptor.property.as_str())
        })),
    }
}

/// Pick the owning side of a one-to-one or many-to-many relation.
fn decide_owner(
    owner: &EntityDescriptor,
    descriptor: &RelationDescriptor,
    declares_join: bool,
    inverse_declares_join: Option<bool>,
    declared_first: bool,
) -> BuildResult<bool> {
    match inverse_declares_join {
        None => Ok(true),
        Some(true) if declares_join => Err(ConfigurationError::AmbiguousOwningSide {
            entity: owner.name.clone(),
            property: descriptor.property.clone(),
        }),
        Some(true) => Ok(false),
        Some(false) if declares_join => Ok(true),
        Some(false) => Ok(declared_first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::naming::{DefaultNamingStrategy, SnakeCaseNamingStrategy};
    use crate::metadata::{CascadeFlags, ColumnDescriptor, ColumnType, JoinColumnOptions};

    fn post() -> EntityDescriptor {
        EntityDescriptor::new("Post")
            .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
            .with_column(ColumnDescriptor::new("title", ColumnType::String))
            .with_column(ColumnDescriptor::new("viewCount", ColumnType::Int32))
    }

    fn category() -> EntityDescriptor {
        EntityDescriptor::new("Category")
            .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
            .with_column(ColumnDescriptor::new("name", ColumnType::String))
    }

    fn build(descriptors: &[EntityDescriptor]) -> BuildResult<MetadataRegistry> {
        MetadataBuilder::new(Arc::new(DefaultNamingStrategy)).build(descriptors)
    }

    #[test]
    fn test_forward_reference_and_join_column() {
        let descriptors = vec![
            post().with_relation(
                RelationDescriptor::many_to_one("author", "Author")
                    .with_inverse("posts")
                    .with_cascade(CascadeFlags::persist()),
            ),
            EntityDescriptor::new("Author")
                .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
                .with_column(ColumnDescriptor::new("name", ColumnType::String))
                .with_relation(RelationDescriptor::one_to_many("posts", "Post")),
        ];
        let registry = build(&descriptors).unwrap();

        let author = registry.relation("Post", "author").unwrap();
        assert!(author.owning);
        assert_eq!(author.inverse_property.as_deref(), Some("posts"));
        let join = author.join_column.as_ref().unwrap();
        assert_eq!(join.name, "author_id");
        assert_eq!(join.referenced_column, "id");

        // inverse resolved from the many-to-one side
        let posts = registry.relation("Author", "posts").unwrap();
        assert!(!posts.owning);
        assert_eq!(posts.inverse_property.as_deref(), Some("author"));
        assert!(posts.join_column.is_none());
    }

    #[test]
    fn test_join_column_on_many_to_many_is_rejected() {
        let descriptors = vec![
            post().with_relation(
                RelationDescriptor::many_to_many("categories", "Category").join_column(),
            ),
            category(),
        ];
        let err = build(&descriptors).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UsingJoinColumnIsNotAllowed {
                entity: "Post".into(),
                property: "categories".into(),
            }
        );
        assert_eq!(
            err.to_string(),
            "Using JoinColumn on Post#categories is wrong. You can use JoinColumn only on one-to-one and many-to-one relations."
        );
    }

    #[test]
    fn test_join_column_on_one_to_many_is_rejected() {
        let descriptors = vec![
            EntityDescriptor::new("Author")
                .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
                .with_relation(
                    RelationDescriptor::one_to_many("posts", "Post")
                        .with_inverse("author")
                        .join_column(),
                ),
            post().with_relation(RelationDescriptor::many_to_one("author", "Author")),
        ];
        assert!(matches!(
            build(&descriptors),
            Err(ConfigurationError::UsingJoinColumnIsNotAllowed { .. })
        ));
    }

    #[test]
    fn test_many_to_many_owner_defaults() {
        let descriptors = vec![
            post().with_relation(
                RelationDescriptor::many_to_many("categories", "Category").with_inverse("posts"),
            ),
            category().with_relation(RelationDescriptor::many_to_many("posts", "Post")),
        ];
        let registry = build(&descriptors).unwrap();

        let categories = registry.relation("Post", "categories").unwrap();
        assert!(categories.owning);
        let table = categories.join_table.as_ref().unwrap();
        assert_eq!(table.name, "post_categories_category");
        assert_eq!(table.owner_column, "post_id");
        assert_eq!(table.inverse_column, "category_id");

        let posts = registry.relation("Category", "posts").unwrap();
        assert!(!posts.owning);
        assert!(posts.join_table.is_none());
    }

    #[test]
    fn test_explicit_join_table_wins_over_declaration_order() {
        let descriptors = vec![
            post().with_relation(
                RelationDescriptor::many_to_many("categories", "Category").with_inverse("posts"),
            ),
            category().with_relation(RelationDescriptor::many_to_many("posts", "Post").join_table()),
        ];
        let registry = build(&descriptors).unwrap();
        assert!(!registry.relation("Post", "categories").unwrap().owning);
        let posts = registry.relation("Category", "posts").unwrap();
        assert_eq!(
            posts.join_table.as_ref().unwrap().name,
            "category_posts_post"
        );
    }

    #[test]
    fn test_one_to_one_both_sides_join_column_is_ambiguous() {
        let descriptors = vec![
            EntityDescriptor::new("User")
                .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
                .with_relation(
                    RelationDescriptor::one_to_one("profile", "Profile")
                        .with_inverse("user")
                        .join_column(),
                ),
            EntityDescriptor::new("Profile")
                .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
                .with_relation(RelationDescriptor::one_to_one("user", "User").join_column()),
        ];
        assert!(matches!(
            build(&descriptors),
            Err(ConfigurationError::AmbiguousOwningSide { .. })
        ));
    }

    #[test]
    fn test_one_to_many_needs_inverse() {
        let descriptors = vec![
            EntityDescriptor::new("Author")
                .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
                .with_relation(RelationDescriptor::one_to_many("posts", "Post")),
            post(),
        ];
        assert!(matches!(
            build(&descriptors),
            Err(ConfigurationError::MissingInverseSide { .. })
        ));
    }

    #[test]
    fn test_invalid_inverse_side() {
        let descriptors = vec![
            post().with_relation(
                RelationDescriptor::many_to_one("author", "Author").with_inverse("articles"),
            ),
            EntityDescriptor::new("Author")
                .with_column(ColumnDescriptor::generated("id", ColumnType::Int32)),
        ];
        assert!(matches!(
            build(&descriptors),
            Err(ConfigurationError::InvalidInverseSide { .. })
        ));
    }

    #[test]
    fn test_unknown_target_duplicate_table_and_missing_primary() {
        let err = build(&[post().with_relation(RelationDescriptor::many_to_one("author", "Ghost"))])
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownRelationTarget { .. }));

        let err = build(&[post(), category().with_table("post")]).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::DuplicateTable {
                table: "post".into(),
                first: "Post".into(),
                second: "Category".into(),
            }
        );

        let err = build(&[EntityDescriptor::new("Loose")
            .with_column(ColumnDescriptor::new("name", ColumnType::String))])
        .unwrap_err();
        assert_eq!(err, ConfigurationError::MissingPrimaryColumn("Loose".into()));
    }

    #[test]
    fn test_join_column_clashing_with_column() {
        let descriptors = vec![
            post()
                .with_column(ColumnDescriptor::new("authorId", ColumnType::Int32).with_name("author_id"))
                .with_relation(RelationDescriptor::many_to_one("author", "Author")),
            EntityDescriptor::new("Author")
                .with_column(ColumnDescriptor::generated("id", ColumnType::Int32)),
        ];
        assert!(matches!(
            build(&descriptors),
            Err(ConfigurationError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn test_explicit_join_column_options() {
        let descriptors = vec![
            post().with_relation(RelationDescriptor::many_to_one("author", "Author").with_join_column(
                JoinColumnOptions {
                    name: Some("writer".into()),
                    referenced_column_name: Some("code".into()),
                },
            )),
            EntityDescriptor::new("Author")
                .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
                .with_column(ColumnDescriptor::new("code", ColumnType::String)),
        ];
        let registry = build(&descriptors).unwrap();
        let join = registry
            .relation("Post", "author")
            .unwrap()
            .join_column
            .clone()
            .unwrap();
        assert_eq!(join.name, "writer");
        assert_eq!(join.referenced_property, "code");
    }

    #[test]
    fn test_closure_tree() {
        let descriptors = vec![EntityDescriptor::new("Category")
            .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
            .with_column(ColumnDescriptor::new("name", ColumnType::String))
            .with_relation(RelationDescriptor::tree_parent("parent", "Category"))
            .with_relation(RelationDescriptor::tree_children("children", "Category", "parent"))
            .with_closure_tree()];
        let registry = build(&descriptors).unwrap();
        let entity = registry.entity("Category").unwrap();

        let closure = entity.closure_table.as_ref().unwrap();
        assert_eq!(closure.table, "category_closure");
        assert_eq!(entity.tree_parent_relation().unwrap().property_name, "parent");
        assert_eq!(
            entity
                .tree_children_relation()
                .unwrap()
                .inverse_property
                .as_deref(),
            Some("parent")
        );
        assert_eq!(
            entity.tree_parent_relation().unwrap().inverse_property.as_deref(),
            Some("children")
        );

        let err = build(&[category().with_closure_tree()]).unwrap_err();
        assert_eq!(err, ConfigurationError::MissingTreeParent("Category".into()));
    }

    #[test]
    fn test_snake_case_strategy_applies_to_columns() {
        let registry = MetadataBuilder::new(Arc::new(SnakeCaseNamingStrategy))
            .build(&[post()])
            .unwrap();
        let entity = registry.entity("Post").unwrap();
        assert_eq!(entity.column("viewCount").unwrap().column_name, "view_count");
        assert_eq!(registry.naming_strategy().name(), "snake_case");
    }

    #[test]
    fn test_build_is_idempotent() {
        let descriptors = vec![
            post().with_relation(RelationDescriptor::many_to_many("categories", "Category")),
            category(),
        ];
        let first = build(&descriptors).unwrap();
        let second = build(&descriptors).unwrap();
        assert_eq!(
            first.relation("Post", "categories").unwrap(),
            second.relation("Post", "categories").unwrap()
        );
    }
}
