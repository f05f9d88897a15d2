//! Immutable metadata graph shared by every query and persistence call.

use std::collections::HashMap;
use std::sync::Arc;

use super::builder::MetadataBuilder;
use super::descriptor::EntityDescriptor;
use super::entity::EntityMetadata;
use super::error::ConfigurationError;
use super::naming::{DefaultNamingStrategy, NamingStrategy};
use super::relation::RelationMetadata;
use crate::error::{Error, Result};

/// All entity metadata of one connection.
#[derive(Debug, Clone)]
pub struct MetadataRegistry {
    entities: Vec<EntityMetadata>,
    by_name: HashMap<String, usize>,
    naming: Arc<dyn NamingStrategy>,
}

impl MetadataRegistry {
    /// Build a registry with the default naming strategy.
    pub fn build(descriptors: &[EntityDescriptor]) -> std::result::Result<Self, ConfigurationError> {
        MetadataBuilder::new(Arc::new(DefaultNamingStrategy)).build(descriptors)
    }

    pub(crate) fn from_parts(entities: Vec<EntityMetadata>, naming: Arc<dyn NamingStrategy>) -> Self {
        let by_name = entities
            .iter()
            .enumerate()
            .map(|(index, entity)| (entity.name.clone(), index))
            .collect();
        Self {
            entities,
            by_name,
            naming,
        }
    }

    /// Get an entity by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityMetadata> {
        self.by_name.get(name).map(|&index| &self.entities[index])
    }

    /// Get an entity by name, failing if it is not registered.
    pub fn entity(&self, name: &str) -> Result<&EntityMetadata> {
        self.get_entity(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Get a relation of an entity.
    pub fn relation(&self, entity: &str, property: &str) -> Result<&RelationMetadata> {
        self.entity(entity)?
            .relation(property)
            .ok_or_else(|| Error::UnknownRelation {
                entity: entity.to_string(),
                relation: property.to_string(),
            })
    }

    /// Target entity of a relation.
    pub fn target_of(&self, relation: &RelationMetadata) -> Result<&EntityMetadata> {
        self.entity(&relation.target)
    }

    /// Other side of a bidirectional relation.
    pub fn inverse_of(&self, relation: &RelationMetadata) -> Option<&RelationMetadata> {
        let inverse = relation.inverse_property.as_deref()?;
        self.get_entity(&relation.target)?.relation(inverse)
    }

    /// All entities, in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityMetadata> {
        self.entities.iter()
    }

    /// All entity names, in declaration order.
    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name.as_str()).collect()
    }

    /// Relations declared anywhere that target `entity`.
    pub fn relations_to(&self, entity: &str) -> Vec<&RelationMetadata> {
        self.entities
            .iter()
            .flat_map(|e| e.relations.iter())
            .filter(|r| r.target == entity)
            .collect()
    }

    /// Naming strategy the registry was built with.
    pub fn naming_strategy(&self) -> &Arc<dyn NamingStrategy> {
        &self.naming
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
