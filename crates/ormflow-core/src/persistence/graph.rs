//! Cascade walk from the entities handed to a persist or remove call.
//!
//! The walk is iterative and keyed by row identity (entity name plus
//! primary key, or the instance itself while it has no key), so cyclic
//! object graphs visit every instance once.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::entity::{EntityRef, Related};
use crate::error::{Error, Result};
use crate::metadata::{EntityKey, MetadataRegistry};

/// Operation planned for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Insert,
    Update,
    Remove,
}

/// Which cascade flags drive the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Walk {
    Persist,
    Remove,
}

/// One related entity seen through a relation of a node.
#[derive(Debug, Clone)]
pub(crate) struct Link {
    pub property: String,
    pub related: EntityRef,
    /// Node of the related entity, if it takes part in this operation.
    pub node: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct OperationNode {
    pub entity: EntityRef,
    pub entity_name: String,
    pub operation: Operation,
    pub links: Vec<Link>,
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum Identity {
    Key(String, EntityKey),
    Instance(usize),
}

/// Nodes in discovery order.
#[derive(Debug, Default)]
pub(crate) struct OperationGraph {
    pub nodes: Vec<OperationNode>,
    index: HashMap<Identity, usize>,
}

impl OperationGraph {
    /// Walk the graph reachable from `roots` through cascading relations.
    pub fn build(registry: &MetadataRegistry, roots: &[EntityRef], walk: Walk) -> Result<Self> {
        let mut graph = Self::default();
        let mut queue = VecDeque::new();

        for root in roots {
            if walk == Walk::Remove {
                let (_, has_id) = identity(registry, root)?;
                if !has_id {
                    return Err(Error::MissingPrimaryKey {
                        entity: root.entity_name(),
                    });
                }
            }
            graph.ensure(registry, root, walk, &mut queue)?;
        }

        while let Some(index) = queue.pop_front() {
            graph.expand(registry, index, walk, &mut queue)?;
        }

        // Links to entities that joined the graph through another path.
        for i in 0..graph.nodes.len() {
            for j in 0..graph.nodes[i].links.len() {
                if graph.nodes[i].links[j].node.is_none() {
                    let related = graph.nodes[i].links[j].related.clone();
                    graph.nodes[i].links[j].node = graph.lookup(registry, &related)?;
                }
            }
        }

        debug!(nodes = graph.nodes.len(), ?walk, "built operation graph");
        Ok(graph)
    }

    /// Node of an entity, if it is part of the graph.
    pub fn lookup(&self, registry: &MetadataRegistry, entity: &EntityRef) -> Result<Option<usize>> {
        let (identity, _) = identity(registry, entity)?;
        Ok(self.index.get(&identity).copied())
    }

    /// Indices of nodes planned for `operation`, in discovery order.
    pub fn indices(&self, operation: Operation) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.operation == operation)
            .map(|(index, _)| index)
            .collect()
    }

    fn ensure(
        &mut self,
        registry: &MetadataRegistry,
        entity: &EntityRef,
        walk: Walk,
        queue: &mut VecDeque<usize>,
    ) -> Result<usize> {
        let (identity, has_id) = identity(registry, entity)?;
        if let Some(&index) = self.index.get(&identity) {
            return Ok(index);
        }

        let operation = match (walk, has_id) {
            (Walk::Remove, _) => Operation::Remove,
            (Walk::Persist, true) => Operation::Update,
            (Walk::Persist, false) => Operation::Insert,
        };
        let index = self.nodes.len();
        self.nodes.push(OperationNode {
            entity: entity.clone(),
            entity_name: entity.entity_name(),
            operation,
            links: Vec::new(),
        });
        self.index.insert(identity, index);
        queue.push_back(index);
        Ok(index)
    }

    fn expand(
        &mut self,
        registry: &MetadataRegistry,
        index: usize,
        walk: Walk,
        queue: &mut VecDeque<usize>,
    ) -> Result<()> {
        let entity = self.nodes[index].entity.clone();
        let meta = registry.entity(&self.nodes[index].entity_name)?;

        let loaded: Vec<(String, Related)> = {
            let data = entity.read();
            meta.relations
                .iter()
                .filter_map(|relation| {
                    data.relation(&relation.property_name)
                        .and_then(|value| value.resolved())
                        .map(|related| (relation.property_name.clone(), related))
                })
                .collect()
        };

        for (property, related) in loaded {
            let Some(relation) = meta.relation(&property) else {
                continue;
            };
            for target in related.entities() {
                let (_, target_has_id) = identity(registry, &target)?;
                let descend = match walk {
                    Walk::Persist if target_has_id => relation.cascade.update,
                    Walk::Persist => relation.cascade.insert,
                    Walk::Remove => target_has_id && relation.cascade.remove,
                };
                let node = if descend {
                    Some(self.ensure(registry, &target, walk, queue)?)
                } else {
                    None
                };
                self.nodes[index].links.push(Link {
                    property: property.clone(),
                    related: target,
                    node,
                });
            }
        }
        Ok(())
    }
}

fn identity(registry: &MetadataRegistry, entity: &EntityRef) -> Result<(Identity, bool)> {
    let data = entity.read();
    let meta = registry.entity(data.entity_name())?;
    Ok(match meta.entity_key(&data) {
        Some(key) => (Identity::Key(meta.name.clone(), key), true),
        None => (Identity::Instance(entity.instance_id()), false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::blog_registry;

    #[test]
    fn test_cyclic_graph_visits_each_instance_once() {
        let registry = blog_registry();
        let author = EntityRef::new("Author").with("name", "Umed");
        let post = EntityRef::new("Post").with("title", "Hello");
        post.set_one("author", Some(author.clone()));
        author.set_many("posts", vec![post.clone()]);

        let graph = OperationGraph::build(&registry, &[post.clone()], Walk::Persist).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].operation, Operation::Insert);
        assert_eq!(graph.nodes[1].entity_name, "Author");
        assert_eq!(graph.nodes[1].links[0].node, Some(0));
        assert_eq!(graph.indices(Operation::Insert), vec![0, 1]);
    }

    #[test]
    fn test_non_cascading_relation_is_linked_but_not_walked() {
        let registry = blog_registry();
        let existing = EntityRef::new("Category").with("id", 4).with("name", "old");
        let post = EntityRef::new("Post").with("title", "Hello");
        post.set_many("categories", vec![existing]);

        let graph = OperationGraph::build(&registry, &[post], Walk::Persist).unwrap();
        // categories cascade insert only, so an existing category is not updated
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].links.len(), 1);
        assert_eq!(graph.nodes[0].links[0].node, None);
    }

    #[test]
    fn test_same_key_is_one_node() {
        let registry = blog_registry();
        let a = EntityRef::new("Author").with("id", 1).with("name", "a");
        let b = EntityRef::new("Author").with("id", 1i64).with("name", "b");

        let graph = OperationGraph::build(&registry, &[a, b], Walk::Persist).unwrap();
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].operation, Operation::Update);
    }

    #[test]
    fn test_remove_requires_key() {
        let registry = blog_registry();
        let err = OperationGraph::build(&registry, &[EntityRef::new("Post")], Walk::Remove)
            .unwrap_err();
        assert!(matches!(err, Error::MissingPrimaryKey { entity } if entity == "Post"));
    }
}
