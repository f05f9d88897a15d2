//! Ordering of graph operations by foreign-key dependencies.

use std::collections::BTreeSet;

use super::graph::{Operation, OperationGraph};
use crate::error::{Error, Result};
use crate::metadata::MetadataRegistry;
use crate::resolver::RelationResolver;

/// `holder` carries a foreign key, through `property`, to the row of `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Dependency {
    pub holder: usize,
    pub target: usize,
    pub property: String,
    pub nullable: bool,
}

/// Statement order plus the dependencies cut to get it.
#[derive(Debug, Default)]
pub(crate) struct Ordering {
    pub order: Vec<usize>,
    pub broken: Vec<Dependency>,
}

/// Foreign-key dependencies between nodes, from either side of a relation.
pub(crate) fn dependencies(
    registry: &MetadataRegistry,
    graph: &OperationGraph,
) -> Result<Vec<Dependency>> {
    let resolver = RelationResolver::new(registry);
    let mut dependencies = Vec::new();

    for (index, node) in graph.nodes.iter().enumerate() {
        let meta = registry.entity(&node.entity_name)?;
        for link in &node.links {
            let (Some(target), Some(relation)) = (link.node, meta.relation(&link.property)) else {
                continue;
            };
            let dependency = if relation.join_column.is_some() {
                Dependency {
                    holder: index,
                    target,
                    property: relation.property_name.clone(),
                    nullable: relation.nullable,
                }
            } else if resolver.key_on_target(relation) {
                let owning = resolver.owning_side(relation)?;
                Dependency {
                    holder: target,
                    target: index,
                    property: owning.property_name.clone(),
                    nullable: owning.nullable,
                }
            } else {
                continue;
            };
            if !dependencies.contains(&dependency) {
                dependencies.push(dependency);
            }
        }
    }
    Ok(dependencies)
}

/// Insert order: a referenced row before the row referencing it.
///
/// A cycle is cut at its first nullable edge; the holder is inserted with a
/// null key and updated once the target exists.
pub(crate) fn insert_order(graph: &OperationGraph, dependencies: &[Dependency]) -> Result<Ordering> {
    topological(
        graph,
        &graph.indices(Operation::Insert),
        dependencies,
        |d| (d.target, d.holder),
    )
}

/// Delete order: a referencing row before the row it references.
///
/// A cycle is cut at its first nullable edge; the holder's key is nulled
/// before any delete runs.
pub(crate) fn remove_order(graph: &OperationGraph, dependencies: &[Dependency]) -> Result<Ordering> {
    topological(
        graph,
        &graph.indices(Operation::Remove),
        dependencies,
        |d| (d.holder, d.target),
    )
}

fn topological(
    graph: &OperationGraph,
    nodes: &[usize],
    dependencies: &[Dependency],
    edge: fn(&Dependency) -> (usize, usize),
) -> Result<Ordering> {
    let members: BTreeSet<usize> = nodes.iter().copied().collect();
    let mut edges: Vec<Dependency> = dependencies
        .iter()
        .filter(|d| members.contains(&d.holder) && members.contains(&d.target))
        .cloned()
        .collect();

    let mut remaining = members;
    let mut ordering = Ordering::default();

    while !remaining.is_empty() {
        let ready = remaining.iter().copied().find(|&node| {
            !edges.iter().any(|d| {
                let (first, then) = edge(d);
                then == node && remaining.contains(&first)
            })
        });

        if let Some(node) = ready {
            ordering.order.push(node);
            remaining.remove(&node);
            continue;
        }

        let breakable = edges.iter().position(|d| {
            let (first, then) = edge(d);
            d.nullable && remaining.contains(&first) && remaining.contains(&then)
        });
        match breakable {
            Some(position) => ordering.broken.push(edges.remove(position)),
            None => {
                let entities: BTreeSet<String> = remaining
                    .iter()
                    .map(|&index| graph.nodes[index].entity_name.clone())
                    .collect();
                return Err(Error::CyclicDependency {
                    entities: entities.into_iter().collect(),
                });
            }
        }
    }

    Ok(ordering)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::persistence::graph::Walk;
    use crate::testing::{blog_registry, couple_registry};

    #[test]
    fn test_referenced_rows_come_first() {
        let registry = blog_registry();
        let author = EntityRef::new("Author").with("name", "Umed");
        let post = EntityRef::new("Post").with("title", "Hello");
        post.set_one("author", Some(author.clone()));

        let graph = OperationGraph::build(&registry, &[post], Walk::Persist).unwrap();
        let deps = dependencies(&registry, &graph).unwrap();
        assert_eq!(deps.len(), 1);

        let ordering = insert_order(&graph, &deps).unwrap();
        assert_eq!(ordering.order, vec![1, 0]);
        assert!(ordering.broken.is_empty());

        let removal = remove_order(&graph, &deps).unwrap();
        assert!(removal.order.is_empty());
    }

    #[test]
    fn test_inverse_side_yields_same_dependency() {
        let registry = blog_registry();
        let author = EntityRef::new("Author").with("name", "Umed");
        let post = EntityRef::new("Post").with("title", "Hello");
        author.set_many("posts", vec![post.clone()]);

        let graph = OperationGraph::build(&registry, &[author], Walk::Persist).unwrap();
        let deps = dependencies(&registry, &graph).unwrap();
        assert_eq!(
            deps,
            vec![Dependency {
                holder: 1,
                target: 0,
                property: "author".into(),
                nullable: true,
            }]
        );
        assert_eq!(insert_order(&graph, &deps).unwrap().order, vec![0, 1]);
    }

    #[test]
    fn test_nullable_cycle_is_broken() {
        let registry = couple_registry(true);
        let husband = EntityRef::new("Husband").with("name", "h");
        let wife = EntityRef::new("Wife").with("name", "w");
        husband.set_one("wife", Some(wife.clone()));
        wife.set_one("husband", Some(husband.clone()));

        let graph = OperationGraph::build(&registry, &[husband], Walk::Persist).unwrap();
        let deps = dependencies(&registry, &graph).unwrap();
        let ordering = insert_order(&graph, &deps).unwrap();
        assert_eq!(ordering.order.len(), 2);
        assert_eq!(ordering.broken.len(), 1);
    }

    #[test]
    fn test_non_nullable_cycle_is_an_error() {
        let registry = couple_registry(false);
        let husband = EntityRef::new("Husband").with("name", "h");
        let wife = EntityRef::new("Wife").with("name", "w");
        husband.set_one("wife", Some(wife.clone()));
        wife.set_one("husband", Some(husband.clone()));

        let graph = OperationGraph::build(&registry, &[husband], Walk::Persist).unwrap();
        let deps = dependencies(&registry, &graph).unwrap();
        let err = insert_order(&graph, &deps).unwrap_err();
        assert!(matches!(
            err,
            Error::CyclicDependency { entities } if entities == vec!["Husband".to_string(), "Wife".to_string()]
        ));
    }
}
