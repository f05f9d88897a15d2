//! Folding of flat result rows into an entity graph.
//!
//! Rows repeat once per join fan-out. Each selected alias keeps one instance
//! per primary key, and each joined member is attached to a given parent at
//! most once, so the graph does not depend on how many rows a join produced.

use std::collections::{HashMap, HashSet};

use ormflow_proto::{Row, Value};

use super::compiler::{column_label, QueryPlan};
use crate::entity::{EntityData, EntityRef, LazyLoader, LazyRelation, Related, RelationValue};
use crate::error::{HydrationError, Result};
use crate::manager::EntityManager;
use crate::metadata::{EntityKey, EntityMetadata, ListenerKind, RelationMetadata};
use crate::persistence;

struct Target<'p> {
    alias: &'p str,
    meta: &'p EntityMetadata,
    /// Target index of the parent alias and the relation joined from it.
    parent: Option<(usize, &'p RelationMetadata)>,
}

#[derive(Default)]
struct Attachment {
    members: Vec<EntityRef>,
    keys: HashSet<EntityKey>,
}

pub(crate) struct Hydrator<'a> {
    manager: &'a EntityManager,
    plan: &'a QueryPlan,
    quiet_root: bool,
}

impl<'a> Hydrator<'a> {
    pub fn new(manager: &'a EntityManager, plan: &'a QueryPlan, quiet_root: bool) -> Self {
        Self {
            manager,
            plan,
            quiet_root,
        }
    }

    /// Hydrate rows into root entities, in first-seen order.
    pub fn hydrate(&self, rows: &[Row]) -> Result<Vec<EntityRef>> {
        let registry = self.manager.registry();
        let mut targets: Vec<Target<'_>> = Vec::new();
        let mut target_of_alias: HashMap<usize, usize> = HashMap::new();

        for (index, alias) in self.plan.aliases.iter().enumerate() {
            if !alias.selected {
                continue;
            }
            let Some(entity) = alias.entity() else {
                continue;
            };
            let meta = registry.entity(entity)?;
            let parent = match alias.parent() {
                Some((parent_index, property)) => match target_of_alias.get(&parent_index) {
                    Some(&parent) => {
                        let parent_meta: &EntityMetadata = targets[parent].meta;
                        Some((parent, registry.relation(&parent_meta.name, property)?))
                    }
                    None => None,
                },
                None => None,
            };
            target_of_alias.insert(index, targets.len());
            targets.push(Target {
                alias: &alias.alias,
                meta,
                parent,
            });
        }

        let joined: HashSet<(usize, &str)> = targets
            .iter()
            .filter_map(|t| t.parent.map(|(p, r)| (p, r.property_name.as_str())))
            .collect();

        let mut seen: Vec<HashMap<EntityKey, EntityRef>> = vec![HashMap::new(); targets.len()];
        let mut ordered: Vec<Vec<EntityRef>> = vec![Vec::new(); targets.len()];
        let mut attached: HashMap<(usize, usize), Attachment> = HashMap::new();

        for row in rows {
            let mut current: Vec<Option<EntityRef>> = vec![None; targets.len()];
            for (t, target) in targets.iter().enumerate() {
                let Some(key) = self.read_key(row, target)? else {
                    if t == 0 {
                        return Err(HydrationError::NullRootKey {
                            alias: target.alias.to_string(),
                        }
                        .into());
                    }
                    continue;
                };

                let entity = match seen[t].get(&key) {
                    Some(entity) => entity.clone(),
                    None => {
                        let entity = self.materialize(row, target, t, &joined)?;
                        seen[t].insert(key.clone(), entity.clone());
                        ordered[t].push(entity.clone());
                        entity
                    }
                };

                if let Some((p, _)) = target.parent {
                    if let Some(parent) = &current[p] {
                        let slot = attached.entry((t, parent.instance_id())).or_default();
                        if slot.keys.insert(key) {
                            slot.members.push(entity.clone());
                        }
                    }
                }
                current[t] = Some(entity);
            }
        }

        for (t, target) in targets.iter().enumerate() {
            let Some((p, relation)) = target.parent else {
                continue;
            };
            for parent in &ordered[p] {
                let members = attached
                    .remove(&(t, parent.instance_id()))
                    .map(|a| a.members)
                    .unwrap_or_default();
                let value = if relation.is_to_many() {
                    Related::Many(members)
                } else {
                    Related::One(members.into_iter().next())
                };
                parent.write().set_relation(
                    relation.property_name.clone(),
                    RelationValue::loaded(value, relation.lazy),
                );
            }
        }

        for entities in &ordered {
            for entity in entities {
                persistence::take_snapshot(registry, entity)?;
            }
        }

        for (t, target) in targets.iter().enumerate() {
            if (t == 0 && self.quiet_root) || !target.meta.listeners.has(ListenerKind::AfterLoad) {
                continue;
            }
            for entity in &ordered[t] {
                self.manager
                    .run_listeners(target.meta, entity, ListenerKind::AfterLoad)?;
            }
        }

        Ok(ordered.into_iter().next().unwrap_or_default())
    }

    fn cell(&self, row: &Row, alias: &str, column: &str) -> Result<Value> {
        let label = column_label(alias, column);
        match row.get(&label) {
            Some(value) => Ok(value.clone()),
            None => Err(HydrationError::MissingColumn { label }.into()),
        }
    }

    fn read_key(&self, row: &Row, target: &Target<'_>) -> Result<Option<EntityKey>> {
        let mut key = Vec::new();
        for column in target.meta.primary_columns() {
            match self.cell(row, target.alias, &column.column_name)?.to_key() {
                Some(part) => key.push(part),
                None => return Ok(None),
            }
        }
        Ok(Some(key))
    }

    fn materialize(
        &self,
        row: &Row,
        target: &Target<'_>,
        index: usize,
        joined: &HashSet<(usize, &str)>,
    ) -> Result<EntityRef> {
        let registry = self.manager.registry();
        let driver = self.manager.driver();
        let meta = target.meta;
        let mut data = EntityData::new(meta.name.clone());

        for column in &meta.columns {
            let value = self.cell(row, target.alias, &column.column_name)?;
            data.set(
                column.property_name.clone(),
                driver.prepare_hydrated_value(value, column.column_type),
            );
        }

        for relation in meta.join_column_relations() {
            let Some(join) = &relation.join_column else {
                continue;
            };
            let mut value = self.cell(row, target.alias, &join.name)?;
            if let Some(referenced) = registry
                .target_of(relation)?
                .column_by_name(&join.referenced_column)
            {
                value = driver.prepare_hydrated_value(value, referenced.column_type);
            }
            data.set_foreign_key(relation.property_name.clone(), value);
        }

        if let Some(owner_id) = meta.primary_values(&data) {
            for relation in meta
                .relations
                .iter()
                .filter(|r| r.lazy && !joined.contains(&(index, r.property_name.as_str())))
            {
                let loader = LazyLoader::new(
                    self.manager.clone(),
                    meta.name.clone(),
                    relation.property_name.clone(),
                    owner_id.clone(),
                );
                data.set_relation(
                    relation.property_name.clone(),
                    RelationValue::Lazy(LazyRelation::unresolved(loader)),
                );
            }
        }

        Ok(EntityRef::from_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::compiler::{JoinSpec, JoinTarget};
    use crate::query::JoinKind;
    use crate::testing::{blog_manager, RecordingDriver};

    fn plan(manager: &EntityManager, entity: &str, alias: &str, joins: &[(&str, &str)]) -> QueryPlan {
        let joins: Vec<JoinSpec> = joins
            .iter()
            .map(|(path, alias)| JoinSpec {
                kind: JoinKind::Left,
                target: JoinTarget::Relation(path.to_string()),
                alias: alias.to_string(),
                select: true,
            })
            .collect();
        QueryPlan::build(manager.registry(), entity, alias, &joins, &[]).unwrap()
    }

    fn post_row(id: i64, title: &str, category: Option<(i64, &str)>) -> Row {
        let (category_id, category_name) = match category {
            Some((id, name)) => (Value::Int64(id), Value::String(name.into())),
            None => (Value::Null, Value::Null),
        };
        Row::new()
            .with("post__id", id)
            .with("post__title", title)
            .with("post__text", Value::Null)
            .with("post__author_id", Value::Null)
            .with("category__id", category_id)
            .with("category__name", category_name)
    }

    #[test]
    fn test_fan_out_rows_fold_into_one_root() {
        let (manager, _driver) = blog_manager(RecordingDriver::new());
        let plan = plan(&manager, "Post", "post", &[("post.categories", "category")]);
        let rows = vec![
            post_row(1, "Hello", Some((1, "kids"))),
            post_row(1, "Hello", Some((2, "future"))),
            post_row(1, "Hello", Some((1, "kids"))),
            post_row(2, "Empty", None),
        ];

        let posts = Hydrator::new(&manager, &plan, false).hydrate(&rows).unwrap();
        assert_eq!(posts.len(), 2);

        let categories = posts[0].many("categories");
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].get("name"), Some(Value::String("kids".into())));
        assert_eq!(posts[0].get("id"), Some(Value::Int32(1)));
        assert!(posts[1].many("categories").is_empty());
        assert!(posts[0].read().is_tracked());
    }

    #[test]
    fn test_joined_instances_are_shared_per_key() {
        let (manager, _driver) = blog_manager(RecordingDriver::new());
        let plan = plan(&manager, "Post", "post", &[("post.categories", "category")]);
        let rows = vec![
            post_row(1, "A", Some((5, "shared"))),
            post_row(2, "B", Some((5, "shared"))),
        ];

        let posts = Hydrator::new(&manager, &plan, false).hydrate(&rows).unwrap();
        let first = posts[0].many("categories");
        let second = posts[1].many("categories");
        assert!(first[0].ptr_eq(&second[0]));
    }

    #[test]
    fn test_missing_column_and_null_root() {
        let (manager, _driver) = blog_manager(RecordingDriver::new());
        let plan = plan(&manager, "Post", "post", &[]);

        let err = Hydrator::new(&manager, &plan, false)
            .hydrate(&[Row::new().with("post__id", 1)])
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Hydration(HydrationError::MissingColumn { ref label }) if label == "post__title"
        ));

        let err = Hydrator::new(&manager, &plan, false)
            .hydrate(&[Row::new().with("post__id", Value::Null)])
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Hydration(HydrationError::NullRootKey { .. })
        ));
    }

    #[test]
    fn test_foreign_key_is_recorded() {
        let (manager, _driver) = blog_manager(RecordingDriver::new());
        let plan = plan(&manager, "Post", "post", &[]);
        let row = Row::new()
            .with("post__id", 3)
            .with("post__title", "t")
            .with("post__text", "x")
            .with("post__author_id", 9i64);

        let posts = Hydrator::new(&manager, &plan, false).hydrate(&[row]).unwrap();
        assert_eq!(
            posts[0].read().foreign_key("author"),
            Some(&Value::Int32(9))
        );
        assert!(posts[0].relation("author").is_none());
    }
}
