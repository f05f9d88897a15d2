//! Execution of a planned persist or remove.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use ormflow_proto::{KeyValue, Value};
use tracing::{debug, warn};

use super::graph::{Operation, OperationGraph, Walk};
use super::plan::{self, Dependency};
use super::snapshot::{member_keys, same_value, take_snapshot};
use crate::driver::Driver;
use crate::entity::EntityRef;
use crate::error::{Error, Result};
use crate::manager::EntityManager;
use crate::metadata::{
    EntityKey, EntityMetadata, ListenerKind, MetadataRegistry, RelationKind, RelationMetadata,
};
use crate::resolver::RelationResolver;

/// Counts of statements issued by one persist or remove call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PersistResult {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    pub junction_rows: usize,
}

/// Foreign-key value computed for one relation of one node.
#[derive(Debug, Clone)]
struct KeyWrite {
    property: String,
    column: String,
    value: Value,
}

/// State shared by the statements of one persist call.
struct PersistContext<'g> {
    graph: &'g OperationGraph,
    /// Entity assigned to `(holder node, relation)` from the other side of
    /// a one-to-many or inverse one-to-one.
    assignments: HashMap<(usize, String), EntityRef>,
    /// `(holder node, relation)` keys written after their target exists.
    deferred: HashSet<(usize, String)>,
}

/// Runs cascades against the manager's driver.
pub(crate) struct Persister<'a> {
    manager: &'a EntityManager,
}

impl<'a> Persister<'a> {
    pub fn new(manager: &'a EntityManager) -> Self {
        Self { manager }
    }

    fn registry(&self) -> &'a MetadataRegistry {
        self.manager.registry()
    }

    fn driver(&self) -> &'a dyn Driver {
        self.manager.driver().as_ref()
    }

    /// Insert or update `roots` and everything their cascades reach.
    pub async fn persist(&self, roots: &[EntityRef]) -> Result<PersistResult> {
        if roots.is_empty() {
            return Ok(PersistResult::default());
        }
        let registry = self.registry();
        let mut graph = OperationGraph::build(registry, roots, Walk::Persist)?;

        let owns = self.begin().await?;
        let result = self.persist_graph(&mut graph).await;
        let result = self.finish(owns, result).await?;

        for node in &graph.nodes {
            take_snapshot(registry, &node.entity)?;
        }
        debug!(
            inserted = result.inserted,
            updated = result.updated,
            junction_rows = result.junction_rows,
            "persisted entity graph"
        );
        Ok(result)
    }

    /// Delete `roots` and everything their remove cascades reach.
    pub async fn remove(&self, roots: &[EntityRef]) -> Result<PersistResult> {
        if roots.is_empty() {
            return Ok(PersistResult::default());
        }
        let registry = self.registry();
        let graph = OperationGraph::build(registry, roots, Walk::Remove)?;

        let owns = self.begin().await?;
        let result = self.remove_graph(&graph).await;
        let result = self.finish(owns, result).await?;

        for node in &graph.nodes {
            let meta = registry.entity(&node.entity_name)?;
            let mut data = node.entity.write();
            data.set_snapshot(None);
            if let Some(generated) = meta.generated_primary_column() {
                data.unset(&generated.property_name);
            }
        }
        debug!(removed = result.removed, "removed entity graph");
        Ok(result)
    }

    async fn begin(&self) -> Result<bool> {
        let driver = self.driver();
        if driver.is_transaction_active() {
            return Ok(false);
        }
        driver.begin_transaction().await?;
        Ok(true)
    }

    async fn finish<T>(&self, owns: bool, result: Result<T>) -> Result<T> {
        if !owns {
            return result;
        }
        let driver = self.driver();
        match result {
            Ok(value) => {
                driver.commit_transaction().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = driver.rollback_transaction().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn persist_graph(&self, graph: &mut OperationGraph) -> Result<PersistResult> {
        let registry = self.registry();
        self.check_existence(graph).await?;

        let dependencies = plan::dependencies(registry, graph)?;
        let ordering = plan::insert_order(graph, &dependencies)?;
        let ctx = self.context(graph, &ordering.broken)?;
        let mut result = PersistResult::default();

        for &index in &ordering.order {
            self.insert(&ctx, index).await?;
            result.inserted += 1;
        }
        for dependency in &ordering.broken {
            self.write_deferred_key(&ctx, dependency).await?;
        }
        self.sync_inverse_keys(&ctx).await?;
        for index in graph.indices(Operation::Update) {
            if self.update(&ctx, index).await? {
                result.updated += 1;
            }
        }
        result.junction_rows = self.sync_junctions(&ctx).await?;
        Ok(result)
    }

    fn context<'g>(
        &self,
        graph: &'g OperationGraph,
        broken: &[Dependency],
    ) -> Result<PersistContext<'g>> {
        let registry = self.registry();
        let resolver = RelationResolver::new(registry);
        let mut assignments = HashMap::new();

        for (index, node) in graph.nodes.iter().enumerate() {
            let meta = registry.entity(&node.entity_name)?;
            for link in &node.links {
                let (Some(target), Some(relation)) = (link.node, meta.relation(&link.property))
                else {
                    continue;
                };
                if resolver.key_on_target(relation) {
                    let owning = resolver.owning_side(relation)?;
                    assignments
                        .entry((target, owning.property_name.clone()))
                        .or_insert_with(|| node.entity.clone());
                }
            }
        }

        Ok(PersistContext {
            graph,
            assignments,
            deferred: broken
                .iter()
                .map(|d| (d.holder, d.property.clone()))
                .collect(),
        })
    }

    /// Turn updates of assigned, non-generated keys into inserts when no
    /// row with that key exists yet. One select per entity type.
    async fn check_existence(&self, graph: &mut OperationGraph) -> Result<()> {
        let registry = self.registry();
        let driver = self.driver();
        let mut candidates: BTreeMap<String, Vec<(usize, EntityKey, Vec<Value>)>> = BTreeMap::new();

        for index in graph.indices(Operation::Update) {
            let node = &graph.nodes[index];
            let meta = registry.entity(&node.entity_name)?;
            if meta.generated_primary_column().is_some() {
                continue;
            }
            let data = node.entity.read();
            if data.is_tracked() {
                continue;
            }
            if let (Some(key), Some(values)) = (meta.entity_key(&data), meta.primary_values(&data)) {
                candidates
                    .entry(meta.name.clone())
                    .or_default()
                    .push((index, key, values));
            }
        }

        for (entity, nodes) in candidates {
            let meta = registry.entity(&entity)?;
            let columns: Vec<_> = meta.primary_columns().collect();
            let selected = columns
                .iter()
                .map(|c| driver.escape(&c.column_name))
                .collect::<Vec<_>>()
                .join(", ");

            let mut params = Vec::new();
            let mut alternatives = Vec::new();
            for (_, _, values) in &nodes {
                let mut parts = Vec::new();
                for (column, value) in columns.iter().zip(values) {
                    params.push(driver.prepare_persistent_value(value.clone(), column.column_type));
                    parts.push(format!(
                        "{} = {}",
                        driver.escape(&column.column_name),
                        driver.placeholder(params.len())
                    ));
                }
                alternatives.push(format!("({})", parts.join(" AND ")));
            }
            let sql = format!(
                "SELECT {selected} FROM {} WHERE {}",
                driver.escape(&meta.table_name),
                alternatives.join(" OR ")
            );
            let rows = driver.query(&sql, &params).await?;

            let existing: HashSet<EntityKey> = rows
                .iter()
                .filter_map(|row| {
                    columns
                        .iter()
                        .map(|c| row.get(&c.column_name).and_then(Value::to_key))
                        .collect::<Option<EntityKey>>()
                })
                .collect();
            for (index, key, _) in nodes {
                if !existing.contains(&key) {
                    graph.nodes[index].operation = Operation::Insert;
                }
            }
        }
        Ok(())
    }

    /// Foreign-key value of one relation, or `None` when this call does not
    /// touch it.
    fn key_write(
        &self,
        ctx: &PersistContext<'_>,
        index: usize,
        relation: &RelationMetadata,
        honor_deferred: bool,
    ) -> Result<Option<KeyWrite>> {
        let Some(join) = &relation.join_column else {
            return Ok(None);
        };
        let node = &ctx.graph.nodes[index];
        let slot = (index, relation.property_name.clone());
        let write = |value: Value| KeyWrite {
            property: relation.property_name.clone(),
            column: join.name.clone(),
            value,
        };

        if honor_deferred && ctx.deferred.contains(&slot) {
            return Ok(Some(write(Value::Null)));
        }

        let related = match node
            .entity
            .relation(&relation.property_name)
            .and_then(|value| value.resolved())
        {
            Some(related) => related.into_one(),
            None => match ctx.assignments.get(&slot) {
                Some(entity) => Some(entity.clone()),
                None => return Ok(None),
            },
        };

        let value = match related {
            None => Value::Null,
            Some(target) => match target.get(&join.referenced_property) {
                Some(value) if !value.is_null() => {
                    let target_meta = self.registry().target_of(relation)?;
                    match target_meta.column(&join.referenced_property) {
                        Some(column) => self
                            .driver()
                            .prepare_persistent_value(value, column.column_type),
                        None => value,
                    }
                }
                _ => {
                    warn!(
                        entity = %node.entity_name,
                        relation = %relation.property_name,
                        "related entity has no key, writing null"
                    );
                    Value::Null
                }
            },
        };
        Ok(Some(write(value)))
    }

    fn key_conditions(&self, meta: &EntityMetadata, entity: &EntityRef) -> Result<Vec<(String, Value)>> {
        let data = entity.read();
        let mut conditions = Vec::new();
        for column in meta.primary_columns() {
            match data.get(&column.property_name) {
                Some(value) if !value.is_null() => conditions.push((
                    column.column_name.clone(),
                    self.driver()
                        .prepare_persistent_value(value.clone(), column.column_type),
                )),
                _ => {
                    return Err(Error::MissingPrimaryKey {
                        entity: meta.name.clone(),
                    })
                }
            }
        }
        Ok(conditions)
    }

    async fn insert(&self, ctx: &PersistContext<'_>, index: usize) -> Result<()> {
        let registry = self.registry();
        let driver = self.driver();
        let node = &ctx.graph.nodes[index];
        let meta = registry.entity(&node.entity_name)?;
        let entity = &node.entity;

        self.manager
            .run_listeners(meta, entity, ListenerKind::BeforeInsert)?;

        let mut values = Vec::new();
        {
            let data = entity.read();
            for column in meta.primary_columns().filter(|c| !c.generated) {
                if data.get(&column.property_name).map_or(true, Value::is_null) {
                    return Err(Error::MissingPrimaryKey {
                        entity: meta.name.clone(),
                    });
                }
            }
            for column in meta.columns.iter().filter(|c| c.is_insertable()) {
                if let Some(value) = data.get(&column.property_name) {
                    values.push((
                        column.column_name.clone(),
                        driver.prepare_persistent_value(value.clone(), column.column_type),
                    ));
                }
            }
        }

        let mut keys = Vec::new();
        for relation in meta.join_column_relations() {
            if let Some(write) = self.key_write(ctx, index, relation, true)? {
                values.push((write.column.clone(), write.value.clone()));
                keys.push(write);
            }
        }

        let generated = meta.generated_primary_column();
        let id = driver
            .insert(
                &meta.table_name,
                &values,
                generated.map(|c| c.column_name.as_str()),
            )
            .await?;
        {
            let mut data = entity.write();
            if let (Some(column), Some(id)) = (generated, id) {
                data.set(
                    column.property_name.clone(),
                    driver.prepare_hydrated_value(id, column.column_type),
                );
            }
            for write in keys {
                data.set_foreign_key(write.property, write.value);
            }
        }
        debug!(entity = %meta.name, table = %meta.table_name, "inserted entity");

        if meta.closure_table.is_some() {
            self.insert_closure_rows(ctx, index, meta).await?;
        }

        self.manager
            .run_listeners(meta, entity, ListenerKind::AfterInsert)
    }

    async fn insert_closure_rows(
        &self,
        ctx: &PersistContext<'_>,
        index: usize,
        meta: &EntityMetadata,
    ) -> Result<()> {
        let Some(closure) = &meta.closure_table else {
            return Ok(());
        };
        let node = &ctx.graph.nodes[index];
        let descendant = self
            .key_conditions(meta, &node.entity)?
            .into_iter()
            .next()
            .map(|(_, value)| value)
            .ok_or_else(|| Error::MissingPrimaryKey {
                entity: meta.name.clone(),
            })?;

        let parent = match meta.tree_parent_relation() {
            Some(relation) => match self.key_write(ctx, index, relation, true)? {
                Some(write) if !write.value.is_null() => Some(write.value),
                _ => None,
            },
            None => None,
        };

        let depth = self
            .driver()
            .insert_into_closure_table(closure, &descendant, parent.as_ref())
            .await?;
        debug!(entity = %meta.name, table = %closure.table, depth, "inserted closure rows");
        Ok(())
    }

    async fn write_deferred_key(&self, ctx: &PersistContext<'_>, dependency: &Dependency) -> Result<()> {
        let registry = self.registry();
        let node = &ctx.graph.nodes[dependency.holder];
        let meta = registry.entity(&node.entity_name)?;
        let relation = registry.relation(&meta.name, &dependency.property)?;
        let Some(write) = self.key_write(ctx, dependency.holder, relation, false)? else {
            return Ok(());
        };

        let conditions = self.key_conditions(meta, &node.entity)?;
        self.driver()
            .update(
                &meta.table_name,
                &[(write.column.clone(), write.value.clone())],
                &conditions,
            )
            .await?;
        node.entity
            .write()
            .set_foreign_key(write.property, write.value);
        Ok(())
    }

    /// Keys held by children of one-to-many (and inverse one-to-one)
    /// relations: null the key of children removed from the collection, set
    /// it on existing children added without cascading.
    async fn sync_inverse_keys(&self, ctx: &PersistContext<'_>) -> Result<()> {
        let registry = self.registry();
        let resolver = RelationResolver::new(registry);
        let mut statements: Vec<(String, (String, Value), Vec<(String, Value)>)> = Vec::new();

        for node in &ctx.graph.nodes {
            let meta = registry.entity(&node.entity_name)?;
            for relation in meta.relations.iter().filter(|r| resolver.key_on_target(r)) {
                let Some(current) = node
                    .entity
                    .relation(&relation.property_name)
                    .and_then(|value| value.resolved())
                else {
                    continue;
                };
                let owning = resolver.owning_side(relation)?;
                let Some(join) = &owning.join_column else {
                    continue;
                };
                let target = registry.target_of(relation)?;
                let now = member_keys(target, &current);
                let before = node
                    .entity
                    .read()
                    .snapshot()
                    .and_then(|s| s.members.get(&relation.property_name).cloned());

                if let Some(before) = &before {
                    for key in before.difference(&now) {
                        if !owning.nullable {
                            warn!(
                                entity = %target.name,
                                relation = %owning.property_name,
                                "removed child has a non-nullable key, leaving it"
                            );
                            continue;
                        }
                        statements.push((
                            target.table_name.clone(),
                            (join.name.clone(), Value::Null),
                            self.key_values(target, key),
                        ));
                    }
                }

                for child in current.entities() {
                    let linked = node
                        .links
                        .iter()
                        .any(|l| l.property == relation.property_name && l.related.ptr_eq(&child) && l.node.is_some());
                    if linked {
                        continue;
                    }
                    let Some(key) = target.entity_key(&child.read()) else {
                        warn!(
                            entity = %target.name,
                            relation = %relation.property_name,
                            "unsaved child without cascade, skipping"
                        );
                        continue;
                    };
                    if before.as_ref().is_some_and(|b| b.contains(&key)) {
                        continue;
                    }
                    let Some(parent_key) = self.referenced_value(meta, &node.entity, &join.referenced_property) else {
                        continue;
                    };
                    statements.push((
                        target.table_name.clone(),
                        (join.name.clone(), parent_key),
                        self.key_values(target, &key),
                    ));
                }
            }
        }

        for (table, assignment, conditions) in statements {
            self.driver()
                .update(&table, std::slice::from_ref(&assignment), &conditions)
                .await?;
        }
        Ok(())
    }

    fn referenced_value(&self, meta: &EntityMetadata, entity: &EntityRef, property: &str) -> Option<Value> {
        let value = entity.get(property).filter(|v| !v.is_null())?;
        Some(match meta.column(property) {
            Some(column) => self.driver().prepare_persistent_value(value, column.column_type),
            None => value,
        })
    }

    /// Primary-key conditions from a stored key.
    fn key_values(&self, meta: &EntityMetadata, key: &[KeyValue]) -> Vec<(String, Value)> {
        meta.primary_columns()
            .zip(key)
            .map(|(column, part)| {
                (
                    column.column_name.clone(),
                    self.driver()
                        .prepare_persistent_value(Value::from(part.clone()), column.column_type),
                )
            })
            .collect()
    }

    /// Changed columns and foreign keys of an existing entity.
    fn changes(
        &self,
        ctx: &PersistContext<'_>,
        index: usize,
        meta: &EntityMetadata,
    ) -> Result<(Vec<(String, Value)>, Vec<KeyWrite>)> {
        let node = &ctx.graph.nodes[index];
        let mut columns = Vec::new();
        {
            let data = node.entity.read();
            let snapshot = data.snapshot();
            for column in meta.columns.iter().filter(|c| c.is_updatable()) {
                let Some(current) = data.get(&column.property_name) else {
                    continue;
                };
                let changed = snapshot
                    .and_then(|s| s.values.get(&column.property_name))
                    .map_or(true, |previous| !same_value(previous, current));
                if changed {
                    columns.push((
                        column.column_name.clone(),
                        self.driver()
                            .prepare_persistent_value(current.clone(), column.column_type),
                    ));
                }
            }
        }

        let mut keys = Vec::new();
        for relation in meta.join_column_relations() {
            let Some(write) = self.key_write(ctx, index, relation, true)? else {
                continue;
            };
            let previous = node.entity.read().foreign_key(&write.property).cloned();
            if previous.map_or(true, |previous| !same_value(&previous, &write.value)) {
                keys.push(write);
            }
        }
        Ok((columns, keys))
    }

    /// Update changed columns of an existing entity. Returns whether a
    /// statement was issued.
    async fn update(&self, ctx: &PersistContext<'_>, index: usize) -> Result<bool> {
        let registry = self.registry();
        let node = &ctx.graph.nodes[index];
        let meta = registry.entity(&node.entity_name)?;
        let entity = &node.entity;

        let (columns, keys) = self.changes(ctx, index, meta)?;
        if columns.is_empty() && keys.is_empty() {
            return Ok(false);
        }

        self.manager
            .run_listeners(meta, entity, ListenerKind::BeforeUpdate)?;
        // listeners may have changed columns
        let (columns, keys) = self.changes(ctx, index, meta)?;
        if columns.is_empty() && keys.is_empty() {
            return Ok(false);
        }

        let mut values = columns;
        values.extend(keys.iter().map(|k| (k.column.clone(), k.value.clone())));
        let conditions = self.key_conditions(meta, entity)?;
        let affected = self
            .driver()
            .update(&meta.table_name, &values, &conditions)
            .await?;
        {
            let mut data = entity.write();
            for write in keys {
                data.set_foreign_key(write.property, write.value);
            }
        }
        debug!(entity = %meta.name, table = %meta.table_name, affected, "updated entity");

        self.manager
            .run_listeners(meta, entity, ListenerKind::AfterUpdate)?;
        Ok(true)
    }

    /// Insert and delete many-to-many junction rows. Returns the number of
    /// rows written.
    async fn sync_junctions(&self, ctx: &PersistContext<'_>) -> Result<usize> {
        let registry = self.registry();
        let resolver = RelationResolver::new(registry);
        let mut seen: HashSet<(String, Vec<(String, Option<KeyValue>)>)> = HashSet::new();
        let mut deletes = Vec::new();
        let mut inserts = Vec::new();

        for node in &ctx.graph.nodes {
            let meta = registry.entity(&node.entity_name)?;
            for relation in meta
                .relations
                .iter()
                .filter(|r| r.kind == RelationKind::ManyToMany)
            {
                let Some(current) = node
                    .entity
                    .relation(&relation.property_name)
                    .and_then(|value| value.resolved())
                else {
                    continue;
                };
                let owning = resolver.owning_side(relation)?;
                let Some(table) = &owning.join_table else {
                    continue;
                };
                let target = registry.target_of(relation)?;
                let Some(mine) = meta.entity_key(&node.entity.read()) else {
                    continue;
                };

                let mut now = BTreeSet::new();
                for member in current.entities() {
                    match target.entity_key(&member.read()) {
                        Some(key) => {
                            now.insert(key);
                        }
                        None => warn!(
                            entity = %meta.name,
                            relation = %relation.property_name,
                            "many-to-many member has no key, skipping"
                        ),
                    }
                }
                let before = node
                    .entity
                    .read()
                    .snapshot()
                    .and_then(|s| s.members.get(&relation.property_name).cloned())
                    .unwrap_or_default();

                let (owner_meta, inverse_meta) = if relation.owning {
                    (meta, target)
                } else {
                    (target, meta)
                };
                let row = |theirs: &EntityKey| {
                    let (owner_key, inverse_key) = if relation.owning {
                        (&mine, theirs)
                    } else {
                        (theirs, &mine)
                    };
                    vec![
                        (
                            table.owner_column.clone(),
                            self.junction_value(owner_meta, &table.owner_referenced_property, owner_key),
                        ),
                        (
                            table.inverse_column.clone(),
                            self.junction_value(
                                inverse_meta,
                                &table.inverse_referenced_property,
                                inverse_key,
                            ),
                        ),
                    ]
                };

                for removed in before.difference(&now) {
                    let conditions = row(removed);
                    if seen.insert(junction_identity(&table.name, &conditions, false)) {
                        deletes.push((table.name.clone(), conditions));
                    }
                }
                for added in now.difference(&before) {
                    let values = row(added);
                    if seen.insert(junction_identity(&table.name, &values, true)) {
                        inserts.push((table.name.clone(), values));
                    }
                }
            }
        }

        let driver = self.driver();
        let written = deletes.len() + inserts.len();
        for (table, conditions) in deletes {
            driver.delete(&table, &conditions).await?;
        }
        for (table, values) in inserts {
            driver.insert(&table, &values, None).await?;
        }
        if written > 0 {
            debug!(rows = written, "synchronized junction rows");
        }
        Ok(written)
    }

    fn junction_value(&self, meta: &EntityMetadata, property: &str, key: &EntityKey) -> Value {
        let value = key.first().cloned().map(Value::from).unwrap_or(Value::Null);
        match meta.column(property) {
            Some(column) => self.driver().prepare_persistent_value(value, column.column_type),
            None => value,
        }
    }

    async fn remove_graph(&self, graph: &OperationGraph) -> Result<PersistResult> {
        let registry = self.registry();
        let driver = self.driver();
        let dependencies = plan::dependencies(registry, graph)?;
        let ordering = plan::remove_order(graph, &dependencies)?;
        let mut result = PersistResult::default();

        for dependency in &ordering.broken {
            let node = &graph.nodes[dependency.holder];
            let meta = registry.entity(&node.entity_name)?;
            let relation = registry.relation(&meta.name, &dependency.property)?;
            if let Some(join) = &relation.join_column {
                let conditions = self.key_conditions(meta, &node.entity)?;
                driver
                    .update(&meta.table_name, &[(join.name.clone(), Value::Null)], &conditions)
                    .await?;
            }
        }

        for index in ordering.order {
            let node = &graph.nodes[index];
            let meta = registry.entity(&node.entity_name)?;
            let entity = &node.entity;

            self.manager
                .run_listeners(meta, entity, ListenerKind::BeforeRemove)?;
            let conditions = self.key_conditions(meta, entity)?;
            let id = conditions
                .first()
                .map(|(_, value)| value.clone())
                .unwrap_or(Value::Null);

            self.unset_child_keys(graph, index).await?;
            for (table, column) in self.junction_columns(meta)? {
                driver.delete(&table, &[(column, id.clone())]).await?;
            }
            if let Some(closure) = &meta.closure_table {
                driver
                    .delete(&closure.table, &[(closure.descendant_column.clone(), id.clone())])
                    .await?;
                driver
                    .delete(&closure.table, &[(closure.ancestor_column.clone(), id.clone())])
                    .await?;
            }

            let affected = driver.delete(&meta.table_name, &conditions).await?;
            debug!(entity = %meta.name, table = %meta.table_name, affected, "removed entity");
            result.removed += 1;

            self.manager
                .run_listeners(meta, entity, ListenerKind::AfterRemove)?;
        }
        Ok(result)
    }

    /// Null the foreign keys of loaded children that stay behind when their
    /// parent is removed.
    async fn unset_child_keys(&self, graph: &OperationGraph, index: usize) -> Result<()> {
        let registry = self.registry();
        let resolver = RelationResolver::new(registry);
        let node = &graph.nodes[index];
        let meta = registry.entity(&node.entity_name)?;

        for relation in meta.relations.iter().filter(|r| resolver.key_on_target(r)) {
            let Some(current) = node
                .entity
                .relation(&relation.property_name)
                .and_then(|value| value.resolved())
            else {
                continue;
            };
            let owning = resolver.owning_side(relation)?;
            let Some(join) = &owning.join_column else {
                continue;
            };
            let target = registry.target_of(relation)?;

            for child in current.entities() {
                let removed = node.links.iter().any(|l| {
                    l.property == relation.property_name && l.related.ptr_eq(&child) && l.node.is_some()
                });
                if removed {
                    continue;
                }
                let Some(key) = target.entity_key(&child.read()) else {
                    continue;
                };
                if !owning.nullable {
                    return Err(Error::RemoveRestricted {
                        entity: meta.name.clone(),
                        relation: relation.property_name.clone(),
                    });
                }
                self.driver()
                    .update(
                        &target.table_name,
                        &[(join.name.clone(), Value::Null)],
                        &self.key_values(target, &key),
                    )
                    .await?;
                if child
                    .one(&owning.property_name)
                    .is_some_and(|parent| parent.ptr_eq(&node.entity))
                {
                    child.set_one(owning.property_name.clone(), None);
                }
                debug!(
                    entity = %target.name,
                    relation = %owning.property_name,
                    "unset key of child left behind"
                );
            }
        }
        Ok(())
    }

    /// Junction columns referencing rows of `meta`, from its own many-to-many
    /// relations and from unidirectional ones declared elsewhere.
    fn junction_columns(&self, meta: &EntityMetadata) -> Result<BTreeSet<(String, String)>> {
        let registry = self.registry();
        let resolver = RelationResolver::new(registry);
        let mut columns = BTreeSet::new();

        for relation in meta
            .relations
            .iter()
            .filter(|r| r.kind == RelationKind::ManyToMany)
        {
            let owning = resolver.owning_side(relation)?;
            if let Some(table) = &owning.join_table {
                let column = if relation.owning {
                    &table.owner_column
                } else {
                    &table.inverse_column
                };
                columns.insert((table.name.clone(), column.clone()));
            }
        }
        for relation in registry.relations_to(&meta.name) {
            if let (true, Some(table)) = (relation.owning, &relation.join_table) {
                columns.insert((table.name.clone(), table.inverse_column.clone()));
            }
        }
        Ok(columns)
    }
}

fn junction_identity(
    table: &str,
    values: &[(String, Value)],
    insert: bool,
) -> (String, Vec<(String, Option<KeyValue>)>) {
    let prefix = if insert { "+" } else { "-" };
    (
        format!("{prefix}{table}"),
        values
            .iter()
            .map(|(column, value)| (column.clone(), value.to_key()))
            .collect(),
    )
}
