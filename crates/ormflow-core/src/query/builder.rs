//! Fluent query builder.

use std::collections::HashMap;

use ormflow_proto::{FilterExpr, OrderSpec, Pagination, Row, Value};
use tracing::debug;

use super::compiler::{column_label, JoinSpec, JoinTarget, QueryPlan, SqlCompiler, COUNT_LABEL};
use super::hydrator::Hydrator;
use super::{CompiledQuery, JoinKind};
use crate::entity::EntityRef;
use crate::error::{HydrationError, Result};
use crate::manager::EntityManager;
use crate::metadata::EntityKey;

/// Alias-based query over one root entity.
///
/// ```ignore
/// let posts = manager
///     .query_builder("Post", "post")?
///     .left_join_and_select("post.categories", "category")
///     .where_(FilterExpr::eq("category.name", "kids"))
///     .order_by(OrderSpec::desc("post.id"))
///     .take(10)
///     .get_results()
///     .await?;
/// ```
#[derive(Clone)]
pub struct QueryBuilder {
    manager: EntityManager,
    entity: String,
    alias: String,
    joins: Vec<JoinSpec>,
    extra_selects: Vec<String>,
    filter: Option<FilterExpr>,
    order: Vec<OrderSpec>,
    pagination: Pagination,
    quiet_root: bool,
}

impl QueryBuilder {
    pub(crate) fn new(
        manager: EntityManager,
        entity: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            entity: entity.into(),
            alias: alias.into(),
            joins: Vec::new(),
            extra_selects: Vec::new(),
            filter: None,
            order: Vec::new(),
            pagination: Pagination::default(),
            quiet_root: false,
        }
    }

    /// Root alias.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Root entity name.
    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    /// Hydrate exactly the given aliases besides the root, replacing any
    /// selection made so far.
    pub fn select<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for join in &mut self.joins {
            join.select = false;
        }
        let root = self.alias.clone();
        self.extra_selects = aliases
            .into_iter()
            .map(Into::into)
            .filter(|alias| *alias != root)
            .collect();
        self
    }

    /// Hydrate one more joined alias.
    pub fn add_select(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        if alias != self.alias && !self.extra_selects.contains(&alias) {
            self.extra_selects.push(alias);
        }
        self
    }

    fn join(mut self, kind: JoinKind, target: JoinTarget, alias: String, select: bool) -> Self {
        self.joins.push(JoinSpec {
            kind,
            target,
            alias,
            select,
        });
        self
    }

    /// Inner-join a relation for filtering only.
    pub fn inner_join(self, path: impl Into<String>, alias: impl Into<String>) -> Self {
        self.join(JoinKind::Inner, JoinTarget::Relation(path.into()), alias.into(), false)
    }

    /// Left-join a relation for filtering only.
    pub fn left_join(self, path: impl Into<String>, alias: impl Into<String>) -> Self {
        self.join(JoinKind::Left, JoinTarget::Relation(path.into()), alias.into(), false)
    }

    /// Inner-join a relation and hydrate it.
    pub fn inner_join_and_select(
        self,
        path: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        self.join(JoinKind::Inner, JoinTarget::Relation(path.into()), alias.into(), true)
    }

    /// Left-join a relation and hydrate it.
    pub fn left_join_and_select(self, path: impl Into<String>, alias: impl Into<String>) -> Self {
        self.join(JoinKind::Left, JoinTarget::Relation(path.into()), alias.into(), true)
    }

    /// Inner-join a raw table on a condition. Its columns are addressed as
    /// `alias.column` and are never hydrated.
    pub fn inner_join_table(
        self,
        table: impl Into<String>,
        alias: impl Into<String>,
        condition: FilterExpr,
    ) -> Self {
        let target = JoinTarget::Table {
            table: table.into(),
            condition,
        };
        self.join(JoinKind::Inner, target, alias.into(), false)
    }

    /// Left-join a raw table on a condition.
    pub fn left_join_table(
        self,
        table: impl Into<String>,
        alias: impl Into<String>,
        condition: FilterExpr,
    ) -> Self {
        let target = JoinTarget::Table {
            table: table.into(),
            condition,
        };
        self.join(JoinKind::Left, target, alias.into(), false)
    }

    /// Replace the where-predicate.
    pub fn where_(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Conjoin a predicate with the current one.
    pub fn and_where(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(current) => current.and_also(filter),
            None => filter,
        });
        self
    }

    /// Disjoin a predicate with the current one.
    pub fn or_where(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(current) => current.or_else(filter),
            None => filter,
        });
        self
    }

    /// Replace the ordering.
    pub fn order_by(mut self, order: OrderSpec) -> Self {
        self.order = vec![order];
        self
    }

    /// Append an ordering term.
    pub fn add_order_by(mut self, order: OrderSpec) -> Self {
        self.order.push(order);
        self
    }

    /// Skip this many root entities.
    pub fn skip(mut self, offset: u32) -> Self {
        self.pagination.offset = offset;
        self
    }

    /// Return at most this many root entities.
    pub fn take(mut self, limit: u32) -> Self {
        self.pagination.limit = Some(limit);
        self
    }

    /// Do not run after-load listeners of root entities.
    pub(crate) fn quiet_root(mut self) -> Self {
        self.quiet_root = true;
        self
    }

    fn plan(&self) -> Result<QueryPlan> {
        QueryPlan::build(
            self.manager.registry(),
            &self.entity,
            &self.alias,
            &self.joins,
            &self.extra_selects,
        )
    }

    fn compiler<'p>(&'p self, plan: &'p QueryPlan) -> SqlCompiler<'p> {
        SqlCompiler::new(self.manager.driver().as_ref(), self.manager.registry(), plan)
    }

    /// SQL and parameters of the select statement.
    pub fn get_sql(&self) -> Result<CompiledQuery> {
        let plan = self.plan()?;
        self.compiler(&plan)
            .select(self.filter.as_ref(), &self.order, self.pagination)
    }

    /// Run the query and hydrate the root entities.
    pub async fn get_results(&self) -> Result<Vec<EntityRef>> {
        let plan = self.plan()?;
        if !self.pagination.is_unbounded() && plan.fans_out(self.manager.registry())? {
            return self.paged_results(&plan).await;
        }

        let query = self
            .compiler(&plan)
            .select(self.filter.as_ref(), &self.order, self.pagination)?;
        let rows = self.manager.driver().query(&query.sql, &query.params).await?;
        let entities = Hydrator::new(&self.manager, &plan, self.quiet_root).hydrate(&rows)?;
        debug!(
            entity = %self.entity,
            alias = %self.alias,
            rows = rows.len(),
            entities = entities.len(),
            "hydrated query results"
        );
        Ok(entities)
    }

    /// Paginate over root ids first, then load the full graph of that page.
    async fn paged_results(&self, plan: &QueryPlan) -> Result<Vec<EntityRef>> {
        let driver = self.manager.driver();
        let root = self.manager.registry().entity(&self.entity)?;
        let ids_query = self
            .compiler(plan)
            .root_ids(self.filter.as_ref(), &self.order, self.pagination)?;
        let id_rows = driver.query(&ids_query.sql, &ids_query.params).await?;

        let mut position: HashMap<EntityKey, usize> = HashMap::new();
        let mut ids: Vec<Vec<Value>> = Vec::new();
        for row in &id_rows {
            let mut id = Vec::new();
            for column in root.primary_columns() {
                let label = column_label(&self.alias, &column.column_name);
                let value = row
                    .get(&label)
                    .cloned()
                    .ok_or(HydrationError::MissingColumn { label })?;
                id.push(driver.prepare_hydrated_value(value, column.column_type));
            }
            let key: Option<EntityKey> = id.iter().map(Value::to_key).collect();
            if let Some(key) = key {
                if !position.contains_key(&key) {
                    position.insert(key, ids.len());
                    ids.push(id);
                }
            }
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let id_filter = key_filter(
            &self.alias,
            &root
                .primary_columns()
                .map(|c| c.property_name.as_str())
                .collect::<Vec<_>>(),
            ids,
        );
        let filter = match &self.filter {
            Some(filter) => filter.clone().and_also(id_filter),
            None => id_filter,
        };
        let query = self
            .compiler(plan)
            .select(Some(&filter), &self.order, Pagination::default())?;
        let rows = driver.query(&query.sql, &query.params).await?;
        let mut entities = Hydrator::new(&self.manager, plan, self.quiet_root).hydrate(&rows)?;

        entities.sort_by_key(|entity| {
            root.entity_key(&entity.read())
                .and_then(|key| position.get(&key).copied())
                .unwrap_or(usize::MAX)
        });
        Ok(entities)
    }

    /// Run the query and return the first root entity.
    pub async fn get_one(&self) -> Result<Option<EntityRef>> {
        Ok(self.get_results().await?.into_iter().next())
    }

    /// Number of distinct root entities matching the query, ignoring
    /// pagination.
    pub async fn get_count(&self) -> Result<u64> {
        let plan = self.plan()?;
        let query = self.compiler(&plan).count(self.filter.as_ref())?;
        let rows = self.manager.driver().query(&query.sql, &query.params).await?;
        let count = rows
            .first()
            .and_then(|row| row.get(COUNT_LABEL))
            .and_then(Value::as_i64)
            .ok_or_else(|| HydrationError::MissingColumn {
                label: COUNT_LABEL.to_string(),
            })?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Run the select statement and return the rows unhydrated.
    pub async fn get_raw_rows(&self) -> Result<Vec<Row>> {
        let query = self.get_sql()?;
        Ok(self.manager.driver().query(&query.sql, &query.params).await?)
    }
}

/// Predicate matching any of the given primary keys.
pub(crate) fn key_filter(alias: &str, properties: &[&str], ids: Vec<Vec<Value>>) -> FilterExpr {
    if let [property] = properties {
        let values = ids.into_iter().filter_map(|id| id.into_iter().next()).collect();
        return FilterExpr::in_values(format!("{alias}.{property}"), values);
    }
    FilterExpr::or(
        ids.into_iter()
            .map(|id| {
                FilterExpr::and(
                    properties
                        .iter()
                        .zip(id)
                        .map(|(property, value)| FilterExpr::eq(format!("{alias}.{property}"), value))
                        .collect(),
                )
            })
            .collect(),
    )
}
