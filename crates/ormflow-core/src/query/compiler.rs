//! Compilation of an alias plan into SQL text and bound parameters.

use ormflow_proto::{FilterExpr, OrderDirection, OrderSpec, Pagination, Value};

use super::{CompiledQuery, JoinKind};
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::metadata::{ColumnType, EntityMetadata, MetadataRegistry};
use crate::resolver::{JoinPath, RelationResolver};

/// Separator between an alias and a column in result labels. User aliases
/// may not contain it.
const LABEL_SEPARATOR: &str = "__";

/// Label of a selected column in result rows.
pub(crate) fn column_label(alias: &str, column: &str) -> String {
    format!("{alias}{LABEL_SEPARATOR}{column}")
}

/// Alias of the junction table between a parent alias and a joined alias.
fn junction_alias(parent: &str, alias: &str) -> String {
    format!("{parent}{LABEL_SEPARATOR}{alias}{LABEL_SEPARATOR}jt")
}

fn check_alias(alias: &str) -> Result<()> {
    if alias.is_empty() || alias.contains(LABEL_SEPARATOR) || alias.contains('.') {
        return Err(Error::InvalidAlias(alias.to_string()));
    }
    Ok(())
}

pub(crate) const COUNT_LABEL: &str = "cnt";

/// Join as declared on the builder.
#[derive(Debug, Clone)]
pub(crate) struct JoinSpec {
    pub kind: JoinKind,
    pub target: JoinTarget,
    pub alias: String,
    pub select: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum JoinTarget {
    /// `parent_alias.relation`
    Relation(String),
    /// Raw table joined on a condition.
    Table { table: String, condition: FilterExpr },
}

#[derive(Debug, Clone)]
pub(crate) enum AliasSource {
    Entity(String),
    Table(String),
}

#[derive(Debug, Clone)]
pub(crate) enum JoinOn {
    Relation { parent: usize, property: String },
    Condition(FilterExpr),
}

#[derive(Debug, Clone)]
pub(crate) struct AliasPlan {
    pub alias: String,
    pub source: AliasSource,
    pub selected: bool,
    pub join: Option<(JoinKind, JoinOn)>,
}

impl AliasPlan {
    pub fn entity(&self) -> Option<&str> {
        match &self.source {
            AliasSource::Entity(name) => Some(name),
            AliasSource::Table(_) => None,
        }
    }

    /// Parent alias index and relation property, for relation joins.
    pub fn parent(&self) -> Option<(usize, &str)> {
        match &self.join {
            Some((_, JoinOn::Relation { parent, property })) => Some((*parent, property)),
            _ => None,
        }
    }
}

/// Every alias of a query; index 0 is the root.
#[derive(Debug, Clone)]
pub(crate) struct QueryPlan {
    pub aliases: Vec<AliasPlan>,
}

impl QueryPlan {
    pub fn build(
        registry: &MetadataRegistry,
        entity: &str,
        alias: &str,
        joins: &[JoinSpec],
        extra_selects: &[String],
    ) -> Result<Self> {
        registry.entity(entity)?;
        check_alias(alias)?;
        let mut plan = Self {
            aliases: vec![AliasPlan {
                alias: alias.to_string(),
                source: AliasSource::Entity(entity.to_string()),
                selected: true,
                join: None,
            }],
        };

        for join in joins {
            check_alias(&join.alias)?;
            if plan.index_of(&join.alias).is_some() {
                return Err(Error::DuplicateAlias(join.alias.clone()));
            }
            let (source, on) = match &join.target {
                JoinTarget::Relation(path) => {
                    let (parent_alias, property) = split_path(path)?;
                    let parent = plan
                        .index_of(parent_alias)
                        .ok_or_else(|| Error::UnknownAlias(parent_alias.to_string()))?;
                    let parent_entity =
                        plan.aliases[parent]
                            .entity()
                            .ok_or_else(|| Error::UnknownRelation {
                                entity: parent_alias.to_string(),
                                relation: property.to_string(),
                            })?;
                    let relation = registry.relation(parent_entity, property)?;
                    (
                        AliasSource::Entity(relation.target.clone()),
                        JoinOn::Relation {
                            parent,
                            property: property.to_string(),
                        },
                    )
                }
                JoinTarget::Table { table, condition } => (
                    AliasSource::Table(table.clone()),
                    JoinOn::Condition(condition.clone()),
                ),
            };
            plan.aliases.push(AliasPlan {
                alias: join.alias.clone(),
                source,
                selected: join.select || extra_selects.contains(&join.alias),
                join: Some((join.kind, on)),
            });
        }

        for extra in extra_selects {
            if plan.index_of(extra).is_none() {
                return Err(Error::UnknownAlias(extra.clone()));
            }
        }

        Ok(plan)
    }

    pub fn index_of(&self, alias: &str) -> Option<usize> {
        self.aliases.iter().position(|a| a.alias == alias)
    }

    pub fn root(&self) -> &AliasPlan {
        &self.aliases[0]
    }

    /// Check if some join can repeat a root row.
    pub fn fans_out(&self, registry: &MetadataRegistry) -> Result<bool> {
        for alias in &self.aliases[1..] {
            match &alias.join {
                Some((_, JoinOn::Relation { parent, property })) => {
                    let Some(entity) = self.aliases[*parent].entity() else {
                        continue;
                    };
                    if registry.relation(entity, property)?.is_to_many() {
                        return Ok(true);
                    }
                }
                Some((_, JoinOn::Condition(_))) => return Ok(true),
                None => {}
            }
        }
        Ok(false)
    }
}

fn split_path(path: &str) -> Result<(&str, &str)> {
    path.split_once('.')
        .ok_or_else(|| Error::UnknownAlias(path.to_string()))
}

/// Turns a plan into SQL for one driver.
pub(crate) struct SqlCompiler<'a> {
    driver: &'a dyn Driver,
    registry: &'a MetadataRegistry,
    plan: &'a QueryPlan,
    params: Vec<Value>,
}

impl<'a> SqlCompiler<'a> {
    pub fn new(driver: &'a dyn Driver, registry: &'a MetadataRegistry, plan: &'a QueryPlan) -> Self {
        Self {
            driver,
            registry,
            plan,
            params: Vec::new(),
        }
    }

    /// Full select of every selected alias.
    pub fn select(
        mut self,
        filter: Option<&FilterExpr>,
        order: &[OrderSpec],
        pagination: Pagination,
    ) -> Result<CompiledQuery> {
        let columns = self.select_list()?;
        let from = self.from_sql()?;
        let mut sql = format!("SELECT {columns} {from}");
        self.push_where(&mut sql, filter)?;
        self.push_order(&mut sql, order)?;
        sql.push_str(&self.driver.limit_clause(pagination.limit, pagination.offset));
        Ok(self.finish(sql))
    }

    /// Root keys of one page, one row per root, in result order.
    ///
    /// Rows are grouped by the root key. An ordering column of a joined alias
    /// is reduced to its smallest value per root when ascending and its
    /// largest when descending.
    pub fn root_ids(
        mut self,
        filter: Option<&FilterExpr>,
        order: &[OrderSpec],
        pagination: Pagination,
    ) -> Result<CompiledQuery> {
        let mut columns = self.root_key_list()?;
        let mut order_terms = Vec::with_capacity(order.len());
        for (i, spec) in order.iter().enumerate() {
            let (column, _) = self.column_ref(&spec.field)?;
            let aggregate = match spec.direction {
                OrderDirection::Asc => "MIN",
                OrderDirection::Desc => "MAX",
            };
            let label = self.driver.escape(&format!("__order_{i}"));
            columns.push_str(&format!(", {aggregate}({column}) AS {label}"));
            order_terms.push(format!("{label} {}", spec.direction.as_sql()));
        }
        let from = self.from_sql()?;
        let mut sql = format!("SELECT {columns} {from}");
        self.push_where(&mut sql, filter)?;
        sql.push_str(" GROUP BY ");
        sql.push_str(&self.root_key_columns()?.join(", "));
        if !order_terms.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_terms.join(", "));
        }
        sql.push_str(&self.driver.limit_clause(pagination.limit, pagination.offset));
        Ok(self.finish(sql))
    }

    /// Number of distinct root entities matching the filter.
    pub fn count(mut self, filter: Option<&FilterExpr>) -> Result<CompiledQuery> {
        let keys = self.root_key_list()?;
        let from = self.from_sql()?;
        let mut inner = format!("SELECT DISTINCT {keys} {from}");
        self.push_where(&mut inner, filter)?;
        let sql = format!(
            "SELECT COUNT(*) AS {} FROM ({inner}) {}",
            self.driver.escape(COUNT_LABEL),
            self.driver.escape("counted")
        );
        Ok(self.finish(sql))
    }

    fn finish(self, sql: String) -> CompiledQuery {
        CompiledQuery {
            sql,
            params: self.params,
        }
    }

    fn entity_of(&self, index: usize) -> Option<Result<&'a EntityMetadata>> {
        self.plan.aliases[index]
            .entity()
            .map(|name| self.registry.entity(name))
    }

    fn root_key_columns(&self) -> Result<Vec<String>> {
        let root = self.plan.root();
        let Some(meta) = self.entity_of(0).transpose()? else {
            return Err(Error::UnknownAlias(root.alias.clone()));
        };
        Ok(meta
            .primary_columns()
            .map(|column| {
                format!(
                    "{}.{}",
                    self.driver.escape(&root.alias),
                    self.driver.escape(&column.column_name)
                )
            })
            .collect())
    }

    fn root_key_list(&self) -> Result<String> {
        let root = self.plan.root();
        let Some(meta) = self.entity_of(0).transpose()? else {
            return Err(Error::UnknownAlias(root.alias.clone()));
        };
        Ok(meta
            .primary_columns()
            .map(|column| self.selected_column(&root.alias, &column.column_name))
            .collect::<Vec<_>>()
            .join(", "))
    }

    fn select_list(&self) -> Result<String> {
        let mut parts = Vec::new();
        for (index, alias) in self.plan.aliases.iter().enumerate() {
            if !alias.selected {
                continue;
            }
            let Some(meta) = self.entity_of(index).transpose()? else {
                continue;
            };
            for column in &meta.columns {
                parts.push(self.selected_column(&alias.alias, &column.column_name));
            }
            for relation in meta.join_column_relations() {
                if let Some(join) = &relation.join_column {
                    parts.push(self.selected_column(&alias.alias, &join.name));
                }
            }
        }
        Ok(parts.join(", "))
    }

    fn selected_column(&self, alias: &str, column: &str) -> String {
        format!(
            "{}.{} AS {}",
            self.driver.escape(alias),
            self.driver.escape(column),
            self.driver.escape(&column_label(alias, column))
        )
    }

    fn from_sql(&mut self) -> Result<String> {
        let plan = self.plan;
        let registry = self.registry;
        let root = plan.root();
        let Some(root_meta) = self.entity_of(0).transpose()? else {
            return Err(Error::UnknownAlias(root.alias.clone()));
        };
        let mut sql = format!(
            "FROM {} {}",
            self.driver.escape(&root_meta.table_name),
            self.driver.escape(&root.alias)
        );

        let resolver = RelationResolver::new(registry);
        for alias in &plan.aliases[1..] {
            let Some((kind, on)) = &alias.join else {
                continue;
            };
            let join = kind.as_sql();
            let name = self.driver.escape(&alias.alias);
            match on {
                JoinOn::Relation { parent, property } => {
                    let parent_plan = &plan.aliases[*parent];
                    let parent_entity = parent_plan
                        .entity()
                        .ok_or_else(|| Error::UnknownAlias(parent_plan.alias.clone()))?;
                    let relation = registry.relation(parent_entity, property)?;
                    let target = registry.target_of(relation)?;
                    let table = self.driver.escape(&target.table_name);
                    let parent_name = self.driver.escape(&parent_plan.alias);

                    match resolver.join_path(relation)? {
                        JoinPath::Direct {
                            parent_column,
                            target_column,
                        } => {
                            sql.push_str(&format!(
                                " {join} {table} {name} ON {name}.{} = {parent_name}.{}",
                                self.driver.escape(&target_column),
                                self.driver.escape(&parent_column)
                            ));
                        }
                        JoinPath::Junction {
                            table: junction,
                            parent_column,
                            junction_parent_column,
                            junction_target_column,
                            target_column,
                        } => {
                            let junction_name = self
                                .driver
                                .escape(&junction_alias(&parent_plan.alias, &alias.alias));
                            sql.push_str(&format!(
                                " {join} {} {junction_name} ON {junction_name}.{} = {parent_name}.{}",
                                self.driver.escape(&junction),
                                self.driver.escape(&junction_parent_column),
                                self.driver.escape(&parent_column)
                            ));
                            sql.push_str(&format!(
                                " {join} {table} {name} ON {name}.{} = {junction_name}.{}",
                                self.driver.escape(&target_column),
                                self.driver.escape(&junction_target_column)
                            ));
                        }
                    }
                }
                JoinOn::Condition(condition) => {
                    let table = match &alias.source {
                        AliasSource::Table(table) => self.driver.escape(table),
                        AliasSource::Entity(entity) => {
                            self.driver.escape(&registry.entity(entity)?.table_name)
                        }
                    };
                    let condition = self.filter_sql(condition)?;
                    sql.push_str(&format!(" {join} {table} {name} ON {condition}"));
                }
            }
        }
        Ok(sql)
    }

    fn push_where(&mut self, sql: &mut String, filter: Option<&FilterExpr>) -> Result<()> {
        if let Some(filter) = filter {
            let condition = self.filter_sql(filter)?;
            sql.push_str(" WHERE ");
            sql.push_str(&condition);
        }
        Ok(())
    }

    fn push_order(&self, sql: &mut String, order: &[OrderSpec]) -> Result<()> {
        if order.is_empty() {
            return Ok(());
        }
        let mut parts = Vec::with_capacity(order.len());
        for spec in order {
            let (column, _) = self.column_ref(&spec.field)?;
            parts.push(format!("{column} {}", spec.direction.as_sql()));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&parts.join(", "));
        Ok(())
    }

    /// Escaped column reference of an `alias.property` path, with the column
    /// type when the alias is an entity.
    fn column_ref(&self, path: &str) -> Result<(String, Option<ColumnType>)> {
        let (alias, property) = split_path(path)?;
        let index = self
            .plan
            .index_of(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;
        let qualified = |column: &str| {
            format!("{}.{}", self.driver.escape(alias), self.driver.escape(column))
        };

        let Some(meta) = self.entity_of(index).transpose()? else {
            return Ok((qualified(property), None));
        };
        if let Some(column) = meta.column(property) {
            return Ok((qualified(&column.column_name), Some(column.column_type)));
        }
        if let Some(relation) = meta.relation(property) {
            if let Some(join) = &relation.join_column {
                let column_type = self
                    .registry
                    .target_of(relation)?
                    .column_by_name(&join.referenced_column)
                    .map(|c| c.column_type);
                return Ok((qualified(&join.name), column_type));
            }
        }
        Err(Error::UnknownProperty {
            alias: alias.to_string(),
            property: property.to_string(),
        })
    }

    fn bind(&mut self, value: Value, column_type: Option<ColumnType>) -> String {
        let value = match column_type {
            Some(column_type) => self.driver.prepare_persistent_value(value, column_type),
            None => value,
        };
        self.params.push(value);
        self.driver.placeholder(self.params.len())
    }

    fn comparison(&mut self, field: &str, op: &str, value: &Value) -> Result<String> {
        let (column, column_type) = self.column_ref(field)?;
        let placeholder = self.bind(value.clone(), column_type);
        Ok(format!("{column} {op} {placeholder}"))
    }

    fn list(&mut self, field: &str, op: &str, values: &[Value]) -> Result<String> {
        let (column, column_type) = self.column_ref(field)?;
        let mut placeholders = Vec::with_capacity(values.len());
        for value in values {
            placeholders.push(self.bind(value.clone(), column_type));
        }
        Ok(format!("{column} {op} ({})", placeholders.join(", ")))
    }

    fn filter_sql(&mut self, expr: &FilterExpr) -> Result<String> {
        Ok(match expr {
            FilterExpr::Eq { field, value } if value.is_null() => {
                format!("{} IS NULL", self.column_ref(field)?.0)
            }
            FilterExpr::Ne { field, value } if value.is_null() => {
                format!("{} IS NOT NULL", self.column_ref(field)?.0)
            }
            FilterExpr::Eq { field, value } => self.comparison(field, "=", value)?,
            FilterExpr::Ne { field, value } => self.comparison(field, "<>", value)?,
            FilterExpr::Lt { field, value } => self.comparison(field, "<", value)?,
            FilterExpr::Le { field, value } => self.comparison(field, "<=", value)?,
            FilterExpr::Gt { field, value } => self.comparison(field, ">", value)?,
            FilterExpr::Ge { field, value } => self.comparison(field, ">=", value)?,
            FilterExpr::In { values, .. } if values.is_empty() => "1 = 0".to_string(),
            FilterExpr::NotIn { values, .. } if values.is_empty() => "1 = 1".to_string(),
            FilterExpr::In { field, values } => self.list(field, "IN", values)?,
            FilterExpr::NotIn { field, values } => self.list(field, "NOT IN", values)?,
            FilterExpr::IsNull { field } => format!("{} IS NULL", self.column_ref(field)?.0),
            FilterExpr::IsNotNull { field } => {
                format!("{} IS NOT NULL", self.column_ref(field)?.0)
            }
            FilterExpr::Like { field, pattern } => {
                let column = self.column_ref(field)?.0;
                format!("{column} LIKE {}", self.bind(Value::String(pattern.clone()), None))
            }
            FilterExpr::NotLike { field, pattern } => {
                let column = self.column_ref(field)?.0;
                format!(
                    "{column} NOT LIKE {}",
                    self.bind(Value::String(pattern.clone()), None)
                )
            }
            FilterExpr::ColumnEq { field, other } => {
                format!("{} = {}", self.column_ref(field)?.0, self.column_ref(other)?.0)
            }
            FilterExpr::And(exprs) if exprs.is_empty() => "1 = 1".to_string(),
            FilterExpr::Or(exprs) if exprs.is_empty() => "1 = 0".to_string(),
            FilterExpr::And(exprs) => self.group(exprs, " AND ")?,
            FilterExpr::Or(exprs) => self.group(exprs, " OR ")?,
            FilterExpr::Not(inner) => format!("NOT ({})", self.filter_sql(inner)?),
        })
    }

    fn group(&mut self, exprs: &[FilterExpr], separator: &str) -> Result<String> {
        let mut parts = Vec::with_capacity(exprs.len());
        for expr in exprs {
            parts.push(self.filter_sql(expr)?);
        }
        Ok(format!("({})", parts.join(separator)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{blog_registry, RecordingDriver};
    use pretty_assertions::assert_eq;

    fn relation_join(kind: JoinKind, path: &str, alias: &str) -> JoinSpec {
        JoinSpec {
            kind,
            target: JoinTarget::Relation(path.to_string()),
            alias: alias.to_string(),
            select: true,
        }
    }

    #[test]
    fn test_select_with_many_to_one_join() {
        let registry = blog_registry();
        let driver = RecordingDriver::new();
        let plan = QueryPlan::build(
            &registry,
            "Post",
            "post",
            &[relation_join(JoinKind::Left, "post.author", "author")],
            &[],
        )
        .unwrap();

        let query = SqlCompiler::new(&driver, &registry, &plan)
            .select(
                Some(&FilterExpr::eq("post.title", "Hello")),
                &[OrderSpec::desc("post.id")],
                Pagination::default(),
            )
            .unwrap();

        assert_eq!(
            query.sql,
            "SELECT \"post\".\"id\" AS \"post__id\", \"post\".\"title\" AS \"post__title\", \
             \"post\".\"text\" AS \"post__text\", \"post\".\"author_id\" AS \"post__author_id\", \
             \"author\".\"id\" AS \"author__id\", \"author\".\"name\" AS \"author__name\" \
             FROM \"post\" \"post\" LEFT JOIN \"author\" \"author\" ON \"author\".\"id\" = \"post\".\"author_id\" \
             WHERE \"post\".\"title\" = ? ORDER BY \"post\".\"id\" DESC"
        );
        assert_eq!(query.params, vec![Value::String("Hello".into())]);
    }

    #[test]
    fn test_many_to_many_join_goes_through_junction() {
        let registry = blog_registry();
        let driver = RecordingDriver::new();
        let mut join = relation_join(JoinKind::Inner, "post.categories", "category");
        join.select = false;
        let plan = QueryPlan::build(&registry, "Post", "post", &[join], &[]).unwrap();

        let query = SqlCompiler::new(&driver, &registry, &plan)
            .select(
                Some(&FilterExpr::eq("category.name", "kids")),
                &[],
                Pagination::limit(5),
            )
            .unwrap();

        assert!(query.sql.contains(
            "INNER JOIN \"post_categories_category\" \"post__category__jt\" \
             ON \"post__category__jt\".\"post_id\" = \"post\".\"id\" \
             INNER JOIN \"category\" \"category\" ON \"category\".\"id\" = \"post__category__jt\".\"category_id\""
        ));
        assert!(!query.sql.contains("\"category__name\""));
        assert!(query.sql.ends_with("WHERE \"category\".\"name\" = ? LIMIT 5"));
    }

    #[test]
    fn test_filter_edge_cases() {
        let registry = blog_registry();
        let driver = RecordingDriver::new();
        let plan = QueryPlan::build(&registry, "Post", "post", &[], &[]).unwrap();

        let filter = FilterExpr::and(vec![
            FilterExpr::eq("post.text", Value::Null),
            FilterExpr::in_values("post.id", vec![]),
            FilterExpr::or(vec![
                FilterExpr::not_in_values("post.id", vec![]),
                FilterExpr::in_values("post.id", vec![Value::Int64(1), Value::Int64(2)]),
            ]),
            FilterExpr::eq("post.author", 3),
        ]);
        let query = SqlCompiler::new(&driver, &registry, &plan)
            .count(Some(&filter))
            .unwrap();

        assert_eq!(
            query.sql,
            "SELECT COUNT(*) AS \"cnt\" FROM (SELECT DISTINCT \"post\".\"id\" AS \"post__id\" \
             FROM \"post\" \"post\" WHERE (\"post\".\"text\" IS NULL AND 1 = 0 AND \
             (1 = 1 OR \"post\".\"id\" IN (?, ?)) AND \"post\".\"author_id\" = ?)) \"counted\""
        );
        assert_eq!(
            query.params,
            vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]
        );
    }

    #[test]
    fn test_unknown_alias_and_property() {
        let registry = blog_registry();
        let driver = RecordingDriver::new();

        let err = QueryPlan::build(
            &registry,
            "Post",
            "post",
            &[relation_join(JoinKind::Left, "missing.author", "author")],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownAlias(alias) if alias == "missing"));

        let plan = QueryPlan::build(&registry, "Post", "post", &[], &[]).unwrap();
        let err = SqlCompiler::new(&driver, &registry, &plan)
            .select(Some(&FilterExpr::eq("post.nope", 1)), &[], Pagination::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownProperty { .. }));
    }

    #[test]
    fn test_root_ids_group_by_root_key() {
        let registry = blog_registry();
        let driver = RecordingDriver::new();
        let plan = QueryPlan::build(
            &registry,
            "Author",
            "author",
            &[relation_join(JoinKind::Left, "author.posts", "post")],
            &[],
        )
        .unwrap();

        let query = SqlCompiler::new(&driver, &registry, &plan)
            .root_ids(
                None,
                &[OrderSpec::asc("post.title"), OrderSpec::desc("author.name")],
                Pagination::limit(2),
            )
            .unwrap();

        assert_eq!(
            query.sql,
            "SELECT \"author\".\"id\" AS \"author__id\", \
             MIN(\"post\".\"title\") AS \"__order_0\", MAX(\"author\".\"name\") AS \"__order_1\" \
             FROM \"author\" \"author\" LEFT JOIN \"post\" \"post\" ON \"post\".\"author_id\" = \"author\".\"id\" \
             GROUP BY \"author\".\"id\" ORDER BY \"__order_0\" ASC, \"__order_1\" DESC LIMIT 2"
        );
    }

    #[test]
    fn test_junction_alias_does_not_clash_with_user_alias() {
        let registry = blog_registry();
        let driver = RecordingDriver::new();
        let plan = QueryPlan::build(
            &registry,
            "Post",
            "post",
            &[
                relation_join(JoinKind::Left, "post.categories", "category"),
                relation_join(JoinKind::Left, "category.posts", "post_category"),
            ],
            &[],
        )
        .unwrap();

        let sql = SqlCompiler::new(&driver, &registry, &plan)
            .select(None, &[], Pagination::default())
            .unwrap()
            .sql;
        assert!(sql.contains("\"post_categories_category\" \"post__category__jt\""));
        assert!(sql.contains("\"post_categories_category\" \"category__post_category__jt\""));
        assert!(sql.contains("\"post\" \"post_category\" ON"));
    }

    #[test]
    fn test_alias_with_label_separator_is_rejected() {
        let registry = blog_registry();

        let err = QueryPlan::build(&registry, "Post", "a__b", &[], &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidAlias(alias) if alias == "a__b"));

        let err = QueryPlan::build(
            &registry,
            "Post",
            "post",
            &[relation_join(JoinKind::Left, "post.author", "post__author")],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidAlias(alias) if alias == "post__author"));
    }

    #[test]
    fn test_fan_out_detection() {
        let registry = blog_registry();
        let to_one = QueryPlan::build(
            &registry,
            "Post",
            "post",
            &[relation_join(JoinKind::Left, "post.author", "author")],
            &[],
        )
        .unwrap();
        assert!(!to_one.fans_out(&registry).unwrap());

        let to_many = QueryPlan::build(
            &registry,
            "Author",
            "author",
            &[relation_join(JoinKind::Left, "author.posts", "post")],
            &[],
        )
        .unwrap();
        assert!(to_many.fans_out(&registry).unwrap());
    }
}
