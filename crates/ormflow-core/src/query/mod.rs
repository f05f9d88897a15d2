//! Relational query builder.
//!
//! Queries are rooted at one entity alias and extended with relation joins
//! addressed as `alias.property`. Execution compiles to a single SQL
//! statement (two when paginating over to-many joins) and hydrates the flat
//! rows back into an entity graph.

mod builder;
mod compiler;
mod hydrator;

use ormflow_proto::{FilterExpr, OrderSpec, Pagination, Value};

pub use builder::QueryBuilder;
pub(crate) use compiler::column_label;

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Rows without a match are dropped.
    Inner,
    /// Rows without a match are kept with nulls.
    Left,
}

impl JoinKind {
    fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// SQL text with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Options of a repository find.
///
/// Relations declared eager on the root entity are joined automatically
/// unless [`without_eager`](Self::without_eager) is set.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub alias: Option<String>,
    pub filter: Option<FilterExpr>,
    pub order: Vec<OrderSpec>,
    pub pagination: Pagination,
    pub joins: Vec<(JoinKind, String, String)>,
    pub skip_eager: bool,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias of the root entity. Defaults to the snake-cased entity name.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, order: OrderSpec) -> Self {
        self.order.push(order);
        self
    }

    pub fn skip(mut self, offset: u32) -> Self {
        self.pagination.offset = offset;
        self
    }

    pub fn take(mut self, limit: u32) -> Self {
        self.pagination.limit = Some(limit);
        self
    }

    /// Left-join and select a relation, e.g. `("post.categories", "category")`.
    pub fn left_join_and_select(mut self, path: impl Into<String>, alias: impl Into<String>) -> Self {
        self.joins.push((JoinKind::Left, path.into(), alias.into()));
        self
    }

    /// Inner-join and select a relation.
    pub fn inner_join_and_select(
        mut self,
        path: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        self.joins.push((JoinKind::Inner, path.into(), alias.into()));
        self
    }

    /// Do not join eager relations.
    pub fn without_eager(mut self) -> Self {
        self.skip_eager = true;
        self
    }
}
