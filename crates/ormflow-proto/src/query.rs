//! Predicate, ordering and pagination types for alias-based queries.
//!
//! Field references are alias paths such as `"post.title"`: the segment before
//! the dot names a query alias, the segment after it a property of the entity
//! bound to that alias.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Where-predicate tree.
///
/// Comparison leaves always carry their right-hand side as a [`Value`], which
/// is compiled into a bound parameter, never into the SQL text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    /// Field equals value.
    Eq { field: String, value: Value },
    /// Field not equals value.
    Ne { field: String, value: Value },
    /// Field less than value.
    Lt { field: String, value: Value },
    /// Field less than or equal to value.
    Le { field: String, value: Value },
    /// Field greater than value.
    Gt { field: String, value: Value },
    /// Field greater than or equal to value.
    Ge { field: String, value: Value },
    /// Field is in a set of values.
    In { field: String, values: Vec<Value> },
    /// Field is not in a set of values.
    NotIn { field: String, values: Vec<Value> },
    /// Field is null.
    IsNull { field: String },
    /// Field is not null.
    IsNotNull { field: String },
    /// Field matches a LIKE pattern.
    Like { field: String, pattern: String },
    /// Field does not match a LIKE pattern.
    NotLike { field: String, pattern: String },
    /// Two alias paths refer to equal values.
    ColumnEq { field: String, other: String },
    /// All conditions must be true.
    And(Vec<FilterExpr>),
    /// At least one condition must be true.
    Or(Vec<FilterExpr>),
    /// Negated condition.
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than filter.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than-or-equal filter.
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Le {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than filter.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than-or-equal filter.
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Ge {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an IN filter.
    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::In {
            field: field.into(),
            values,
        }
    }

    /// Create a NOT IN filter.
    pub fn not_in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::NotIn {
            field: field.into(),
            values,
        }
    }

    /// Create an IS NULL filter.
    pub fn is_null(field: impl Into<String>) -> Self {
        FilterExpr::IsNull {
            field: field.into(),
        }
    }

    /// Create an IS NOT NULL filter.
    pub fn is_not_null(field: impl Into<String>) -> Self {
        FilterExpr::IsNotNull {
            field: field.into(),
        }
    }

    /// Create a LIKE filter.
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        FilterExpr::Like {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    /// Create a NOT LIKE filter.
    pub fn not_like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        FilterExpr::NotLike {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    /// Compare two alias paths, e.g. a closure column against an entity key.
    pub fn column_eq(field: impl Into<String>, other: impl Into<String>) -> Self {
        FilterExpr::ColumnEq {
            field: field.into(),
            other: other.into(),
        }
    }

    /// Create an AND filter.
    pub fn and(exprs: Vec<FilterExpr>) -> Self {
        FilterExpr::And(exprs)
    }

    /// Create an OR filter.
    pub fn or(exprs: Vec<FilterExpr>) -> Self {
        FilterExpr::Or(exprs)
    }

    /// Negate a filter.
    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: FilterExpr) -> Self {
        FilterExpr::Not(Box::new(expr))
    }

    /// Conjoin with another expression, flattening nested ANDs.
    pub fn and_also(self, other: FilterExpr) -> Self {
        match self {
            FilterExpr::And(mut exprs) => {
                exprs.push(other);
                FilterExpr::And(exprs)
            }
            expr => FilterExpr::And(vec![expr, other]),
        }
    }

    /// Disjoin with another expression, flattening nested ORs.
    pub fn or_else(self, other: FilterExpr) -> Self {
        match self {
            FilterExpr::Or(mut exprs) => {
                exprs.push(other);
                FilterExpr::Or(exprs)
            }
            expr => FilterExpr::Or(vec![expr, other]),
        }
    }

    /// Collect every alias path referenced by this expression.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FilterExpr::Eq { field, .. }
            | FilterExpr::Ne { field, .. }
            | FilterExpr::Lt { field, .. }
            | FilterExpr::Le { field, .. }
            | FilterExpr::Gt { field, .. }
            | FilterExpr::Ge { field, .. }
            | FilterExpr::In { field, .. }
            | FilterExpr::NotIn { field, .. }
            | FilterExpr::IsNull { field }
            | FilterExpr::IsNotNull { field }
            | FilterExpr::Like { field, .. }
            | FilterExpr::NotLike { field, .. } => out.push(field),
            FilterExpr::ColumnEq { field, other } => {
                out.push(field);
                out.push(other);
            }
            FilterExpr::And(exprs) | FilterExpr::Or(exprs) => {
                for expr in exprs {
                    expr.collect_fields(out);
                }
            }
            FilterExpr::Not(expr) => expr.collect_fields(out),
        }
    }
}

/// Order specification for sorting results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Alias path to order by.
    pub field: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create an ascending order spec.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order spec.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

impl OrderDirection {
    /// SQL keyword for this direction.
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Pagination parameters, counted in root entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of results to return.
    pub limit: Option<u32>,
    /// Number of results to skip.
    pub offset: u32,
}

impl Pagination {
    /// Create pagination with limit and offset.
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }

    /// Create pagination with just a limit.
    pub fn limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: 0,
        }
    }

    /// Create pagination with just an offset.
    pub fn offset(offset: u32) -> Self {
        Self {
            limit: None,
            offset,
        }
    }

    /// Whether this pagination restricts anything.
    pub fn is_unbounded(&self) -> bool {
        self.limit.is_none() && self.offset == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_also_flattens() {
        let filter = FilterExpr::eq("post.title", "Hello")
            .and_also(FilterExpr::is_not_null("post.text"))
            .and_also(FilterExpr::gt("post.id", 3));

        if let FilterExpr::And(exprs) = &filter {
            assert_eq!(exprs.len(), 3);
        } else {
            panic!("Expected And filter");
        }
    }

    #[test]
    fn test_or_else_flattens() {
        let filter = FilterExpr::eq("c.name", "kids")
            .or_else(FilterExpr::eq("c.name", "people"))
            .or_else(FilterExpr::eq("c.name", "animals"));

        if let FilterExpr::Or(exprs) = &filter {
            assert_eq!(exprs.len(), 3);
        } else {
            panic!("Expected Or filter");
        }
    }

    #[test]
    fn test_fields_collects_nested_paths() {
        let filter = FilterExpr::and(vec![
            FilterExpr::eq("post.title", "Hello"),
            FilterExpr::not(FilterExpr::or(vec![
                FilterExpr::is_null("author.name"),
                FilterExpr::column_eq("closure.ancestor", "node.id"),
            ])),
        ]);

        assert_eq!(
            filter.fields(),
            vec!["post.title", "author.name", "closure.ancestor", "node.id"]
        );
    }

    #[test]
    fn test_pagination_builders() {
        assert_eq!(Pagination::new(10, 20).limit, Some(10));
        assert_eq!(Pagination::offset(5).limit, None);
        assert!(Pagination::default().is_unbounded());
        assert!(!Pagination::limit(1).is_unbounded());
    }

    #[test]
    fn test_filter_json_roundtrip() {
        let filter = FilterExpr::and(vec![
            FilterExpr::eq("post.title", "Hello"),
            FilterExpr::in_values("post.id", vec![Value::Int64(1), Value::Int64(2)]),
        ]);
        let json = serde_json::to_string(&filter).unwrap();
        let back: FilterExpr = serde_json::from_str(&json).unwrap();
        assert_eq!(filter, back);
    }
}
