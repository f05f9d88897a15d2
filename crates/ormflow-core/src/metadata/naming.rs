//! Naming strategies for tables, columns and junction tables.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use convert_case::{Case, Casing};

use super::error::ConfigurationError;

/// Name of the strategy used when none is configured.
pub const DEFAULT_NAMING_STRATEGY: &str = "default";

/// Derives physical names for anything a descriptor leaves unnamed.
pub trait NamingStrategy: Send + Sync + fmt::Debug {
    /// Name the strategy is registered under.
    fn name(&self) -> &str;

    /// Table name for an entity.
    fn table_name(&self, entity_name: &str, user_specified: Option<&str>) -> String;

    /// Column name for a property.
    fn column_name(&self, property: &str, user_specified: Option<&str>) -> String;

    /// Foreign-key column for a relation property.
    fn join_column_name(&self, relation_property: &str, referenced_column: &str) -> String;

    /// Junction table of a many-to-many relation.
    fn join_table_name(&self, owner_table: &str, inverse_table: &str, owner_property: &str)
        -> String;

    /// Junction column referencing `column` of `table`.
    fn join_table_column_name(&self, table: &str, column: &str) -> String;

    /// Closure table of a tree entity.
    fn closure_table_name(&self, table: &str) -> String {
        format!("{table}_closure")
    }
}

/// Keeps property names as column names.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNamingStrategy;

impl NamingStrategy for DefaultNamingStrategy {
    fn name(&self) -> &str {
        DEFAULT_NAMING_STRATEGY
    }

    fn table_name(&self, entity_name: &str, user_specified: Option<&str>) -> String {
        user_specified
            .map(str::to_string)
            .unwrap_or_else(|| entity_name.to_case(Case::Snake))
    }

    fn column_name(&self, property: &str, user_specified: Option<&str>) -> String {
        user_specified.unwrap_or(property).to_string()
    }

    fn join_column_name(&self, relation_property: &str, referenced_column: &str) -> String {
        format!("{relation_property}_{referenced_column}")
    }

    fn join_table_name(
        &self,
        owner_table: &str,
        inverse_table: &str,
        owner_property: &str,
    ) -> String {
        format!("{owner_table}_{owner_property}_{inverse_table}")
    }

    fn join_table_column_name(&self, table: &str, column: &str) -> String {
        format!("{table}_{column}")
    }
}

/// Converts every derived name to snake_case.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeCaseNamingStrategy;

impl NamingStrategy for SnakeCaseNamingStrategy {
    fn name(&self) -> &str {
        "snake_case"
    }

    fn table_name(&self, entity_name: &str, user_specified: Option<&str>) -> String {
        user_specified
            .map(str::to_string)
            .unwrap_or_else(|| entity_name.to_case(Case::Snake))
    }

    fn column_name(&self, property: &str, user_specified: Option<&str>) -> String {
        user_specified
            .map(str::to_string)
            .unwrap_or_else(|| property.to_case(Case::Snake))
    }

    fn join_column_name(&self, relation_property: &str, referenced_column: &str) -> String {
        format!(
            "{}_{}",
            relation_property.to_case(Case::Snake),
            referenced_column
        )
    }

    fn join_table_name(
        &self,
        owner_table: &str,
        inverse_table: &str,
        owner_property: &str,
    ) -> String {
        format!(
            "{}_{}_{}",
            owner_table,
            owner_property.to_case(Case::Snake),
            inverse_table
        )
    }

    fn join_table_column_name(&self, table: &str, column: &str) -> String {
        format!("{table}_{}", column.to_case(Case::Snake))
    }
}

/// Naming strategies available to a connection, by name.
#[derive(Debug, Clone)]
pub struct NamingStrategyRegistry {
    strategies: HashMap<String, Arc<dyn NamingStrategy>>,
}

impl NamingStrategyRegistry {
    /// Registry holding the built-in strategies.
    pub fn new() -> Self {
        let mut registry = Self {
            strategies: HashMap::new(),
        };
        registry.register(Arc::new(DefaultNamingStrategy));
        registry.register(Arc::new(SnakeCaseNamingStrategy));
        registry
    }

    /// Register a strategy, replacing one of the same name.
    pub fn register(&mut self, strategy: Arc<dyn NamingStrategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    /// Look up a strategy. `None` selects the default one.
    pub fn resolve(
        &self,
        name: Option<&str>,
        connection: &str,
    ) -> Result<Arc<dyn NamingStrategy>, ConfigurationError> {
        let name = name.unwrap_or(DEFAULT_NAMING_STRATEGY);
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::NamingStrategyNotFound {
                strategy: name.to_string(),
                connection: connection.to_string(),
            })
    }

    /// Registered strategy names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }
}

impl Default for NamingStrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let naming = DefaultNamingStrategy;
        assert_eq!(naming.table_name("PostAuthor", None), "post_author");
        assert_eq!(naming.table_name("PostAuthor", Some("sample3_author")), "sample3_author");
        assert_eq!(naming.column_name("viewCount", None), "viewCount");
        assert_eq!(naming.join_column_name("author", "id"), "author_id");
        assert_eq!(naming.join_table_name("post", "category", "categories"), "post_categories_category");
        assert_eq!(naming.join_table_column_name("post", "id"), "post_id");
        assert_eq!(naming.closure_table_name("category"), "category_closure");
    }

    #[test]
    fn test_snake_case_names() {
        let naming = SnakeCaseNamingStrategy;
        assert_eq!(naming.column_name("viewCount", None), "view_count");
        assert_eq!(naming.column_name("viewCount", Some("views")), "views");
        assert_eq!(naming.join_column_name("postDetails", "id"), "post_details_id");
        assert_eq!(
            naming.join_table_name("post", "category", "twoSideCategories"),
            "post_two_side_categories_category"
        );
    }

    #[test]
    fn test_resolve_unknown_strategy() {
        let registry = NamingStrategyRegistry::new();
        assert_eq!(registry.resolve(None, "default").unwrap().name(), "default");
        assert_eq!(
            registry.resolve(Some("snake_case"), "default").unwrap().name(),
            "snake_case"
        );

        let err = registry.resolve(Some("my_strategy"), "test").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Naming strategy \"my_strategy\" was not found. Looks like this naming strategy does not exist or it was not registered in current \"test\" connection?"
        );
    }
}
