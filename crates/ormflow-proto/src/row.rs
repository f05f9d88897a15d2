//! Flat result rows returned by drivers.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One result row: an ordered list of `(column label, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column.
    pub fn push(&mut self, label: impl Into<String>, value: Value) {
        self.columns.push((label.into(), value));
    }

    /// Builder form of [`Row::push`].
    pub fn with(mut self, label: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(label, value.into());
        self
    }

    /// Look a column up by its label.
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| value)
    }

    /// Whether the row carries a column with this label.
    pub fn contains(&self, label: &str) -> bool {
        self.columns.iter().any(|(name, _)| name == label)
    }

    /// Value at a position.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.columns.get(index).map(|(_, value)| value)
    }

    /// All columns in result order.
    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup() {
        let row = Row::new()
            .with("post__id", 1i64)
            .with("post__title", "Hello");

        assert_eq!(row.len(), 2);
        assert_eq!(row.get("post__id"), Some(&Value::Int64(1)));
        assert_eq!(row.get_index(1), Some(&Value::String("Hello".into())));
        assert!(row.contains("post__title"));
        assert!(row.get("post__text").is_none());
    }
}
