//! Runtime entity instances.
//!
//! An [`EntityRef`] is a shared handle to one in-memory entity. Several
//! handles may point to the same instance, which is how an object graph with
//! cycles (a post and its author's post list) is represented. Identity of a
//! handle is the instance it points to.

mod lazy;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use ormflow_proto::Value;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use lazy::{LazyRelation, LazyState};
pub(crate) use lazy::LazyLoader;

use crate::metadata::EntityKey;

/// Loaded value of a relation property.
#[derive(Clone)]
pub enum Related {
    /// To-one relation, possibly empty.
    One(Option<EntityRef>),
    /// To-many relation.
    Many(Vec<EntityRef>),
}

impl Related {
    /// All related entities.
    pub fn entities(&self) -> Vec<EntityRef> {
        match self {
            Related::One(one) => one.iter().cloned().collect(),
            Related::Many(many) => many.clone(),
        }
    }

    /// The single related entity, for to-one relations.
    pub fn into_one(self) -> Option<EntityRef> {
        match self {
            Related::One(one) => one,
            Related::Many(many) => many.into_iter().next(),
        }
    }

    /// Related entities as a list.
    pub fn into_many(self) -> Vec<EntityRef> {
        match self {
            Related::One(one) => one.into_iter().collect(),
            Related::Many(many) => many,
        }
    }

    /// Number of related entities.
    pub fn len(&self) -> usize {
        match self {
            Related::One(one) => usize::from(one.is_some()),
            Related::Many(many) => many.len(),
        }
    }

    /// Check if nothing is related.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Related {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Related::One(None) => f.write_str("One(None)"),
            Related::One(Some(entity)) => write!(f, "One({})", entity.label()),
            Related::Many(many) => write!(f, "Many({} entities)", many.len()),
        }
    }
}

/// Value held by a relation property.
#[derive(Clone)]
pub enum RelationValue {
    /// Loaded to-one value.
    One(Option<EntityRef>),
    /// Loaded to-many value.
    Many(Vec<EntityRef>),
    /// Deferred value, loaded on first access.
    Lazy(LazyRelation),
}

impl RelationValue {
    /// The loaded value, if any. An unresolved lazy value has none.
    pub fn resolved(&self) -> Option<Related> {
        match self {
            RelationValue::One(one) => Some(Related::One(one.clone())),
            RelationValue::Many(many) => Some(Related::Many(many.clone())),
            RelationValue::Lazy(lazy) => lazy.peek(),
        }
    }

    /// Wrap a loaded value, keeping it lazy-shaped for lazy relations.
    pub fn loaded(value: Related, lazy: bool) -> Self {
        match (value, lazy) {
            (value, true) => RelationValue::Lazy(LazyRelation::resolved(value)),
            (Related::One(one), false) => RelationValue::One(one),
            (Related::Many(many), false) => RelationValue::Many(many),
        }
    }
}

impl fmt::Debug for RelationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationValue::Lazy(lazy) => write!(f, "Lazy({:?})", lazy.peek()),
            other => match other.resolved() {
                Some(related) => related.fmt(f),
                None => f.write_str("None"),
            },
        }
    }
}

/// Column values and relation membership recorded when an instance was last
/// loaded or persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Snapshot {
    pub values: BTreeMap<String, Value>,
    pub foreign_keys: BTreeMap<String, Value>,
    pub members: BTreeMap<String, BTreeSet<EntityKey>>,
}

/// State of one entity instance.
pub struct EntityData {
    entity: String,
    values: BTreeMap<String, Value>,
    relations: BTreeMap<String, RelationValue>,
    foreign_keys: BTreeMap<String, Value>,
    snapshot: Option<Snapshot>,
}

impl EntityData {
    /// Create an empty instance of an entity.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            values: BTreeMap::new(),
            relations: BTreeMap::new(),
            foreign_keys: BTreeMap::new(),
            snapshot: None,
        }
    }

    /// Entity name.
    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    /// Get a column value by property name.
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    /// Set a column value.
    pub fn set(&mut self, property: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(property.into(), value.into());
    }

    /// Remove a column value.
    pub fn unset(&mut self, property: &str) -> Option<Value> {
        self.values.remove(property)
    }

    /// All column values, by property name.
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Get a relation value.
    pub fn relation(&self, property: &str) -> Option<&RelationValue> {
        self.relations.get(property)
    }

    /// Set a relation value, replacing any cached lazy value.
    pub fn set_relation(&mut self, property: impl Into<String>, value: RelationValue) {
        self.relations.insert(property.into(), value);
    }

    /// All relation values, by property name.
    pub fn relations(&self) -> &BTreeMap<String, RelationValue> {
        &self.relations
    }

    /// Raw foreign-key value of a relation, as last read from the database.
    pub fn foreign_key(&self, property: &str) -> Option<&Value> {
        self.foreign_keys.get(property)
    }

    pub(crate) fn foreign_keys(&self) -> &BTreeMap<String, Value> {
        &self.foreign_keys
    }

    pub(crate) fn set_foreign_key(&mut self, property: impl Into<String>, value: Value) {
        self.foreign_keys.insert(property.into(), value);
    }

    pub(crate) fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub(crate) fn set_snapshot(&mut self, snapshot: Option<Snapshot>) {
        self.snapshot = snapshot;
    }

    /// Check if this instance was loaded from or saved to the database.
    pub fn is_tracked(&self) -> bool {
        self.snapshot.is_some()
    }
}

impl fmt::Debug for EntityData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityData")
            .field("entity", &self.entity)
            .field("values", &self.values)
            .field("relations", &self.relations)
            .finish()
    }
}

/// Shared handle to an entity instance.
#[derive(Clone)]
pub struct EntityRef(Arc<RwLock<EntityData>>);

impl EntityRef {
    /// Create an empty instance of an entity.
    pub fn new(entity: impl Into<String>) -> Self {
        Self::from_data(EntityData::new(entity))
    }

    /// Wrap existing data.
    pub fn from_data(data: EntityData) -> Self {
        Self(Arc::new(RwLock::new(data)))
    }

    /// Lock for reading. Do not hold across an `.await`.
    pub fn read(&self) -> RwLockReadGuard<'_, EntityData> {
        self.0.read()
    }

    /// Lock for writing. Do not hold across an `.await`.
    pub fn write(&self) -> RwLockWriteGuard<'_, EntityData> {
        self.0.write()
    }

    /// Entity name.
    pub fn entity_name(&self) -> String {
        self.read().entity.clone()
    }

    /// Get a column value.
    pub fn get(&self, property: &str) -> Option<Value> {
        self.read().get(property).cloned()
    }

    /// Set a column value.
    pub fn set(&self, property: impl Into<String>, value: impl Into<Value>) {
        self.write().set(property, value);
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(property, value);
        self
    }

    /// Set a to-one relation.
    pub fn set_one(&self, property: impl Into<String>, related: Option<EntityRef>) {
        self.write()
            .set_relation(property, RelationValue::One(related));
    }

    /// Set a to-many relation.
    pub fn set_many(&self, property: impl Into<String>, related: Vec<EntityRef>) {
        self.write()
            .set_relation(property, RelationValue::Many(related));
    }

    /// Set a relation to a deferred value.
    pub fn set_lazy(&self, property: impl Into<String>, lazy: LazyRelation) {
        self.write().set_relation(property, RelationValue::Lazy(lazy));
    }

    /// Get a relation value.
    pub fn relation(&self, property: &str) -> Option<RelationValue> {
        self.read().relation(property).cloned()
    }

    /// The loaded single value of a to-one relation.
    pub fn one(&self, property: &str) -> Option<EntityRef> {
        self.relation(property)
            .and_then(|value| value.resolved())
            .and_then(Related::into_one)
    }

    /// The loaded members of a to-many relation.
    pub fn many(&self, property: &str) -> Vec<EntityRef> {
        self.relation(property)
            .and_then(|value| value.resolved())
            .map(Related::into_many)
            .unwrap_or_default()
    }

    /// The deferred accessor of a lazy relation.
    pub fn lazy(&self, property: &str) -> Option<LazyRelation> {
        match self.relation(property)? {
            RelationValue::Lazy(lazy) => Some(lazy),
            _ => None,
        }
    }

    /// Check if two handles point to the same instance.
    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the instance, stable while any handle is alive.
    pub(crate) fn instance_id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    fn label(&self) -> String {
        match self.0.try_read() {
            Some(data) => format!("{}{:?}", data.entity, data.values.values().next()),
            None => "<locked>".to_string(),
        }
    }

    /// Plain JSON view of the instance and its loaded relations.
    ///
    /// Instances reached a second time on the same path are cut off, so
    /// cyclic graphs serialize finitely. Unresolved lazy relations are left out.
    pub fn to_json(&self) -> serde_json::Value {
        let mut path = HashSet::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut HashSet<usize>) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        let (values, relations) = {
            let data = self.read();
            (data.values.clone(), data.relations.clone())
        };
        for (property, value) in values {
            object.insert(property, value_to_json(&value));
        }

        if path.insert(self.instance_id()) {
            for (property, relation) in relations {
                let json = match relation.resolved() {
                    Some(Related::One(Some(entity))) => entity.to_json_inner(path),
                    Some(Related::One(None)) => serde_json::Value::Null,
                    Some(Related::Many(many)) => serde_json::Value::Array(
                        many.iter().map(|entity| entity.to_json_inner(path)).collect(),
                    ),
                    None => continue,
                };
                object.insert(property, json);
            }
            path.remove(&self.instance_id());
        }

        serde_json::Value::Object(object)
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int32(i) => serde_json::Value::from(*i),
        Value::Int64(i) | Value::Timestamp(i) => serde_json::Value::from(*i),
        Value::Float64(f) => serde_json::Value::from(*f),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::Array(b.iter().map(|x| (*x).into()).collect()),
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Some(data) => f
                .debug_struct("EntityRef")
                .field("entity", &data.entity)
                .field("values", &data.values)
                .finish(),
            None => f.write_str("EntityRef(<locked>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let post = EntityRef::new("Post")
            .with("title", "Hello post")
            .with("viewCount", 0);
        assert_eq!(post.get("title"), Some(Value::String("Hello post".into())));
        assert_eq!(post.get("text"), None);
        assert_eq!(post.entity_name(), "Post");
    }

    #[test]
    fn test_relations_and_identity() {
        let author = EntityRef::new("Author").with("name", "Umed");
        let post = EntityRef::new("Post");
        post.set_one("author", Some(author.clone()));

        assert!(post.one("author").unwrap().ptr_eq(&author));
        assert!(post.many("categories").is_empty());
        assert!(!author.ptr_eq(&EntityRef::new("Author")));
    }

    #[test]
    fn test_to_json_cuts_cycles() {
        let author = EntityRef::new("Author").with("id", 1);
        let post = EntityRef::new("Post").with("id", 7);
        post.set_one("author", Some(author.clone()));
        author.set_many("posts", vec![post.clone()]);

        assert_eq!(
            post.to_json(),
            json!({ "id": 7, "author": { "id": 1, "posts": [ { "id": 7 } ] } })
        );
    }

    #[test]
    fn test_resolved_lazy_relation_is_loaded() {
        let category = EntityRef::new("Category").with("name", "kids");
        let post = EntityRef::new("Post");
        post.set_lazy(
            "categories",
            LazyRelation::resolved(Related::Many(vec![category.clone()])),
        );

        assert_eq!(post.many("categories").len(), 1);
        assert!(post.lazy("categories").unwrap().is_resolved());
    }
}
