//! Integration tests for closure-table trees against SQLite.

use std::sync::Arc;

use ormflow::{
    CascadeFlags, ColumnDescriptor, ColumnType, Connection, ConnectionOptions, Driver,
    EntityDescriptor, EntityRef, RelationDescriptor, SqliteDriver, TreeRepository, Value,
};

const SCHEMA: &str = "
    CREATE TABLE category (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        parent_id INTEGER REFERENCES category(id)
    );
    CREATE TABLE category_closure (
        ancestor INTEGER NOT NULL,
        descendant INTEGER NOT NULL,
        depth INTEGER NOT NULL,
        PRIMARY KEY (ancestor, descendant)
    );
";

struct TestContext {
    connection: Connection,
    driver: Arc<SqliteDriver>,
    categories: TreeRepository,
}

impl TestContext {
    async fn new() -> Self {
        let driver = Arc::new(SqliteDriver::memory());
        let connection = Connection::builder(ConnectionOptions::sqlite_memory())
            .with_entity(category())
            .connect_with_driver(driver.clone())
            .await
            .unwrap();
        driver.execute_script(SCHEMA).unwrap();
        let categories = connection.tree_repository("Category").unwrap();

        Self {
            connection,
            driver,
            categories,
        }
    }

    fn node(&self, name: &str, parent: Option<&EntityRef>) -> EntityRef {
        let node = self.categories.create().unwrap().with("name", name);
        node.set_one("parent", parent.cloned());
        node
    }

    /// root
    /// ├── a
    /// │   └── a1
    /// └── b
    async fn seed(&self) -> [EntityRef; 4] {
        let root = self.node("root", None);
        let a = self.node("a", Some(&root));
        let a1 = self.node("a1", Some(&a));
        let b = self.node("b", Some(&root));
        self.categories.persist(&a1).await.unwrap();
        self.categories.persist(&b).await.unwrap();
        [root, a, a1, b]
    }

    async fn depth(&self, ancestor: &EntityRef, descendant: &EntityRef) -> Option<Value> {
        let rows = self
            .driver
            .query(
                "SELECT depth FROM category_closure WHERE ancestor = ? AND descendant = ?",
                &[ancestor.get("id").unwrap(), descendant.get("id").unwrap()],
            )
            .await
            .unwrap();
        rows.first().and_then(|row| row.get("depth").cloned())
    }
}

fn category() -> EntityDescriptor {
    EntityDescriptor::new("Category")
        .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
        .with_column(ColumnDescriptor::new("name", ColumnType::String))
        .with_relation(
            RelationDescriptor::tree_parent("parent", "Category")
                .with_cascade(CascadeFlags::persist()),
        )
        .with_relation(RelationDescriptor::tree_children("children", "Category", "parent"))
        .with_closure_tree()
}

fn names(nodes: &[EntityRef]) -> Vec<String> {
    let mut names: Vec<String> = nodes
        .iter()
        .filter_map(|node| node.get("name").and_then(|name| name.as_str().map(str::to_string)))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_closure_rows_written_on_insert() {
    let ctx = TestContext::new().await;
    let [root, a, a1, b] = ctx.seed().await;

    assert_eq!(ctx.depth(&root, &root).await, Some(Value::Int64(0)));
    assert_eq!(ctx.depth(&root, &a).await, Some(Value::Int64(1)));
    assert_eq!(ctx.depth(&root, &a1).await, Some(Value::Int64(2)));
    assert_eq!(ctx.depth(&a, &a1).await, Some(Value::Int64(1)));
    assert_eq!(ctx.depth(&b, &a1).await, None);
}

#[tokio::test]
async fn test_find_roots_and_descendants() {
    let ctx = TestContext::new().await;
    let [root, a, a1, _] = ctx.seed().await;

    let roots = ctx.categories.find_roots().await.unwrap();
    assert_eq!(names(&roots), vec!["root"]);

    let descendants = ctx.categories.find_descendants(&root).await.unwrap();
    assert_eq!(names(&descendants), vec!["a", "a1", "b", "root"]);
    assert_eq!(names(&ctx.categories.find_descendants(&a).await.unwrap()), vec!["a", "a1"]);

    assert_eq!(ctx.categories.count_descendants(&root).await.unwrap(), 4);
    assert_eq!(ctx.categories.count_descendants(&a1).await.unwrap(), 1);
}

#[tokio::test]
async fn test_find_ancestors() {
    let ctx = TestContext::new().await;
    let [root, _, a1, b] = ctx.seed().await;

    let ancestors = ctx.categories.find_ancestors(&a1).await.unwrap();
    assert_eq!(names(&ancestors), vec!["a", "a1", "root"]);
    assert_eq!(ctx.categories.count_ancestors(&a1).await.unwrap(), 3);
    assert_eq!(ctx.categories.count_ancestors(&b).await.unwrap(), 2);
    assert_eq!(ctx.categories.count_ancestors(&root).await.unwrap(), 1);
}

#[tokio::test]
async fn test_descendants_tree_nests_children() {
    let ctx = TestContext::new().await;
    let [root, ..] = ctx.seed().await;

    let tree = ctx.categories.find_descendants_tree(&root).await.unwrap();
    let children = tree.many("children");
    assert_eq!(names(&children), vec!["a", "b"]);

    let a = children
        .iter()
        .find(|child| child.get("name") == Some(Value::from("a")))
        .unwrap();
    assert_eq!(names(&a.many("children")), vec!["a1"]);
}

#[tokio::test]
async fn test_ancestors_tree_chains_parents() {
    let ctx = TestContext::new().await;
    let [_, _, a1, _] = ctx.seed().await;

    let leaf = ctx.categories.find_ancestors_tree(&a1).await.unwrap();
    let parent = leaf.one("parent").unwrap();
    assert_eq!(parent.get("name"), Some(Value::from("a")));
    let grandparent = parent.one("parent").unwrap();
    assert_eq!(grandparent.get("name"), Some(Value::from("root")));
    assert!(grandparent.one("parent").is_none());
}

#[tokio::test]
async fn test_descendants_query_builder_filters_subtree() {
    let ctx = TestContext::new().await;
    let [root, ..] = ctx.seed().await;

    let builder = ctx
        .categories
        .create_descendants_query_builder("category", "closure", &root)
        .unwrap()
        .and_where(ormflow::FilterExpr::eq("closure.depth", 1));
    let children = builder.get_results().await.unwrap();
    assert_eq!(names(&children), vec!["a", "b"]);
}

#[tokio::test]
async fn test_removed_leaf_leaves_the_closure() {
    let ctx = TestContext::new().await;
    let [root, _, a1, _] = ctx.seed().await;

    ctx.categories.remove(&a1).await.unwrap();
    assert_eq!(ctx.categories.count_descendants(&root).await.unwrap(), 3);
    assert!(ctx.connection.is_connected());
}
