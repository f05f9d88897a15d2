//! Sample scenarios. Each opens its own connection and creates the tables it
//! needs.

use std::sync::Arc;

use ormflow::{
    CascadeFlags, ColumnDescriptor, ColumnType, Connection, ConnectionOptions, EntityDescriptor,
    EntityRef, FilterExpr, FindOptions, ListenerKind, MemoryReporter, RelationDescriptor, Reporter,
    Value,
};
use tracing::info;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

async fn open(
    options: ConnectionOptions,
    entities: Vec<EntityDescriptor>,
    reporter: Option<Arc<dyn Reporter>>,
    schema: &[&str],
) -> Result<Connection> {
    let mut builder = Connection::builder(options).with_entities(entities);
    if let Some(reporter) = reporter {
        builder = builder.with_reporter(reporter);
    }
    let connection = builder.connect().await?;
    for statement in schema {
        connection.driver().execute(statement, &[]).await?;
    }
    Ok(connection)
}

fn print(entity: &EntityRef) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&entity.to_json())?);
    Ok(())
}

fn id_filter(alias: &str, entity: &EntityRef) -> FilterExpr {
    FilterExpr::eq(format!("{alias}.id"), entity.get("id").unwrap_or(Value::Null))
}

fn blog_entities() -> Vec<EntityDescriptor> {
    vec![
        EntityDescriptor::new("Author")
            .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
            .with_column(ColumnDescriptor::new("name", ColumnType::String))
            .with_relation(RelationDescriptor::one_to_many("posts", "Post").with_inverse("author")),
        EntityDescriptor::new("Post")
            .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
            .with_column(ColumnDescriptor::new("title", ColumnType::String))
            .with_column(ColumnDescriptor::new("text", ColumnType::String).nullable())
            .with_relation(
                RelationDescriptor::many_to_one("author", "Author")
                    .with_inverse("posts")
                    .with_cascade(CascadeFlags::persist()),
            ),
    ]
}

const BLOG_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS author (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS post (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL, \
     text TEXT, author_id INTEGER REFERENCES author(id))",
];

/// A post saved together with its new author.
pub async fn many_to_one(options: ConnectionOptions) -> Result<()> {
    let connection = open(options, blog_entities(), None, BLOG_SCHEMA).await?;
    let posts = connection.repository("Post")?;

    let author = EntityRef::new("Author").with("name", "Umed");
    let post = posts
        .create()?
        .with("title", "Hello how are you?")
        .with("text", "Hello, this is my first post");
    post.set_one("author", Some(author));
    posts.persist(&post).await?;
    info!(id = ?post.get("id"), "post saved");

    let loaded = posts
        .find_one(
            FindOptions::new()
                .with_alias("post")
                .left_join_and_select("post.author", "author")
                .with_filter(id_filter("post", &post)),
        )
        .await?;
    if let Some(loaded) = loaded {
        print(&loaded)?;
    }
    connection.close().await?;
    Ok(())
}

/// Listeners bound to every lifecycle event of a post.
pub async fn listeners(options: ConnectionOptions) -> Result<()> {
    let mut entities = blog_entities();
    let events = [
        ListenerKind::BeforeInsert,
        ListenerKind::AfterInsert,
        ListenerKind::BeforeUpdate,
        ListenerKind::AfterUpdate,
        ListenerKind::BeforeRemove,
        ListenerKind::AfterRemove,
        ListenerKind::AfterLoad,
    ];
    if let Some(post) = entities.pop() {
        let post = events.into_iter().fold(post, |post, kind| {
            post.with_listener(kind, move |_, ctx| {
                ctx.report(format!("event: {kind} post"));
                Ok(())
            })
        });
        entities.push(post);
    }

    let reporter = Arc::new(MemoryReporter::new());
    let connection = open(options, entities, Some(reporter.clone()), BLOG_SCHEMA).await?;
    let posts = connection.repository("Post")?;

    let post = posts.create()?.with("title", "Listeners").with("text", "draft");
    posts.persist(&post).await?;
    post.set("text", "published");
    posts.persist(&post).await?;
    posts.find(FindOptions::new().with_alias("post").with_filter(id_filter("post", &post))).await?;
    posts.remove(&post).await?;

    for entry in reporter.entries() {
        println!("{}: {}", entry.entity, entry.message);
    }
    connection.close().await?;
    Ok(())
}

fn question_entities(lazy_categories: bool) -> Vec<EntityDescriptor> {
    let categories = RelationDescriptor::many_to_many("categories", "Category")
        .with_inverse("questions")
        .with_cascade(CascadeFlags::persist())
        .join_table();
    vec![
        EntityDescriptor::new("Question")
            .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
            .with_column(ColumnDescriptor::new("title", ColumnType::String))
            .with_relation(if lazy_categories {
                categories.lazy()
            } else {
                categories
            }),
        EntityDescriptor::new("Category")
            .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
            .with_column(ColumnDescriptor::new("name", ColumnType::String))
            .with_relation(
                RelationDescriptor::many_to_many("questions", "Question").with_inverse("categories"),
            ),
    ]
}

const QUESTION_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS question (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS category (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS question_categories_category (\
     question_id INTEGER NOT NULL REFERENCES question(id), \
     category_id INTEGER NOT NULL REFERENCES category(id), \
     PRIMARY KEY (question_id, category_id))",
];

async fn save_question(connection: &Connection, title: &str, categories: &[&str]) -> Result<EntityRef> {
    let questions = connection.repository("Question")?;
    let question = questions.create()?.with("title", title);
    question.set_many(
        "categories",
        categories
            .iter()
            .map(|name| EntityRef::new("Category").with("name", *name))
            .collect(),
    );
    questions.persist(&question).await?;
    Ok(question)
}

/// Junction rows added and removed as membership changes.
pub async fn many_to_many(options: ConnectionOptions) -> Result<()> {
    let connection = open(options, question_entities(false), None, QUESTION_SCHEMA).await?;
    let questions = connection.repository("Question")?;
    let question = save_question(&connection, "Why ORMs?", &["orm", "databases", "rust"]).await?;

    let find = FindOptions::new()
        .with_alias("question")
        .left_join_and_select("question.categories", "category")
        .with_filter(id_filter("question", &question));
    let Some(loaded) = questions.find_one(find.clone()).await? else {
        return Ok(());
    };
    print(&loaded)?;

    let kept: Vec<EntityRef> = loaded
        .many("categories")
        .into_iter()
        .filter(|category| category.get("name") != Some(Value::from("databases")))
        .collect();
    loaded.set_many("categories", kept);
    questions.persist(&loaded).await?;

    if let Some(reloaded) = questions.find_one(find).await? {
        print(&reloaded)?;
    }
    connection.close().await?;
    Ok(())
}

/// Categories of a question fetched only when asked for.
pub async fn lazy(options: ConnectionOptions) -> Result<()> {
    let connection = open(options, question_entities(true), None, QUESTION_SCHEMA).await?;
    let questions = connection.repository("Question")?;
    let question = save_question(&connection, "Lazy or eager?", &["loading"]).await?;

    let Some(loaded) = questions.find_one_by_id(question.get("id").unwrap_or(Value::Null)).await?
    else {
        return Ok(());
    };
    if let Some(categories) = loaded.lazy("categories") {
        info!(state = ?categories.state(), "before first access");
        for category in categories.load_many().await? {
            print(&category)?;
        }
        info!(state = ?categories.state(), "after first access");
    }
    connection.close().await?;
    Ok(())
}

fn section() -> EntityDescriptor {
    EntityDescriptor::new("Section")
        .with_column(ColumnDescriptor::generated("id", ColumnType::Int32))
        .with_column(ColumnDescriptor::new("name", ColumnType::String))
        .with_relation(
            RelationDescriptor::tree_parent("parent", "Section").with_cascade(CascadeFlags::persist()),
        )
        .with_relation(RelationDescriptor::tree_children("children", "Section", "parent"))
        .with_closure_tree()
}

const SECTION_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS section (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, \
     parent_id INTEGER REFERENCES section(id))",
    "CREATE TABLE IF NOT EXISTS section_closure (ancestor INTEGER NOT NULL, descendant INTEGER NOT NULL, \
     depth INTEGER NOT NULL, PRIMARY KEY (ancestor, descendant))",
];

/// A small tree queried through its closure table.
pub async fn tree(options: ConnectionOptions) -> Result<()> {
    let connection = open(options, vec![section()], None, SECTION_SCHEMA).await?;
    let sections = connection.tree_repository("Section")?;

    let node = |name: &str, parent: Option<&EntityRef>| {
        let node = EntityRef::new("Section").with("name", name);
        node.set_one("parent", parent.cloned());
        node
    };
    let root = node("Docs", None);
    let guide = node("Guide", Some(&root));
    let relations = node("Relations", Some(&guide));
    let reference = node("Reference", Some(&root));
    sections.persist_all(&[relations.clone(), reference]).await?;

    let descendants = sections.count_descendants(&root).await?;
    let ancestors = sections.count_ancestors(&relations).await?;
    info!(descendants, ancestors, "tree saved");
    print(&sections.find_descendants_tree(&root).await?)?;
    print(&sections.find_ancestors_tree(&relations).await?)?;
    connection.close().await?;
    Ok(())
}
