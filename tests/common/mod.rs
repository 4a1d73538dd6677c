#![allow(dead_code)]

use lazydb::schema::{ColumnKind, ObjectDescriptor, OnTargetClear, SchemaRegistry};
use lazydb::{Engine, Entity, Link, LinkSlot, Row};
use tempfile::TempDir;

/// Engine on a fresh on-disk database with the `test_` prefix
pub fn open_engine() -> (TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(dir.path(), Some("test_")).unwrap();
    (dir, engine)
}

/// Owns a `TestLink`; saving a new `Test` creates one
#[derive(Debug, Clone, PartialEq)]
pub struct Test {
    pub id: i64,
    pub length: i64,
    pub random_real: f64,
    pub name: String,
    pub link: Link<TestLink>,
}

impl Default for Test {
    fn default() -> Self {
        Self {
            id: 0,
            length: 0,
            random_real: 0.0,
            name: String::new(),
            link: Link::new(TestLink::default()),
        }
    }
}

impl Entity for Test {
    const TYPE_NAME: &'static str = "Test";

    fn descriptor() -> ObjectDescriptor {
        ObjectDescriptor::new("Test", "test")
            .column("length", ColumnKind::Integer)
            .column("random_real", ColumnKind::Real)
            .column("name", ColumnKind::Text)
            .chained_link("link_id", "TestLink")
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn encode(&self, row: &mut Row) {
        row.set("length", self.length);
        row.set("random_real", self.random_real);
        row.set("name", self.name.as_str());
        row.set_link("link_id", &self.link);
    }

    fn decode(row: &Row) -> Self {
        Self {
            id: 0,
            length: row.get_i64("length"),
            random_real: row.get_f64("random_real"),
            name: row.get_string("name"),
            link: row.get_link("link_id"),
        }
    }

    fn links_mut(&mut self) -> Vec<&mut dyn LinkSlot> {
        vec![&mut self.link as &mut dyn LinkSlot]
    }

    fn describe_links(registry: &mut SchemaRegistry) -> lazydb::Result<()> {
        registry.register::<TestLink>()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestLink {
    pub id: i64,
    pub label: String,
}

impl Entity for TestLink {
    const TYPE_NAME: &'static str = "TestLink";

    fn descriptor() -> ObjectDescriptor {
        ObjectDescriptor::new("TestLink", "test_link").column("label", ColumnKind::Text)
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn encode(&self, row: &mut Row) {
        row.set("label", self.label.as_str());
    }

    fn decode(row: &Row) -> Self {
        Self {
            id: 0,
            label: row.get_string("label"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MyClass {
    pub id: i64,
    pub value: i64,
}

impl Entity for MyClass {
    const TYPE_NAME: &'static str = "MyClass";

    fn descriptor() -> ObjectDescriptor {
        ObjectDescriptor::new("MyClass", "my_class").column("value", ColumnKind::Integer)
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn encode(&self, row: &mut Row) {
        row.set("value", self.value);
    }

    fn decode(row: &Row) -> Self {
        Self {
            id: 0,
            value: row.get_i64("value"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Author {
    pub id: i64,
    pub name: String,
}

impl Entity for Author {
    const TYPE_NAME: &'static str = "Author";

    fn descriptor() -> ObjectDescriptor {
        ObjectDescriptor::new("Author", "author").column("name", ColumnKind::Text)
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn encode(&self, row: &mut Row) {
        row.set("name", self.name.as_str());
    }

    fn decode(row: &Row) -> Self {
        Self {
            id: 0,
            name: row.get_string("name"),
        }
    }
}

/// Deleted along with its author
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: Link<Author>,
}

impl Book {
    pub fn by(title: &str, author: Author) -> Self {
        Self {
            id: 0,
            title: title.to_string(),
            author: Link::new(author),
        }
    }
}

impl Entity for Book {
    const TYPE_NAME: &'static str = "Book";

    fn descriptor() -> ObjectDescriptor {
        ObjectDescriptor::new("Book", "book")
            .column("title", ColumnKind::Text)
            .link("author_id", "Author")
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn encode(&self, row: &mut Row) {
        row.set("title", self.title.as_str());
        row.set_link("author_id", &self.author);
    }

    fn decode(row: &Row) -> Self {
        Self {
            id: 0,
            title: row.get_string("title"),
            author: row.get_link("author_id"),
        }
    }

    fn links_mut(&mut self) -> Vec<&mut dyn LinkSlot> {
        vec![&mut self.author as &mut dyn LinkSlot]
    }

    fn describe_links(registry: &mut SchemaRegistry) -> lazydb::Result<()> {
        registry.register::<Author>()?;
        Ok(())
    }
}

/// Survives its book with the link nulled
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Review {
    pub id: i64,
    pub stars: i64,
    pub book: Link<Book>,
}

impl Entity for Review {
    const TYPE_NAME: &'static str = "Review";

    fn descriptor() -> ObjectDescriptor {
        ObjectDescriptor::new("Review", "review")
            .column("stars", ColumnKind::Integer)
            .link_with("book_id", "Book", OnTargetClear::SetNull, false)
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn encode(&self, row: &mut Row) {
        row.set("stars", self.stars);
        row.set_link("book_id", &self.book);
    }

    fn decode(row: &Row) -> Self {
        Self {
            id: 0,
            stars: row.get_i64("stars"),
            book: row.get_link("book_id"),
        }
    }

    fn links_mut(&mut self) -> Vec<&mut dyn LinkSlot> {
        vec![&mut self.book as &mut dyn LinkSlot]
    }

    fn describe_links(registry: &mut SchemaRegistry) -> lazydb::Result<()> {
        registry.register::<Book>()?;
        Ok(())
    }
}

/// Register every fixture type so all reverse links are known
pub fn register_all(engine: &Engine) {
    engine.register::<Test>().unwrap();
    engine.register::<MyClass>().unwrap();
    engine.register::<Review>().unwrap();
}
