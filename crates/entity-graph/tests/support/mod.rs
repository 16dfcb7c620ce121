//! Test models shared by the integration tests.
//!
//! - `Category` owns `Item`s; each item holds an undeclared `BackRef` to its
//!   category, set by `Category::wire` and never encoded.
//! - `Person` has optional to-many `friends`, which can form cycles.
//! - `Badge` has a required to-one `holder`.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use entity_graph::{
    BackRef, DecodeError, EntityModel, FieldDecl, ModelDeclaration, NodeReader, NodeWriter,
};
use entity_store::{EntityId, StoreSchema, ValueKind};

#[derive(Debug)]
pub struct Category {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub items: Vec<Arc<Item>>,
}

impl EntityModel for Category {
    const DECLARATION: &'static ModelDeclaration = &ModelDeclaration::new(
        "CategoryEntity",
        &[
            FieldDecl::scalar("id", ValueKind::Id),
            FieldDecl::scalar("name", ValueKind::String),
            FieldDecl::scalar("description", ValueKind::String).optional(),
            FieldDecl::codable("tags").optional(),
            FieldDecl::to_many("items", "ItemEntity"),
        ],
    );

    fn id(&self) -> EntityId {
        self.id
    }

    fn encode_fields(&self, writer: &mut NodeWriter<'_>) {
        writer
            .attribute("id", self.id)
            .attribute("name", self.name.clone())
            .optional_attribute("description", self.description.clone())
            .optional_codable("tags", self.tags.as_ref())
            .to_many("items", self.items.iter().map(Arc::as_ref));
    }

    fn decode_fields(reader: &mut NodeReader<'_, '_>) -> Result<Self, DecodeError> {
        Ok(Category {
            id: reader.required("id")?,
            name: reader.required("name")?,
            description: reader.optional("description")?,
            tags: reader.optional_codable("tags")?,
            items: reader.to_many("items")?,
        })
    }

    fn wire(this: &Arc<Self>) {
        for item in &this.items {
            item.category.set(this);
        }
    }
}

#[derive(Debug)]
pub struct Item {
    pub id: EntityId,
    pub title: String,
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub category: BackRef<Category>,
}

impl EntityModel for Item {
    const DECLARATION: &'static ModelDeclaration = &ModelDeclaration::new(
        "ItemEntity",
        &[
            FieldDecl::scalar("id", ValueKind::Id),
            FieldDecl::scalar("title", ValueKind::String),
            FieldDecl::scalar("price", ValueKind::Float),
            FieldDecl::scalar("created_at", ValueKind::Timestamp).renamed("createdAt"),
        ],
    );

    fn id(&self) -> EntityId {
        self.id
    }

    fn encode_fields(&self, writer: &mut NodeWriter<'_>) {
        writer
            .attribute("id", self.id)
            .attribute("title", self.title.clone())
            .attribute("price", self.price)
            .attribute("created_at", self.created_at);
    }

    // `category` is wired by the owning Category.
    fn decode_fields(reader: &mut NodeReader<'_, '_>) -> Result<Self, DecodeError> {
        Ok(Item {
            id: reader.required("id")?,
            title: reader.required("title")?,
            price: reader.required("price")?,
            created_at: reader.required("created_at")?,
            category: BackRef::new(),
        })
    }
}

#[derive(Debug)]
pub struct Person {
    pub id: EntityId,
    pub name: String,
    pub friends: Mutex<Vec<Arc<Person>>>,
}

impl Person {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Person {
            id: EntityId::new(),
            name: name.to_string(),
            friends: Mutex::new(Vec::new()),
        })
    }

    pub fn befriend(&self, other: &Arc<Person>) {
        self.friends.lock().unwrap().push(Arc::clone(other));
    }

    pub fn friend_ids(&self) -> Vec<EntityId> {
        self.friends.lock().unwrap().iter().map(|f| f.id).collect()
    }
}

impl EntityModel for Person {
    const DECLARATION: &'static ModelDeclaration = &ModelDeclaration::new(
        "PersonEntity",
        &[
            FieldDecl::scalar("name", ValueKind::String),
            FieldDecl::to_many("friends", "PersonEntity").optional(),
        ],
    );

    fn id(&self) -> EntityId {
        self.id
    }

    fn encode_fields(&self, writer: &mut NodeWriter<'_>) {
        let friends = self.friends.lock().unwrap().clone();
        writer
            .attribute("name", self.name.clone())
            .to_many("friends", friends.iter().map(Arc::as_ref));
    }

    fn decode_fields(reader: &mut NodeReader<'_, '_>) -> Result<Self, DecodeError> {
        Ok(Person {
            id: reader.id(),
            name: reader.required("name")?,
            friends: Mutex::new(reader.to_many("friends")?),
        })
    }
}

#[derive(Debug)]
pub struct Badge {
    pub id: EntityId,
    pub label: String,
    pub holder: Arc<Person>,
}

impl EntityModel for Badge {
    const DECLARATION: &'static ModelDeclaration = &ModelDeclaration::new(
        "BadgeEntity",
        &[
            FieldDecl::scalar("label", ValueKind::String),
            FieldDecl::to_one("holder", "PersonEntity"),
        ],
    );

    fn id(&self) -> EntityId {
        self.id
    }

    fn encode_fields(&self, writer: &mut NodeWriter<'_>) {
        writer
            .attribute("label", self.label.clone())
            .to_one("holder", self.holder.as_ref());
    }

    fn decode_fields(reader: &mut NodeReader<'_, '_>) -> Result<Self, DecodeError> {
        Ok(Badge {
            id: reader.id(),
            label: reader.required("label")?,
            holder: reader.to_one("holder")?,
        })
    }
}

/// Store schema derived from the test model declarations.
pub fn schema() -> StoreSchema {
    StoreSchema::builder()
        .entity(Category::DECLARATION.entity_descriptor())
        .entity(Item::DECLARATION.entity_descriptor())
        .entity(Person::DECLARATION.entity_descriptor())
        .entity(Badge::DECLARATION.entity_descriptor())
        .build()
        .expect("test schema is valid")
}

pub fn item(title: &str, price: f64) -> Arc<Item> {
    Arc::new(Item {
        id: EntityId::new(),
        title: title.to_string(),
        price,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        category: BackRef::new(),
    })
}

/// A category that owns `items`, with back-references wired.
pub fn category(name: &str, items: Vec<Arc<Item>>) -> Arc<Category> {
    let category = Arc::new(Category {
        id: EntityId::new(),
        name: name.to_string(),
        description: None,
        tags: None,
        items,
    });
    Category::wire(&category);
    category
}
