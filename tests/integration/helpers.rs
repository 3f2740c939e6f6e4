//! Shared models and fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Barrier;

use crudkit::prelude::*;
use crudkit_core::types::Record;
use crudkit_database::Transaction;
use crudkit_entity::EntityMetadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub views: i64,
    #[serde(default)]
    pub author_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Tag>>,
}

impl Model for Article {
    fn describe(schema: ModelSchema<Self>) -> ModelSchema<Self> {
        schema
            .field("id", field::primary_key())
            .field("title", field::text().label("Title").required().min(1.0).max(120.0))
            .field("body", field::text().nullable())
            .field("views", field::integer().min(0.0).default_value(0))
            .field(
                "author",
                field::relation(RelationDef::many_to_one("authors", "author_id")).label("Author"),
            )
            .field("author_id", field::relation_id("author").nullable())
            .field(
                "tags",
                field::relation(RelationDef::many_to_many(
                    "tags",
                    JoinTable {
                        name: "article_tags",
                        owner_column: "article_id",
                        target_column: "tag_id",
                    },
                )),
            )
    }
}

impl Article {
    pub fn draft(title: &str) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            body: None,
            views: 0,
            author_id: None,
            author: None,
            tags: None,
        }
    }
}

/// Like [`Article`] but serializes absent relations as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Option<i64>,
    pub title: String,
    pub author_id: Option<i64>,
    pub author: Option<Author>,
    pub tags: Option<Vec<Tag>>,
}

impl Model for Post {
    fn describe(schema: ModelSchema<Self>) -> ModelSchema<Self> {
        schema
            .field("id", field::primary_key())
            .field("title", field::text().required())
            .field("author", field::relation(RelationDef::many_to_one("authors", "author_id")))
            .field("author_id", field::relation_id("author").nullable())
            .field(
                "tags",
                field::relation(RelationDef::many_to_many(
                    "tags",
                    JoinTable {
                        name: "post_tags",
                        owner_column: "post_id",
                        target_column: "tag_id",
                    },
                )),
            )
    }
}

/// Memory database seeded with two authors and three tags.
pub async fn seeded_database() -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.seed(
        "authors",
        [
            json!({"id": 1, "name": "Ursula"}),
            json!({"id": 2, "name": "Octavia"}),
        ],
    )
    .await
    .expect("seed authors");
    db.seed(
        "tags",
        [
            json!({"id": 1, "label": "fiction"}),
            json!({"id": 2, "label": "essay"}),
            json!({"id": 3, "label": "classic"}),
        ],
    )
    .await
    .expect("seed tags");
    db
}

pub fn articles(db: &MemoryDatabase) -> GenericRepository<Article> {
    GenericRepository::new(Arc::new(db.clone()), "articles").expect("article metadata")
}

pub fn posts(db: &MemoryDatabase) -> GenericRepository<Post> {
    GenericRepository::new(Arc::new(db.clone()), "posts").expect("post metadata")
}

/// Database whose first `gated` fetches each wait until all of them have
/// read, forcing concurrent callers to interleave read-read-write-write.
pub struct GatedDatabase {
    inner: MemoryDatabase,
    barrier: Arc<Barrier>,
    remaining: Arc<AtomicUsize>,
}

impl GatedDatabase {
    pub fn new(inner: MemoryDatabase, gated: usize) -> Self {
        Self {
            inner,
            barrier: Arc::new(Barrier::new(gated)),
            remaining: Arc::new(AtomicUsize::new(gated)),
        }
    }
}

#[async_trait]
impl Database for GatedDatabase {
    async fn session(&self) -> AppResult<Box<dyn Session>> {
        Ok(Box::new(GatedSession {
            inner: self.inner.session().await?,
            barrier: Arc::clone(&self.barrier),
            remaining: Arc::clone(&self.remaining),
        }))
    }

    async fn begin(&self) -> AppResult<Box<dyn Transaction>> {
        self.inner.begin().await
    }
}

struct GatedSession {
    inner: Box<dyn Session>,
    barrier: Arc<Barrier>,
    remaining: Arc<AtomicUsize>,
}

#[async_trait]
impl Session for GatedSession {
    async fn count(&mut self, meta: &EntityMetadata, condition: &Condition) -> AppResult<u64> {
        self.inner.count(meta, condition).await
    }

    async fn fetch(&mut self, meta: &EntityMetadata, query: &SearchQuery) -> AppResult<Vec<Record>> {
        let rows = self.inner.fetch(meta, query).await?;
        let gated = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if gated {
            self.barrier.wait().await;
        }
        Ok(rows)
    }

    async fn save(&mut self, meta: &EntityMetadata, entity: Record) -> AppResult<Record> {
        self.inner.save(meta, entity).await
    }

    async fn remove(&mut self, meta: &EntityMetadata, id: &FilterValue) -> AppResult<u64> {
        self.inner.remove(meta, id).await
    }
}
