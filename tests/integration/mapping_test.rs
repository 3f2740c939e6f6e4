//! Field metadata, model mapping and condition helpers working together.

mod helpers;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crudkit::prelude::*;
use crudkit_core::types::Record;
use crudkit_entity::{EntityMetadata, mapper, registry};
use helpers::{Article, Author, Tag, articles, seeded_database};

fn loaded_article() -> Article {
    Article {
        id: Some(4),
        title: "Bloodchild".into(),
        body: Some("Stories".into()),
        views: 12,
        author_id: Some(2),
        author: Some(Author { id: 2, name: "Octavia".into() }),
        tags: Some(vec![Tag { id: 1, label: "fiction".into() }]),
    }
}

#[test]
fn test_model_entity_round_trip() {
    let meta = EntityMetadata::of::<Article>("articles").unwrap();
    let article = loaded_article();

    let entity = mapper::model_to_entity(&meta, &article).unwrap();
    assert_eq!(entity["author"], json!({"id": 2, "name": "Octavia"}));
    assert_eq!(entity["author_id"], json!(2));

    let back: Article = mapper::any_to_model(entity).unwrap();
    assert_eq!(back, article);
}

#[test]
fn test_apply_changes_overwrites_only_present_properties() {
    let original = loaded_article();

    let mut same = original.clone();
    mapper::apply_changes_to_model(&mut same, &mapper::to_record(&original).unwrap()).unwrap();
    assert_eq!(same, original);

    let mut changed = original.clone();
    let Value::Object(changes) = json!({"title": "Wild Seed", "body": null, "author": {"id": 1, "name": "Ursula"}}) else {
        unreachable!()
    };
    mapper::apply_changes_to_model(&mut changed, &changes).unwrap();
    assert_eq!(changed.title, "Wild Seed");
    assert_eq!(changed.body, None);
    assert_eq!(changed.views, original.views);
    assert_eq!(changed.author.as_ref().map(|a| a.id), Some(1));
    assert_eq!(changed.tags, original.tags);
}

#[test]
fn test_registry_lists_described_fields() {
    registry::ensure::<Article>();

    assert_eq!(
        registry::list_fields::<Article>(),
        vec!["id", "title", "body", "views", "author", "author_id", "tags"]
    );
    assert_eq!(registry::relation_fields::<Article>(), vec!["author", "author_id", "tags"]);
    let title = registry::get::<Article>("title").unwrap();
    assert_eq!(title.label.as_deref(), Some("Title"));
    assert!(title.required);
}

#[test]
fn test_validation_uses_descriptors() {
    let mut article = loaded_article();
    assert!(registry::validate(&article).is_ok());

    article.title = String::new();
    let err = registry::validate(&article).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let mut article = loaded_article();
    article.views = -3;
    assert!(registry::validate(&article).is_err());
}

struct Audited;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Comment {
    id: Option<i64>,
    text: String,
    #[serde(default)]
    created_by: Option<String>,
}

impl Model for Comment {
    fn describe(schema: ModelSchema<Self>) -> ModelSchema<Self> {
        registry::describe::<Audited>()
            .field("id", field::primary_key())
            .field("created_by", field::text().nullable().column("author_name"))
            .register();
        schema.inherit::<Audited>().field("text", field::text().required())
    }
}

#[tokio::test]
async fn test_inherited_fields_map_to_columns() {
    let db = MemoryDatabase::new();
    let repo = GenericRepository::<Comment>::new(Arc::new(db.clone()), "comments").unwrap();
    assert_eq!(registry::list_fields::<Comment>(), vec!["id", "created_by", "text"]);

    let saved = repo
        .create(
            Comment {
                id: None,
                text: "Nice".into(),
                created_by: Some("ana".into()),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(saved.id, Some(1));

    let rows = db.rows("comments").await;
    assert_eq!(rows[0]["author_name"], json!("ana"));
    assert!(!rows[0].contains_key("created_by"));

    let found = repo
        .find_many(Condition::eq("created_by", "ana"), None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Undescribed {
    id: Option<i64>,
}

impl Model for Undescribed {}

#[test]
fn test_undescribed_model_is_misconfigured() {
    let err = GenericRepository::<Undescribed>::new(Arc::new(MemoryDatabase::new()), "nothing")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Misconfigured);
}

#[tokio::test]
async fn test_condition_from_map_drives_queries() {
    let db = seeded_database().await;
    let repo = articles(&db);
    for (title, author, body) in [
        ("A", Some(1), None),
        ("B", Some(2), Some("text")),
        ("C", Some(2), None),
        ("D", None, None),
    ] {
        let mut draft = Article::draft(title);
        draft.author_id = author;
        draft.body = body.map(str::to_string);
        repo.create(draft, None).await.unwrap();
    }

    let Value::Object(map) = json!({"author_id": [1, 2], "body": null}) else {
        unreachable!()
    };
    let condition = Condition::from_map(&map).unwrap();
    let found = repo
        .find_many(SearchQuery::new(condition).sort_by(SortField::asc("title")), None)
        .await
        .unwrap();
    let titles: Vec<String> = found.into_iter().map(|a| a.title).collect();
    assert_eq!(titles, vec!["A", "C"]);

    let either = Condition::any([Condition::eq("title", "D"), Condition::eq("author_id", 1)]);
    assert_eq!(repo.find_many(either.clone(), None).await.unwrap().len(), 2);
    assert_eq!(repo.find_many(either.negate(), None).await.unwrap().len(), 2);

    let mut unknown = Record::new();
    unknown.insert("password".into(), json!("x"));
    let err = repo
        .find_many(Condition::from_map(&unknown).unwrap(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}
