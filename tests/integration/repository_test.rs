//! End-to-end repository behavior on the in-memory backend.

mod helpers;

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crudkit::prelude::*;
use helpers::{Article, Post, Tag, articles, posts, seeded_database};

#[tokio::test]
async fn test_create_and_load_relations() {
    let db = seeded_database().await;
    let repo = articles(&db);

    let mut draft = Article::draft("Left Hand of Darkness");
    draft.author_id = Some(1);
    draft.tags = Some(vec![
        Tag { id: 1, label: "fiction".into() },
        Tag { id: 3, label: "classic".into() },
    ]);
    let created = repo.create(draft, None).await.unwrap();
    let id = created.id.unwrap();

    let loaded = repo
        .find_one(
            SearchQuery::new(Condition::eq("id", id)).with_relations(["author", "tags"]),
            None,
        )
        .await
        .unwrap()
        .expect("article exists");

    assert_eq!(loaded.author.map(|a| a.name).as_deref(), Some("Ursula"));
    let labels: Vec<String> = loaded.tags.unwrap_or_default().into_iter().map(|t| t.label).collect();
    assert_eq!(labels, vec!["fiction", "classic"]);
}

#[tokio::test]
async fn test_create_ignores_preset_primary_key() {
    let db = seeded_database().await;
    let repo = articles(&db);

    let mut preset = Article::draft("Kindred");
    preset.id = Some(99);
    let created = repo.create(preset, None).await.unwrap();

    assert_eq!(created.id, Some(1));
    assert!(repo.find_one(Condition::eq("id", 99), None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_unknown_id_is_not_found() {
    let db = seeded_database().await;
    let repo = articles(&db);

    let err = repo
        .update(7, Patch::new().set("title", "Ghost"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(db.rows("articles").await.is_empty());
}

#[tokio::test]
async fn test_update_patch_on_relation_id_keeps_tags() {
    let db = seeded_database().await;
    let repo = articles(&db);

    let mut draft = Article::draft("Parable of the Sower");
    draft.author_id = Some(1);
    draft.tags = Some(vec![Tag { id: 2, label: "essay".into() }]);
    let id = repo.create(draft, None).await.unwrap().id.unwrap();

    let patch = Patch::new().set("author_id", 2);
    assert!(repo.locate_query(&FilterValue::Integer(id), &patch).relations.is_empty());

    let updated = repo.update(id, patch, None).await.unwrap();
    assert_eq!(updated.author_id, Some(2));
    assert_eq!(updated.title, "Parable of the Sower");
    assert_eq!(db.links("article_tags", id).await, vec![json!(2)]);
}

#[tokio::test]
async fn test_null_relations_leave_stored_keys_alone() {
    let db = seeded_database().await;
    let repo = posts(&db);

    let created = repo
        .create(
            Post {
                id: None,
                title: "Kindred".into(),
                author_id: Some(1),
                author: None,
                tags: Some(vec![Tag { id: 1, label: "fiction".into() }]),
            },
            None,
        )
        .await
        .unwrap();
    let id = created.id.unwrap();
    assert_eq!(created.author_id, Some(1));
    assert_eq!(db.links("post_tags", id).await, vec![json!(1)]);

    let renamed = repo
        .update(id, Patch::new().set("title", "Kindred (2nd ed.)"), None)
        .await
        .unwrap();
    assert_eq!(renamed.author_id, Some(1));
    assert_eq!(db.rows("posts").await[0].get("author_id"), Some(&json!(1)));
    assert_eq!(db.links("post_tags", id).await, vec![json!(1)]);

    let detached = repo
        .update(id, Patch::new().set("author", Value::Null), None)
        .await
        .unwrap();
    assert_eq!(detached.author_id, None);
    assert_eq!(db.rows("posts").await[0].get("author_id"), Some(&Value::Null));
    assert_eq!(db.links("post_tags", id).await, vec![json!(1)]);

    repo.update(id, Patch::new().set("tags", json!([])), None).await.unwrap();
    assert!(db.links("post_tags", id).await.is_empty());
}

#[tokio::test]
async fn test_update_replaces_many_to_many_wholesale() {
    let db = seeded_database().await;
    let repo = articles(&db);

    let mut draft = Article::draft("Dispossessed");
    draft.tags = Some(vec![
        Tag { id: 1, label: "fiction".into() },
        Tag { id: 2, label: "essay".into() },
    ]);
    let id = repo.create(draft, None).await.unwrap().id.unwrap();

    let patch = Patch::new().set("tags", json!([{"id": 3, "label": "classic"}]));
    assert_eq!(
        repo.locate_query(&FilterValue::Integer(id), &patch).relations,
        vec!["tags".to_string()]
    );

    let updated = repo.update(id, patch, None).await.unwrap();
    assert_eq!(updated.tags.map(|tags| tags.len()), Some(1));
    assert_eq!(db.links("article_tags", id).await, vec![json!(3)]);
}

#[tokio::test]
async fn test_remove_drops_row_and_links() {
    let db = seeded_database().await;
    let repo = articles(&db);

    let mut draft = Article::draft("Earthseed");
    draft.tags = Some(vec![Tag { id: 1, label: "fiction".into() }]);
    let id = repo.create(draft, None).await.unwrap().id.unwrap();

    repo.remove(id, None).await.unwrap();
    assert!(db.rows("articles").await.is_empty());
    assert!(db.links("article_tags", id).await.is_empty());

    repo.remove(id, None).await.expect("removing a missing row succeeds");
}

#[tokio::test]
async fn test_search_filters_sorts_and_pages() {
    let db = seeded_database().await;
    let repo = articles(&db);
    for (title, views) in [("Alpha", 5), ("Beta", 50), ("Gamma", 500), ("Delta", 0)] {
        let mut draft = Article::draft(title);
        draft.views = views;
        repo.create(draft, None).await.unwrap();
    }

    let input = SearchInput::page(1, 2)
        .filter(FilterField::new("views", FilterOp::Gt, 1))
        .sort_by(SortField::desc("views"));
    let first = repo.search(&input, Condition::default(), None).await.unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.total_pages, 2);
    assert!(first.has_next);
    assert!(!first.has_previous);
    let titles: Vec<&str> = first.items.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["Gamma", "Beta"]);

    let second = repo
        .search(&SearchInput { page: 2, ..input }, Condition::default(), None)
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].title, "Alpha");
}

#[tokio::test]
async fn test_search_rejects_bad_input() {
    let db = seeded_database().await;
    let repo = articles(&db).with_search_config(SearchConfig {
        default_page_size: 10,
        max_page_size: 20,
    });

    for input in [
        SearchInput::page(0, 10),
        SearchInput::page(1, 0),
        SearchInput::page(1, 21),
        SearchInput::page(1, 10).sort_by(SortField::asc("rating")),
        SearchInput::page(1, 10).filter(FilterField::eq("secret", 1)),
        SearchInput::page(u64::MAX, 10),
    ] {
        let err = repo.search(&input, Condition::default(), None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation, "input {input:?}");
    }
    assert_eq!(repo.page(4).page_size, 10);
}

/// Hooks that count views and log calls, writing through the hook session.
#[derive(Default)]
struct AuditHooks {
    log: Mutex<Vec<String>>,
}

#[async_trait]
impl RepositoryHooks<Article> for AuditHooks {
    async fn before_save(
        &self,
        _session: &mut dyn Session,
        prev: Option<&Article>,
        next: &mut Article,
    ) -> AppResult<()> {
        if prev.is_none() && next.title.trim().is_empty() {
            return Err(AppError::validation("title must not be blank"));
        }
        next.title = next.title.trim().to_string();
        self.log.lock().unwrap().push(format!("before_save {}", next.title));
        Ok(())
    }

    async fn after_save(&self, session: &mut dyn Session, _prev: Option<&Article>, next: &Article) -> AppResult<()> {
        let meta = crudkit_entity::EntityMetadata::of::<Article>("articles")?;
        let total = session.count(&meta, &Condition::default()).await?;
        self.log
            .lock()
            .unwrap()
            .push(format!("after_save {:?} of {total}", next.id));
        Ok(())
    }
}

#[tokio::test]
async fn test_hooks_shape_writes_and_see_session() {
    let db = seeded_database().await;
    let repo = articles(&db).with_hooks(AuditHooks::default());

    let created = repo.create(Article::draft("  Lilith's Brood "), None).await.unwrap();
    assert_eq!(created.title, "Lilith's Brood");

    let err = repo.create(Article::draft("   "), None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(db.rows("articles").await.len(), 1);

    assert_eq!(
        *repo.hooks().log.lock().unwrap(),
        vec!["before_save Lilith's Brood", "after_save Some(1) of 1"]
    );
}

#[tokio::test]
async fn test_transaction_commits_all_or_nothing() {
    let db = seeded_database().await;
    let repo = articles(&db);

    let work = repo.clone();
    let ids = transaction(&db, move |tx| {
        Box::pin(async move {
            let a = work.create(Article::draft("One"), Some(&mut *tx)).await?;
            let b = work.create(Article::draft("Two"), Some(&mut *tx)).await?;
            Ok::<_, AppError>((a.id, b.id))
        })
    })
    .await
    .unwrap();
    assert_eq!(ids, (Some(1), Some(2)));
    assert_eq!(db.rows("articles").await.len(), 2);

    let work = repo.clone();
    let err = transaction(&db, move |tx| {
        Box::pin(async move {
            work.remove(1, Some(&mut *tx)).await?;
            work.update(2, Patch::new().set("title", "Changed"), Some(&mut *tx)).await?;
            work.update(3, Patch::new().set("title", "Missing"), Some(&mut *tx)).await
        })
    })
    .await
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let titles: Vec<String> = repo
        .find_many(SearchQuery::default().sort_by(SortField::asc("id")), None)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.title)
        .collect();
    assert_eq!(titles, vec!["One", "Two"]);
}
