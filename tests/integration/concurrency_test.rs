//! Interleaving of concurrent updates with and without a transaction.

mod helpers;

use crudkit::prelude::*;
use helpers::{Article, GatedDatabase, articles, seeded_database};

/// Two updates that both read before either writes: without a transaction
/// the second write is computed from a stale read and one patch is lost.
#[tokio::test]
async fn test_untransacted_updates_can_lose_a_patch() {
    let db = seeded_database().await;
    let id = articles(&db)
        .create(Article::draft("Original"), None)
        .await
        .unwrap()
        .id
        .unwrap();

    let gated = GenericRepository::<Article>::new(Arc::new(GatedDatabase::new(db.clone(), 2)), "articles")
        .unwrap();
    let (retitled, rewritten) = tokio::join!(
        gated.update(id, Patch::new().set("title", "Retitled"), None),
        gated.update(id, Patch::new().set("body", "Rewritten"), None),
    );
    retitled.unwrap();
    rewritten.unwrap();

    let stored = articles(&db)
        .find_one(Condition::eq("id", id), None)
        .await
        .unwrap()
        .unwrap();
    let both_applied = stored.title == "Retitled" && stored.body.as_deref() == Some("Rewritten");
    assert!(!both_applied, "expected a lost update, got {stored:?}");
}

/// The same two updates, each in its own transaction, both survive.
#[tokio::test]
async fn test_transacted_updates_keep_both_patches() {
    let db = seeded_database().await;
    let repo = articles(&db);
    let id = repo.create(Article::draft("Original"), None).await.unwrap().id.unwrap();

    let first = repo.clone();
    let second = repo.clone();
    let (retitled, rewritten) = tokio::join!(
        transaction(&db, move |tx| {
            Box::pin(async move {
                first.update(id, Patch::new().set("title", "Retitled"), Some(tx)).await
            })
        }),
        transaction(&db, move |tx| {
            Box::pin(async move {
                second.update(id, Patch::new().set("body", "Rewritten"), Some(tx)).await
            })
        }),
    );
    retitled.unwrap();
    rewritten.unwrap();

    let stored = repo.find_one(Condition::eq("id", id), None).await.unwrap().unwrap();
    assert_eq!(stored.title, "Retitled");
    assert_eq!(stored.body.as_deref(), Some("Rewritten"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_get_distinct_keys() {
    let db = seeded_database().await;
    let repo = articles(&db);

    let handles: Vec<_> = (0..16)
        .map(|n| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.create(Article::draft(&format!("Draft {n}")), None).await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id.unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 16);
    assert_eq!(db.rows("articles").await.len(), 16);
}
