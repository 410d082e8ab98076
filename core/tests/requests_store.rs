//! Integration tests for the request/ticket store (G) against a live Redis,
//! per spec.md §8's request lifecycle and pagination scenarios.
//!
//! Requires `GALLERY_TEST_REDIS_URL` (default `redis://127.0.0.1:6379/`).

mod common;

use gallery_core::requests::models::{NewRequest, RequestListFilter, RequestStatus};
use gallery_core::requests::RequestStore;

fn new_request(guild_id: &str, user_id: &str, title: &str) -> NewRequest {
    NewRequest {
        guild_id: guild_id.to_owned(),
        user_id: user_id.to_owned(),
        gallery_id: None,
        title: title.to_owned(),
        description: "a description".to_owned(),
    }
}

#[tokio::test]
async fn create_then_get_round_trips_and_starts_open() {
    let ns = common::unique_namespace("requests-create");
    let kv = common::test_kv(&ns).await;
    let store = RequestStore::new(kv);

    let created = store.create(new_request("guild-1", "user-1", "More lighting")).await.unwrap();
    assert_eq!(created.status, RequestStatus::Open);

    let fetched = store.get(&created.id).await.unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.title, "More lighting");
}

#[tokio::test]
async fn list_filters_by_guild_user_and_status() {
    let ns = common::unique_namespace("requests-list");
    let kv = common::test_kv(&ns).await;
    let store = RequestStore::new(kv);

    let a = store.create(new_request("guild-1", "user-1", "A")).await.unwrap();
    let b = store.create(new_request("guild-1", "user-2", "B")).await.unwrap();
    let _c = store.create(new_request("guild-2", "user-1", "C")).await.unwrap();

    store.update_status(&a.id, RequestStatus::Approved, "mod-1").await.unwrap();

    let by_guild = store
        .list(&RequestListFilter { guild_ids: vec!["guild-1".to_owned()], ..Default::default() }, None, 10)
        .await
        .unwrap();
    let by_guild_ids: Vec<&str> = by_guild.items.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(by_guild_ids.len(), 2);
    assert!(by_guild_ids.contains(&a.id.as_str()));
    assert!(by_guild_ids.contains(&b.id.as_str()));

    let by_status = store
        .list(
            &RequestListFilter {
                guild_ids: vec!["guild-1".to_owned()],
                status: Some(RequestStatus::Approved),
                ..Default::default()
            },
            None,
            10,
        )
        .await
        .unwrap();
    assert_eq!(by_status.items.len(), 1);
    assert_eq!(by_status.items[0].id, a.id);

    let multi_guild = store
        .list(
            &RequestListFilter { guild_ids: vec!["guild-1".to_owned(), "guild-2".to_owned()], ..Default::default() },
            None,
            10,
        )
        .await
        .unwrap();
    assert_eq!(multi_guild.items.len(), 3);
}

#[tokio::test]
async fn list_paginates_newest_first_with_a_cursor() {
    let ns = common::unique_namespace("requests-paginate");
    let kv = common::test_kv(&ns).await;
    let store = RequestStore::new(kv);

    let mut created = Vec::new();
    for i in 0..5 {
        created.push(store.create(new_request("guild-1", "user-1", &format!("req-{i}"))).await.unwrap());
        // ZADD scores need to differ to get a deterministic newest-first order
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let filter = RequestListFilter { guild_ids: vec!["guild-1".to_owned()], ..Default::default() };
    let first_page = store.list(&filter, None, 2).await.unwrap();
    assert_eq!(first_page.items.len(), 2);
    assert!(first_page.has_more);
    assert_eq!(first_page.items[0].title, "req-4");
    assert_eq!(first_page.items[1].title, "req-3");

    let second_page = store.list(&filter, Some(&first_page.items[1].id), 2).await.unwrap();
    assert_eq!(second_page.items.len(), 2);
    assert_eq!(second_page.items[0].title, "req-2");
    assert_eq!(second_page.items[1].title, "req-1");
    assert!(second_page.has_more);

    let third_page = store.list(&filter, Some(&second_page.items[1].id), 2).await.unwrap();
    assert_eq!(third_page.items.len(), 1);
    assert_eq!(third_page.items[0].title, "req-0");
    assert!(!third_page.has_more);
}

#[tokio::test]
async fn update_status_follows_the_transition_graph_and_closes_with_an_actor() {
    let ns = common::unique_namespace("requests-transitions");
    let kv = common::test_kv(&ns).await;
    let store = RequestStore::new(kv);

    let created = store.create(new_request("guild-1", "user-1", "Needs review")).await.unwrap();

    let invalid = store.update_status(&created.id, RequestStatus::Closed, "mod-1").await;
    assert_eq!(invalid.unwrap_err().kind, gallery_core::ErrorKind::Conflict);

    let approved = store.update_status(&created.id, RequestStatus::Approved, "mod-1").await.unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);

    let closed = store.update_status(&created.id, RequestStatus::Closed, "mod-2").await.unwrap();
    assert_eq!(closed.status, RequestStatus::Closed);
    assert_eq!(closed.closed_by.as_deref(), Some("mod-2"));
    assert!(closed.closed_at.is_some());

    let reopened = store.update_status(&created.id, RequestStatus::Open, "mod-1").await.unwrap();
    assert_eq!(reopened.status, RequestStatus::Open);
    assert!(reopened.closed_by.is_none());
    assert!(reopened.closed_at.is_none());
}

#[tokio::test]
async fn comments_are_listed_in_creation_order_and_deletion_clears_them() {
    let ns = common::unique_namespace("requests-comments");
    let kv = common::test_kv(&ns).await;
    let store = RequestStore::new(kv);

    let created = store.create(new_request("guild-1", "user-1", "Needs review")).await.unwrap();
    store.add_comment(&created.id, "mod-1", "first".to_owned()).await.unwrap();
    store.add_comment(&created.id, "mod-2", "second".to_owned()).await.unwrap();

    let comments = store.list_comments(&created.id).await.unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0].content, "first");
    assert_eq!(comments[1].content, "second");

    store.delete(&created.id).await.unwrap();
    assert!(store.get(&created.id).await.is_err());
    assert!(store.list_comments(&created.id).await.unwrap().is_empty());
}
