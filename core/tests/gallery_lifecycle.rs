//! Integration tests for the gallery metadata service (C) against a live
//! Redis, per spec.md §8's end-to-end scenarios 1 and 5 ("expiry sweep").
//!
//! Requires `GALLERY_TEST_REDIS_URL` (default `redis://127.0.0.1:6379/`).

mod common;

use std::sync::Arc;

use gallery_core::gallery::GalleryService;
use gallery_core::kv::keys::GalleryKeys;
use gallery_core::kv::Kv;

#[tokio::test]
async fn create_derives_slug_and_expiry_and_lists_the_gallery() {
    let ns = common::unique_namespace("create");
    let kv = common::test_kv(&ns).await;
    let store = common::unreachable_store();
    let svc = GalleryService::new(kv, store);

    let gallery = svc
        .create("guild-1", "Summer '25", 4, "user-1")
        .await
        .expect("create should succeed even though the object store is unreachable");

    assert_eq!(gallery.meta.folder_name, "summer-25");
    let expected_span_ms = 4 * 7 * 24 * 60 * 60 * 1000;
    let actual_span_ms = (gallery.meta.expires_at - gallery.meta.created_at).num_milliseconds();
    assert_eq!(actual_span_ms, expected_span_ms);

    let listed = svc.list("guild-1").await.expect("list should succeed");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Summer '25");
}

#[tokio::test]
async fn create_rejects_a_colliding_slug() {
    let ns = common::unique_namespace("collide");
    let kv = common::test_kv(&ns).await;
    let store = common::unreachable_store();
    let svc = GalleryService::new(kv, store);

    svc.create("guild-1", "My Gallery", 1, "user-1").await.unwrap();
    let err = svc
        .create("guild-1", "My!!!Gallery", 1, "user-1")
        .await
        .expect_err("a second gallery slugging to the same path must be rejected");
    assert_eq!(err.kind, gallery_core::ErrorKind::Conflict);
}

#[tokio::test]
async fn list_sweeps_expired_entries_and_keeps_the_live_one() {
    let ns = common::unique_namespace("sweep");
    let kv = common::test_kv(&ns).await;
    let store = common::unreachable_store();
    let svc = GalleryService::new(Arc::clone(&kv), store);

    // one live gallery through the normal API
    svc.create("guild-1", "Still Live", 4, "user-1").await.unwrap();

    // two expired galleries, written directly since create() only accepts
    // ttlWeeks >= 1 (always in the future) -- this simulates galleries whose
    // time has already passed.
    seed_expired_gallery(&kv, "guild-1", "Old One").await;
    seed_expired_gallery(&kv, "guild-1", "Older Still").await;

    let listed = svc.list("guild-1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Still Live");

    // the sweep must have removed the expired rows from both indexes
    let remaining_names = kv.smembers(&GalleryKeys::list(&kv.namespace, "guild-1")).await.unwrap();
    assert_eq!(remaining_names, vec!["Still Live".to_owned()]);
    let expiries = kv
        .zrange(&GalleryKeys::expiries(&kv.namespace), 0, -1)
        .await
        .unwrap();
    assert_eq!(expiries.len(), 1);
}

async fn seed_expired_gallery(kv: &Kv, guild_id: &str, name: &str) {
    use chrono::{Duration, Utc};
    use gallery_core::gallery::models::GalleryMeta;

    let now = Utc::now();
    let meta = GalleryMeta {
        created_at: now - Duration::weeks(10),
        expires_at: now - Duration::weeks(1),
        ttl_weeks: 9,
        created_by: "user-1".to_owned(),
        folder_name: gallery_core::naming::slug(name),
        total_items: 0,
    };
    let ns = &kv.namespace;
    let mut pipe = Kv::new_pipeline();
    pipe.cmd("sadd").arg(GalleryKeys::list(ns, guild_id)).arg(name);
    pipe.cmd("set")
        .arg(GalleryKeys::meta(ns, guild_id, name))
        .arg(serde_json::to_string(&meta).unwrap());
    pipe.cmd("zadd")
        .arg(GalleryKeys::expiries(ns))
        .arg(meta.expires_at.timestamp_millis())
        .arg(GalleryKeys::member(ns, guild_id, name));
    let (): () = kv.pipeline(&pipe).await.unwrap();
}
