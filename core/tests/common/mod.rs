//! Shared integration-test scaffolding: a real Redis connection and an
//! object store pointed at an endpoint nothing is listening on.
//!
//! Mirrors the teacher's own convention of testing against live
//! infrastructure rather than mocks (`api/tests/*.rs` +
//! `test_utilities::admin_client()` connect to an already-running
//! deployment): these tests need a real Redis reachable at
//! `GALLERY_TEST_REDIS_URL` (default `redis://127.0.0.1:6379/`). They lean on
//! `GalleryService::create`'s existing warn-and-continue handling of a
//! failed folder-marker write so the KV-only assertions below don't also
//! require a live S3-compatible endpoint.

use std::sync::Arc;

use bb8_redis::bb8::Pool;
use bb8_redis::RedisConnectionManager;

use gallery_core::conf::S3 as S3Conf;
use gallery_core::kv::Kv;
use gallery_core::store::ObjectStore;

pub async fn test_kv(namespace: &str) -> Arc<Kv> {
    let url = std::env::var("GALLERY_TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_owned());
    let manager = RedisConnectionManager::new(url).expect("a valid redis url");
    let pool = Pool::builder()
        .max_size(5)
        .build(manager)
        .await
        .expect("a redis instance reachable at GALLERY_TEST_REDIS_URL for integration tests");
    Arc::new(Kv::from_pool(pool, namespace))
}

/// An `ObjectStore` pointed at an endpoint nothing is listening on; any call
/// that actually needs a reply will fail, which is fine for the KV-only
/// scenarios these tests exercise (`create`'s folder marker write is
/// best-effort and only logs a warning on failure).
pub fn unreachable_store() -> Arc<ObjectStore> {
    let conf = S3Conf {
        bucket: "gallery-test-bucket".to_owned(),
        access_key: "test".to_owned(),
        secret_key: "test".to_owned(),
        endpoint: "http://127.0.0.1:1".to_owned(),
        region: "us-east-1".to_owned(),
    };
    Arc::new(ObjectStore::new(&conf))
}

/// A fresh, collision-free namespace for one test run
pub fn unique_namespace(test_name: &str) -> String {
    format!("gallery-test-{test_name}-{}", uuid::Uuid::new_v4())
}
