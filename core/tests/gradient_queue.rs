//! Integration tests for the gradient worker's queue-facing behavior (F)
//! against a live Redis, per spec.md §8 ("gradient enqueue idempotence").
//!
//! `enqueue` never touches the object store, so these don't need a live S3.
//!
//! Requires `GALLERY_TEST_REDIS_URL` (default `redis://127.0.0.1:6379/`).

mod common;

use gallery_core::conf::GradientWorker as GradientWorkerConf;
use gallery_core::gradient::models::GradientEnqueueRequest;
use gallery_core::gradient::GradientWorker;
use gallery_core::kv::keys::GradientKeys;

fn enabled_conf() -> GradientWorkerConf {
    GradientWorkerConf {
        enabled: true,
        concurrency: 2,
        max_retries: 3,
        poll_interval_ms: 50,
    }
}

fn enqueue_req(storage_key: &str) -> GradientEnqueueRequest {
    GradientEnqueueRequest {
        guild_id: "guild-1".to_owned(),
        gallery_name: "Summer '25".to_owned(),
        storage_key: storage_key.to_owned(),
        item_id: "item-1".to_owned(),
    }
}

#[tokio::test]
async fn enqueue_is_idempotent_per_storage_key() {
    let ns = common::unique_namespace("gradient-idempotent");
    let kv = common::test_kv(&ns).await;
    let store = common::unreachable_store();
    let worker = GradientWorker::new(kv.clone(), store, enabled_conf());

    let key = "guild-1/summer-25/uploads/2025-01-01/1-0-a.png";
    let first = worker.enqueue(enqueue_req(key)).await.unwrap().unwrap();
    let second = worker.enqueue(enqueue_req(key)).await.unwrap().unwrap();
    assert_eq!(first, second);

    // queued exactly once across both calls
    let queue_len = kv.llen(&GradientKeys::queue(&kv.namespace)).await.unwrap();
    assert_eq!(queue_len, 1);
}

#[tokio::test]
async fn disabled_worker_never_enqueues() {
    let ns = common::unique_namespace("gradient-disabled");
    let kv = common::test_kv(&ns).await;
    let store = common::unreachable_store();
    let mut conf = enabled_conf();
    conf.enabled = false;
    let worker = GradientWorker::new(kv.clone(), store, conf);

    let outcome = worker.enqueue(enqueue_req("guild-1/slug/uploads/x.png")).await.unwrap();
    assert!(outcome.is_none());

    let queue_len = kv.llen(&GradientKeys::queue(&kv.namespace)).await.unwrap();
    assert_eq!(queue_len, 0);
}

#[tokio::test]
async fn enqueue_does_not_overwrite_a_completed_record() {
    use chrono::Utc;
    use gallery_core::gradient::models::{Gradient, GradientRecord, GradientStatus};
    use gallery_core::kv::Kv;

    let ns = common::unique_namespace("gradient-terminal-latch");
    let kv = common::test_kv(&ns).await;
    let store = common::unreachable_store();
    let worker = GradientWorker::new(kv.clone(), store, enabled_conf());

    let key = "guild-1/summer-25/uploads/2025-01-01/1-0-b.png";
    let record_key = GradientKeys::record(&kv.namespace, key);
    let completed = GradientRecord {
        status: GradientStatus::Completed,
        gradient: Some(Gradient {
            palette: vec!["#ff0000".to_owned()],
            primary: "#ff0000".to_owned(),
            secondary: "#00ff00".to_owned(),
            foreground: "#ffffff".to_owned(),
            css_gradient: "linear-gradient(135deg, #ff0000 0%, #00ff00 100%)".to_owned(),
            blur_data_url: "data:image/png;base64,AAAA".to_owned(),
        }),
        attempts: 1,
        last_error: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    kv.set(&record_key, &serde_json::to_string(&completed).unwrap())
        .await
        .unwrap();

    // the job key itself is absent, so enqueue will proceed to the
    // "mark pending unless completed" branch and must leave the completed
    // record untouched.
    worker.enqueue(enqueue_req(key)).await.unwrap();

    let raw = kv.get(&record_key).await.unwrap().unwrap();
    let stored: GradientRecord = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored.status, GradientStatus::Completed);
    let _ = Kv::new_pipeline(); // exercise the same pipeline builder other tests use
}
