//! A standalone gradient-worker process, analogous to thorium's
//! `scaler`/`reactor` binaries: loads config, builds the KV + object-store
//! adapters, and runs the gradient dispatcher loop to completion/shutdown
//! signal. Its own binary (rather than only an in-process task spawned by
//! `gallery-api`) matches the deployment model spec.md's Design Notes call
//! out: multiple worker processes may run concurrently against the same
//! KV-resident queue, each contending via `LMOVE`.

mod args;

use std::sync::Arc;

use clap::Parser;
use gallery_core::conf::Conf;
use gallery_core::gradient::GradientWorker;
use gallery_core::kv::Kv;
use gallery_core::store::ObjectStore;

#[tokio::main]
async fn main() {
    let args = args::Args::parse();
    let conf = Conf::new(&args.config).expect("Failed to load config");
    gallery_core::utils::trace::setup("GalleryWorker", &conf.tracing.level);

    let store = Arc::new(ObjectStore::new(&conf.s3));
    if let Err(err) = store.ensure_bucket().await {
        panic!("tenant bucket is not reachable, refusing to start: {err}");
    }
    let kv = Arc::new(Kv::new(&conf.redis).await);

    if !conf.gradient_worker.enabled {
        tracing::event!(
            tracing::Level::WARN,
            "GRADIENT_WORKER_ENABLED is false; this process has nothing to do and will idle"
        );
    }

    let worker = Arc::new(GradientWorker::new(kv, store, conf.gradient_worker.clone()));
    worker.start().await;
    tracing::event!(
        tracing::Level::INFO,
        concurrency = conf.gradient_worker.concurrency,
        poll_interval_ms = conf.gradient_worker.poll_interval_ms,
        "gradient dispatcher started"
    );

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for the shutdown signal");
    tracing::event!(tracing::Level::INFO, "shutdown signal received, draining in-flight jobs");
    worker.stop().await;
}
