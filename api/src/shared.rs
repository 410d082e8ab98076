//! Shared, process-wide state every route handler reaches through, the way
//! thorium's `utils::Shared` bundles its backend clients for `AppState`.

use std::sync::Arc;

use gallery_core::chunked_upload::ChunkedUploadService;
use gallery_core::conf::Conf;
use gallery_core::gallery::GalleryService;
use gallery_core::gradient::GradientWorker;
use gallery_core::kv::Kv;
use gallery_core::requests::RequestStore;
use gallery_core::store::ObjectStore;
use gallery_core::zip_pipeline::ZipPipeline;

/// Every backend client and service a route handler might need
pub struct Shared {
    pub conf: Conf,
    pub galleries: GalleryService,
    pub chunked_uploads: ChunkedUploadService,
    pub zip_pipeline: ZipPipeline,
    pub gradient_worker: Arc<GradientWorker>,
    pub requests: RequestStore,
}

impl Shared {
    /// Build every backend adapter/service from config, failing startup if
    /// the tenant bucket is unreachable (spec.md §4.2, §7: `Fatal`).
    pub async fn new(conf: Conf) -> Self {
        let store = Arc::new(ObjectStore::new(&conf.s3));
        if let Err(err) = store.ensure_bucket().await {
            panic!("tenant bucket is not reachable, refusing to start: {err}");
        }
        let kv = Arc::new(Kv::new(&conf.redis).await);

        let galleries = GalleryService::new(Arc::clone(&kv), Arc::clone(&store));
        let chunked_uploads = ChunkedUploadService::new(&conf.chunked_upload, conf.limits.max_chunk_size);
        let zip_pipeline = ZipPipeline::new(Arc::clone(&kv), Arc::clone(&store), conf.limits.clone());
        let gradient_worker = Arc::new(GradientWorker::new(
            Arc::clone(&kv),
            Arc::clone(&store),
            conf.gradient_worker.clone(),
        ));
        let requests = RequestStore::new(Arc::clone(&kv));

        Shared {
            conf,
            galleries,
            chunked_uploads,
            zip_pipeline,
            gradient_worker,
            requests,
        }
    }
}
