//! The shared configuration for the gallery platform

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Helps serde default the redis connection pool size
fn default_pool_size() -> u32 {
    10
}

/// Helps serde default the s3 region
fn default_s3_region() -> String {
    "us-east-1".to_owned()
}

/// Redis connection settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Redis {
    /// The host redis is reachable at
    pub host: String,
    /// The port redis is bound to
    #[serde(default = "default_redis_port")]
    pub port: u16,
    /// The number of connections to keep in the pool
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// A username to use if redis has authentication enabled
    pub username: Option<String>,
    /// A password to use if redis has authentication enabled
    pub password: Option<String>,
    /// The key namespace prefix all gallery keys are written under
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_redis_port() -> u16 {
    6379
}

fn default_namespace() -> String {
    "gallery".to_owned()
}

/// S3-compatible object store connection settings, per spec.md §6.3
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct S3 {
    /// The single tenant bucket every gallery lives under (`MASTER_BUCKET_NAME`)
    pub bucket: String,
    /// The access key to authenticate with
    pub access_key: String,
    /// The secret key to authenticate with
    pub secret_key: String,
    /// The endpoint to talk to (`S3_ENDPOINT`)
    pub endpoint: String,
    /// The region our client should present
    #[serde(default = "default_s3_region")]
    pub region: String,
}

/// Helps serde default the gradient worker's concurrency
fn default_gradient_concurrency() -> usize {
    4
}

/// Helps serde default the gradient worker's max retries per image
fn default_gradient_max_retries() -> u32 {
    5
}

/// Helps serde default the gradient worker's dispatcher poll interval
fn default_gradient_poll_interval_ms() -> u64 {
    1_000
}

/// Gradient worker settings, per spec.md §4.6, §6.3
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GradientWorker {
    /// Master switch; when false `enqueue` returns `None` and the dispatcher is a no-op
    #[serde(default)]
    pub enabled: bool,
    /// Max in-flight gradient jobs per process (`GRADIENT_WORKER_CONCURRENCY`)
    #[serde(default = "default_gradient_concurrency")]
    pub concurrency: usize,
    /// Per-image retry cap (`GRADIENT_JOB_MAX_RETRIES`)
    #[serde(default = "default_gradient_max_retries")]
    pub max_retries: u32,
    /// Dispatcher tick cadence in ms (`GRADIENT_WORKER_POLL_INTERVAL_MS`)
    #[serde(default = "default_gradient_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for GradientWorker {
    fn default() -> Self {
        GradientWorker {
            enabled: false,
            concurrency: default_gradient_concurrency(),
            max_retries: default_gradient_max_retries(),
            poll_interval_ms: default_gradient_poll_interval_ms(),
        }
    }
}

/// Helps serde default the max chunk size (10 MiB)
fn default_max_chunk_size() -> u64 {
    10 * 1024 * 1024
}

/// Helps serde default the max ZIP entry count
fn default_max_zip_entries() -> usize {
    1000
}

/// Helps serde default the max ZIP uncompressed size (500 MiB)
fn default_max_zip_uncompressed_bytes() -> u64 {
    500 * 1024 * 1024
}

/// Helps serde default the ZIP processing wall-clock budget (5 minutes)
fn default_max_processing_duration_ms() -> u64 {
    300_000
}

/// Helps serde default how many ZIP entries pass between progress writes
fn default_progress_update_interval() -> usize {
    10
}

/// Upload limits, per spec.md §6.3
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Limits {
    /// Max bytes accepted per chunk (`MAX_CHUNK_SIZE`)
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Max entries allowed in one ZIP (`MAX_ZIP_ENTRIES`)
    #[serde(default = "default_max_zip_entries")]
    pub max_zip_entries: usize,
    /// Max cumulative uncompressed bytes allowed in one ZIP (`MAX_ZIP_UNCOMPRESSED_BYTES`)
    #[serde(default = "default_max_zip_uncompressed_bytes")]
    pub max_zip_uncompressed_bytes: u64,
    /// Max wall-clock time allowed to process one ZIP (`MAX_PROCESSING_DURATION_MS`)
    #[serde(default = "default_max_processing_duration_ms")]
    pub max_processing_duration_ms: u64,
    /// How many processed ZIP entries pass between intermediate progress writes
    #[serde(default = "default_progress_update_interval")]
    pub progress_update_interval: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_chunk_size: default_max_chunk_size(),
            max_zip_entries: default_max_zip_entries(),
            max_zip_uncompressed_bytes: default_max_zip_uncompressed_bytes(),
            max_processing_duration_ms: default_max_processing_duration_ms(),
            progress_update_interval: default_progress_update_interval(),
        }
    }
}

/// Helps serde default the upload-session janitor TTL (24h)
fn default_session_ttl_hours() -> i64 {
    24
}

/// Chunked upload session settings, per spec.md §3.2, §4.4
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChunkedUpload {
    /// The local scratch directory chunk sessions are written under
    pub scratch_dir: String,
    /// Sessions older than this many hours are reaped
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

/// Helps serde default the local tracing level
fn default_tracing_level() -> String {
    "info".to_owned()
}

/// Tracing settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tracing {
    /// The default filter directive to use if `RUST_LOG` is unset
    #[serde(default = "default_tracing_level")]
    pub level: String,
}

impl Default for Tracing {
    fn default() -> Self {
        Tracing {
            level: default_tracing_level(),
        }
    }
}

/// Helps serde default the bind interface
fn default_interface() -> String {
    "0.0.0.0".to_owned()
}

/// Helps serde default the bind port
fn default_port() -> u16 {
    8080
}

/// HTTP server bind settings, consumed only by `gallery-api`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Server {
    /// The interface to bind to
    #[serde(default = "default_interface")]
    pub interface: String,
    /// The port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            interface: default_interface(),
            port: default_port(),
        }
    }
}

/// The full gallery platform configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Conf {
    /// Redis connection settings
    pub redis: Redis,
    /// S3-compatible object store settings
    pub s3: S3,
    /// Gradient worker settings
    #[serde(default)]
    pub gradient_worker: GradientWorker,
    /// Upload limits
    #[serde(default)]
    pub limits: Limits,
    /// Chunked upload settings
    pub chunked_upload: ChunkedUpload,
    /// Tracing settings
    #[serde(default)]
    pub tracing: Tracing,
    /// HTTP server bind settings
    #[serde(default)]
    pub server: Server,
}

impl Conf {
    /// Load config from a YAML file, overlaid with `GALLERY__`-prefixed env vars
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the YAML config file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Yaml))
            .add_source(
                config::Environment::with_prefix("gallery")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
