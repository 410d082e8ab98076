//! The gradient worker (F): a durable at-least-once job queue over the KV
//! store with a delayed-retry sorted set, bounded concurrency, exponential
//! backoff, and idempotent per-image de-duplication. Per spec.md §3.4, §4.6.
//!
//! Modeled as an explicitly started/stopped service value (spec.md §9's
//! "Design Notes" rearchitecture of the source's singleton worker instance)
//! rather than a lazily-initialized global: `GradientWorker::new` builds an
//! idle value, `start()` spawns the dispatcher task, `stop()` drains
//! in-flight jobs back onto the queue before returning.

pub mod models;
pub mod palette;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::conf::GradientWorker as GradientWorkerConf;
use crate::kv::keys::GradientKeys;
use crate::kv::{Direction, Kv};
use crate::store::ObjectStore;
use crate::utils::{ApiError, ErrorKind};

use models::{
    Gradient, GradientEnqueueRequest, GradientJob, GradientMetricsSnapshot, GradientRecord,
    GradientStatus,
};

/// Gradient job payload TTL, per spec.md §6.2
const JOB_TTL_SECS: u64 = 24 * 60 * 60;
/// Gradient per-image record TTL, per spec.md §6.2
const RECORD_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Rolling metrics counters, updated with plain atomics the way thorium's
/// scaler bookkeeping avoids a metrics-crate dependency (Prometheus scrape
/// is out of scope per spec.md §1; the counters are produced, not exported).
#[derive(Default)]
struct GradientMetrics {
    jobs_processed: AtomicU64,
    jobs_failed: AtomicU64,
    /// Running total of processing time in ms, for the rolling average
    total_processing_ms: AtomicU64,
    active_jobs: AtomicUsize,
    is_running: AtomicBool,
}

/// The gradient worker service: owns the queue/dispatcher lifecycle
pub struct GradientWorker {
    kv: Arc<Kv>,
    store: Arc<ObjectStore>,
    conf: GradientWorkerConf,
    metrics: Arc<GradientMetrics>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl GradientWorker {
    #[must_use]
    pub fn new(kv: Arc<Kv>, store: Arc<ObjectStore>, conf: GradientWorkerConf) -> Self {
        GradientWorker {
            kv,
            store,
            conf,
            metrics: Arc::new(GradientMetrics::default()),
            dispatcher: Mutex::new(None),
        }
    }

    /// Enqueue a gradient job for one image. Returns `None` if the worker is
    /// disabled. Idempotent per `storageKey`: a second enqueue for the same
    /// key returns the same job id without re-queuing or touching the
    /// per-image record, per spec.md §4.6/§8.
    #[tracing::instrument(name = "GradientWorker::enqueue", skip(self), err(Debug))]
    pub async fn enqueue(
        &self,
        req: GradientEnqueueRequest,
    ) -> Result<Option<String>, ApiError> {
        if !self.conf.enabled {
            return Ok(None);
        }
        req.validate()?;

        let ns = &self.kv.namespace;
        let job_id = GradientKeys::job_id_for(&req.storage_key);
        let job_key = GradientKeys::job(ns, &job_id);

        if self.kv.get(&job_key).await?.is_some() {
            return Ok(Some(job_id));
        }

        let record_key = GradientKeys::record(ns, &req.storage_key);
        let existing_record: Option<GradientRecord> =
            deserialize_or_absent!(self.kv.get(&record_key).await?);
        let already_completed = matches!(
            existing_record,
            Some(GradientRecord {
                status: GradientStatus::Completed,
                ..
            })
        );
        if !already_completed {
            let now = Utc::now();
            let pending = GradientRecord::pending(now);
            self.kv
                .set_ex(&record_key, &serialize!(&pending), RECORD_TTL_SECS)
                .await?;
        }

        let job = GradientJob {
            job_id: job_id.clone(),
            guild_id: req.guild_id,
            gallery_name: req.gallery_name,
            storage_key: req.storage_key,
            item_id: req.item_id,
            attempts: 0,
            created_at: Utc::now(),
        };
        self.kv
            .set_ex(&job_key, &serialize!(&job), JOB_TTL_SECS)
            .await?;
        self.kv.rpush(&GradientKeys::queue(ns), &job_id).await?;
        Ok(Some(job_id))
    }

    /// Start the dispatcher loop as a background task. No-op if disabled or
    /// already running.
    pub async fn start(self: &Arc<Self>) {
        if !self.conf.enabled {
            return;
        }
        let mut guard = self.dispatcher.lock().await;
        if guard.is_some() {
            return;
        }
        self.metrics.is_running.store(true, Ordering::SeqCst);
        let worker = Arc::clone(self);
        *guard = Some(tokio::spawn(async move { worker.dispatch_loop().await }));
    }

    /// Stop the dispatcher and drain `processing` back onto `queue`, per
    /// spec.md §4.6 shutdown contract: recovered jobs will be re-attempted,
    /// safe because per-image `completed` is a terminal latch.
    pub async fn stop(&self) {
        let mut guard = self.dispatcher.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }
        self.metrics.is_running.store(false, Ordering::SeqCst);

        let ns = &self.kv.namespace;
        let (queue, processing) = (GradientKeys::queue(ns), GradientKeys::processing(ns));
        loop {
            match self
                .kv
                .lmove(&processing, &queue, Direction::Left, Direction::Right)
                .await
            {
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
    }

    /// A snapshot of the worker's current metrics, per spec.md §4.6
    pub async fn metrics(&self) -> Result<GradientMetricsSnapshot, ApiError> {
        let ns = &self.kv.namespace;
        Ok(GradientMetricsSnapshot {
            jobs_processed: self.metrics.jobs_processed.load(Ordering::Relaxed),
            jobs_failed: self.metrics.jobs_failed.load(Ordering::Relaxed),
            avg_processing_time_ms: self.avg_processing_ms(),
            active_jobs: self.metrics.active_jobs.load(Ordering::Relaxed),
            is_running: self.metrics.is_running.load(Ordering::Relaxed),
            is_enabled: self.conf.enabled,
            queue_len: self.kv.llen(&GradientKeys::queue(ns)).await?,
            processing_len: self.kv.llen(&GradientKeys::processing(ns)).await?,
            delayed_len: self.kv.zcard(&GradientKeys::delayed(ns)).await?,
        })
    }

    /// Fetch the current derived-metadata record for one image, if any has
    /// been requested. `None` means no gradient was ever enqueued for this
    /// `storageKey`.
    pub async fn record(&self, storage_key: &str) -> Result<Option<GradientRecord>, ApiError> {
        let key = GradientKeys::record(&self.kv.namespace, storage_key);
        Ok(deserialize_or_absent!(self.kv.get(&key).await?))
    }

    fn avg_processing_ms(&self) -> f64 {
        let processed = self.metrics.jobs_processed.load(Ordering::Relaxed);
        if processed == 0 {
            return 0.0;
        }
        self.metrics.total_processing_ms.load(Ordering::Relaxed) as f64 / processed as f64
    }

    /// The dispatcher: a 1s-cadence ticker that promotes due delayed jobs and
    /// fires up to `concurrency` parallel `process_one` tasks per tick.
    async fn dispatch_loop(self: Arc<Self>) {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_millis(self.conf.poll_interval_ms));
        let gate = Arc::new(Semaphore::new(self.conf.concurrency));
        loop {
            ticker.tick().await;
            if let Err(err) = self.promote_delayed().await {
                tracing::event!(tracing::Level::WARN, error = %err, "failed to promote delayed gradient jobs");
                continue;
            }
            loop {
                let Ok(permit) = Arc::clone(&gate).try_acquire_owned() else {
                    break;
                };
                let ns = &self.kv.namespace;
                let moved = self
                    .kv
                    .lmove(
                        &GradientKeys::queue(ns),
                        &GradientKeys::processing(ns),
                        Direction::Left,
                        Direction::Right,
                    )
                    .await;
                match moved {
                    Ok(Some(job_id)) => {
                        let worker = Arc::clone(&self);
                        self.metrics.active_jobs.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(async move {
                            let _permit = permit;
                            worker.process_one(job_id).await;
                            worker.metrics.active_jobs.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    _ => break,
                }
            }
        }
    }

    /// Move due delayed jobs back onto the main queue
    async fn promote_delayed(&self) -> Result<(), ApiError> {
        let ns = &self.kv.namespace;
        let delayed = GradientKeys::delayed(ns);
        let queue = GradientKeys::queue(ns);
        let now = crate::utils::time::now_ms();
        for job_id in self.kv.zrangebyscore(&delayed, 0, now).await? {
            // reclaim guard: only the caller that actually removed the member re-adds it
            if self.kv.zrem(&delayed, &job_id).await? >= 1 {
                self.kv.rpush(&queue, &job_id).await?;
            }
        }
        Ok(())
    }

    /// Process one job to completion, failure, or delayed-retry, per the
    /// seven steps of spec.md §4.6.
    #[tracing::instrument(name = "GradientWorker::process_one", skip(self), err(Debug))]
    async fn process_one(&self, job_id: String) -> Result<(), ApiError> {
        let ns = &self.kv.namespace;
        let job_key = GradientKeys::job(ns, &job_id);
        let processing = GradientKeys::processing(ns);

        let Some(job_json) = self.kv.get(&job_key).await? else {
            // job state is stale; nothing to do but release the in-flight slot
            self.kv.lrem(&processing, 0, &job_id).await?;
            return Ok(());
        };
        let job: GradientJob = match serde_json::from_str(&job_json) {
            Ok(job) => job,
            Err(_) => {
                self.kv.lrem(&processing, 0, &job_id).await?;
                return Ok(());
            }
        };

        let record_key = GradientKeys::record(ns, &job.storage_key);
        let now = Utc::now();
        let existing: Option<GradientRecord> =
            deserialize_or_absent!(self.kv.get(&record_key).await?);

        // terminal latch: a completed record is never overwritten, even by a
        // stale duplicate delivery (spec.md §4.6/§5) — a redelivered job for
        // an image that already finished is wasted work, not a retry.
        if matches!(existing, Some(GradientRecord { status: GradientStatus::Completed, .. })) {
            self.kv.del(&job_key).await?;
            self.kv.lrem(&processing, 0, &job_id).await?;
            return Ok(());
        }

        let (created_at, _) = existing
            .as_ref()
            .map(|r| (r.created_at, r.attempts))
            .unwrap_or((now, 0));
        let attempts = job.attempts + 1;

        let processing_record = GradientRecord {
            status: GradientStatus::Processing,
            gradient: None,
            attempts,
            last_error: None,
            created_at,
            updated_at: now,
        };
        self.kv
            .set_ex(&record_key, &serialize!(&processing_record), RECORD_TTL_SECS)
            .await?;

        let mut updated_job = job.clone();
        updated_job.attempts = attempts;
        self.kv
            .set_ex(&job_key, &serialize!(&updated_job), JOB_TTL_SECS)
            .await?;

        let started = std::time::Instant::now();
        let outcome = self.run_extraction(&job.storage_key).await;

        match outcome {
            Ok(gradient) => {
                self.mark_completed(&record_key, created_at, attempts, gradient)
                    .await?;
                self.kv.del(&job_key).await?;
                self.kv.lrem(&processing, 0, &job_id).await?;
                self.metrics.jobs_processed.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .total_processing_ms
                    .fetch_add(started.elapsed().as_millis() as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.kv.lrem(&processing, 0, &job_id).await?;
                if attempts >= self.conf.max_retries {
                    self.mark_failed(&record_key, created_at, attempts, &err)
                        .await?;
                    self.kv.del(&job_key).await?;
                    self.metrics.jobs_failed.fetch_add(1, Ordering::Relaxed);
                } else {
                    let backoff_ms = 2_i64.saturating_pow(attempts) * 1000;
                    let retry_at = crate::utils::time::now_ms() + backoff_ms;
                    self.kv
                        .zadd(&GradientKeys::delayed(ns), &job_id, retry_at)
                        .await?;
                }
                Ok(())
            }
        }
    }

    async fn run_extraction(&self, storage_key: &str) -> Result<Gradient, ApiError> {
        let body = self.store.get_object(storage_key).await?;
        let bytes = body.collect().await?;
        if bytes.is_empty() {
            return Err(ApiError::new(
                ErrorKind::Transient,
                Some(format!("object {storage_key} returned an empty body")),
            ));
        }
        palette::extract(&bytes)
    }

    async fn mark_completed(
        &self,
        record_key: &str,
        created_at: chrono::DateTime<Utc>,
        attempts: u32,
        gradient: Gradient,
    ) -> Result<(), ApiError> {
        let record = GradientRecord {
            status: GradientStatus::Completed,
            gradient: Some(gradient),
            attempts,
            last_error: None,
            created_at,
            updated_at: Utc::now(),
        };
        self.kv
            .set_ex(record_key, &serialize!(&record), RECORD_TTL_SECS)
            .await
    }

    async fn mark_failed(
        &self,
        record_key: &str,
        created_at: chrono::DateTime<Utc>,
        attempts: u32,
        err: &ApiError,
    ) -> Result<(), ApiError> {
        let record = GradientRecord {
            status: GradientStatus::Failed,
            gradient: None,
            attempts,
            last_error: Some(err.to_string()),
            created_at,
            updated_at: Utc::now(),
        };
        self.kv
            .set_ex(record_key, &serialize!(&record), RECORD_TTL_SECS)
            .await
    }
}

/// An atomic snapshot read helper exposed for tests that only care about the
/// backoff math, independent of a live dispatcher.
#[must_use]
pub fn backoff_ms(attempts: u32) -> i64 {
    2_i64.saturating_pow(attempts) * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_ms(1), 2000);
        assert_eq!(backoff_ms(2), 4000);
        assert_eq!(backoff_ms(3), 8000);
    }
}
