//! ZIP ingestion pipeline (E), per spec.md §3.3, §4.5.
//!
//! `classify_upload` is the shared decision function used by both the
//! single-image and ZIP branches. The synchronous archive walk (central
//! directory parse + per-entry decompression) runs inside
//! `tokio::task::spawn_blocking`, the way the teacher's own `zip` usage in
//! `utils/s3.rs::download_as_zip` stays synchronous (`ZipWriter` over a
//! `std::io::Cursor`) even though the surrounding handler is async; the
//! async uploads themselves run back on the normal executor.

pub mod models;

use std::path::{Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

use crate::conf::Limits;
use crate::kv::keys::UploadJobKeys;
use crate::kv::Kv;
use crate::naming::{self};
use crate::store::ObjectStore;
use crate::utils::ApiError;

use models::{FailedFile, UploadClass, UploadJob, UploadJobProgress, UploadJobStatus, UploadOutcome, UploadedFile};

use std::sync::Arc;

/// Image extensions recognized by the single-image fast path, per spec.md §4.5 step 1
const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "avif", "heic"];
/// Upload job record TTL while a job is in flight, per spec.md §6.2
const JOB_TTL_SECS: u64 = 24 * 60 * 60;
/// Upload job record TTL once terminal, for late pollers, per spec.md §3.3
const TERMINAL_TTL_SECS: i64 = 10 * 60;

/// Classify an upload by MIME type, filename extension, and (for ZIP
/// detection) a small prefix of the file's bytes, per spec.md §4.5.
#[must_use]
pub fn classify_upload(filename: &str, mime: Option<&str>, head: &[u8]) -> UploadClass {
    let ext = extension_of(filename);
    let mime_is_image = mime.map(|m| m.starts_with("image/")).unwrap_or(false);
    if mime_is_image || ext.as_deref().is_some_and(|e| IMAGE_EXTS.contains(&e)) {
        return UploadClass::Image;
    }

    let mime_is_zip = matches!(mime, Some("application/zip") | Some("application/x-zip-compressed"));
    let ext_is_zip = ext.as_deref() == Some("zip");
    let magic_is_zip =
        head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") || head.starts_with(b"PK\x07\x08");
    if mime_is_zip || ext_is_zip || magic_is_zip {
        return UploadClass::Zip;
    }
    UploadClass::Unsupported
}

fn extension_of(filename: &str) -> Option<String> {
    if !filename.contains('.') {
        return None;
    }
    filename.rsplit('.').next().map(str::to_lowercase)
}

/// A best-effort content type from a filename's extension
#[must_use]
pub fn guess_content_type(filename: &str) -> String {
    match extension_of(filename).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("avif") => "image/avif",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
    .to_owned()
}

/// One extracted-and-decompressed ZIP entry, ready to upload
struct ExtractedEntry {
    name: String,
    bytes: Vec<u8>,
}

/// The result of the synchronous archive walk
enum ExtractOutcome {
    Entries {
        entries: Vec<ExtractedEntry>,
        failed: Vec<FailedFile>,
    },
    TooManyEntries,
    NoSupportedImages,
    TooLarge,
}

/// Walk a ZIP's central directory, filter to supported image entries, and
/// decompress each into memory one at a time, per spec.md §4.5's bounds.
fn extract_zip_sync(path: &Path, max_entries: usize, max_bytes: u64) -> Result<ExtractOutcome, ApiError> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut archive = zip::ZipArchive::new(reader)?;

    let mut candidates = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_file() {
            let name = entry.name().to_owned();
            let is_image = extension_of(&name).as_deref().is_some_and(|e| IMAGE_EXTS.contains(&e));
            if is_image && !naming::is_apple_artifact(&name) {
                candidates.push((i, name));
            }
        }
    }
    if candidates.len() > max_entries {
        return Ok(ExtractOutcome::TooManyEntries);
    }
    if candidates.is_empty() {
        return Ok(ExtractOutcome::NoSupportedImages);
    }

    let mut entries = Vec::with_capacity(candidates.len());
    let mut failed = Vec::new();
    let mut total_bytes: u64 = 0;
    for (index, name) in candidates {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(err) => {
                failed.push(FailedFile {
                    filename: name,
                    error: err.to_string(),
                });
                continue;
            }
        };
        total_bytes += entry.size();
        if total_bytes > max_bytes {
            return Ok(ExtractOutcome::TooLarge);
        }
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        if let Err(err) = std::io::Read::read_to_end(&mut entry, &mut bytes) {
            failed.push(FailedFile {
                filename: name,
                error: err.to_string(),
            });
            continue;
        }
        entries.push(ExtractedEntry { name, bytes });
    }
    Ok(ExtractOutcome::Entries { entries, failed })
}

/// The ZIP ingestion pipeline (and the shared upload decision tree)
#[derive(Clone)]
pub struct ZipPipeline {
    kv: Arc<Kv>,
    store: Arc<ObjectStore>,
    limits: Limits,
}

impl ZipPipeline {
    #[must_use]
    pub fn new(kv: Arc<Kv>, store: Arc<ObjectStore>, limits: Limits) -> Self {
        ZipPipeline { kv, store, limits }
    }

    /// The decision tree of spec.md §4.5: route a completed upload either to
    /// a synchronous single-image put, or to a backgrounded ZIP job.
    #[tracing::instrument(name = "ZipPipeline::upload_to_gallery", skip(self), err(Debug))]
    pub async fn upload_to_gallery(
        &self,
        guild_id: &str,
        gallery_name: &str,
        object_path: &str,
        filename: &str,
        mime: Option<&str>,
        source: &Path,
    ) -> Result<UploadOutcome, ApiError> {
        let head = read_head(source).await?;
        match classify_upload(filename, mime, &head) {
            UploadClass::Image => {
                let bytes = tokio::fs::read(source).await?;
                let epoch_ms = crate::utils::time::now_ms();
                let key = naming::single_image_key(object_path, epoch_ms, filename);
                let content_type = mime.map(str::to_owned).unwrap_or_else(|| guess_content_type(filename));
                self.store.put_buffer(&key, bytes, &content_type).await?;
                Ok(UploadOutcome::Sync {
                    uploaded: UploadedFile { key, content_type },
                })
            }
            UploadClass::Zip => {
                let job_id = Uuid::new_v4().to_string();
                let file_size = tokio::fs::metadata(source).await?.len();
                let job = UploadJob::new(
                    job_id.clone(),
                    guild_id.to_owned(),
                    gallery_name.to_owned(),
                    filename.to_owned(),
                    file_size,
                );
                self.persist_job(&job).await?;

                let pipeline = self.clone();
                let source = source.to_path_buf();
                let object_path = object_path.to_owned();
                tokio::spawn(async move {
                    pipeline.run_zip_job(job_id, source, object_path).await;
                });
                Ok(UploadOutcome::Async { job_id: job.job_id })
            }
            UploadClass::Unsupported => {
                crate::bad!(format!("unsupported upload type for {filename:?}"))
            }
        }
    }

    /// Fetch one upload job's current record
    pub async fn get_job(&self, job_id: &str) -> Result<UploadJob, ApiError> {
        let key = UploadJobKeys::job(&self.kv.namespace, job_id);
        let raw = self.kv.get(&key).await?;
        match deserialize_or_absent!(raw) {
            Some(job) => Ok(job),
            None => crate::not_found!(format!("no upload job {job_id}")),
        }
    }

    async fn persist_job(&self, job: &UploadJob) -> Result<(), ApiError> {
        let key = UploadJobKeys::job(&self.kv.namespace, &job.job_id);
        self.kv.set_ex(&key, &serialize!(job), JOB_TTL_SECS).await?;
        self.kv
            .rpush(&UploadJobKeys::list(&self.kv.namespace), &job.job_id)
            .await
    }

    /// Run the backgrounded pipeline for one ZIP job to a terminal state,
    /// honoring the wall-clock watchdog of spec.md §4.5/§5.
    async fn run_zip_job(&self, job_id: String, source: PathBuf, object_path: String) {
        let budget = Duration::from_millis(self.limits.max_processing_duration_ms);
        let result = tokio::time::timeout(budget, self.run_zip_job_inner(&job_id, &source, &object_path)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = self.fail_job(&job_id, &err.to_string()).await;
            }
            Err(_elapsed) => {
                let _ = self.fail_job(&job_id, "ZIP processing timed out").await;
            }
        }
        let _ = tokio::fs::remove_file(&source).await;
    }

    async fn run_zip_job_inner(&self, job_id: &str, source: &Path, object_path: &str) -> Result<(), ApiError> {
        self.mark_processing(job_id).await?;

        let max_entries = self.limits.max_zip_entries;
        let max_bytes = self.limits.max_zip_uncompressed_bytes;
        let path = source.to_path_buf();
        let outcome = tokio::task::spawn_blocking(move || extract_zip_sync(&path, max_entries, max_bytes)).await??;

        match outcome {
            ExtractOutcome::NoSupportedImages => {
                self.fail_job(job_id, "ZIP contained no supported image files").await
            }
            ExtractOutcome::TooManyEntries => {
                self.fail_job(job_id, "ZIP limits exceeded: too many entries").await
            }
            ExtractOutcome::TooLarge => {
                self.fail_job(job_id, "ZIP limits exceeded: uncompressed size").await
            }
            ExtractOutcome::Entries { entries, failed } => {
                self.upload_entries(job_id, object_path, entries, failed).await
            }
        }
    }

    /// Upload every extracted entry in order, writing periodic progress
    /// updates, then a final, fully-materialized progress write.
    async fn upload_entries(
        &self,
        job_id: &str,
        object_path: &str,
        entries: Vec<ExtractedEntry>,
        mut failed: Vec<FailedFile>,
    ) -> Result<(), ApiError> {
        let total = entries.len() as u64;
        let timestamp = crate::utils::time::now_ms();
        let mut uploaded = Vec::new();

        for (n, entry) in entries.into_iter().enumerate() {
            let key = naming::zip_entry_key(object_path, timestamp, n, &entry.name);
            let content_type = guess_content_type(&entry.name);
            match self.store.put_buffer(&key, entry.bytes, &content_type).await {
                Ok(()) => uploaded.push(UploadedFile { key, content_type }),
                Err(err) => failed.push(FailedFile {
                    filename: entry.name,
                    error: err.to_string(),
                }),
            }

            let processed = (n + 1) as u64;
            if self.limits.progress_update_interval > 0 && processed % self.limits.progress_update_interval as u64 == 0 {
                self.write_progress(job_id, processed, total, &[], &[]).await?;
            }
        }

        if uploaded.is_empty() {
            return self.fail_job(job_id, "ZIP contained no supported image files").await;
        }

        self.write_progress(job_id, total, total, &uploaded, &failed).await?;
        self.complete_job(job_id).await
    }

    async fn read_job(&self, job_id: &str) -> Result<UploadJob, ApiError> {
        self.get_job(job_id).await
    }

    async fn write_job(&self, job: &UploadJob, ttl_secs: i64) -> Result<(), ApiError> {
        let key = UploadJobKeys::job(&self.kv.namespace, &job.job_id);
        self.kv.set(&key, &serialize!(job)).await?;
        self.kv.expire(&key, ttl_secs).await
    }

    async fn mark_processing(&self, job_id: &str) -> Result<(), ApiError> {
        let mut job = self.read_job(job_id).await?;
        job.status = UploadJobStatus::Processing;
        job.started_at = Some(chrono::Utc::now());
        self.write_job(&job, JOB_TTL_SECS as i64).await
    }

    async fn write_progress(
        &self,
        job_id: &str,
        processed: u64,
        total: u64,
        uploaded: &[UploadedFile],
        failed: &[FailedFile],
    ) -> Result<(), ApiError> {
        let mut job = self.read_job(job_id).await?;
        job.progress = UploadJobProgress {
            processed_files: processed,
            total_files: total,
            uploaded_files: uploaded.to_vec(),
            failed_files: failed.to_vec(),
        };
        self.write_job(&job, JOB_TTL_SECS as i64).await
    }

    async fn complete_job(&self, job_id: &str) -> Result<(), ApiError> {
        let mut job = self.read_job(job_id).await?;
        job.status = UploadJobStatus::Completed;
        job.completed_at = Some(chrono::Utc::now());
        self.write_job(&job, TERMINAL_TTL_SECS).await
    }

    async fn fail_job(&self, job_id: &str, error: &str) -> Result<(), ApiError> {
        let mut job = self.read_job(job_id).await?;
        job.status = UploadJobStatus::Failed;
        job.error = Some(error.to_owned());
        job.completed_at = Some(chrono::Utc::now());
        self.write_job(&job, TERMINAL_TTL_SECS).await
    }
}

/// Read up to the first few bytes of a file for magic-byte sniffing,
/// without reading the whole thing.
async fn read_head(path: &Path) -> Result<Vec<u8>, ApiError> {
    use tokio::io::AsyncReadExt;
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; 8];
    let n = file.read(&mut buf).await?;
    buf.truncate(n);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Build a throwaway ZIP archive with `count` entries named `img-N.jpg`,
    /// each holding `bytes_per_entry` arbitrary bytes, returning its path.
    fn build_zip(count: usize, bytes_per_entry: usize) -> PathBuf {
        let path = std::env::temp_dir().join(format!("gallery-zip-test-{}.zip", Uuid::new_v4()));
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::<()>::default().compression_method(zip::CompressionMethod::Stored);
        let payload = vec![7u8; bytes_per_entry];
        for i in 0..count {
            writer.start_file(format!("img-{i}.jpg"), options).unwrap();
            writer.write_all(&payload).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn extract_zip_sync_reads_every_supported_entry() {
        let path = build_zip(3, 16);
        let outcome = extract_zip_sync(&path, 10, 10_000).unwrap();
        match outcome {
            ExtractOutcome::Entries { entries, failed } => {
                assert_eq!(entries.len(), 3);
                assert!(failed.is_empty());
                assert!(entries.iter().all(|e| e.bytes.len() == 16));
            }
            _ => panic!("expected Entries"),
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn extract_zip_sync_rejects_too_many_entries() {
        let path = build_zip(5, 16);
        let outcome = extract_zip_sync(&path, 3, 10_000).unwrap();
        assert!(matches!(outcome, ExtractOutcome::TooManyEntries));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn extract_zip_sync_rejects_when_uncompressed_size_exceeds_cap() {
        let path = build_zip(3, 100);
        let outcome = extract_zip_sync(&path, 10, 150).unwrap();
        assert!(matches!(outcome, ExtractOutcome::TooLarge));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn extract_zip_sync_reports_no_supported_images_for_an_all_text_archive() {
        let path = std::env::temp_dir().join(format!("gallery-zip-test-{}.zip", Uuid::new_v4()));
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::<()>::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("readme.txt", options).unwrap();
        writer.write_all(b"not an image").unwrap();
        writer.finish().unwrap();

        let outcome = extract_zip_sync(&path, 10, 10_000).unwrap();
        assert!(matches!(outcome, ExtractOutcome::NoSupportedImages));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn classifies_by_extension() {
        assert_eq!(classify_upload("photo.JPG", None, &[]), UploadClass::Image);
        assert_eq!(classify_upload("archive.zip", None, &[]), UploadClass::Zip);
        assert_eq!(classify_upload("notes.txt", None, &[]), UploadClass::Unsupported);
    }

    #[test]
    fn classifies_by_mime_when_extension_is_missing() {
        assert_eq!(classify_upload("blob", Some("image/png"), &[]), UploadClass::Image);
        assert_eq!(classify_upload("blob", Some("application/zip"), &[]), UploadClass::Zip);
    }

    #[test]
    fn classifies_by_magic_bytes() {
        assert_eq!(classify_upload("blob", None, b"PK\x03\x04rest"), UploadClass::Zip);
    }

    #[test]
    fn image_mime_takes_priority_over_zip_extension_edge_cases() {
        // a file genuinely named .zip with an image mime is still treated as an image
        assert_eq!(classify_upload("weird.zip", Some("image/jpeg"), &[]), UploadClass::Image);
    }
}
