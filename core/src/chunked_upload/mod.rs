//! Chunked upload service (D): process-local resumable uploads, per
//! spec.md §3.2, §4.4.
//!
//! Single-process, in-memory state keyed by `uploadId` — the spec is
//! explicit that this is process-local scratch, not KV-resident, so a
//! `tokio::sync::RwLock<HashMap<..>>` guarded map is the right shape rather
//! than routing it through [`crate::kv::Kv`].

pub mod models;

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::conf::ChunkedUpload as ChunkedUploadConf;
use crate::utils::{ApiError, ErrorKind};

use models::{UploadPhase, UploadProgress, UploadSession, UploadStatus};

pub use models::SessionInfo;

/// Chunks larger than this are rejected (413 equivalent), per spec.md §4.4
pub const MAX_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// The process-local chunked upload service
pub struct ChunkedUploadService {
    sessions: RwLock<HashMap<String, UploadSession>>,
    scratch_root: PathBuf,
    max_chunk_size: u64,
    session_ttl: Duration,
}

impl ChunkedUploadService {
    #[must_use]
    pub fn new(conf: &ChunkedUploadConf, max_chunk_size: u64) -> Self {
        ChunkedUploadService {
            sessions: RwLock::new(HashMap::new()),
            scratch_root: PathBuf::from(&conf.scratch_dir),
            max_chunk_size,
            session_ttl: Duration::hours(conf.session_ttl_hours),
        }
    }

    /// Start a new upload session, allocating a fresh scratch directory
    #[tracing::instrument(name = "ChunkedUploadService::init_session", skip(self), err(Debug))]
    pub async fn init_session(
        &self,
        file_name: String,
        file_type: String,
        total_size: u64,
        gallery_name: String,
        guild_id: String,
    ) -> Result<String, ApiError> {
        let upload_id = Uuid::new_v4().to_string();
        let temp_dir = self.scratch_root.join(&upload_id);
        fs::create_dir_all(&temp_dir).await?;

        let session = UploadSession {
            upload_id: upload_id.clone(),
            file_name,
            file_type,
            total_size,
            gallery_name,
            guild_id,
            temp_dir,
            created_at: Utc::now(),
            progress: UploadProgress::new(total_size),
        };
        self.sessions.write().await.insert(upload_id.clone(), session);
        Ok(upload_id)
    }

    /// Persist one chunk to `tempDir/chunk-<index>`, rejecting oversized
    /// chunks per spec.md §4.4.
    #[tracing::instrument(name = "ChunkedUploadService::save_chunk", skip(self, bytes), err(Debug))]
    pub async fn save_chunk(&self, upload_id: &str, index: u64, bytes: &[u8]) -> Result<(), ApiError> {
        if bytes.len() as u64 > self.max_chunk_size {
            return Err(ApiError::new(
                ErrorKind::ResourceLimit,
                Some(format!(
                    "chunk {index} is {} bytes, exceeding the {} byte cap",
                    bytes.len(),
                    self.max_chunk_size
                )),
            ));
        }
        let temp_dir = {
            let mut sessions = self.sessions.write().await;
            let session = self.require_session_mut(&mut sessions, upload_id)?;
            if session.progress.status == UploadStatus::Pending {
                session.progress.status = UploadStatus::Uploading;
                session.progress.phase = UploadPhase::ClientUpload;
            }
            session.progress.uploaded_bytes += bytes.len() as u64;
            session.temp_dir.clone()
        };
        let chunk_path = temp_dir.join(format!("chunk-{index}"));
        let mut file = File::create(&chunk_path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    /// Sequentially concatenate chunks `0..k` (k = number of chunk files on
    /// disk) into one file, returning its absolute path. No parallelism:
    /// assembly streams rather than buffering the whole upload in memory.
    #[tracing::instrument(name = "ChunkedUploadService::finalize", skip(self), err(Debug))]
    pub async fn finalize(&self, upload_id: &str) -> Result<PathBuf, ApiError> {
        let (temp_dir, file_name) = {
            let mut sessions = self.sessions.write().await;
            let session = self.require_session_mut(&mut sessions, upload_id)?;
            session.progress.status = UploadStatus::Processing;
            session.progress.phase = UploadPhase::ServerAssemble;
            (session.temp_dir.clone(), session.file_name.clone())
        };

        let mut chunk_count = 0u64;
        while fs::try_exists(temp_dir.join(format!("chunk-{chunk_count}"))).await? {
            chunk_count += 1;
        }

        let assembled_path = temp_dir
            .parent()
            .unwrap_or(&temp_dir)
            .join(format!("{upload_id}-{file_name}"));
        let mut output = File::create(&assembled_path).await?;
        for index in 0..chunk_count {
            let mut chunk = File::open(temp_dir.join(format!("chunk-{index}"))).await?;
            let mut buf = Vec::new();
            chunk.read_to_end(&mut buf).await?;
            output.write_all(&buf).await?;
        }
        output.flush().await?;
        fs::remove_dir_all(&temp_dir).await?;
        Ok(assembled_path)
    }

    /// Apply a progress delta, per spec.md §3.2's explicit progress API
    pub async fn update_progress(
        &self,
        upload_id: &str,
        status: UploadStatus,
        phase: UploadPhase,
        uploaded_delta: u64,
    ) -> Result<(), ApiError> {
        let mut sessions = self.sessions.write().await;
        let session = self.require_session_mut(&mut sessions, upload_id)?;
        session.progress.status = status;
        session.progress.phase = phase;
        session.progress.uploaded_bytes += uploaded_delta;
        Ok(())
    }

    /// Mark a session's progress as `completed`, with the final file count
    pub async fn mark_completed(
        &self,
        upload_id: &str,
        processed_files: Option<u64>,
        total_files: Option<u64>,
    ) -> Result<(), ApiError> {
        let mut sessions = self.sessions.write().await;
        let session = self.require_session_mut(&mut sessions, upload_id)?;
        session.progress.status = UploadStatus::Completed;
        session.progress.processed_files = processed_files;
        session.progress.total_files = total_files;
        session.progress.error = None;
        Ok(())
    }

    /// Mark a session's progress as `failed`, recording the error
    pub async fn mark_failed(&self, upload_id: &str, error: impl Into<String>) -> Result<(), ApiError> {
        let mut sessions = self.sessions.write().await;
        let session = self.require_session_mut(&mut sessions, upload_id)?;
        session.progress.status = UploadStatus::Failed;
        session.progress.error = Some(error.into());
        Ok(())
    }

    /// Read a session's current progress
    pub async fn progress(&self, upload_id: &str) -> Result<UploadProgress, ApiError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(upload_id)
            .map(|s| s.progress.clone())
            .ok_or_else(|| ApiError::new(ErrorKind::NotFound, Some(format!("no upload session {upload_id}"))))
    }

    /// Read the static fields of a session (everything but its progress),
    /// for callers that need to hand the assembled file off to the next
    /// stage of the pipeline once a session has finished uploading.
    pub async fn session_info(&self, upload_id: &str) -> Result<SessionInfo, ApiError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(upload_id)
            .map(|s| SessionInfo {
                file_name: s.file_name.clone(),
                file_type: s.file_type.clone(),
                gallery_name: s.gallery_name.clone(),
                guild_id: s.guild_id.clone(),
            })
            .ok_or_else(|| ApiError::new(ErrorKind::NotFound, Some(format!("no upload session {upload_id}"))))
    }

    /// Reap sessions whose `createdAt` is older than the configured TTL
    /// (default 24h), removing their scratch directories.
    #[tracing::instrument(name = "ChunkedUploadService::cleanup_expired", skip(self))]
    pub async fn cleanup_expired(&self) {
        let cutoff = self.cutoff(Utc::now());
        let expired: Vec<(String, PathBuf)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, s)| s.created_at < cutoff)
                .map(|(id, s)| (id.clone(), s.temp_dir.clone()))
                .collect()
        };
        for (id, dir) in expired {
            self.sessions.write().await.remove(&id);
            if let Err(err) = fs::remove_dir_all(&dir).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::event!(tracing::Level::WARN, error = %err, upload_id = %id, "failed to remove expired upload scratch dir");
                }
            }
        }
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.session_ttl
    }

    fn require_session_mut<'a>(
        &self,
        sessions: &'a mut HashMap<String, UploadSession>,
        upload_id: &str,
    ) -> Result<&'a mut UploadSession, ApiError> {
        sessions
            .get_mut(upload_id)
            .ok_or_else(|| ApiError::new(ErrorKind::NotFound, Some(format!("no upload session {upload_id}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf(dir: &std::path::Path) -> ChunkedUploadConf {
        ChunkedUploadConf {
            scratch_dir: dir.to_string_lossy().into_owned(),
            session_ttl_hours: 24,
        }
    }

    #[tokio::test]
    async fn chunks_assemble_in_order_regardless_of_write_order() {
        let tmp = std::env::temp_dir().join(format!("gallery-test-{}", Uuid::new_v4()));
        let svc = ChunkedUploadService::new(&conf(&tmp), MAX_CHUNK_SIZE);
        let id = svc
            .init_session(
                "greeting.txt".to_owned(),
                "text/plain".to_owned(),
                23,
                "gallery".to_owned(),
                "guild".to_owned(),
            )
            .await
            .unwrap();

        // write out of order: 2, 0, 1
        svc.save_chunk(&id, 2, b"World!").await.unwrap();
        svc.save_chunk(&id, 0, b"Hello, ").await.unwrap();
        svc.save_chunk(&id, 1, b"Beautiful ").await.unwrap();

        let path = svc.finalize(&id).await.unwrap();
        let contents = fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "Hello, Beautiful World!");

        fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn oversized_chunk_is_rejected() {
        let tmp = std::env::temp_dir().join(format!("gallery-test-{}", Uuid::new_v4()));
        let svc = ChunkedUploadService::new(&conf(&tmp), 4);
        let id = svc
            .init_session(
                "f.bin".to_owned(),
                "application/octet-stream".to_owned(),
                10,
                "gallery".to_owned(),
                "guild".to_owned(),
            )
            .await
            .unwrap();
        let err = svc.save_chunk(&id, 0, b"too big").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ResourceLimit);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let tmp = std::env::temp_dir().join(format!("gallery-test-{}", Uuid::new_v4()));
        let svc = ChunkedUploadService::new(&conf(&tmp), MAX_CHUNK_SIZE);
        let err = svc.progress("nonexistent").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
