//! Chunked upload session models, per spec.md §3.2

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The overall lifecycle state of an upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Processing,
    Completed,
    Failed,
}

/// Which leg of the pipeline is currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadPhase {
    ClientUpload,
    ServerAssemble,
    ServerZipExtract,
    ServerUpload,
}

/// The progress record polled by clients, per spec.md §3.2
#[derive(Debug, Clone, Serialize)]
pub struct UploadProgress {
    pub status: UploadStatus,
    pub phase: UploadPhase,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_files: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_files: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadProgress {
    #[must_use]
    pub fn new(total_bytes: u64) -> Self {
        UploadProgress {
            status: UploadStatus::Pending,
            phase: UploadPhase::ClientUpload,
            uploaded_bytes: 0,
            total_bytes,
            processed_files: None,
            total_files: None,
            error: None,
        }
    }
}

/// The static, non-progress fields of a session, handed back to the caller
/// once an upload finishes so it can be routed into the next pipeline stage
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub file_name: String,
    pub file_type: String,
    pub gallery_name: String,
    pub guild_id: String,
}

/// A single resumable upload session, per spec.md §3.2/§4.4
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_id: String,
    pub file_name: String,
    pub file_type: String,
    pub total_size: u64,
    pub gallery_name: String,
    pub guild_id: String,
    /// The local scratch directory chunks are written under, one per session
    pub temp_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub progress: UploadProgress,
}
