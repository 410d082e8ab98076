//! Upload job models (ZIP ingestion pipeline, E), per spec.md §3.3

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The lifecycle state of one upload job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One file this job successfully uploaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub key: String,
    pub content_type: String,
}

/// One file this job failed to upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedFile {
    pub filename: String,
    pub error: String,
}

/// Per spec.md §3.3: `uploadedFiles`/`failedFiles` are empty on intermediate
/// updates and fully materialized only on the final update.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UploadJobProgress {
    pub processed_files: u64,
    pub total_files: u64,
    pub uploaded_files: Vec<UploadedFile>,
    pub failed_files: Vec<FailedFile>,
}

/// The persistent `upload:job:<id>` record, per spec.md §3.3
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub job_id: String,
    pub guild_id: String,
    pub gallery_name: String,
    pub filename: String,
    pub file_size: u64,
    pub status: UploadJobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub progress: UploadJobProgress,
}

impl UploadJob {
    #[must_use]
    pub fn new(job_id: String, guild_id: String, gallery_name: String, filename: String, file_size: u64) -> Self {
        UploadJob {
            job_id,
            guild_id,
            gallery_name,
            filename,
            file_size,
            status: UploadJobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            progress: UploadJobProgress::default(),
        }
    }
}

/// The result of routing one uploaded file, per spec.md §4.5's decision tree
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum UploadOutcome {
    /// A single image, uploaded synchronously
    Sync { uploaded: UploadedFile },
    /// A ZIP, being processed in the background
    Async { job_id: String },
}

/// What kind of payload `classify_upload` decided this is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadClass {
    Image,
    Zip,
    Unsupported,
}
