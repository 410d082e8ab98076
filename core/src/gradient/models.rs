//! Gradient job/record models, per spec.md §3.4

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The lifecycle state of one image's derived gradient metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// The derived UI-placeholder metadata for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gradient {
    /// The N dominant colors extracted from the image, as `#rrggbb` strings
    pub palette: Vec<String>,
    /// The most frequent color in the palette
    pub primary: String,
    /// The second most distinct color by color distance from `primary`
    pub secondary: String,
    /// Black or white, chosen by contrast threshold against `primary`
    pub foreground: String,
    /// `linear-gradient(135deg, <primary> 0%, <secondary> 100%)`
    pub css_gradient: String,
    /// A tiny base64-encoded blurred placeholder image
    pub blur_data_url: String,
}

/// The `gradient:<storageKey>` record, 30 day TTL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientRecord {
    pub status: GradientStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient: Option<Gradient>,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GradientRecord {
    #[must_use]
    pub fn pending(now: DateTime<Utc>) -> Self {
        GradientRecord {
            status: GradientStatus::Pending,
            gradient: None,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The request carried into `enqueue`, per spec.md §4.6
#[derive(Debug, Clone, Deserialize)]
pub struct GradientEnqueueRequest {
    pub guild_id: String,
    pub gallery_name: String,
    pub storage_key: String,
    pub item_id: String,
}

impl GradientEnqueueRequest {
    /// Validate the request is well formed; all four fields must be non-empty
    pub fn validate(&self) -> Result<(), crate::utils::ApiError> {
        if self.guild_id.trim().is_empty()
            || self.gallery_name.trim().is_empty()
            || self.storage_key.trim().is_empty()
            || self.item_id.trim().is_empty()
        {
            return crate::bad!("gradient enqueue request has an empty field".to_owned());
        }
        Ok(())
    }
}

/// The `gradient:job:<id>` payload, 24h TTL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientJob {
    pub job_id: String,
    pub guild_id: String,
    pub gallery_name: String,
    pub storage_key: String,
    pub item_id: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

/// Rolling metrics exposed by the dispatcher, per spec.md §4.6
#[derive(Debug, Default, Serialize)]
pub struct GradientMetricsSnapshot {
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub avg_processing_time_ms: f64,
    pub active_jobs: usize,
    pub is_running: bool,
    pub is_enabled: bool,
    pub queue_len: i64,
    pub processing_len: i64,
    pub delayed_len: i64,
}
