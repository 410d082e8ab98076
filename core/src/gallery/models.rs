//! Gallery metadata models, per spec.md §3.1

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gradient::models::Gradient;

/// The persisted `guild:<g>:gallery:<n>:meta` blob
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GalleryMeta {
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ttl_weeks: u32,
    pub created_by: String,
    pub folder_name: String,
    pub total_items: u64,
}

impl GalleryMeta {
    /// True iff the metadata key exists (implicit) and `expiresAt > now`
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// A gallery as returned to callers: its human-facing name plus metadata
#[derive(Debug, Clone, Serialize)]
pub struct Gallery {
    pub name: String,
    pub guild_id: String,
    #[serde(flatten)]
    pub meta: GalleryMeta,
}

/// One enriched listing entry, per spec.md §4.3 `contents`.
///
/// `gradient`'s outer `Option` controls field presence (omitted for
/// pending/processing/missing gradient records); the inner `Option`
/// distinguishes a completed gradient (`Some`) from a failed one, which the
/// spec requires to serialize as an explicit `null` rather than being
/// omitted.
#[derive(Debug, Clone, Serialize)]
pub struct GalleryItem {
    pub key: String,
    pub size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient: Option<Option<Gradient>>,
}
