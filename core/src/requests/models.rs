//! Request/ticket and comment models, per spec.md §3.5

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The lifecycle state of one request, per spec.md §3.5's transition graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Open,
    Approved,
    Denied,
    Cancelled,
    Closed,
}

impl RequestStatus {
    /// The string used as the `request:status:<s>` index suffix
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::Approved => "approved",
            RequestStatus::Denied => "denied",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Closed => "closed",
        }
    }
}

/// `true` iff `(from, to)` is an edge in the directed transition graph:
/// `open -> {approved, denied, cancelled}`, `{approved, denied, cancelled} ->
/// closed`, `closed -> open`. All other pairs, including self-transitions,
/// are rejected.
#[must_use]
pub fn is_valid_transition(from: RequestStatus, to: RequestStatus) -> bool {
    use RequestStatus::{Approved, Cancelled, Closed, Denied, Open};
    matches!(
        (from, to),
        (Open, Approved)
            | (Open, Denied)
            | (Open, Cancelled)
            | (Approved, Closed)
            | (Denied, Closed)
            | (Cancelled, Closed)
            | (Closed, Open)
    )
}

/// The persisted `request:<id>` record, 30 day TTL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub guild_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gallery_id: Option<String>,
    pub title: String,
    pub description: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<String>,
}

/// A new request's required fields, validated by `RequestStore::create`
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub guild_id: String,
    pub user_id: String,
    pub gallery_id: Option<String>,
    pub title: String,
    pub description: String,
}

impl NewRequest {
    pub fn validate(&self) -> Result<(), crate::utils::ApiError> {
        if self.guild_id.trim().is_empty() || self.user_id.trim().is_empty() {
            return crate::bad!("guildId and userId must not be empty".to_owned());
        }
        if self.title.trim().is_empty() {
            return crate::bad!("request title must not be empty".to_owned());
        }
        Ok(())
    }
}

/// The persisted `request:comment:<id>` record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub request_id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Filters accepted by `RequestStore::list`, per spec.md §4.7
#[derive(Debug, Clone, Default)]
pub struct RequestListFilter {
    /// Guild(s) to scope the query to. A single entry reads that guild's
    /// index directly; more than one goes through a transient `SUNION`
    /// scratch key before intersecting with the other filters.
    pub guild_ids: Vec<String>,
    pub user_id: Option<String>,
    pub status: Option<RequestStatus>,
}

/// One page of a cursor-paginated request listing
#[derive(Debug, Clone, Serialize)]
pub struct RequestPage {
    pub items: Vec<Request>,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequestStatus::{Approved, Cancelled, Closed, Denied, Open};

    #[test]
    fn open_to_closed_directly_is_invalid() {
        assert!(!is_valid_transition(Open, Closed));
    }

    #[test]
    fn open_fans_out_to_three_terminal_review_states() {
        assert!(is_valid_transition(Open, Approved));
        assert!(is_valid_transition(Open, Denied));
        assert!(is_valid_transition(Open, Cancelled));
    }

    #[test]
    fn review_states_only_go_to_closed() {
        for from in [Approved, Denied, Cancelled] {
            assert!(is_valid_transition(from, Closed));
            assert!(!is_valid_transition(from, Open));
        }
    }

    #[test]
    fn closed_reopens_to_open_only() {
        assert!(is_valid_transition(Closed, Open));
        assert!(!is_valid_transition(Closed, Approved));
    }

    #[test]
    fn self_transitions_are_always_invalid() {
        for s in [Open, Approved, Denied, Cancelled, Closed] {
            assert!(!is_valid_transition(s, s));
        }
    }
}
