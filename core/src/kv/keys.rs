//! KV key builders, per spec.md §6.2
//!
//! Every key in the namespace is built here so the string layout is defined
//! exactly once, the way `models/backends/db/keys/jobs.rs` centralizes job
//! queue/data keys for thorium.

/// Gallery-related keys, scoped under a namespace prefix (§4.3)
pub struct GalleryKeys;

impl GalleryKeys {
    /// `<ns>:guild:<g>:galleries` — the set of gallery names for a guild
    pub fn list(ns: &str, guild_id: &str) -> String {
        format!("{ns}:guild:{guild_id}:galleries")
    }

    /// `<ns>:guild:<g>:gallery:<n>:meta` — the JSON metadata blob
    pub fn meta(ns: &str, guild_id: &str, name: &str) -> String {
        format!("{ns}:guild:{guild_id}:gallery:{name}:meta")
    }

    /// `<ns>:guild:<g>:gallery:<n>` — the value used as a member of the expiry sorted set
    pub fn member(ns: &str, guild_id: &str, name: &str) -> String {
        format!("{ns}:guild:{guild_id}:gallery:{name}")
    }

    /// `<ns>:galleries:expiries:v2` — the expiry sorted set, score = `expiresAt`
    pub fn expiries(ns: &str) -> String {
        format!("{ns}:galleries:expiries:v2")
    }
}

/// Upload-job-related keys (§3.3, §4.5)
pub struct UploadJobKeys;

impl UploadJobKeys {
    /// `<ns>:upload:job:<id>`
    pub fn job(ns: &str, job_id: &str) -> String {
        format!("{ns}:upload:job:{job_id}")
    }

    /// `<ns>:upload:jobs` — the enumeration list
    pub fn list(ns: &str) -> String {
        format!("{ns}:upload:jobs")
    }
}

/// Gradient-queue-related keys (§3.4, §4.6)
pub struct GradientKeys;

impl GradientKeys {
    /// `<ns>:gradient:queue`
    pub fn queue(ns: &str) -> String {
        format!("{ns}:gradient:queue")
    }

    /// `<ns>:gradient:processing`
    pub fn processing(ns: &str) -> String {
        format!("{ns}:gradient:processing")
    }

    /// `<ns>:gradient:delayed`
    pub fn delayed(ns: &str) -> String {
        format!("{ns}:gradient:delayed")
    }

    /// `<ns>:gradient:job:<id>`
    pub fn job(ns: &str, job_id: &str) -> String {
        format!("{ns}:gradient:job:{job_id}")
    }

    /// `<ns>:gradient:<storageKey>` — the per-image derived-metadata record
    pub fn record(ns: &str, storage_key: &str) -> String {
        format!("{ns}:gradient:{storage_key}")
    }

    /// `jobId = "gradient-" + storageKey` with `/` replaced by `-`, stable so
    /// re-enqueuing the same image dedups (spec.md §3.4 invariant).
    pub fn job_id_for(storage_key: &str) -> String {
        format!("gradient-{}", storage_key.replace('/', "-"))
    }
}

/// Request/ticket-related keys (§3.5, §4.7)
pub struct RequestKeys;

impl RequestKeys {
    /// `<ns>:request:<id>`
    pub fn request(ns: &str, id: &str) -> String {
        format!("{ns}:request:{id}")
    }

    /// `<ns>:request:guild:<g>`
    pub fn by_guild(ns: &str, guild_id: &str) -> String {
        format!("{ns}:request:guild:{guild_id}")
    }

    /// `<ns>:request:user:<u>`
    pub fn by_user(ns: &str, user_id: &str) -> String {
        format!("{ns}:request:user:{user_id}")
    }

    /// `<ns>:request:status:<s>`
    pub fn by_status(ns: &str, status: &str) -> String {
        format!("{ns}:request:status:{status}")
    }

    /// `<ns>:request:comments:<id>` — sorted set of comment ids for one request
    pub fn comments(ns: &str, request_id: &str) -> String {
        format!("{ns}:request:comments:{request_id}")
    }

    /// `<ns>:request:comment:<cid>`
    pub fn comment(ns: &str, comment_id: &str) -> String {
        format!("{ns}:request:comment:{comment_id}")
    }

    /// `<ns>:request:created` — global sorted set keyed by creation timestamp
    pub fn created(ns: &str) -> String {
        format!("{ns}:request:created")
    }

    /// `<ns>:request:updated` — global sorted set keyed by last-update timestamp
    pub fn updated(ns: &str) -> String {
        format!("{ns}:request:updated")
    }

    /// A transient key for a multi-guild `SUNION` scratch set, short TTL
    pub fn guild_union_scratch(ns: &str, token: &str) -> String {
        format!("{ns}:request:guild-union:{token}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_job_id_is_stable_and_dedups_on_slash() {
        let a = GradientKeys::job_id_for("guild/slug/uploads/2025-01-01/1-0-a.png");
        let b = GradientKeys::job_id_for("guild/slug/uploads/2025-01-01/1-0-a.png");
        assert_eq!(a, b);
        assert!(!a.contains('/'));
    }
}
