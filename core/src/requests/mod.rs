//! Request/ticket store (G), per spec.md §3.5, §4.7.
//!
//! Reuses the exact KV patterns §4.3 (gallery metadata) already
//! establishes — set+sorted-set indexing, pipelined multi-writes — plus
//! [`crate::kv::Kv::optimistic`] for the status-transition CAS loop, per
//! spec.md §4.7's own note that this component "shares the KV patterns of
//! §C". Modeled the same way as `GalleryService`: one `RequestStore` holding
//! `Arc<Kv>`, one method per operation, `#[tracing::instrument(err(Debug))]`
//! throughout.

pub mod models;

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::kv::keys::RequestKeys;
use crate::kv::Kv;
use crate::utils::{ApiError, ErrorKind};

use models::{Comment, NewRequest, Request, RequestListFilter, RequestPage, RequestStatus};

/// Request/comment record TTL, per spec.md §6.2
const REQUEST_TTL_SECS: i64 = 30 * 24 * 60 * 60;
/// TTL of the transient multi-guild `SUNION` scratch key, per spec.md §4.7
const UNION_SCRATCH_TTL_SECS: i64 = 30;
/// CAS retry budget for `update_status`, per spec.md §4.7/§8
const MAX_CAS_ATTEMPTS: u32 = 5;

/// Every request/ticket operation of spec.md §4.7
pub struct RequestStore {
    kv: Arc<Kv>,
}

impl RequestStore {
    #[must_use]
    pub fn new(kv: Arc<Kv>) -> Self {
        RequestStore { kv }
    }

    /// Create a request as one pipelined multi-write: the record itself
    /// (with TTL), the per-guild/user/status index rows, and both global
    /// sorted sets scored by `now`.
    #[tracing::instrument(name = "RequestStore::create", skip(self), err(Debug))]
    pub async fn create(&self, new: NewRequest) -> Result<Request, ApiError> {
        new.validate()?;
        let now = Utc::now();
        let request = Request {
            id: Uuid::new_v4().to_string(),
            guild_id: new.guild_id,
            user_id: new.user_id,
            gallery_id: new.gallery_id,
            title: new.title,
            description: new.description,
            status: RequestStatus::Open,
            created_at: now,
            updated_at: now,
            closed_at: None,
            closed_by: None,
        };

        let ns = &self.kv.namespace;
        let now_ms = crate::utils::time::to_ms(now);
        let mut pipe = Kv::new_pipeline();
        pipe.cmd("set").arg(RequestKeys::request(ns, &request.id)).arg(serialize!(&request));
        pipe.cmd("expire").arg(RequestKeys::request(ns, &request.id)).arg(REQUEST_TTL_SECS);
        pipe.cmd("sadd").arg(RequestKeys::by_guild(ns, &request.guild_id)).arg(&request.id);
        pipe.cmd("sadd").arg(RequestKeys::by_user(ns, &request.user_id)).arg(&request.id);
        pipe.cmd("sadd")
            .arg(RequestKeys::by_status(ns, request.status.as_str()))
            .arg(&request.id);
        pipe.cmd("zadd").arg(RequestKeys::created(ns)).arg(now_ms).arg(&request.id);
        pipe.cmd("zadd").arg(RequestKeys::updated(ns)).arg(now_ms).arg(&request.id);
        let (): () = self.kv.pipeline(&pipe).await?;

        Ok(request)
    }

    /// Fetch a single request by id
    #[tracing::instrument(name = "RequestStore::get", skip(self), err(Debug))]
    pub async fn get(&self, id: &str) -> Result<Request, ApiError> {
        let key = RequestKeys::request(&self.kv.namespace, id);
        match deserialize_or_absent!(self.kv.get(&key).await?) {
            Some(request) => Ok(request),
            None => crate::not_found!(format!("no request {id}")),
        }
    }

    /// List requests matching `filter`, cursor-paginated by creation time
    /// (most recent first). `cursor` is the id of the last item returned by
    /// the previous page; an unknown cursor falls back to the first page.
    #[tracing::instrument(name = "RequestStore::list", skip(self), err(Debug))]
    pub async fn list(
        &self,
        filter: &RequestListFilter,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<RequestPage, ApiError> {
        let candidate_ids = self.candidate_ids(filter).await?;
        if candidate_ids.is_empty() {
            return Ok(RequestPage {
                items: Vec::new(),
                has_more: false,
            });
        }

        let ns = &self.kv.namespace;
        let scores = self.kv.zmscore(&RequestKeys::created(ns), &candidate_ids).await?;
        // orphan candidates (present in an index but missing from `created`, e.g. a
        // partially-cleaned-up record) are silently dropped, per spec.md §4.7
        let mut scored: Vec<(String, i64)> = candidate_ids
            .into_iter()
            .zip(scores)
            .filter_map(|(id, score)| score.map(|s| (id, s)))
            .collect();
        // newest first; tie-break on id for a stable, deterministic order
        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let start = match cursor {
            Some(c) => scored.iter().position(|(id, _)| id == c).map_or(0, |i| i + 1),
            None => 0,
        };
        let page_ids: Vec<String> = scored[start.min(scored.len())..]
            .iter()
            .take(page_size)
            .map(|(id, _)| id.clone())
            .collect();
        let has_more = start + page_ids.len() < scored.len();

        let request_keys: Vec<String> = page_ids.iter().map(|id| RequestKeys::request(ns, id)).collect();
        let raw = self.kv.mget(&request_keys).await?;
        let items: Vec<Request> = raw.into_iter().filter_map(|r| deserialize_or_absent!(r)).collect();

        Ok(RequestPage { items, has_more })
    }

    /// Compute the candidate id set for `filter`: a single guild reads its
    /// set directly; multiple guilds are unioned into a short-TTL scratch
    /// key first. The guild set (or scratch key) is then intersected with
    /// any user/status filters.
    async fn candidate_ids(&self, filter: &RequestListFilter) -> Result<Vec<String>, ApiError> {
        if filter.guild_ids.is_empty() {
            return crate::bad!("request listing requires at least one guildId".to_owned());
        }
        let ns = &self.kv.namespace;

        let guild_key = if filter.guild_ids.len() == 1 {
            RequestKeys::by_guild(ns, &filter.guild_ids[0])
        } else {
            let guild_keys: Vec<String> = filter
                .guild_ids
                .iter()
                .map(|g| RequestKeys::by_guild(ns, g))
                .collect();
            let token = Uuid::new_v4().to_string();
            let scratch = RequestKeys::guild_union_scratch(ns, &token);
            self.kv.sunion_store(&scratch, &guild_keys).await?;
            self.kv.expire(&scratch, UNION_SCRATCH_TTL_SECS).await?;
            scratch
        };

        let mut keys = vec![guild_key];
        if let Some(user_id) = &filter.user_id {
            keys.push(RequestKeys::by_user(ns, user_id));
        }
        if let Some(status) = filter.status {
            keys.push(RequestKeys::by_status(ns, status.as_str()));
        }

        if keys.len() == 1 {
            self.kv.smembers(&keys[0]).await
        } else {
            self.kv.sinter(&keys).await
        }
    }

    /// Transition a request's status under optimistic CAS, retrying up to
    /// [`MAX_CAS_ATTEMPTS`] times on a watched-key abort before surfacing
    /// `Conflict`, per spec.md §4.7/§8. On reaching `closed`, `closedBy`/
    /// `closedAt` are captured; reopening from `closed` clears them.
    #[tracing::instrument(name = "RequestStore::update_status", skip(self), err(Debug))]
    pub async fn update_status(
        &self,
        id: &str,
        to: RequestStatus,
        actor_user_id: &str,
    ) -> Result<Request, ApiError> {
        let ns = self.kv.namespace.clone();
        let key = RequestKeys::request(&ns, id);
        let now = Utc::now();

        self.kv
            .optimistic(&key, MAX_CAS_ATTEMPTS, move |current| {
                let raw = current.ok_or_else(|| ApiError::new(ErrorKind::NotFound, Some(format!("no request {id}"))))?;
                let mut request: Request = serde_json::from_str(&raw)?;

                if !models::is_valid_transition(request.status, to) {
                    return crate::conflict!(format!(
                        "cannot transition request {id} from {:?} to {to:?}",
                        request.status
                    ));
                }

                let from = request.status;
                request.status = to;
                request.updated_at = now;
                if to == RequestStatus::Closed {
                    request.closed_at = Some(now);
                    request.closed_by = Some(actor_user_id.to_owned());
                } else if from == RequestStatus::Closed {
                    request.closed_at = None;
                    request.closed_by = None;
                }

                let mut pipe = Kv::new_pipeline();
                pipe.cmd("set").arg(&key).arg(serialize!(&request));
                pipe.cmd("expire").arg(&key).arg(REQUEST_TTL_SECS);
                pipe.cmd("srem").arg(RequestKeys::by_status(&ns, from.as_str())).arg(id);
                pipe.cmd("sadd").arg(RequestKeys::by_status(&ns, to.as_str())).arg(id);
                pipe.cmd("zadd")
                    .arg(RequestKeys::updated(&ns))
                    .arg(crate::utils::time::to_ms(now))
                    .arg(id);
                Ok((pipe, request))
            })
            .await
    }

    /// Add a comment to a request, scored into `request:comments:<id>` by
    /// creation time.
    #[tracing::instrument(name = "RequestStore::add_comment", skip(self, content), err(Debug))]
    pub async fn add_comment(&self, request_id: &str, user_id: &str, content: String) -> Result<Comment, ApiError> {
        if content.trim().is_empty() {
            return crate::bad!("comment content must not be empty".to_owned());
        }
        // confirm the parent request exists before attaching a comment to it
        self.get(request_id).await?;

        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.to_owned(),
            user_id: user_id.to_owned(),
            content,
            created_at: now,
        };

        let ns = &self.kv.namespace;
        let mut pipe = Kv::new_pipeline();
        pipe.cmd("set").arg(RequestKeys::comment(ns, &comment.id)).arg(serialize!(&comment));
        pipe.cmd("expire").arg(RequestKeys::comment(ns, &comment.id)).arg(REQUEST_TTL_SECS);
        pipe.cmd("zadd")
            .arg(RequestKeys::comments(ns, request_id))
            .arg(crate::utils::time::to_ms(now))
            .arg(&comment.id);
        let (): () = self.kv.pipeline(&pipe).await?;

        Ok(comment)
    }

    /// List a request's comments in creation order
    #[tracing::instrument(name = "RequestStore::list_comments", skip(self), err(Debug))]
    pub async fn list_comments(&self, request_id: &str) -> Result<Vec<Comment>, ApiError> {
        let ns = &self.kv.namespace;
        let comment_ids = self.kv.zrange(&RequestKeys::comments(ns, request_id), 0, -1).await?;
        if comment_ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = comment_ids.iter().map(|id| RequestKeys::comment(ns, id)).collect();
        let raw = self.kv.mget(&keys).await?;
        Ok(raw.into_iter().filter_map(|r| deserialize_or_absent!(r)).collect())
    }

    /// Delete a request, its comments, and every index/sorted-set row that
    /// references it, as one pipeline.
    #[tracing::instrument(name = "RequestStore::delete", skip(self), err(Debug))]
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let request = self.get(id).await?;
        let ns = &self.kv.namespace;
        let comment_ids = self.kv.zrange(&RequestKeys::comments(ns, id), 0, -1).await?;

        let mut pipe = Kv::new_pipeline();
        pipe.cmd("del").arg(RequestKeys::request(ns, id));
        pipe.cmd("srem").arg(RequestKeys::by_guild(ns, &request.guild_id)).arg(id);
        pipe.cmd("srem").arg(RequestKeys::by_user(ns, &request.user_id)).arg(id);
        pipe.cmd("srem")
            .arg(RequestKeys::by_status(ns, request.status.as_str()))
            .arg(id);
        pipe.cmd("zrem").arg(RequestKeys::created(ns)).arg(id);
        pipe.cmd("zrem").arg(RequestKeys::updated(ns)).arg(id);
        for comment_id in &comment_ids {
            pipe.cmd("del").arg(RequestKeys::comment(ns, comment_id));
        }
        pipe.cmd("del").arg(RequestKeys::comments(ns, id));
        let (): () = self.kv.pipeline(&pipe).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_cursor_math_matches_indexof_plus_one() {
        // mirrors the production `list` cursor logic without a live KV
        let scored: Vec<(String, i64)> = vec![
            ("a".into(), 300),
            ("b".into(), 200),
            ("c".into(), 100),
        ];
        let start = scored.iter().position(|(id, _)| id == "b").map_or(0, |i| i + 1);
        assert_eq!(start, 2);
        let page: Vec<&str> = scored[start..].iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(page, vec!["c"]);
    }

    #[test]
    fn unknown_cursor_falls_back_to_first_page() {
        let scored: Vec<(String, i64)> = vec![("a".into(), 300), ("b".into(), 200)];
        let start = scored.iter().position(|(id, _)| id == "missing").map_or(0, |i| i + 1);
        assert_eq!(start, 0);
    }
}
