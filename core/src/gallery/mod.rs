//! Gallery metadata service (C), per spec.md §3.1, §4.3.
//!
//! CRUD over gallery records, slug derivation, the expiry sorted set,
//! item-count counters, and list-with-cleanup of expired galleries. Modeled
//! as `GalleryService` holding `Arc<Kv>` + `Arc<ObjectStore>`, matching the
//! `pub async fn create(...) -> Result<T, ApiError>` shape of thorium's
//! `models/backends/db/groups.rs::create`.

pub mod models;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;

use crate::gradient::models::{GradientRecord, GradientStatus};
use crate::kv::keys::GalleryKeys;
use crate::kv::Kv;
use crate::naming::{self, slug};
use crate::store::{ObjectStore, MAX_DELETE_BATCH};
use crate::utils::ApiError;

use models::{Gallery, GalleryItem, GalleryMeta};

/// Holds every gallery-metadata operation of spec.md §4.3
pub struct GalleryService {
    kv: Arc<Kv>,
    store: Arc<ObjectStore>,
}

impl GalleryService {
    #[must_use]
    pub fn new(kv: Arc<Kv>, store: Arc<ObjectStore>) -> Self {
        GalleryService { kv, store }
    }

    /// Create a new gallery. Per the Open Questions resolution adopted in
    /// SPEC_FULL.md §9: a name collides with an existing member `m` iff
    /// `m` case-insensitively equals the new name OR `slug(m) == slug(name)`.
    #[tracing::instrument(name = "GalleryService::create", skip(self), err(Debug))]
    pub async fn create(
        &self,
        guild_id: &str,
        name: &str,
        ttl_weeks: u32,
        created_by: &str,
    ) -> Result<Gallery, ApiError> {
        if name.trim().is_empty() {
            return crate::bad!("gallery name must not be empty".to_owned());
        }
        if ttl_weeks < 1 {
            return crate::bad!("ttlWeeks must be >= 1".to_owned());
        }

        let ns = &self.kv.namespace;
        let list_key = GalleryKeys::list(ns, guild_id);
        let existing = self.kv.smembers(&list_key).await?;
        if self.collides(&existing, name) {
            return crate::conflict!(format!(
                "a gallery named or slugged like {name:?} already exists in this guild"
            ));
        }

        let gallery_slug = slug(name);
        let now = Utc::now();
        let expires_at = now + Duration::weeks(i64::from(ttl_weeks));
        let meta = GalleryMeta {
            created_at: now,
            expires_at,
            ttl_weeks,
            created_by: created_by.to_owned(),
            folder_name: gallery_slug.clone(),
            total_items: 0,
        };

        let meta_key = GalleryKeys::meta(ns, guild_id, name);
        let member_key = GalleryKeys::member(ns, guild_id, name);
        let expiries_key = GalleryKeys::expiries(ns);

        let mut pipe = Kv::new_pipeline();
        pipe.cmd("sadd").arg(&list_key).arg(name);
        pipe.cmd("set").arg(&meta_key).arg(serialize!(&meta));
        pipe.cmd("zadd")
            .arg(&expiries_key)
            .arg(crate::utils::time::to_ms(expires_at))
            .arg(&member_key);
        let (): () = self.kv.pipeline(&pipe).await?;

        let marker = naming::folder_marker_key(guild_id, &gallery_slug);
        if let Err(err) = self.store.put_folder_marker(&marker).await {
            tracing::event!(
                tracing::Level::WARN,
                error = %err,
                marker = %marker,
                "failed to create gallery folder marker; first upload will create it"
            );
        }

        Ok(Gallery {
            name: name.to_owned(),
            guild_id: guild_id.to_owned(),
            meta,
        })
    }

    /// List every live gallery for a guild, sweeping expired/malformed index
    /// rows as a side effect. This is the sole expiry reaper: no background
    /// job performs this cleanup, per spec.md §4.3's invariant.
    #[tracing::instrument(name = "GalleryService::list", skip(self), err(Debug))]
    pub async fn list(&self, guild_id: &str) -> Result<Vec<Gallery>, ApiError> {
        let ns = &self.kv.namespace;
        let list_key = GalleryKeys::list(ns, guild_id);
        let names = self.kv.smembers(&list_key).await?;
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let meta_keys: Vec<String> = names
            .iter()
            .map(|name| GalleryKeys::meta(ns, guild_id, name))
            .collect();
        let raw_metas = self.kv.mget(&meta_keys).await?;

        let now = Utc::now();
        let mut active = Vec::new();
        let mut expired_names = Vec::new();

        for (name, raw) in names.into_iter().zip(raw_metas.into_iter()) {
            let meta: Option<GalleryMeta> = deserialize_or_absent!(raw);
            match meta {
                Some(meta) if meta.is_live(now) => active.push(Gallery {
                    name: name.clone(),
                    guild_id: guild_id.to_owned(),
                    meta,
                }),
                _ => expired_names.push(name),
            }
        }

        if !expired_names.is_empty() {
            let mut pipe = Kv::new_pipeline();
            let expiries_key = GalleryKeys::expiries(ns);
            for name in &expired_names {
                pipe.cmd("srem").arg(&list_key).arg(name);
                pipe.cmd("del").arg(GalleryKeys::meta(ns, guild_id, name));
                pipe.cmd("zrem")
                    .arg(&expiries_key)
                    .arg(GalleryKeys::member(ns, guild_id, name));
            }
            let (): () = self.kv.pipeline(&pipe).await?;
        }

        Ok(active)
    }

    /// Look up one gallery. A missing key or an expired gallery both surface
    /// as `NotFound` (`ErrorKind` has no separate "expired" variant; see
    /// spec.md §7's enumerated kinds).
    #[tracing::instrument(name = "GalleryService::get", skip(self), err(Debug))]
    pub async fn get(&self, guild_id: &str, name: &str) -> Result<Gallery, ApiError> {
        let ns = &self.kv.namespace;
        let meta_key = GalleryKeys::meta(ns, guild_id, name);
        let raw = self.kv.get(&meta_key).await?;
        let meta: GalleryMeta = match deserialize_or_absent!(raw) {
            Some(meta) => meta,
            None => return crate::not_found!(format!("no gallery named {name:?}")),
        };
        if !meta.is_live(Utc::now()) {
            return crate::not_found!(format!("gallery {name:?} has expired"));
        }
        Ok(Gallery {
            name: name.to_owned(),
            guild_id: guild_id.to_owned(),
            meta,
        })
    }

    /// Rename a gallery, moving its object-store prefix. Per spec.md §4.3:
    /// safe to re-run if the object-move step crashes midway (copy is a
    /// same-bytes no-op, delete of a missing key is ignored).
    #[tracing::instrument(name = "GalleryService::rename", skip(self), err(Debug))]
    pub async fn rename(&self, guild_id: &str, old: &str, new: &str) -> Result<Gallery, ApiError> {
        if new.trim().is_empty() {
            return crate::bad!("new gallery name must not be empty".to_owned());
        }
        let current = self.get(guild_id, old).await?;

        let ns = &self.kv.namespace;
        let list_key = GalleryKeys::list(ns, guild_id);
        let existing = self.kv.smembers(&list_key).await?;
        let others: Vec<String> = existing.into_iter().filter(|n| n != old).collect();
        if self.collides(&others, new) {
            return crate::conflict!(format!(
                "a gallery named or slugged like {new:?} already exists in this guild"
            ));
        }

        let old_slug = current.meta.folder_name.clone();
        let new_slug = slug(new);
        let mut new_meta = current.meta.clone();
        new_meta.folder_name = new_slug.clone();

        let old_meta_key = GalleryKeys::meta(ns, guild_id, old);
        let new_meta_key = GalleryKeys::meta(ns, guild_id, new);
        let old_member = GalleryKeys::member(ns, guild_id, old);
        let new_member = GalleryKeys::member(ns, guild_id, new);
        let expiries_key = GalleryKeys::expiries(ns);

        let mut pipe = Kv::new_pipeline();
        pipe.cmd("srem").arg(&list_key).arg(old);
        pipe.cmd("sadd").arg(&list_key).arg(new);
        pipe.cmd("del").arg(&old_meta_key);
        pipe.cmd("set").arg(&new_meta_key).arg(serialize!(&new_meta));
        pipe.cmd("zrem").arg(&expiries_key).arg(&old_member);
        pipe.cmd("zadd")
            .arg(&expiries_key)
            .arg(crate::utils::time::to_ms(new_meta.expires_at))
            .arg(&new_member);
        let (): () = self.kv.pipeline(&pipe).await?;

        self.move_prefix(guild_id, &old_slug, &new_slug).await?;

        Ok(Gallery {
            name: new.to_owned(),
            guild_id: guild_id.to_owned(),
            meta: new_meta,
        })
    }

    /// Copy every object under the old prefix to the new prefix, then
    /// delete the old ones. Idempotent: re-running after a partial failure
    /// just re-copies (no-op for already-moved keys) and re-deletes
    /// (no-op for already-gone keys).
    async fn move_prefix(&self, guild_id: &str, old_slug: &str, new_slug: &str) -> Result<(), ApiError> {
        let old_prefix = format!("{guild_id}/{old_slug}/");
        let new_prefix = format!("{guild_id}/{new_slug}/");

        let mut old_keys = Vec::new();
        {
            let mut stream = Box::pin(self.store.list_prefix(&old_prefix));
            while let Some(obj) = stream.next().await {
                let obj = obj?;
                old_keys.push(obj.key);
            }
        }

        for old_key in &old_keys {
            let rest = old_key.strip_prefix(&old_prefix).unwrap_or(old_key);
            let new_key = format!("{new_prefix}{rest}");
            self.store.copy_object(old_key, &new_key).await?;
        }

        for chunk in old_keys.chunks(MAX_DELETE_BATCH) {
            self.store.delete_batch(chunk).await?;
        }
        Ok(())
    }

    /// Remove a gallery's index rows and empty its object-store prefix.
    #[tracing::instrument(name = "GalleryService::remove", skip(self), err(Debug))]
    pub async fn remove(&self, guild_id: &str, name: &str) -> Result<(), ApiError> {
        let current = self.get(guild_id, name).await?;
        let ns = &self.kv.namespace;
        let list_key = GalleryKeys::list(ns, guild_id);
        let meta_key = GalleryKeys::meta(ns, guild_id, name);
        let member_key = GalleryKeys::member(ns, guild_id, name);
        let expiries_key = GalleryKeys::expiries(ns);

        let mut pipe = Kv::new_pipeline();
        pipe.cmd("srem").arg(&list_key).arg(name);
        pipe.cmd("del").arg(&meta_key);
        pipe.cmd("zrem").arg(&expiries_key).arg(&member_key);
        let (): () = self.kv.pipeline(&pipe).await?;

        let prefix = format!("{guild_id}/{}/", current.meta.folder_name);
        let mut keys = Vec::new();
        {
            let mut stream = Box::pin(self.store.list_prefix(&prefix));
            while let Some(obj) = stream.next().await {
                keys.push(obj?.key);
            }
        }
        for chunk in keys.chunks(MAX_DELETE_BATCH) {
            self.store.delete_batch(chunk).await?;
        }
        let marker = naming::folder_marker_key(guild_id, &current.meta.folder_name);
        self.store.delete_object(&marker).await.ok();
        Ok(())
    }

    /// Recompute `totalItems` from the object store: the canonical source of
    /// truth for item counts, per spec.md §3.1/§4.3.
    #[tracing::instrument(name = "GalleryService::sync_item_count", skip(self), err(Debug))]
    pub async fn sync_item_count(&self, guild_id: &str, name: &str) -> Result<u64, ApiError> {
        let items = self.contents(guild_id, name).await?;
        let count = items.len() as u64;
        self.rewrite_meta(guild_id, name, |meta| meta.total_items = count)
            .await?;
        Ok(count)
    }

    /// Increment `totalItems` by `delta`, last-write-wins
    #[tracing::instrument(name = "GalleryService::increment_item_count", skip(self), err(Debug))]
    pub async fn increment_item_count(&self, guild_id: &str, name: &str, delta: u64) -> Result<u64, ApiError> {
        self.rewrite_meta(guild_id, name, |meta| meta.total_items += delta)
            .await
            .map(|meta| meta.total_items)
    }

    /// Decrement `totalItems` by `delta`, clamped at 0
    #[tracing::instrument(name = "GalleryService::decrement_item_count", skip(self), err(Debug))]
    pub async fn decrement_item_count(&self, guild_id: &str, name: &str, delta: u64) -> Result<u64, ApiError> {
        self.rewrite_meta(guild_id, name, |meta| {
            meta.total_items = meta.total_items.saturating_sub(delta);
        })
        .await
        .map(|meta| meta.total_items)
    }

    async fn rewrite_meta<F>(&self, guild_id: &str, name: &str, f: F) -> Result<GalleryMeta, ApiError>
    where
        F: FnOnce(&mut GalleryMeta),
    {
        let mut gallery = self.get(guild_id, name).await?;
        f(&mut gallery.meta);
        let ns = &self.kv.namespace;
        let meta_key = GalleryKeys::meta(ns, guild_id, name);
        self.kv.set(&meta_key, &serialize!(&gallery.meta)).await?;
        Ok(gallery.meta)
    }

    /// List enriched gallery contents: filters out folder markers, empty
    /// placeholder entries, and Apple resource-fork artifacts; attaches
    /// gradient records where available, per spec.md §4.3.
    #[tracing::instrument(name = "GalleryService::contents", skip(self), err(Debug))]
    pub async fn contents(&self, guild_id: &str, name: &str) -> Result<Vec<GalleryItem>, ApiError> {
        let gallery = self.get(guild_id, name).await?;
        let gallery_slug = &gallery.meta.folder_name;

        let uploads_prefix = naming::uploads_prefix(guild_id, gallery_slug);
        let mut objects = self.collect_prefix(&uploads_prefix).await?;
        if objects.is_empty() {
            let fallback_prefix = naming::folder_marker_key(guild_id, gallery_slug);
            objects = self.collect_prefix(&fallback_prefix).await?;
        }

        let filtered: Vec<_> = objects
            .into_iter()
            .filter(|obj| obj.size > 0 && !obj.key.ends_with('/') && !naming::is_apple_artifact(&obj.key))
            .collect();

        if filtered.is_empty() {
            return Ok(Vec::new());
        }

        let ns = &self.kv.namespace;
        let record_keys: Vec<String> = filtered
            .iter()
            .map(|obj| crate::kv::keys::GradientKeys::record(ns, &obj.key))
            .collect();
        let raw_records = self.kv.mget(&record_keys).await?;

        let mut items = Vec::with_capacity(filtered.len());
        for (obj, raw) in filtered.into_iter().zip(raw_records.into_iter()) {
            let record: Option<GradientRecord> = deserialize_or_absent!(raw);
            let gradient = match record {
                Some(r) if r.status == GradientStatus::Completed => Some(r.gradient),
                Some(r) if r.status == GradientStatus::Failed => Some(None),
                _ => None,
            };
            items.push(GalleryItem {
                key: obj.key,
                size: obj.size,
                gradient,
            });
        }
        Ok(items)
    }

    async fn collect_prefix(&self, prefix: &str) -> Result<Vec<crate::store::ObjectSummary>, ApiError> {
        let mut out = Vec::new();
        let mut stream = Box::pin(self.store.list_prefix(prefix));
        while let Some(obj) = stream.next().await {
            out.push(obj?);
        }
        Ok(out)
    }

    /// `true` if `name` collides with any `existing` member under the
    /// uniqueness predicate adopted in SPEC_FULL.md §9.
    fn collides(&self, existing: &[String], name: &str) -> bool {
        let target_slug = slug(name);
        existing
            .iter()
            .any(|m| m.eq_ignore_ascii_case(name) || slug(m) == target_slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collides_matches_case_insensitive_name_or_shared_slug() {
        let existing = vec!["Summer Trip".to_owned(), "Other".to_owned()];
        // same slug via punctuation difference
        assert!(slug_collision(&existing, "summer trip"));
        assert!(slug_collision(&existing, "Summer-Trip!!"));
        assert!(!slug_collision(&existing, "Winter Trip"));
    }

    /// a free function mirroring `GalleryService::collides` so the
    /// uniqueness predicate can be unit tested without a live KV/store
    fn slug_collision(existing: &[String], name: &str) -> bool {
        let target = slug(name);
        existing.iter().any(|m| m.eq_ignore_ascii_case(name) || slug(m) == target)
    }
}
