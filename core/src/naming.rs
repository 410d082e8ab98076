//! Slug derivation and path sanitization, per spec.md §3.1, §3.6, §6.1
//!
//! Pure functions: no KV or object-store calls, easy to property-test per
//! spec.md §8.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

fn non_slug_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static slug regex"))
}

fn non_path_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._/-]+").expect("static sanitize regex"))
}

fn double_slash() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/{2,}").expect("static collapse-slash regex"))
}

/// Derive a gallery's `folderName` from its human-facing `name`.
///
/// Lowercase, replace runs of non-`[a-z0-9]` characters with a single `-`,
/// strip leading/trailing `-`; if that leaves nothing, fall back to
/// `"gallery"`.
#[must_use]
pub fn slug(name: &str) -> String {
    let lowered = name.to_lowercase();
    let collapsed = non_slug_chars().replace_all(&lowered, "-");
    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() {
        "gallery".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Sanitize a raw file path/name for safe use as (part of) an object key.
///
/// Backslashes become slashes, `..` segments are stripped, runs of
/// characters outside `[A-Za-z0-9._/-]` become a single `-`, repeated
/// slashes collapse, and the result is trimmed of leading/trailing `-`.
#[must_use]
pub fn sanitize_path(raw: &str) -> String {
    let slashed = raw.replace('\\', "/");
    let no_traversal = slashed.replace("..", "");
    let collapsed_chars = non_path_chars().replace_all(&no_traversal, "-");
    let collapsed_slashes = double_slash().replace_all(&collapsed_chars, "/");
    collapsed_slashes.trim_matches('-').to_owned()
}

/// Build the zero-byte folder marker key for a gallery: `<guild>/<slug>/`
#[must_use]
pub fn folder_marker_key(guild_id: &str, gallery_slug: &str) -> String {
    format!("{guild_id}/{gallery_slug}/")
}

/// Build the uploads prefix for a gallery: `<guild>/<slug>/uploads/`
#[must_use]
pub fn uploads_prefix(guild_id: &str, gallery_slug: &str) -> String {
    format!("{guild_id}/{gallery_slug}/uploads/")
}

/// Build the dated object-path prefix an upload lands under:
/// `<guild>/<slug>/uploads/<yyyy-mm-dd>`
#[must_use]
pub fn upload_date_prefix(guild_id: &str, gallery_slug: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}{}",
        uploads_prefix(guild_id, gallery_slug),
        at.format("%Y-%m-%d")
    )
}

/// Build a single-image object key: `<prefix>/<epochMillis>-<sanitizedFilename>`
#[must_use]
pub fn single_image_key(object_prefix: &str, epoch_ms: i64, filename: &str) -> String {
    format!("{object_prefix}/{epoch_ms}-{}", sanitize_path(filename))
}

/// Build a ZIP-entry object key: `<prefix>/<epochMillis>-<n>-<sanitizedFilename>`
#[must_use]
pub fn zip_entry_key(object_prefix: &str, epoch_ms: i64, index: usize, filename: &str) -> String {
    format!(
        "{object_prefix}/{epoch_ms}-{index}-{}",
        sanitize_path(filename)
    )
}

/// True if `name` is a macOS resource-fork artifact that should be hidden
/// from gallery listings, per spec.md §4.3 `contents`.
#[must_use]
pub fn is_apple_artifact(key: &str) -> bool {
    if key.contains("__MACOSX/") {
        return true;
    }
    let filename = key.rsplit('/').next().unwrap_or(key);
    if filename.starts_with("._") {
        return true;
    }
    // strip a leading `\d+-\d+-` timestamp/index prefix (per spec.md §4.3) and check again
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    let re = PREFIX.get_or_init(|| Regex::new(r"^\d+-\d+-").expect("static artifact regex"));
    if let Some(stripped) = re.find(filename) {
        let rest = &filename[stripped.end()..];
        if rest.starts_with("._") {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_lowercases_and_hyphenates() {
        assert_eq!(slug("My Awesome Gallery"), "my-awesome-gallery");
    }

    #[test]
    fn slug_collapses_punctuation_runs() {
        assert_eq!(slug("My!!!Gallery###2025"), "my-gallery-2025");
    }

    #[test]
    fn slug_trims_leading_and_trailing_hyphens() {
        assert_eq!(slug("---MyGallery---"), "mygallery");
    }

    #[test]
    fn slug_falls_back_when_empty() {
        assert_eq!(slug("!!!###$$$"), "gallery");
    }

    #[test]
    fn slug_handles_parentheses() {
        assert_eq!(slug("Annual Photo Review (2025)"), "annual-photo-review-2025");
    }

    #[test]
    fn slug_always_matches_shape() {
        let re = Regex::new(r"^[a-z0-9][a-z0-9-]*$").unwrap();
        for input in [
            "My Awesome Gallery",
            "!!!",
            "a",
            "A B C",
            "___",
            "2025-summer",
        ] {
            let s = slug(input);
            assert!(
                s == "gallery" || re.is_match(&s),
                "slug({input:?}) = {s:?} doesn't match shape"
            );
        }
    }

    #[test]
    fn sanitize_strips_traversal() {
        assert_eq!(sanitize_path("../../../etc/passwd"), "/etc/passwd");
    }

    #[test]
    fn sanitize_normalizes_backslashes() {
        assert_eq!(sanitize_path("foo\\bar\\baz"), "foo/bar/baz");
    }

    #[test]
    fn sanitize_trims_hyphens() {
        assert_eq!(sanitize_path("---foo---"), "foo");
    }

    #[test]
    fn sanitize_collapses_slashes() {
        assert_eq!(sanitize_path("foo///bar"), "foo/bar");
    }

    #[test]
    fn sanitize_collapses_disallowed_runs() {
        assert_eq!(sanitize_path("My Photo (1).jpeg"), "My-Photo-1-.jpeg");
    }

    #[test]
    fn apple_artifact_detects_macosx_dir() {
        assert!(is_apple_artifact("guild/slug/uploads/__MACOSX/._a.png"));
    }

    #[test]
    fn apple_artifact_detects_dot_underscore_prefix() {
        assert!(is_apple_artifact("guild/slug/uploads/._a.png"));
    }

    #[test]
    fn apple_artifact_detects_after_stripping_index_prefix() {
        assert!(is_apple_artifact("guild/slug/uploads/2025-01-01/1700000000-3-._a.png"));
    }

    #[test]
    fn apple_artifact_false_for_normal_image() {
        assert!(!is_apple_artifact("guild/slug/uploads/2025-01-01/1700000000-0-photo.jpg"));
    }
}
