//! The `guildId`/`userId` extractor.
//!
//! Per spec.md §1, session auth, CSRF, and the Discord OAuth exchange are
//! out of scope for this core — "where these touch the core we specify only
//! the contract: the handler supplies a validated guild id and user id."
//! This extractor stands in for that upstream middleware: it reads the two
//! headers an auth layer would already have set on the request by the time
//! it reaches these routes, and rejects with `Authorization` if either is
//! missing, exactly the shape `ErrorKind::Authorization` describes ("not
//! produced by the core itself; supplied by the handler collaborator").

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use gallery_core::{ApiError as CoreError, ErrorKind};

use crate::utils::errors::ApiError;

/// A validated guild/user pair, already authenticated upstream
#[derive(Debug, Clone)]
pub struct GuildContext {
    pub guild_id: String,
    pub user_id: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for GuildContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let guild_id = header(parts, "x-guild-id")?;
        let user_id = header(parts, "x-user-id")?;
        Ok(GuildContext { guild_id, user_id })
    }
}

fn header(parts: &Parts, name: &'static str) -> Result<String, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            ApiError(CoreError::new(
                ErrorKind::Authorization,
                Some(format!("missing or invalid {name} header")),
            ))
        })
}
