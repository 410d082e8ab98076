//! Request/ticket routes (G), per spec.md §4.7.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use gallery_core::requests::models::{
    Comment, NewRequest, Request, RequestListFilter, RequestPage, RequestStatus,
};
use serde::Deserialize;
use tracing::instrument;

use crate::utils::{ApiError, GuildContext};
use crate::AppState;

/// A new request body; `guildId`/`userId` come from the validated context,
/// not the client, so the wire body only carries the rest of `NewRequest`.
#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub gallery_id: Option<String>,
    pub title: String,
    pub description: String,
}

#[instrument(name = "routes::requests::create", skip(state), err(Debug))]
async fn create(
    ctx: GuildContext,
    State(state): State<AppState>,
    Json(body): Json<CreateRequestBody>,
) -> Result<Json<Request>, ApiError> {
    let new = NewRequest {
        guild_id: ctx.guild_id,
        user_id: ctx.user_id,
        gallery_id: body.gallery_id,
        title: body.title,
        description: body.description,
    };
    let request = state.requests.create(new).await?;
    Ok(Json(request))
}

#[instrument(name = "routes::requests::get", skip(state), err(Debug))]
async fn get_request(
    _ctx: GuildContext,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Request>, ApiError> {
    let request = state.requests.get(&id).await?;
    Ok(Json(request))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub guild_ids: Vec<String>,
    pub user_id: Option<String>,
    pub status: Option<RequestStatus>,
    pub cursor: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    25
}

#[instrument(name = "routes::requests::list", skip(state), err(Debug))]
async fn list(
    ctx: GuildContext,
    Query(query): Query<ListQuery>,
    State(state): State<AppState>,
) -> Result<Json<RequestPage>, ApiError> {
    let guild_ids = if query.guild_ids.is_empty() {
        vec![ctx.guild_id]
    } else {
        query.guild_ids
    };
    let filter = RequestListFilter {
        guild_ids,
        user_id: query.user_id,
        status: query.status,
    };
    let page = state
        .requests
        .list(&filter, query.cursor.as_deref(), query.page_size)
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusBody {
    pub status: RequestStatus,
}

#[instrument(name = "routes::requests::update_status", skip(state), err(Debug))]
async fn update_status(
    ctx: GuildContext,
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<UpdateStatusBody>,
) -> Result<Json<Request>, ApiError> {
    let request = state.requests.update_status(&id, body.status, &ctx.user_id).await?;
    Ok(Json(request))
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentBody {
    pub content: String,
}

#[instrument(name = "routes::requests::add_comment", skip(state, body), err(Debug))]
async fn add_comment(
    ctx: GuildContext,
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<CreateCommentBody>,
) -> Result<Json<Comment>, ApiError> {
    let comment = state.requests.add_comment(&id, &ctx.user_id, body.content).await?;
    Ok(Json(comment))
}

#[instrument(name = "routes::requests::list_comments", skip(state), err(Debug))]
async fn list_comments(
    _ctx: GuildContext,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    let comments = state.requests.list_comments(&id).await?;
    Ok(Json(comments))
}

#[instrument(name = "routes::requests::delete", skip(state), err(Debug))]
async fn delete(
    _ctx: GuildContext,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<axum::http::StatusCode, ApiError> {
    state.requests.delete(&id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub fn mount(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/requests", post(create).get(list))
        .route("/api/requests/:id", get(get_request).delete(delete))
        .route("/api/requests/:id/status", post(update_status))
        .route("/api/requests/:id/comments", post(add_comment).get(list_comments))
}
