//! Gallery metadata routes (C), thin wrappers over
//! [`gallery_core::gallery::GalleryService`].

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use gallery_core::gallery::models::{Gallery, GalleryItem};
use serde::Deserialize;
use tracing::instrument;

use crate::utils::{ApiError, GuildContext};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateGalleryRequest {
    pub name: String,
    pub ttl_weeks: u32,
}

#[instrument(name = "routes::galleries::create", skip(state), err(Debug))]
async fn create(
    ctx: GuildContext,
    State(state): State<AppState>,
    Json(body): Json<CreateGalleryRequest>,
) -> Result<Json<Gallery>, ApiError> {
    let gallery = state
        .galleries
        .create(&ctx.guild_id, &body.name, body.ttl_weeks, &ctx.user_id)
        .await?;
    Ok(Json(gallery))
}

#[instrument(name = "routes::galleries::list", skip(state), err(Debug))]
async fn list(ctx: GuildContext, State(state): State<AppState>) -> Result<Json<Vec<Gallery>>, ApiError> {
    let galleries = state.galleries.list(&ctx.guild_id).await?;
    Ok(Json(galleries))
}

#[instrument(name = "routes::galleries::get_gallery", skip(state), err(Debug))]
async fn get_gallery(
    ctx: GuildContext,
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Gallery>, ApiError> {
    let gallery = state.galleries.get(&ctx.guild_id, &name).await?;
    Ok(Json(gallery))
}

#[derive(Debug, Deserialize)]
pub struct RenameGalleryRequest {
    pub new_name: String,
}

#[instrument(name = "routes::galleries::rename", skip(state), err(Debug))]
async fn rename(
    ctx: GuildContext,
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<RenameGalleryRequest>,
) -> Result<Json<Gallery>, ApiError> {
    let gallery = state.galleries.rename(&ctx.guild_id, &name, &body.new_name).await?;
    Ok(Json(gallery))
}

#[instrument(name = "routes::galleries::remove", skip(state), err(Debug))]
async fn remove(
    ctx: GuildContext,
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<axum::http::StatusCode, ApiError> {
    state.galleries.remove(&ctx.guild_id, &name).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[instrument(name = "routes::galleries::contents", skip(state), err(Debug))]
async fn contents(
    ctx: GuildContext,
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<GalleryItem>>, ApiError> {
    let items = state.galleries.contents(&ctx.guild_id, &name).await?;
    Ok(Json(items))
}

pub fn mount(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/galleries", axum::routing::post(create).get(list))
        .route("/api/galleries/:name", get(get_gallery).patch(rename).delete(remove))
        .route("/api/galleries/:name/contents", get(contents))
}
