//! Upload routes: chunked session endpoints (D) and the single-image/ZIP
//! ingestion entry point (E), per spec.md §4.4, §4.5.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use gallery_core::chunked_upload::models::UploadProgress;
use gallery_core::gradient::models::GradientEnqueueRequest;
use gallery_core::naming;
use gallery_core::zip_pipeline::models::{UploadJob, UploadOutcome};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::utils::{ApiError, GuildContext};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct InitSessionRequest {
    pub file_name: String,
    pub file_type: String,
    pub total_size: u64,
    pub gallery_name: String,
}

#[derive(Debug, Serialize)]
pub struct InitSessionResponse {
    pub upload_id: String,
}

#[instrument(name = "routes::uploads::init_session", skip(state), err(Debug))]
async fn init_session(
    ctx: GuildContext,
    State(state): State<AppState>,
    Json(body): Json<InitSessionRequest>,
) -> Result<Json<InitSessionResponse>, ApiError> {
    let upload_id = state
        .chunked_uploads
        .init_session(body.file_name, body.file_type, body.total_size, body.gallery_name, ctx.guild_id)
        .await?;
    Ok(Json(InitSessionResponse { upload_id }))
}

#[instrument(name = "routes::uploads::save_chunk", skip(state, bytes), err(Debug))]
async fn save_chunk(
    _ctx: GuildContext,
    Path((upload_id, index)): Path<(String, u64)>,
    State(state): State<AppState>,
    bytes: Bytes,
) -> Result<axum::http::StatusCode, ApiError> {
    state.chunked_uploads.save_chunk(&upload_id, index, &bytes).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[instrument(name = "routes::uploads::progress", skip(state), err(Debug))]
async fn progress(
    _ctx: GuildContext,
    Path(upload_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UploadProgress>, ApiError> {
    let progress = state.chunked_uploads.progress(&upload_id).await?;
    Ok(Json(progress))
}

/// Assemble a finished chunked session and route it through the ZIP
/// ingestion pipeline, enqueueing a gradient job for a synchronous
/// single-image result.
#[instrument(name = "routes::uploads::finalize", skip(state), err(Debug))]
async fn finalize(
    _ctx: GuildContext,
    Path(upload_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UploadOutcome>, ApiError> {
    let info = state.chunked_uploads.session_info(&upload_id).await?;
    let assembled = state.chunked_uploads.finalize(&upload_id).await?;

    let gallery = state.galleries.get(&info.guild_id, &info.gallery_name).await?;
    let object_path = naming::upload_date_prefix(&info.guild_id, &gallery.meta.folder_name, Utc::now());

    let outcome = state
        .zip_pipeline
        .upload_to_gallery(
            &info.guild_id,
            &info.gallery_name,
            &object_path,
            &info.file_name,
            Some(info.file_type.as_str()),
            &assembled,
        )
        .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            state.chunked_uploads.mark_failed(&upload_id, err.to_string()).await.ok();
            return Err(err.into());
        }
    };

    match &outcome {
        UploadOutcome::Sync { uploaded } => {
            state
                .galleries
                .increment_item_count(&info.guild_id, &info.gallery_name, 1)
                .await?;
            state
                .gradient_worker
                .enqueue(GradientEnqueueRequest {
                    guild_id: info.guild_id.clone(),
                    gallery_name: info.gallery_name.clone(),
                    storage_key: uploaded.key.clone(),
                    item_id: uploaded.key.clone(),
                })
                .await?;
            state.chunked_uploads.mark_completed(&upload_id, Some(1), Some(1)).await?;
        }
        UploadOutcome::Async { .. } => {
            state.chunked_uploads.mark_completed(&upload_id, None, None).await?;
        }
    }

    Ok(Json(outcome))
}

#[instrument(name = "routes::uploads::get_job", skip(state), err(Debug))]
async fn get_job(
    _ctx: GuildContext,
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UploadJob>, ApiError> {
    let job = state.zip_pipeline.get_job(&job_id).await?;
    Ok(Json(job))
}

pub fn mount(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/uploads/chunked", post(init_session))
        .route("/api/uploads/chunked/:upload_id/chunks/:index", post(save_chunk))
        .route("/api/uploads/chunked/:upload_id/progress", get(progress))
        .route("/api/uploads/chunked/:upload_id/finalize", post(finalize))
        .route("/api/uploads/zip/:job_id", get(get_job))
}
