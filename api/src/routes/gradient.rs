//! Gradient worker routes (F): per-image status lookup and dispatcher
//! metrics, per spec.md §4.6.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use gallery_core::gradient::models::{GradientMetricsSnapshot, GradientRecord};
use tracing::instrument;

use crate::utils::{ApiError, GuildContext};
use crate::AppState;

#[instrument(name = "routes::gradient::record", skip(state), err(Debug))]
async fn record(
    _ctx: GuildContext,
    Path(storage_key): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Option<GradientRecord>>, ApiError> {
    let record = state.gradient_worker.record(&storage_key).await?;
    Ok(Json(record))
}

#[instrument(name = "routes::gradient::metrics", skip(state), err(Debug))]
async fn metrics(State(state): State<AppState>) -> Result<Json<GradientMetricsSnapshot>, ApiError> {
    let metrics = state.gradient_worker.metrics().await?;
    Ok(Json(metrics))
}

pub fn mount(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/gradient/metrics", get(metrics))
        .route("/api/gradient/*storage_key", get(record))
}
