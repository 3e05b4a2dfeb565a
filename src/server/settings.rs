use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::ai::ConnectionTest;
use crate::db::DeskStats;
use crate::error::Result;
use crate::models::{Settings, SettingsPatch};

use super::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/settings", get(get_settings).patch(patch_settings))
        .route("/settings/test-ai", post(test_ai))
        .route("/settings/categories", get(categories))
        .route("/settings/stats", get(stats))
        .route("/settings/reset", post(reset_settings))
}

async fn get_settings(State(state): State<AppState>) -> Result<Json<Settings>> {
    Ok(Json(state.repo.get_settings().await?))
}

async fn patch_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<Settings>> {
    Ok(Json(state.repo.patch_settings(patch).await?))
}

async fn test_ai(State(state): State<AppState>) -> Json<ConnectionTest> {
    Json(state.ai.test_connection(&state.repo).await)
}

async fn categories(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.repo.categories().await?))
}

async fn stats(State(state): State<AppState>) -> Result<Json<DeskStats>> {
    Ok(Json(state.repo.stats().await?))
}

async fn reset_settings(State(state): State<AppState>) -> Result<Json<Settings>> {
    Ok(Json(state.repo.reset_settings().await?))
}
