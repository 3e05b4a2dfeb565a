use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{NewWorkspaceItem, WorkspaceEntry, WorkspaceItem, WorkspaceItemPatch};
use crate::report::{render, ExportFormat, ExportItem, ExportMeta};

use super::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/workspace/items", get(list_items).post(add_item))
        .route(
            "/workspace/items/{id}",
            axum::routing::patch(update_item).delete(delete_item),
        )
        .route("/workspace/reorder", post(reorder))
        .route("/workspace/export", get(export_workspace))
        .route("/workspace/clear", post(clear_workspace))
}

async fn list_items(State(state): State<AppState>) -> Result<Json<Vec<WorkspaceEntry>>> {
    let entries = state
        .repo
        .list_workspace()
        .await?
        .into_iter()
        .map(|(item, article)| WorkspaceEntry { item, article })
        .collect();
    Ok(Json(entries))
}

async fn add_item(
    State(state): State<AppState>,
    Json(new_item): Json<NewWorkspaceItem>,
) -> Result<(StatusCode, Json<WorkspaceItem>)> {
    let item = state
        .repo
        .add_to_workspace(new_item.article_id)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("article {} not found", new_item.article_id))
        })?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<WorkspaceItemPatch>,
) -> Result<Json<WorkspaceItem>> {
    state
        .repo
        .update_workspace_item(id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("workspace item {id} not found")))
}

async fn delete_item(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode> {
    if state.repo.remove_from_workspace(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("workspace item {id} not found")))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReorderRequest {
    item_ids: Vec<i64>,
}

async fn reorder(
    State(state): State<AppState>,
    Json(request): Json<ReorderRequest>,
) -> Result<StatusCode> {
    state.repo.reorder_workspace(request.item_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ExportParams {
    format: Option<String>,
}

async fn export_workspace(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<impl axum::response::IntoResponse> {
    let format: ExportFormat = params.format.as_deref().unwrap_or("json").parse()?;

    let items: Vec<ExportItem> = state
        .repo
        .list_workspace()
        .await?
        .iter()
        .enumerate()
        .map(|(index, (item, article))| ExportItem::from_entry(index as i64, item, article))
        .collect();

    let meta = ExportMeta {
        title: "Workspace Export".to_string(),
        description: None,
        status: None,
        exported_at: Utc::now(),
    };
    let body = render(&meta, &items, format)?;

    Ok(([(header::CONTENT_TYPE, format.content_type())], body))
}

async fn clear_workspace(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let removed = state.repo.clear_workspace().await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}
