use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Article, NewReport, Report, ReportPatch, WorkspaceItem};
use crate::report::{render, ExportFormat, ExportItem, ExportMeta};

use super::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/reports", get(list_reports).post(create_report))
        .route(
            "/reports/{id}",
            get(get_report).patch(update_report).delete(delete_report),
        )
        .route("/reports/{id}/export", get(export_report))
}

async fn list_reports(State(state): State<AppState>) -> Result<Json<Vec<Report>>> {
    Ok(Json(state.repo.list_reports().await?))
}

async fn create_report(
    State(state): State<AppState>,
    Json(new_report): Json<NewReport>,
) -> Result<(StatusCode, Json<Report>)> {
    if new_report.title.trim().is_empty() {
        return Err(AppError::validation("report title must not be empty"));
    }

    let report = state.repo.create_report(new_report).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportEntry {
    order_index: i64,
    item: WorkspaceItem,
    article: Article,
}

#[derive(Serialize)]
struct ReportDetail {
    #[serde(flatten)]
    report: Report,
    items: Vec<ReportEntry>,
}

async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ReportDetail>> {
    let report = state
        .repo
        .get_report(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("report {id} not found")))?;

    let items = state
        .repo
        .list_report_items(id)
        .await?
        .into_iter()
        .map(|(order_index, item, article)| ReportEntry {
            order_index,
            item,
            article,
        })
        .collect();

    Ok(Json(ReportDetail { report, items }))
}

async fn update_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<ReportPatch>,
) -> Result<Json<Report>> {
    state
        .repo
        .update_report(id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("report {id} not found")))
}

async fn delete_report(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode> {
    if state.repo.delete_report(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("report {id} not found")))
    }
}

#[derive(Deserialize)]
struct ExportParams {
    format: Option<String>,
}

/// Renders a report in the frozen snapshot order; item content is read live
/// from the current workspace/article rows.
async fn export_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<ExportParams>,
) -> Result<impl axum::response::IntoResponse> {
    let format: ExportFormat = params.format.as_deref().unwrap_or("json").parse()?;

    let report = state
        .repo
        .get_report(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("report {id} not found")))?;

    let items: Vec<ExportItem> = state
        .repo
        .list_report_items(id)
        .await?
        .iter()
        .map(|(order, item, article)| ExportItem::from_entry(*order, item, article))
        .collect();

    let meta = ExportMeta {
        title: report.title,
        description: report.description,
        status: Some(report.status.as_str().to_string()),
        exported_at: Utc::now(),
    };
    let body = render(&meta, &items, format)?;

    Ok(([(header::CONTENT_TYPE, format.content_type())], body))
}
