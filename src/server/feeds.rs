use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::error::{AppError, Result};
use crate::feed::FetchOutcome;
use crate::models::{Feed, FeedPatch, NewFeed};

use super::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/feeds", get(list_feeds).post(create_feed))
        .route(
            "/feeds/{id}",
            get(get_feed).patch(update_feed).delete(delete_feed),
        )
        .route("/feeds/{id}/refresh", post(refresh_feed))
        .route("/feeds/refresh-all", post(refresh_all))
}

async fn list_feeds(State(state): State<AppState>) -> Result<Json<Vec<Feed>>> {
    Ok(Json(state.repo.get_all_feeds().await?))
}

async fn create_feed(
    State(state): State<AppState>,
    Json(new_feed): Json<NewFeed>,
) -> Result<(StatusCode, Json<Feed>)> {
    if new_feed.name.trim().is_empty() {
        return Err(AppError::validation("feed name must not be empty"));
    }
    url::Url::parse(&new_feed.url)
        .map_err(|_| AppError::validation(format!("invalid feed URL: {}", new_feed.url)))?;

    let feed = state.repo.insert_feed(new_feed).await?;
    Ok((StatusCode::CREATED, Json(feed)))
}

async fn get_feed(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Feed>> {
    state
        .repo
        .get_feed(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("feed {id} not found")))
}

async fn update_feed(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<FeedPatch>,
) -> Result<Json<Feed>> {
    if let Some(url) = &patch.url {
        url::Url::parse(url)
            .map_err(|_| AppError::validation(format!("invalid feed URL: {url}")))?;
    }

    state
        .repo
        .update_feed(id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("feed {id} not found")))
}

async fn delete_feed(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode> {
    if state.repo.delete_feed(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("feed {id} not found")))
    }
}

async fn refresh_feed(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FetchOutcome>> {
    let outcome = state.fetcher.fetch_feed(&state.repo, id).await?;
    Ok(Json(outcome))
}

/// Kicks off an all-feeds refresh in the background and returns immediately.
async fn refresh_all(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    tokio::spawn(async move {
        state.fetcher.fetch_all(&state.repo).await;
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "message": "refresh started" })),
    )
}
