//! REST surface over the repository, fetcher, AI client and search index.
//!
//! All error responses share one JSON shape: `{"error": code, "message": text}`
//! with 400 for bad input, 404 for missing ids, 409 for conflicts and 500 for
//! everything unexpected.

mod articles;
mod feeds;
mod reports;
mod settings;
mod workspace;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::ai::AiClient;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::FeedFetcher;
use crate::search::SimilarityIndex;

#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub fetcher: Arc<FeedFetcher>,
    pub ai: Arc<AiClient>,
    pub search: Arc<SimilarityIndex>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::AiApi(_) | AppError::Http(_) | AppError::FeedParse(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "upstream_error")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = ErrorBody {
            error: code.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(feeds::router())
        .merge(articles::router())
        .merge(workspace::router())
        .merge(reports::router())
        .merge(settings::router())
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: AppState, bind_addr: &str) -> Result<()> {
    let app = router(state);

    tracing::info!("Listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
