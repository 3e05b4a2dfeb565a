use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::EmbeddingStats;
use crate::error::{AppError, Result};
use crate::models::{Article, ArticleListQuery, ArticlePatch};
use crate::search::{vec_to_blob, SearchHit};

use super::AppState;

const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_SIMILAR_LIMIT: usize = 5;
const DEFAULT_BATCH_LIMIT: u32 = 10;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/articles", get(list_articles))
        .route("/articles/search", post(search_articles))
        .route("/articles/embeddings/batch", post(embeddings_batch))
        .route("/articles/embeddings/stats", get(embeddings_stats))
        .route("/articles/{id}", get(get_article).patch(update_article))
        .route("/articles/{id}/summarize", post(summarize_article))
        .route("/articles/{id}/embedding", post(generate_embedding))
        .route("/articles/{id}/similar", get(similar_articles))
}

async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ArticleListQuery>,
) -> Result<Json<Vec<Article>>> {
    Ok(Json(state.repo.list_articles(query).await?))
}

async fn get_article(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Article>> {
    state
        .repo
        .get_article(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("article {id} not found")))
}

async fn update_article(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<ArticlePatch>,
) -> Result<Json<Article>> {
    state
        .repo
        .update_article(id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("article {id} not found")))
}

async fn summarize_article(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Article>> {
    let article = state
        .repo
        .get_article(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("article {id} not found")))?;

    let summary = state.ai.summarize_text(&state.repo, &article.content).await?;

    state
        .repo
        .set_article_summary(id, summary)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("article {id} not found")))
}

async fn generate_embedding(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    let article = state
        .repo
        .get_article(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("article {id} not found")))?;

    let input = format!("{}\n\n{}", article.title, article.content);
    let vector = state.ai.generate_embedding(&input).await?;
    let dimensions = vector.len();

    state
        .repo
        .upsert_embedding(id, vec_to_blob(&vector), state.ai.embeddings_model().to_string())
        .await?;

    Ok(Json(serde_json::json!({
        "articleId": id,
        "dimensions": dimensions,
        "model": state.ai.embeddings_model(),
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    query: String,
    limit: Option<usize>,
}

async fn search_articles(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<SearchHit>>> {
    if request.query.trim().is_empty() {
        return Err(AppError::validation("query must not be empty"));
    }
    let limit = request.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

    let hits = state.search.search(&state.repo, &request.query, limit).await?;
    Ok(Json(hits))
}

#[derive(Deserialize)]
struct SimilarParams {
    limit: Option<usize>,
}

async fn similar_articles(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<SimilarParams>,
) -> Result<Json<Vec<SearchHit>>> {
    let limit = params.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT);

    state
        .search
        .find_similar(&state.repo, id, limit)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("article {id} not found")))
}

#[derive(Deserialize)]
struct BatchRequest {
    limit: Option<u32>,
}

/// Embeds a batch of articles that have no stored vector yet. Per-article
/// failures are logged and skipped so one bad article cannot stall the rest.
async fn embeddings_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<serde_json::Value>> {
    let limit = request.limit.unwrap_or(DEFAULT_BATCH_LIMIT);
    let articles = state.repo.articles_missing_embeddings(limit).await?;

    let mut processed = 0;
    let mut failed = 0;
    for article in articles {
        let input = format!("{}\n\n{}", article.title, article.content);
        match state.ai.generate_embedding(&input).await {
            Ok(vector) => {
                state
                    .repo
                    .upsert_embedding(
                        article.id,
                        vec_to_blob(&vector),
                        state.ai.embeddings_model().to_string(),
                    )
                    .await?;
                processed += 1;
            }
            Err(e) => {
                tracing::warn!("Embedding for article {} failed: {}", article.id, e);
                failed += 1;
            }
        }
    }

    Ok(Json(serde_json::json!({
        "processed": processed,
        "failed": failed,
    })))
}

async fn embeddings_stats(State(state): State<AppState>) -> Result<Json<EmbeddingStats>> {
    Ok(Json(state.repo.embedding_stats().await?))
}
