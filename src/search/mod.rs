//! Similarity search over ingested articles.
//!
//! Two interchangeable backends: a word-set Jaccard fallback that needs no
//! stored vectors, and a linear cosine scan over stored embeddings. The
//! backend is picked once at startup from configuration.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ai::AiClient;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::Article;

const CANDIDATE_MULTIPLIER: u32 = 3;
const TITLE_MATCH_BOOST: f64 = 0.3;
const CATEGORY_MATCH_BOOST: f64 = 0.1;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub article_id: i64,
    pub score: f64,
    pub title: String,
    pub snippet: String,
    pub category: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Jaccard,
    Vector,
}

impl FromStr for Backend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jaccard" => Ok(Backend::Jaccard),
            "vector" => Ok(Backend::Vector),
            other => Err(AppError::Config(format!(
                "unknown search backend: {other}"
            ))),
        }
    }
}

pub struct SimilarityIndex {
    backend: Backend,
    ai: Arc<AiClient>,
}

impl SimilarityIndex {
    pub fn new(backend: Backend, ai: Arc<AiClient>) -> Self {
        Self { backend, ai }
    }

    pub async fn search(
        &self,
        repo: &Repository,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        match self.backend {
            Backend::Jaccard => self.search_jaccard(repo, query, limit).await,
            Backend::Vector => self.search_vector(repo, query, limit).await,
        }
    }

    /// Related-article lookup seeded from the source article's title and
    /// snippet, with the source itself removed from the results.
    pub async fn find_similar(
        &self,
        repo: &Repository,
        article_id: i64,
        limit: usize,
    ) -> Result<Option<Vec<SearchHit>>> {
        let Some(article) = repo.get_article(article_id).await? else {
            return Ok(None);
        };

        let query = format!("{} {}", article.title, article.snippet);
        let mut hits = self.search(repo, &query, limit + 1).await?;
        hits.retain(|h| h.article_id != article_id);
        hits.truncate(limit);
        Ok(Some(hits))
    }

    async fn search_jaccard(
        &self,
        repo: &Repository,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        // A page of the most recent non-archived articles; no relevance
        // pre-filtering happens before scoring.
        let candidates = repo
            .recent_unarchived(limit as u32 * CANDIDATE_MULTIPLIER)
            .await?;

        let mut hits: Vec<SearchHit> = candidates
            .iter()
            .filter_map(|article| {
                let score = jaccard_score(query, article);
                (score > 0.0).then(|| SearchHit {
                    article_id: article.id,
                    score,
                    title: article.title.clone(),
                    snippet: article.snippet.clone(),
                    category: article.category.clone(),
                    published_at: article.published_at,
                })
            })
            .collect();

        sort_and_truncate(&mut hits, limit);
        Ok(hits)
    }

    async fn search_vector(
        &self,
        repo: &Repository,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let query_vec = self.ai.generate_embedding(query).await?;
        let candidates = repo.embedding_candidates().await?;

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter_map(|c| {
                let score = cosine_similarity(&query_vec, &blob_to_vec(&c.blob)) as f64;
                (score > 0.0).then(|| SearchHit {
                    article_id: c.article_id,
                    score,
                    title: c.title,
                    snippet: c.snippet,
                    category: c.category,
                    published_at: c.published_at,
                })
            })
            .collect();

        sort_and_truncate(&mut hits, limit);
        Ok(hits)
    }
}

fn sort_and_truncate(hits: &mut Vec<SearchHit>, limit: usize) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(limit);
}

/// Word-set Jaccard index of the query against title+snippet+content, with
/// flat boosts for literal substring matches in title and category. Clamped
/// to 1.0.
fn jaccard_score(query: &str, article: &Article) -> f64 {
    let query_lower = query.to_lowercase();
    let query_words: HashSet<&str> = query_lower.split_whitespace().collect();
    let text = format!(
        "{} {} {}",
        article.title, article.snippet, article.content
    )
    .to_lowercase();
    let text_words: HashSet<&str> = text.split_whitespace().collect();

    if query_words.is_empty() || text_words.is_empty() {
        return 0.0;
    }

    let intersection = query_words.intersection(&text_words).count();
    let union = query_words.union(&text_words).count();
    let mut score = intersection as f64 / union as f64;

    if article.title.to_lowercase().contains(&query_lower) {
        score += TITLE_MATCH_BOOST;
    }
    if let Some(category) = &article.category {
        if category.to_lowercase().contains(&query_lower) {
            score += CATEGORY_MATCH_BOOST;
        }
    }

    score.min(1.0)
}

/// Encode a float vector as little-endian bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in [-1.0, 1.0]; 0.0 for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: i64, title: &str, snippet: &str, content: &str, category: Option<&str>) -> Article {
        Article {
            id,
            feed_id: 1,
            title: title.to_string(),
            content: content.to_string(),
            snippet: snippet.to_string(),
            author: None,
            published_at: Utc::now(),
            url: format!("https://example.com/{id}"),
            is_read: false,
            is_archived: false,
            category: category.map(|c| c.to_string()),
            summary: None,
            analysis: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn title_substring_boost_outranks_plain_overlap() {
        let trade = article(
            1,
            "US-China Trade Relations",
            "Talks resume",
            "Negotiators met to discuss trade tariffs.",
            Some("world"),
        );
        let other = article(
            2,
            "Garden Birds in Spring",
            "Feeders",
            "Finches and sparrows visit feeders.",
            Some("nature"),
        );

        let trade_score = jaccard_score("trade", &trade);
        let other_score = jaccard_score("trade", &other);

        assert!(trade_score > other_score);
        assert!(trade_score >= TITLE_MATCH_BOOST);
        assert_eq!(other_score, 0.0);
    }

    #[test]
    fn category_substring_adds_smaller_boost() {
        let with_category = article(1, "Markets wobble", "s", "markets fell", Some("markets"));
        let without = article(2, "Markets wobble", "s", "markets fell", None);

        let a = jaccard_score("markets", &with_category);
        let b = jaccard_score("markets", &without);
        assert!((a - b - CATEGORY_MATCH_BOOST).abs() < 1e-9);
    }

    #[test]
    fn score_is_clamped_to_one() {
        let exact = article(1, "trade", "trade", "trade", Some("trade"));
        assert_eq!(jaccard_score("trade", &exact), 1.0);
    }

    #[test]
    fn blob_roundtrip_is_lossless() {
        let vec = vec![0.25f32, -1.5, 3.125, 0.0];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn cosine_similarity_basics() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
