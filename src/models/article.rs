use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub content: String,
    pub snippet: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub url: String,
    pub is_read: bool,
    pub is_archived: bool,
    pub category: Option<String>,
    pub summary: Option<String>,
    pub analysis: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A parsed feed entry ready for insertion. Only the fetcher builds these.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub feed_id: i64,
    pub title: String,
    pub content: String,
    pub snippet: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub url: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePatch {
    pub is_read: Option<bool>,
    pub is_archived: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleListQuery {
    pub category: Option<String>,
    /// "unread", "read" or "archived"; unset means all non-archived.
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub feed_id: Option<i64>,
}
