use std::time::Duration;

use chrono::Utc;
use feed_rs::parser;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Serialize;

use crate::db::Repository;
use crate::error::Result;
use crate::models::{Feed, NewArticle};
use crate::text::{clean_html, make_snippet};

const FETCH_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOutcome {
    pub success: bool,
    pub articles_added: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchOutcome {
    fn failed(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            articles_added: 0,
            error: Some(msg.into()),
        }
    }
}

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("newsdesk/0.1")
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    pub async fn fetch_feed(&self, repo: &Repository, feed_id: i64) -> Result<FetchOutcome> {
        let Some(feed) = repo.get_feed(feed_id).await? else {
            return Ok(FetchOutcome::failed("feed not found"));
        };
        if !feed.is_active {
            return Ok(FetchOutcome::failed("feed is not active"));
        }

        let max_articles = repo.max_articles_per_feed().await;

        let parsed = match self.download(&feed.url).await {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}", feed.url, e);
                return Ok(FetchOutcome::failed(e.to_string()));
            }
        };

        let mut added = 0;
        // Entries are taken in document order; the cap bounds processing, it
        // does not pick the newest N.
        for entry in parsed.entries.into_iter().take(max_articles as usize) {
            let Some(article) = map_entry(&feed, entry) else {
                continue;
            };
            match repo.insert_article_if_new(article).await {
                Ok(true) => added += 1,
                Ok(false) => {} // URL already seen
                Err(e) => tracing::warn!("Failed to store entry from {}: {}", feed.url, e),
            }
        }

        repo.update_feed_last_fetched(feed_id).await?;
        let trimmed = repo.trim_feed_articles(feed_id, max_articles).await?;
        if trimmed > 0 {
            tracing::debug!("Trimmed {} old articles from {}", trimmed, feed.name);
        }

        Ok(FetchOutcome {
            success: true,
            articles_added: added,
            error: None,
        })
    }

    async fn download(&self, url: &str) -> Result<feed_rs::model::Feed> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        Ok(parser::parse(&bytes[..])?)
    }

    /// Refresh all active feeds with at most five in flight at a time.
    /// Per-feed failures are logged and never abort the batch.
    pub async fn fetch_all(&self, repo: &Repository) {
        let feeds = match repo.get_active_feeds().await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::error!("Failed to load feeds for refresh: {}", e);
                return;
            }
        };

        let total = feeds.len();
        let added: usize = stream::iter(feeds)
            .map(|feed| async move {
                match self.fetch_feed(repo, feed.id).await {
                    Ok(outcome) if outcome.success => {
                        tracing::debug!(
                            "Fetched {} new articles from {}",
                            outcome.articles_added,
                            feed.name
                        );
                        outcome.articles_added
                    }
                    Ok(outcome) => {
                        tracing::warn!(
                            "Refresh of {} failed: {}",
                            feed.name,
                            outcome.error.unwrap_or_default()
                        );
                        0
                    }
                    Err(e) => {
                        tracing::warn!("Refresh of {} failed: {}", feed.name, e);
                        0
                    }
                }
            })
            .buffer_unordered(FETCH_CONCURRENCY)
            .fold(0, |acc, n| async move { acc + n })
            .await;

        tracing::info!("Refreshed {} feeds, {} new articles", total, added);
    }
}

impl Default for FeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a parsed entry to an article row. Entries without a link or title are
/// dropped; content preference is full content, then summary, then title.
fn map_entry(feed: &Feed, entry: feed_rs::model::Entry) -> Option<NewArticle> {
    let url = entry.links.first().map(|l| l.href.clone())?;
    let title = entry.title.as_ref().map(|t| t.content.clone())?;

    let content_html = entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()));

    let content = content_html
        .as_deref()
        .and_then(clean_html)
        .unwrap_or_else(|| title.clone());
    let snippet = make_snippet(&content);

    Some(NewArticle {
        feed_id: feed.id,
        title,
        content,
        snippet,
        author: entry.authors.first().map(|a| a.name.clone()),
        published_at: entry.published.or(entry.updated).unwrap_or_else(Utc::now),
        url,
        category: Some(feed.category.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_feed() -> Feed {
        Feed {
            id: 7,
            name: "Example".to_string(),
            url: "https://example.com/feed.xml".to_string(),
            category: "tech".to_string(),
            is_active: true,
            last_fetched: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn entries_without_link_or_title_are_dropped() {
        let xml = r#"<?xml version="1.0"?>
            <rss version="2.0"><channel><title>Example</title>
                <item>
                    <title>Kept</title>
                    <link>https://example.com/articles/1</link>
                    <description>&lt;p&gt;Fish &amp;amp; chips.&lt;/p&gt;</description>
                </item>
                <item>
                    <description>No title, no link</description>
                </item>
            </channel></rss>"#;

        let parsed = parser::parse(xml.as_bytes()).unwrap();
        let feed = test_feed();
        let articles: Vec<_> = parsed
            .entries
            .into_iter()
            .filter_map(|e| map_entry(&feed, e))
            .collect();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Kept");
        assert_eq!(articles[0].url, "https://example.com/articles/1");
        assert_eq!(articles[0].content, "Fish & chips.");
        assert_eq!(articles[0].category.as_deref(), Some("tech"));
    }

    #[test]
    fn content_falls_back_to_title_when_body_is_missing() {
        let xml = r#"<?xml version="1.0"?>
            <rss version="2.0"><channel><title>Example</title>
                <item>
                    <title>Bare headline</title>
                    <link>https://example.com/articles/2</link>
                </item>
            </channel></rss>"#;

        let parsed = parser::parse(xml.as_bytes()).unwrap();
        let feed = test_feed();
        let article = parsed
            .entries
            .into_iter()
            .filter_map(|e| map_entry(&feed, e))
            .next()
            .unwrap();

        assert_eq!(article.content, "Bare headline");
        assert_eq!(article.snippet, "Bare headline");
    }
}
