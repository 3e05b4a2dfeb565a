use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    keys, Article, ArticleListQuery, ArticlePatch, Feed, FeedPatch, NewArticle, NewFeed,
    NewReport, Report, ReportPatch, ReportStatus, Settings, SettingsPatch, WorkspaceItem,
    WorkspaceItemPatch,
};
use crate::models::settings::{
    DEFAULT_MAX_ARTICLES_PER_FEED, DEFAULT_REFRESH_INTERVAL_MINUTES,
};

use super::schema::SCHEMA;

const DEFAULT_PAGE_SIZE: u32 = 50;

/// Candidate row for the vector search scan.
pub struct EmbeddingCandidate {
    pub article_id: i64,
    pub blob: Vec<u8>,
    pub title: String,
    pub snippet: String,
    pub category: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeskStats {
    pub feeds: i64,
    pub active_feeds: i64,
    pub articles: i64,
    pub unread_articles: i64,
    pub workspace_items: i64,
    pub reports: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingStats {
    pub total_articles: i64,
    pub with_embeddings: i64,
}

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path.to_string()).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Feed operations

    pub async fn insert_feed(&self, feed: NewFeed) -> Result<Feed> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO feeds (name, url, category, is_active) VALUES (?1, ?2, ?3, ?4)",
                    params![feed.name, feed.url, feed.category, feed.is_active],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(|e| map_unique_violation(e, "a feed with this URL already exists"))?;

        self.get_feed(id)
            .await?
            .ok_or_else(|| AppError::not_found("feed vanished after insert"))
    }

    pub async fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
        let feed = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?1"
                ))?;
                let feed = stmt
                    .query_row(params![id], |row| Ok(feed_from_row(row)))
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    pub async fn get_all_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {FEED_COLUMNS} FROM feeds ORDER BY name"
                ))?;
                let feeds = stmt
                    .query_map([], |row| Ok(feed_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn get_active_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {FEED_COLUMNS} FROM feeds WHERE is_active = 1 ORDER BY name"
                ))?;
                let feeds = stmt
                    .query_map([], |row| Ok(feed_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn update_feed(&self, id: i64, patch: FeedPatch) -> Result<Option<Feed>> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE feeds SET
                         name = COALESCE(?2, name),
                         url = COALESCE(?3, url),
                         category = COALESCE(?4, category),
                         is_active = COALESCE(?5, is_active)
                     WHERE id = ?1",
                    params![id, patch.name, patch.url, patch.category, patch.is_active],
                )?;
                Ok(changed)
            })
            .await
            .map_err(|e| map_unique_violation(e, "a feed with this URL already exists"))?;

        if changed == 0 {
            return Ok(None);
        }
        self.get_feed(id).await
    }

    pub async fn update_feed_last_fetched(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE feeds SET last_fetched = datetime('now') WHERE id = ?1",
                    params![id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn delete_feed(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute("DELETE FROM feeds WHERE id = ?1", params![id])?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted > 0)
    }

    // Article operations

    /// Inserts the article unless one with the same URL already exists.
    /// Returns true if a row was inserted.
    pub async fn insert_article_if_new(&self, article: NewArticle) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                let inserted = conn.execute(
                    "INSERT INTO articles
                         (feed_id, title, content, snippet, author, published_at, url, category)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(url) DO NOTHING",
                    params![
                        article.feed_id,
                        article.title,
                        article.content,
                        article.snippet,
                        article.author,
                        article.published_at.to_rfc3339(),
                        article.url,
                        article.category,
                    ],
                )?;
                Ok(inserted)
            })
            .await?;
        Ok(inserted > 0)
    }

    pub async fn get_article(&self, id: i64) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1"
                ))?;
                let article = stmt
                    .query_row(params![id], |row| Ok(article_from_row(row)))
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    pub async fn list_articles(&self, query: ArticleListQuery) -> Result<Vec<Article>> {
        let status_clause = match query.status.as_deref() {
            None => "1 = 1",
            Some("unread") => "is_read = 0 AND is_archived = 0",
            Some("read") => "is_read = 1 AND is_archived = 0",
            Some("archived") => "is_archived = 1",
            Some(other) => {
                return Err(AppError::validation(format!(
                    "unknown article status filter: {other}"
                )))
            }
        };
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0);

        let articles = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles
                     WHERE {status_clause}
                       AND (?1 IS NULL OR category = ?1)
                       AND (?2 IS NULL OR feed_id = ?2)
                     ORDER BY published_at DESC
                     LIMIT ?3 OFFSET ?4"
                );
                let mut stmt = conn.prepare(&sql)?;
                let articles = stmt
                    .query_map(
                        params![query.category, query.feed_id, limit, offset],
                        |row| Ok(article_from_row(row)),
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    /// Most recent non-archived articles, used as the candidate page for search.
    pub async fn recent_unarchived(&self, limit: u32) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles
                     WHERE is_archived = 0
                     ORDER BY published_at DESC
                     LIMIT ?1"
                ))?;
                let articles = stmt
                    .query_map(params![limit], |row| Ok(article_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn update_article(&self, id: i64, patch: ArticlePatch) -> Result<Option<Article>> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE articles SET
                         is_read = COALESCE(?2, is_read),
                         is_archived = COALESCE(?3, is_archived)
                     WHERE id = ?1",
                    params![id, patch.is_read, patch.is_archived],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Ok(None);
        }
        self.get_article(id).await
    }

    pub async fn set_article_summary(&self, id: i64, summary: String) -> Result<Option<Article>> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE articles SET summary = ?2 WHERE id = ?1",
                    params![id, summary],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Ok(None);
        }
        self.get_article(id).await
    }

    /// Deletes everything beyond the `keep` most recently published articles
    /// of a feed. Returns the number of rows removed.
    pub async fn trim_feed_articles(&self, feed_id: i64, keep: u32) -> Result<usize> {
        let removed = self
            .conn
            .call(move |conn| {
                let removed = conn.execute(
                    "DELETE FROM articles
                     WHERE feed_id = ?1 AND id NOT IN (
                         SELECT id FROM articles
                         WHERE feed_id = ?1
                         ORDER BY published_at DESC
                         LIMIT ?2
                     )",
                    params![feed_id, keep],
                )?;
                Ok(removed)
            })
            .await?;
        Ok(removed)
    }

    // Workspace operations

    /// Appends an article to the workspace with `sort_order = max + 1`.
    ///
    /// The insert is a single conditional statement; the UNIQUE constraint on
    /// `article_id` turns a concurrent duplicate add into a conflict error
    /// instead of a second row. Returns None when the article does not exist.
    pub async fn add_to_workspace(&self, article_id: i64) -> Result<Option<WorkspaceItem>> {
        let item = self
            .conn
            .call(move |conn| {
                let exists: bool = conn
                    .query_row(
                        "SELECT 1 FROM articles WHERE id = ?1",
                        params![article_id],
                        |_| Ok(true),
                    )
                    .optional()?
                    .unwrap_or(false);
                if !exists {
                    return Ok(None);
                }

                conn.execute(
                    "INSERT INTO workspace_items (article_id, sort_order)
                     SELECT ?1, COALESCE(MAX(sort_order) + 1, 0) FROM workspace_items",
                    params![article_id],
                )?;
                let id = conn.last_insert_rowid();

                let mut stmt = conn.prepare(&format!(
                    "SELECT {WORKSPACE_COLUMNS} FROM workspace_items WHERE id = ?1"
                ))?;
                let item = stmt.query_row(params![id], |row| Ok(workspace_item_from_row(row)))?;
                Ok(Some(item))
            })
            .await
            .map_err(|e| map_unique_violation(e, "article is already in the workspace"))?;
        Ok(item)
    }

    pub async fn get_workspace_item(&self, id: i64) -> Result<Option<WorkspaceItem>> {
        let item = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {WORKSPACE_COLUMNS} FROM workspace_items WHERE id = ?1"
                ))?;
                let item = stmt
                    .query_row(params![id], |row| Ok(workspace_item_from_row(row)))
                    .optional()?;
                Ok(item)
            })
            .await?;
        Ok(item)
    }

    /// All workspace items joined with their articles, in display order.
    pub async fn list_workspace(&self) -> Result<Vec<(WorkspaceItem, Article)>> {
        let entries = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {WORKSPACE_COLUMNS_W}, {ARTICLE_COLUMNS_A}
                     FROM workspace_items w
                     JOIN articles a ON w.article_id = a.id
                     ORDER BY w.sort_order, w.id"
                ))?;
                let entries = stmt
                    .query_map([], |row| {
                        Ok((workspace_item_from_row(row), article_from_row_at(row, 8)))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    /// Partial update; supplying either field also marks the item as edited.
    pub async fn update_workspace_item(
        &self,
        id: i64,
        patch: WorkspaceItemPatch,
    ) -> Result<Option<WorkspaceItem>> {
        if patch.is_empty() {
            return self.get_workspace_item(id).await;
        }

        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE workspace_items SET
                         custom_content = COALESCE(?2, custom_content),
                         custom_analysis = COALESCE(?3, custom_analysis),
                         is_edited = 1
                     WHERE id = ?1",
                    params![id, patch.custom_content, patch.custom_analysis],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Ok(None);
        }
        self.get_workspace_item(id).await
    }

    pub async fn remove_from_workspace(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted =
                    conn.execute("DELETE FROM workspace_items WHERE id = ?1", params![id])?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted > 0)
    }

    pub async fn clear_workspace(&self) -> Result<usize> {
        let removed = self
            .conn
            .call(|conn| {
                let removed = conn.execute("DELETE FROM workspace_items", [])?;
                Ok(removed)
            })
            .await?;
        Ok(removed)
    }

    /// Rewrites `sort_order` to each id's position in the supplied list, in
    /// one transaction. Ids not listed keep their current order; the list is
    /// not validated for completeness.
    pub async fn reorder_workspace(&self, ordered_ids: Vec<i64>) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (index, id) in ordered_ids.iter().enumerate() {
                    tx.execute(
                        "UPDATE workspace_items SET sort_order = ?1 WHERE id = ?2",
                        params![index as i64, id],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Report operations

    /// Creates a report; with `copy_workspace` the current workspace is
    /// snapshotted into report_items (order frozen, content stays live).
    pub async fn create_report(&self, report: NewReport) -> Result<Report> {
        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO reports (title, description, status) VALUES (?1, ?2, ?3)",
                    params![report.title, report.description, report.status.as_str()],
                )?;
                let report_id = tx.last_insert_rowid();

                if report.copy_workspace {
                    let item_ids: Vec<i64> = {
                        let mut stmt = tx.prepare(
                            "SELECT id FROM workspace_items ORDER BY sort_order, id",
                        )?;
                        let ids = stmt.query_map([], |row| row.get(0))?
                            .collect::<std::result::Result<Vec<_>, _>>()?;
                        ids
                    };
                    for (index, item_id) in item_ids.iter().enumerate() {
                        tx.execute(
                            "INSERT INTO report_items (report_id, workspace_item_id, order_index)
                             VALUES (?1, ?2, ?3)",
                            params![report_id, item_id, index as i64],
                        )?;
                    }
                }

                tx.commit()?;
                Ok(report_id)
            })
            .await?;

        self.get_report(id)
            .await?
            .ok_or_else(|| AppError::not_found("report vanished after insert"))
    }

    pub async fn get_report(&self, id: i64) -> Result<Option<Report>> {
        let report = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"
                ))?;
                let report = stmt
                    .query_row(params![id], |row| Ok(report_from_row(row)))
                    .optional()?;
                Ok(report)
            })
            .await?;
        Ok(report)
    }

    pub async fn list_reports(&self) -> Result<Vec<Report>> {
        let reports = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {REPORT_COLUMNS} FROM reports ORDER BY updated_at DESC"
                ))?;
                let reports = stmt
                    .query_map([], |row| Ok(report_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(reports)
            })
            .await?;
        Ok(reports)
    }

    pub async fn update_report(&self, id: i64, patch: ReportPatch) -> Result<Option<Report>> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE reports SET
                         title = COALESCE(?2, title),
                         description = COALESCE(?3, description),
                         status = COALESCE(?4, status)
                     WHERE id = ?1",
                    params![
                        id,
                        patch.title,
                        patch.description,
                        patch.status.map(|s| s.as_str()),
                    ],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Ok(None);
        }
        self.get_report(id).await
    }

    pub async fn delete_report(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute("DELETE FROM reports WHERE id = ?1", params![id])?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted > 0)
    }

    /// Report items joined with their live workspace/article rows, in the
    /// frozen snapshot order.
    pub async fn list_report_items(
        &self,
        report_id: i64,
    ) -> Result<Vec<(i64, WorkspaceItem, Article)>> {
        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT ri.order_index, {WORKSPACE_COLUMNS_W}, {ARTICLE_COLUMNS_A}
                     FROM report_items ri
                     JOIN workspace_items w ON ri.workspace_item_id = w.id
                     JOIN articles a ON w.article_id = a.id
                     WHERE ri.report_id = ?1
                     ORDER BY ri.order_index"
                ))?;
                let entries = stmt
                    .query_map(params![report_id], |row| {
                        Ok((
                            row.get::<_, i64>(0).unwrap(),
                            workspace_item_from_row_at(row, 1),
                            article_from_row_at(row, 9),
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    // Settings operations

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        let value = self
            .conn
            .call(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM settings WHERE key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO settings (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// All settings as a typed struct, falling back to defaults for keys
    /// that are unset or unparseable.
    pub async fn get_settings(&self) -> Result<Settings> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut settings = Settings::default();
        for (key, value) in rows {
            match key.as_str() {
                keys::AI_SYSTEM_PROMPT => settings.ai_system_prompt = value,
                keys::AI_MAX_TOKENS => {
                    if let Ok(v) = value.parse() {
                        settings.ai_max_tokens = v;
                    }
                }
                keys::AI_TEMPERATURE => {
                    if let Ok(v) = value.parse() {
                        settings.ai_temperature = v;
                    }
                }
                keys::REFRESH_INTERVAL_MINUTES => {
                    if let Ok(v) = value.parse() {
                        settings.refresh_interval_minutes = v;
                    }
                }
                keys::MAX_ARTICLES_PER_FEED => {
                    if let Ok(v) = value.parse() {
                        settings.max_articles_per_feed = v;
                    }
                }
                _ => {}
            }
        }
        Ok(settings)
    }

    pub async fn patch_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        if let Some(v) = patch.ai_system_prompt {
            self.set_setting(keys::AI_SYSTEM_PROMPT, &v).await?;
        }
        if let Some(v) = patch.ai_max_tokens {
            self.set_setting(keys::AI_MAX_TOKENS, &v.to_string()).await?;
        }
        if let Some(v) = patch.ai_temperature {
            self.set_setting(keys::AI_TEMPERATURE, &v.to_string()).await?;
        }
        if let Some(v) = patch.refresh_interval_minutes {
            self.set_setting(keys::REFRESH_INTERVAL_MINUTES, &v.to_string())
                .await?;
        }
        if let Some(v) = patch.max_articles_per_feed {
            self.set_setting(keys::MAX_ARTICLES_PER_FEED, &v.to_string())
                .await?;
        }
        self.get_settings().await
    }

    /// Wipes all stored settings and writes the defaults back, in one batch.
    pub async fn reset_settings(&self) -> Result<Settings> {
        let defaults = Settings::default();
        let pairs = vec![
            (keys::AI_SYSTEM_PROMPT, defaults.ai_system_prompt.clone()),
            (keys::AI_MAX_TOKENS, defaults.ai_max_tokens.to_string()),
            (keys::AI_TEMPERATURE, defaults.ai_temperature.to_string()),
            (
                keys::REFRESH_INTERVAL_MINUTES,
                defaults.refresh_interval_minutes.to_string(),
            ),
            (
                keys::MAX_ARTICLES_PER_FEED,
                defaults.max_articles_per_feed.to_string(),
            ),
        ];
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM settings", [])?;
                for (key, value) in &pairs {
                    tx.execute(
                        "INSERT INTO settings (key, value) VALUES (?1, ?2)",
                        params![key, value],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(defaults)
    }

    pub async fn max_articles_per_feed(&self) -> u32 {
        self.get_setting(keys::MAX_ARTICLES_PER_FEED)
            .await
            .ok()
            .flatten()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_ARTICLES_PER_FEED)
    }

    pub async fn refresh_interval_minutes(&self) -> u32 {
        self.get_setting(keys::REFRESH_INTERVAL_MINUTES)
            .await
            .ok()
            .flatten()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_MINUTES)
    }

    // Embedding operations

    pub async fn upsert_embedding(
        &self,
        article_id: i64,
        blob: Vec<u8>,
        model: String,
    ) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO embeddings (article_id, embedding, model) VALUES (?1, ?2, ?3)
                     ON CONFLICT(article_id) DO UPDATE SET
                         embedding = excluded.embedding,
                         model = excluded.model,
                         created_at = datetime('now')",
                    params![article_id, blob, model],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// All stored embeddings for non-archived articles, for the linear scan.
    pub async fn embedding_candidates(&self) -> Result<Vec<EmbeddingCandidate>> {
        let candidates = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT e.article_id, e.embedding, a.title, a.snippet, a.category, a.published_at
                     FROM embeddings e
                     JOIN articles a ON e.article_id = a.id
                     WHERE a.is_archived = 0",
                )?;
                let candidates = stmt
                    .query_map([], |row| {
                        Ok(EmbeddingCandidate {
                            article_id: row.get(0).unwrap(),
                            blob: row.get(1).unwrap(),
                            title: row.get(2).unwrap(),
                            snippet: row.get(3).unwrap(),
                            category: row.get(4).unwrap(),
                            published_at: row
                                .get::<_, String>(5)
                                .ok()
                                .and_then(|s| parse_datetime(&s))
                                .unwrap_or_else(Utc::now),
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(candidates)
            })
            .await?;
        Ok(candidates)
    }

    pub async fn articles_missing_embeddings(&self, limit: u32) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles
                     WHERE is_archived = 0
                       AND id NOT IN (SELECT article_id FROM embeddings)
                     ORDER BY published_at DESC
                     LIMIT ?1"
                ))?;
                let articles = stmt
                    .query_map(params![limit], |row| Ok(article_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn embedding_stats(&self) -> Result<EmbeddingStats> {
        let stats = self
            .conn
            .call(|conn| {
                let stats = conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM articles),
                            (SELECT COUNT(*) FROM embeddings)",
                    [],
                    |row| {
                        Ok(EmbeddingStats {
                            total_articles: row.get(0)?,
                            with_embeddings: row.get(1)?,
                        })
                    },
                )?;
                Ok(stats)
            })
            .await?;
        Ok(stats)
    }

    // Aggregates

    pub async fn categories(&self) -> Result<Vec<String>> {
        let categories = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT category FROM feeds
                     UNION
                     SELECT category FROM articles WHERE category IS NOT NULL
                     ORDER BY 1",
                )?;
                let categories = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(categories)
            })
            .await?;
        Ok(categories)
    }

    pub async fn stats(&self) -> Result<DeskStats> {
        let stats = self
            .conn
            .call(|conn| {
                let stats = conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM feeds),
                            (SELECT COUNT(*) FROM feeds WHERE is_active = 1),
                            (SELECT COUNT(*) FROM articles),
                            (SELECT COUNT(*) FROM articles WHERE is_read = 0 AND is_archived = 0),
                            (SELECT COUNT(*) FROM workspace_items),
                            (SELECT COUNT(*) FROM reports)",
                    [],
                    |row| {
                        Ok(DeskStats {
                            feeds: row.get(0)?,
                            active_feeds: row.get(1)?,
                            articles: row.get(2)?,
                            unread_articles: row.get(3)?,
                            workspace_items: row.get(4)?,
                            reports: row.get(5)?,
                        })
                    },
                )?;
                Ok(stats)
            })
            .await?;
        Ok(stats)
    }
}

const FEED_COLUMNS: &str =
    "id, name, url, category, is_active, last_fetched, created_at, updated_at";

const ARTICLE_COLUMNS: &str = "id, feed_id, title, content, snippet, author, published_at, url, \
     is_read, is_archived, category, summary, analysis, created_at, updated_at";

const ARTICLE_COLUMNS_A: &str = "a.id, a.feed_id, a.title, a.content, a.snippet, a.author, \
     a.published_at, a.url, a.is_read, a.is_archived, a.category, a.summary, a.analysis, \
     a.created_at, a.updated_at";

const WORKSPACE_COLUMNS: &str = "id, article_id, sort_order, custom_content, custom_analysis, \
     is_edited, created_at, updated_at";

const WORKSPACE_COLUMNS_W: &str = "w.id, w.article_id, w.sort_order, w.custom_content, \
     w.custom_analysis, w.is_edited, w.created_at, w.updated_at";

const REPORT_COLUMNS: &str = "id, title, description, status, created_at, updated_at";

fn map_unique_violation(err: tokio_rusqlite::Error, message: &str) -> AppError {
    if let tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)) = &err {
        if e.code == rusqlite::ErrorCode::ConstraintViolation {
            return AppError::conflict(message.to_string());
        }
    }
    AppError::Database(err)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn datetime_at(row: &Row, idx: usize) -> DateTime<Utc> {
    row.get::<_, String>(idx)
        .ok()
        .and_then(|s| parse_datetime(&s))
        .unwrap_or_else(Utc::now)
}

fn feed_from_row(row: &Row) -> Feed {
    Feed {
        id: row.get(0).unwrap(),
        name: row.get(1).unwrap(),
        url: row.get(2).unwrap(),
        category: row.get(3).unwrap(),
        is_active: row.get::<_, i64>(4).unwrap() != 0,
        last_fetched: row
            .get::<_, Option<String>>(5)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        created_at: datetime_at(row, 6),
        updated_at: datetime_at(row, 7),
    }
}

fn article_from_row(row: &Row) -> Article {
    article_from_row_at(row, 0)
}

fn article_from_row_at(row: &Row, base: usize) -> Article {
    Article {
        id: row.get(base).unwrap(),
        feed_id: row.get(base + 1).unwrap(),
        title: row.get(base + 2).unwrap(),
        content: row.get(base + 3).unwrap(),
        snippet: row.get(base + 4).unwrap(),
        author: row.get(base + 5).unwrap(),
        published_at: datetime_at(row, base + 6),
        url: row.get(base + 7).unwrap(),
        is_read: row.get::<_, i64>(base + 8).unwrap() != 0,
        is_archived: row.get::<_, i64>(base + 9).unwrap() != 0,
        category: row.get(base + 10).unwrap(),
        summary: row.get(base + 11).unwrap(),
        analysis: row.get(base + 12).unwrap(),
        created_at: datetime_at(row, base + 13),
        updated_at: datetime_at(row, base + 14),
    }
}

fn workspace_item_from_row(row: &Row) -> WorkspaceItem {
    workspace_item_from_row_at(row, 0)
}

fn workspace_item_from_row_at(row: &Row, base: usize) -> WorkspaceItem {
    WorkspaceItem {
        id: row.get(base).unwrap(),
        article_id: row.get(base + 1).unwrap(),
        sort_order: row.get(base + 2).unwrap(),
        custom_content: row.get(base + 3).unwrap(),
        custom_analysis: row.get(base + 4).unwrap(),
        is_edited: row.get::<_, i64>(base + 5).unwrap() != 0,
        created_at: datetime_at(row, base + 6),
        updated_at: datetime_at(row, base + 7),
    }
}

fn report_from_row(row: &Row) -> Report {
    Report {
        id: row.get(0).unwrap(),
        title: row.get(1).unwrap(),
        description: row.get(2).unwrap(),
        status: ReportStatus::parse(&row.get::<_, String>(3).unwrap())
            .unwrap_or(ReportStatus::Draft),
        created_at: datetime_at(row, 4),
        updated_at: datetime_at(row, 5),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn test_repo() -> (Repository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
        (repo, dir)
    }

    fn sample_feed(n: u32) -> NewFeed {
        NewFeed {
            name: format!("Feed {n}"),
            url: format!("https://example.com/feed-{n}.xml"),
            category: "news".to_string(),
            is_active: true,
        }
    }

    fn sample_article(feed_id: i64, n: u32) -> NewArticle {
        NewArticle {
            feed_id,
            title: format!("Article {n}"),
            content: format!("Content of article {n}."),
            snippet: format!("Snippet {n}"),
            author: None,
            published_at: Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, n).unwrap(),
            url: format!("https://example.com/articles/{n}"),
            category: Some("news".to_string()),
        }
    }

    #[tokio::test]
    async fn duplicate_feed_url_is_a_conflict() {
        let (repo, _dir) = test_repo().await;
        repo.insert_feed(sample_feed(1)).await.unwrap();
        let err = repo.insert_feed(sample_feed(1)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_article_url_is_a_noop() {
        let (repo, _dir) = test_repo().await;
        let feed = repo.insert_feed(sample_feed(1)).await.unwrap();

        assert!(repo
            .insert_article_if_new(sample_article(feed.id, 1))
            .await
            .unwrap());
        assert!(!repo
            .insert_article_if_new(sample_article(feed.id, 1))
            .await
            .unwrap());

        let articles = repo.list_articles(ArticleListQuery::default()).await.unwrap();
        assert_eq!(articles.len(), 1);
    }

    #[tokio::test]
    async fn workspace_append_assigns_dense_orders() {
        let (repo, _dir) = test_repo().await;
        let feed = repo.insert_feed(sample_feed(1)).await.unwrap();
        repo.insert_article_if_new(sample_article(feed.id, 1))
            .await
            .unwrap();
        repo.insert_article_if_new(sample_article(feed.id, 2))
            .await
            .unwrap();
        let articles = repo.recent_unarchived(10).await.unwrap();

        let first = repo
            .add_to_workspace(articles[1].id)
            .await
            .unwrap()
            .unwrap();
        let second = repo
            .add_to_workspace(articles[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.sort_order, 0);
        assert_eq!(second.sort_order, 1);
    }

    #[tokio::test]
    async fn duplicate_workspace_add_is_a_conflict() {
        let (repo, _dir) = test_repo().await;
        let feed = repo.insert_feed(sample_feed(1)).await.unwrap();
        repo.insert_article_if_new(sample_article(feed.id, 1))
            .await
            .unwrap();
        let article = &repo.recent_unarchived(1).await.unwrap()[0];

        repo.add_to_workspace(article.id).await.unwrap().unwrap();
        let err = repo.add_to_workspace(article.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn workspace_add_of_missing_article_is_none() {
        let (repo, _dir) = test_repo().await;
        assert!(repo.add_to_workspace(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reorder_swaps_orders() {
        let (repo, _dir) = test_repo().await;
        let feed = repo.insert_feed(sample_feed(1)).await.unwrap();
        repo.insert_article_if_new(sample_article(feed.id, 1))
            .await
            .unwrap();
        repo.insert_article_if_new(sample_article(feed.id, 2))
            .await
            .unwrap();
        let articles = repo.recent_unarchived(10).await.unwrap();
        let a = repo
            .add_to_workspace(articles[1].id)
            .await
            .unwrap()
            .unwrap();
        let b = repo
            .add_to_workspace(articles[0].id)
            .await
            .unwrap()
            .unwrap();

        repo.reorder_workspace(vec![b.id, a.id]).await.unwrap();

        let a = repo.get_workspace_item(a.id).await.unwrap().unwrap();
        let b = repo.get_workspace_item(b.id).await.unwrap().unwrap();
        assert_eq!(a.sort_order, 1);
        assert_eq!(b.sort_order, 0);
    }

    #[tokio::test]
    async fn partial_update_sets_edited_and_keeps_other_field() {
        let (repo, _dir) = test_repo().await;
        let feed = repo.insert_feed(sample_feed(1)).await.unwrap();
        repo.insert_article_if_new(sample_article(feed.id, 1))
            .await
            .unwrap();
        let article = &repo.recent_unarchived(1).await.unwrap()[0];
        let item = repo.add_to_workspace(article.id).await.unwrap().unwrap();

        let item = repo
            .update_workspace_item(
                item.id,
                WorkspaceItemPatch {
                    custom_content: Some("rewritten".to_string()),
                    custom_analysis: None,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(item.is_edited);
        assert_eq!(item.custom_content.as_deref(), Some("rewritten"));

        let item = repo
            .update_workspace_item(
                item.id,
                WorkspaceItemPatch {
                    custom_content: None,
                    custom_analysis: Some("x".to_string()),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.custom_analysis.as_deref(), Some("x"));
        assert_eq!(item.custom_content.as_deref(), Some("rewritten"));
    }

    #[tokio::test]
    async fn trim_keeps_most_recently_published() {
        let (repo, _dir) = test_repo().await;
        let feed = repo.insert_feed(sample_feed(1)).await.unwrap();
        for n in 1..=5 {
            repo.insert_article_if_new(sample_article(feed.id, n))
                .await
                .unwrap();
        }

        let removed = repo.trim_feed_articles(feed.id, 3).await.unwrap();
        assert_eq!(removed, 2);

        let remaining = repo.recent_unarchived(10).await.unwrap();
        assert_eq!(remaining.len(), 3);
        // Articles 1 and 2 were published earliest and should be gone.
        assert!(remaining.iter().all(|a| a.title != "Article 1"));
        assert!(remaining.iter().all(|a| a.title != "Article 2"));
    }

    #[tokio::test]
    async fn article_delete_cascades_to_workspace_and_report_items() {
        let (repo, _dir) = test_repo().await;
        let feed = repo.insert_feed(sample_feed(1)).await.unwrap();
        repo.insert_article_if_new(sample_article(feed.id, 1))
            .await
            .unwrap();
        repo.insert_article_if_new(sample_article(feed.id, 2))
            .await
            .unwrap();
        let articles = repo.recent_unarchived(10).await.unwrap();
        for article in &articles {
            repo.add_to_workspace(article.id).await.unwrap().unwrap();
        }
        let report = repo
            .create_report(NewReport {
                title: "Snapshot".to_string(),
                description: None,
                status: ReportStatus::Draft,
                copy_workspace: true,
            })
            .await
            .unwrap();
        assert_eq!(repo.list_report_items(report.id).await.unwrap().len(), 2);

        // Trimming to one article deletes the older one; the cascade must
        // take its workspace item and report item with it.
        repo.trim_feed_articles(feed.id, 1).await.unwrap();

        assert_eq!(repo.list_workspace().await.unwrap().len(), 1);
        assert_eq!(repo.list_report_items(report.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn report_snapshot_freezes_current_workspace_order() {
        let (repo, _dir) = test_repo().await;
        let feed = repo.insert_feed(sample_feed(1)).await.unwrap();
        repo.insert_article_if_new(sample_article(feed.id, 1))
            .await
            .unwrap();
        repo.insert_article_if_new(sample_article(feed.id, 2))
            .await
            .unwrap();
        let articles = repo.recent_unarchived(10).await.unwrap();
        let a = repo
            .add_to_workspace(articles[1].id)
            .await
            .unwrap()
            .unwrap();
        let b = repo
            .add_to_workspace(articles[0].id)
            .await
            .unwrap()
            .unwrap();
        repo.reorder_workspace(vec![b.id, a.id]).await.unwrap();

        let report = repo
            .create_report(NewReport {
                title: "Weekly".to_string(),
                description: None,
                status: ReportStatus::Draft,
                copy_workspace: true,
            })
            .await
            .unwrap();

        let items = repo.list_report_items(report.id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, 0);
        assert_eq!(items[0].1.id, b.id);
        assert_eq!(items[1].1.id, a.id);
    }

    #[tokio::test]
    async fn settings_default_patch_and_reset() {
        let (repo, _dir) = test_repo().await;

        let settings = repo.get_settings().await.unwrap();
        assert_eq!(settings.max_articles_per_feed, 50);
        assert_eq!(settings.ai_max_tokens, 1024);

        let settings = repo
            .patch_settings(SettingsPatch {
                max_articles_per_feed: Some(10),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(settings.max_articles_per_feed, 10);
        assert_eq!(repo.max_articles_per_feed().await, 10);

        let settings = repo.reset_settings().await.unwrap();
        assert_eq!(settings.max_articles_per_feed, 50);
        assert_eq!(repo.max_articles_per_feed().await, 50);
    }

    #[tokio::test]
    async fn list_articles_honors_status_filter() {
        let (repo, _dir) = test_repo().await;
        let feed = repo.insert_feed(sample_feed(1)).await.unwrap();
        repo.insert_article_if_new(sample_article(feed.id, 1))
            .await
            .unwrap();
        repo.insert_article_if_new(sample_article(feed.id, 2))
            .await
            .unwrap();
        let articles = repo.recent_unarchived(10).await.unwrap();
        repo.update_article(
            articles[0].id,
            ArticlePatch {
                is_read: Some(true),
                is_archived: None,
            },
        )
        .await
        .unwrap();
        repo.update_article(
            articles[1].id,
            ArticlePatch {
                is_read: None,
                is_archived: Some(true),
            },
        )
        .await
        .unwrap();

        let unread = repo
            .list_articles(ArticleListQuery {
                status: Some("unread".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(unread.is_empty());

        let read = repo
            .list_articles(ArticleListQuery {
                status: Some("read".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(read.len(), 1);

        let archived = repo
            .list_articles(ArticleListQuery {
                status: Some("archived".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(archived.len(), 1);

        let err = repo
            .list_articles(ArticleListQuery {
                status: Some("starred".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn embedding_upsert_and_stats() {
        let (repo, _dir) = test_repo().await;
        let feed = repo.insert_feed(sample_feed(1)).await.unwrap();
        repo.insert_article_if_new(sample_article(feed.id, 1))
            .await
            .unwrap();
        repo.insert_article_if_new(sample_article(feed.id, 2))
            .await
            .unwrap();
        let articles = repo.recent_unarchived(10).await.unwrap();

        let missing = repo.articles_missing_embeddings(10).await.unwrap();
        assert_eq!(missing.len(), 2);

        repo.upsert_embedding(articles[0].id, vec![0, 0, 128, 63], "test-model".to_string())
            .await
            .unwrap();

        let stats = repo.embedding_stats().await.unwrap();
        assert_eq!(stats.total_articles, 2);
        assert_eq!(stats.with_embeddings, 1);
        assert_eq!(repo.articles_missing_embeddings(10).await.unwrap().len(), 1);
        assert_eq!(repo.embedding_candidates().await.unwrap().len(), 1);
    }
}
