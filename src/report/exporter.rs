use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{Article, WorkspaceItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Html,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "html" => Ok(ExportFormat::Html),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(AppError::validation(format!(
                "unsupported export format: {other}"
            ))),
        }
    }
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Html => "text/html; charset=utf-8",
            ExportFormat::Csv => "text/csv",
        }
    }
}

/// Header fields of an export; workspace exports use a synthetic one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMeta {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub exported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportItem {
    pub order: i64,
    pub title: String,
    pub category: Option<String>,
    pub published_at: DateTime<Utc>,
    pub url: String,
    pub content: String,
    pub analysis: Option<String>,
}

impl ExportItem {
    /// Display content prefers the curator's override over the article body;
    /// ordering comes from the caller.
    pub fn from_entry(order: i64, item: &WorkspaceItem, article: &Article) -> Self {
        Self {
            order,
            title: article.title.clone(),
            category: article.category.clone(),
            published_at: article.published_at,
            url: article.url.clone(),
            content: item
                .custom_content
                .clone()
                .unwrap_or_else(|| article.content.clone()),
            analysis: item.custom_analysis.clone(),
        }
    }
}

pub fn render(meta: &ExportMeta, items: &[ExportItem], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => render_json(meta, items),
        ExportFormat::Html => Ok(render_html(meta, items)),
        ExportFormat::Csv => Ok(render_csv(items)),
    }
}

fn render_json(meta: &ExportMeta, items: &[ExportItem]) -> Result<String> {
    #[derive(Serialize)]
    struct Export<'a> {
        #[serde(flatten)]
        meta: &'a ExportMeta,
        items: &'a [ExportItem],
    }

    Ok(serde_json::to_string_pretty(&Export { meta, items })?)
}

fn render_html(meta: &ExportMeta, items: &[ExportItem]) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(html, "<title>{}</title>", escape_html(&meta.title));
    html.push_str(
        "<style>\n\
         body { font-family: Georgia, serif; max-width: 48em; margin: 2em auto; color: #222; }\n\
         h1 { border-bottom: 2px solid #222; padding-bottom: 0.3em; }\n\
         .item { margin: 2em 0; }\n\
         .meta { color: #666; font-size: 0.85em; }\n\
         .analysis { background: #f5f5f0; padding: 0.8em 1em; margin-top: 1em; }\n\
         .analysis h3 { margin: 0 0 0.4em; font-size: 0.9em; text-transform: uppercase; }\n\
         </style>\n</head>\n<body>\n",
    );

    let _ = writeln!(html, "<h1>{}</h1>", escape_html(&meta.title));
    if let Some(description) = &meta.description {
        let _ = writeln!(html, "<p>{}</p>", escape_html(description));
    }

    for (index, item) in items.iter().enumerate() {
        html.push_str("<div class=\"item\">\n");
        let _ = writeln!(
            html,
            "<h2>{}. {}</h2>",
            index + 1,
            escape_html(&item.title)
        );
        let _ = writeln!(
            html,
            "<p class=\"meta\">{} &middot; {} &middot; <a href=\"{}\">{}</a></p>",
            escape_html(item.category.as_deref().unwrap_or("uncategorized")),
            item.published_at.format("%Y-%m-%d"),
            escape_html(&item.url),
            escape_html(&item.url),
        );
        let _ = writeln!(html, "<p>{}</p>", escape_html(&item.content));
        if let Some(analysis) = &item.analysis {
            let _ = writeln!(
                html,
                "<div class=\"analysis\">\n<h3>Analysis</h3>\n<p>{}</p>\n</div>",
                escape_html(analysis)
            );
        }
        html.push_str("</div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn render_csv(items: &[ExportItem]) -> String {
    let mut csv = String::from("Order,Title,Category,Published Date,URL,Content,Analysis\n");
    for item in items {
        let _ = writeln!(
            csv,
            "{},{},{},{},{},{},{}",
            item.order,
            csv_field(&item.title),
            csv_field(item.category.as_deref().unwrap_or("")),
            csv_field(&item.published_at.to_rfc3339()),
            csv_field(&item.url),
            csv_field(&item.content),
            csv_field(item.analysis.as_deref().unwrap_or("")),
        );
    }
    csv
}

/// Always quoted; internal quotes doubled.
fn csv_field(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Repository;
    use crate::models::{
        ArticlePatch, NewArticle, NewFeed, NewReport, ReportStatus, WorkspaceItemPatch,
    };
    use chrono::TimeZone;

    fn meta(title: &str) -> ExportMeta {
        ExportMeta {
            title: title.to_string(),
            description: None,
            status: None,
            exported_at: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
        }
    }

    fn item(order: i64, title: &str, analysis: Option<&str>) -> ExportItem {
        ExportItem {
            order,
            title: title.to_string(),
            category: Some("news".to_string()),
            published_at: Utc.with_ymd_and_hms(2026, 1, 15, 9, 30, 0).unwrap(),
            url: format!("https://example.com/{order}"),
            content: "Body text".to_string(),
            analysis: analysis.map(|a| a.to_string()),
        }
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = "pdf".parse::<ExportFormat>().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn csv_doubles_internal_quotes() {
        let items = vec![item(0, r#"He said "hi""#, None)];
        let csv = render_csv(&items);
        assert!(csv.contains(r#""He said ""hi""""#));
        assert!(csv.starts_with("Order,Title,Category,Published Date,URL,Content,Analysis\n"));
    }

    #[test]
    fn html_escapes_markup_and_omits_empty_analysis() {
        let items = vec![
            item(0, "Rust <Generics> & You", None),
            item(1, "Second", Some("Worth a follow-up")),
        ];
        let html = render_html(&meta("Weekly \"Brief\""), &items);

        assert!(html.contains("Rust &lt;Generics&gt; &amp; You"));
        assert!(html.contains("Weekly &quot;Brief&quot;"));
        assert!(html.contains("Worth a follow-up"));
        // Only the second item carries an analysis block.
        assert_eq!(html.matches("class=\"analysis\"").count(), 1);
        assert!(html.contains("<h2>1. "));
        assert!(html.contains("<h2>2. "));
    }

    #[test]
    fn json_keeps_item_order_and_custom_content() {
        let export = render(
            &meta("Brief"),
            &[item(0, "First", None), item(1, "Second", None)],
            ExportFormat::Json,
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&export).unwrap();
        assert_eq!(value["title"], "Brief");
        assert_eq!(value["items"][0]["title"], "First");
        assert_eq!(value["items"][1]["order"], 1);
    }

    // The full curation flow: ingest two articles, curate and reorder the
    // workspace, snapshot into a report, export as JSON and check the order
    // matches the post-reorder workspace rather than ingestion order.
    #[tokio::test]
    async fn curation_flow_exports_in_snapshot_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.db");
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();

        let feed = repo
            .insert_feed(NewFeed {
                name: "Wire".to_string(),
                url: "https://example.com/wire.xml".to_string(),
                category: "news".to_string(),
                is_active: true,
            })
            .await
            .unwrap();

        for (n, title) in [(1, "Alpha"), (2, "Beta")] {
            repo.insert_article_if_new(NewArticle {
                feed_id: feed.id,
                title: title.to_string(),
                content: format!("{title} body"),
                snippet: format!("{title} snippet"),
                author: None,
                published_at: Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, n).unwrap(),
                url: format!("https://example.com/wire/{n}"),
                category: Some("news".to_string()),
            })
            .await
            .unwrap();
        }

        let articles = repo.recent_unarchived(10).await.unwrap();
        let beta = articles.iter().find(|a| a.title == "Beta").unwrap();
        let alpha = articles.iter().find(|a| a.title == "Alpha").unwrap();

        let first = repo.add_to_workspace(alpha.id).await.unwrap().unwrap();
        let second = repo.add_to_workspace(beta.id).await.unwrap().unwrap();
        assert_eq!((first.sort_order, second.sort_order), (0, 1));

        // Curator override on one item.
        repo.update_workspace_item(
            second.id,
            WorkspaceItemPatch {
                custom_content: Some("Beta, rewritten".to_string()),
                custom_analysis: None,
            },
        )
        .await
        .unwrap()
        .unwrap();

        repo.reorder_workspace(vec![second.id, first.id])
            .await
            .unwrap();

        let report = repo
            .create_report(NewReport {
                title: "Morning Brief".to_string(),
                description: None,
                status: ReportStatus::Published,
                copy_workspace: true,
            })
            .await
            .unwrap();

        let entries = repo.list_report_items(report.id).await.unwrap();
        let items: Vec<ExportItem> = entries
            .iter()
            .map(|(order, item, article)| ExportItem::from_entry(*order, item, article))
            .collect();
        let export = render(
            &ExportMeta {
                title: report.title.clone(),
                description: report.description.clone(),
                status: Some(report.status.as_str().to_string()),
                exported_at: Utc::now(),
            },
            &items,
            ExportFormat::Json,
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&export).unwrap();
        assert_eq!(value["status"], "published");
        assert_eq!(value["items"][0]["title"], "Beta");
        assert_eq!(value["items"][0]["content"], "Beta, rewritten");
        assert_eq!(value["items"][1]["title"], "Alpha");

        // Archiving flags elsewhere must not disturb the snapshot.
        repo.update_article(
            alpha.id,
            ArticlePatch {
                is_read: Some(true),
                is_archived: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(repo.list_report_items(report.id).await.unwrap().len(), 2);
    }
}
