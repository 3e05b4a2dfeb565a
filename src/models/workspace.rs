use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Article;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceItem {
    pub id: i64,
    pub article_id: i64,
    #[serde(rename = "order")]
    pub sort_order: i64,
    pub custom_content: Option<String>,
    pub custom_analysis: Option<String>,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A workspace item joined with its article, as served to clients.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceEntry {
    #[serde(flatten)]
    pub item: WorkspaceItem,
    pub article: Article,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkspaceItem {
    pub article_id: i64,
}

/// Partial update; an omitted field means "no change", not "clear".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceItemPatch {
    pub custom_content: Option<String>,
    pub custom_analysis: Option<String>,
}

impl WorkspaceItemPatch {
    pub fn is_empty(&self) -> bool {
        self.custom_content.is_none() && self.custom_analysis.is_none()
    }
}
