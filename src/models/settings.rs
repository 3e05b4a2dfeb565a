use serde::{Deserialize, Serialize};

/// Keys for the flat key/value settings store.
pub mod keys {
    pub const AI_SYSTEM_PROMPT: &str = "ai_system_prompt";
    pub const AI_MAX_TOKENS: &str = "ai_max_tokens";
    pub const AI_TEMPERATURE: &str = "ai_temperature";
    pub const REFRESH_INTERVAL_MINUTES: &str = "refresh_interval_minutes";
    pub const MAX_ARTICLES_PER_FEED: &str = "max_articles_per_feed";
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes news articles. \
Provide a concise, informative summary in 2-3 paragraphs. \
Focus on the key facts, main arguments, and important conclusions. \
Use clear, accessible language.";

pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_REFRESH_INTERVAL_MINUTES: u32 = 30;
pub const DEFAULT_MAX_ARTICLES_PER_FEED: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub ai_system_prompt: String,
    pub ai_max_tokens: u32,
    pub ai_temperature: f64,
    pub refresh_interval_minutes: u32,
    pub max_articles_per_feed: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ai_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            ai_max_tokens: DEFAULT_MAX_TOKENS,
            ai_temperature: DEFAULT_TEMPERATURE,
            refresh_interval_minutes: DEFAULT_REFRESH_INTERVAL_MINUTES,
            max_articles_per_feed: DEFAULT_MAX_ARTICLES_PER_FEED,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub ai_system_prompt: Option<String>,
    pub ai_max_tokens: Option<u32>,
    pub ai_temperature: Option<f64>,
    pub refresh_interval_minutes: Option<u32>,
    pub max_articles_per_feed: Option<u32>,
}
