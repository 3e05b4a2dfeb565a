use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::keys;
use crate::models::settings::{DEFAULT_MAX_TOKENS, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE};
use crate::text::{char_prefix, truncate_at_boundary};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_MODEL: &str = "claude-3-5-haiku-20241022";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const SUMMARIZE_INPUT_CHARS: usize = 2000;
const EMBED_INPUT_CHARS: usize = 1000;
const PREVIEW_CHARS: usize = 120;

const TEST_TEXT: &str =
    "Reply with one short sentence confirming that you can read this message.";

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<Message>,
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
}

pub struct AiClient {
    client: Client,
    anthropic_api_key: Option<String>,
    embeddings_api_url: String,
    embeddings_api_key: Option<String>,
    embeddings_model: String,
}

impl AiClient {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            anthropic_api_key: config.anthropic_api_key.clone(),
            embeddings_api_url: config.embeddings_api_url.clone(),
            embeddings_api_key: config.embeddings_api_key.clone(),
            embeddings_model: config.embeddings_model.clone(),
        }
    }

    pub fn embeddings_model(&self) -> &str {
        &self.embeddings_model
    }

    /// Summarizes a text with one completion call. System prompt, max tokens
    /// and temperature come from the settings store on every call, falling
    /// back to defaults when unset or unreadable.
    pub async fn summarize_text(&self, repo: &Repository, text: &str) -> Result<String> {
        let api_key = self
            .anthropic_api_key
            .as_ref()
            .ok_or_else(|| AppError::Config("anthropic_api_key is not set".to_string()))?;

        let system_prompt = repo
            .get_setting(keys::AI_SYSTEM_PROMPT)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let max_tokens = repo
            .get_setting(keys::AI_MAX_TOKENS)
            .await
            .ok()
            .flatten()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);
        let temperature = repo
            .get_setting(keys::AI_TEMPERATURE)
            .await
            .ok()
            .flatten()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TEMPERATURE);

        let input = truncate_at_boundary(text, SUMMARIZE_INPUT_CHARS);

        let request = MessageRequest {
            model: ANTHROPIC_MODEL.to_string(),
            max_tokens,
            temperature,
            messages: vec![Message {
                role: "user".to_string(),
                content: input,
            }],
            system: Some(system_prompt),
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AppError::AiApi(format!("API error: {}", error_text)));
        }

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|_| AppError::AiApi("unexpected completion response shape".to_string()))?;

        let summary = message
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        if summary.is_empty() {
            return Err(AppError::AiApi("completion returned no text".to_string()));
        }
        Ok(summary)
    }

    /// Embeds a text with one call against an OpenAI-compatible endpoint.
    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let api_key = self
            .embeddings_api_key
            .as_ref()
            .ok_or_else(|| AppError::Config("embeddings_api_key is not set".to_string()))?;

        let input = truncate_at_boundary(text, EMBED_INPUT_CHARS);

        let request = EmbeddingsRequest {
            model: self.embeddings_model.clone(),
            input: vec![input],
        };

        let response = self
            .client
            .post(&self.embeddings_api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AppError::AiApi(format!("API error: {}", error_text)));
        }

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|_| AppError::AiApi("unexpected embeddings response shape".to_string()))?;

        body.data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| AppError::AiApi("embeddings response was empty".to_string()))
    }

    /// One live summarization round-trip against a fixed input, reported
    /// with a truncated preview of the reply.
    pub async fn test_connection(&self, repo: &Repository) -> ConnectionTest {
        match self.summarize_text(repo, TEST_TEXT).await {
            Ok(reply) => ConnectionTest {
                success: true,
                message: format!("AI responded: {}", char_prefix(&reply, PREVIEW_CHARS)),
            },
            Err(e) => ConnectionTest {
                success: false,
                message: e.to_string(),
            },
        }
    }
}
