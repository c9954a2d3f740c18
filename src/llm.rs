//! Generative-model service: chat completions over an OpenAI-compatible API.
//!
//! The assistant talks to two models (a primary and a lighter fallback)
//! through the [`ChatModel`] trait. [`OpenAiCompatibleChat`] is the HTTP
//! implementation; Groq, OpenAI and most self-hosted gateways accept the
//! same `POST /chat/completions` shape.
//!
//! Credentials are resolved per call, so a missing key surfaces as an
//! [`LlmError::MissingApiKey`] the fallback controller can act on instead
//! of a startup failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

/// Errors from chat-completion calls.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key not found: set {env_var} or configure llm.api_key_file")]
    MissingApiKey { env_var: String },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("model returned an empty reply")]
    EmptyReply,
}

/// A chat model answering one (system, user) exchange.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the assistant's reply. Never `Ok` with blank text.
    async fn chat(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Where the API key comes from: an environment variable first, then a file.
#[derive(Debug, Clone)]
pub struct ApiKeySource {
    pub env_var: String,
    pub file: Option<PathBuf>,
}

impl ApiKeySource {
    pub fn resolve(&self) -> Result<String, LlmError> {
        if let Ok(key) = std::env::var(&self.env_var) {
            let key = key.trim();
            if !key.is_empty() {
                return Ok(key.to_string());
            }
        }
        if let Some(ref path) = self.file {
            if let Ok(contents) = std::fs::read_to_string(path) {
                let key = contents.trim();
                if !key.is_empty() {
                    return Ok(key.to_string());
                }
            }
        }
        Err(LlmError::MissingApiKey {
            env_var: self.env_var.clone(),
        })
    }
}

/// Chat model reached through `POST {base_url}/chat/completions`.
pub struct OpenAiCompatibleChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    key: ApiKeySource,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl OpenAiCompatibleChat {
    pub fn new(config: &LlmConfig, model: &str) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Network {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            key: ApiKeySource {
                env_var: config.api_key_env.clone(),
                file: config.api_key_file.clone(),
            },
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let api_key = self.key.resolve()?;
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| LlmError::Parse {
            message: e.to_string(),
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::EmptyReply);
        }
        Ok(text.trim().to_string())
    }
}

/// Build the (primary, fallback) chat models from configuration.
pub fn create_chat_models(
    config: &LlmConfig,
) -> Result<(Arc<dyn ChatModel>, Arc<dyn ChatModel>), LlmError> {
    let primary = OpenAiCompatibleChat::new(config, &config.primary_model)?;
    let fallback = OpenAiCompatibleChat::new(config, &config.fallback_model)?;
    Ok((Arc::new(primary), Arc::new(fallback)))
}
