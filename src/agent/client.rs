//! Inference capability backed by the Ollama chat API.
//!
//! Every agent shares one [`Inference`] implementation. The Ollama client
//! sends a system + user message pair and returns the single completion.

use crate::config::ModelConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failures of the inference capability.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Cannot connect to Ollama at {0}. Is Ollama running?")]
    Connect(String),

    #[error("Ollama API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to send request: {0}")]
    Request(String),

    #[error("Failed to parse Ollama response: {0}")]
    Decode(String),

    #[error("Model returned an empty completion")]
    EmptyCompletion,
}

/// A language model that turns a system prompt and a user prompt into text.
#[async_trait]
pub trait Inference: Send + Sync {
    async fn infer(&self, system: &str, user: &str) -> Result<String, InferenceError>;
}

/// Message in the chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions<'a>,
}

/// Fixed decoding parameters.
#[derive(Debug, Serialize)]
struct OllamaOptions<'a> {
    temperature: f32,
    num_predict: usize,
    repeat_penalty: f32,
    stop: &'a [String],
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Inference over a local Ollama server.
pub struct OllamaClient {
    config: ModelConfig,
    http_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: ModelConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn request<'a>(&'a self, system: &str, user: &str) -> OllamaChatRequest<'a> {
        OllamaChatRequest {
            model: &self.config.name,
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
                repeat_penalty: self.config.repeat_penalty,
                stop: &self.config.stop,
            },
        }
    }
}

#[async_trait]
impl Inference for OllamaClient {
    async fn infer(&self, system: &str, user: &str) -> Result<String, InferenceError> {
        let url = format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'));
        let request = self.request(system, user);

        debug!("Sending chat request to {} ({} chars)", url, user.chars().count());

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout(self.config.timeout_seconds)
                } else if e.is_connect() {
                    InferenceError::Connect(self.config.ollama_url.clone())
                } else {
                    InferenceError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api { status, body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Decode(e.to_string()))?;

        let content = chat_response.message.content.trim().to_string();
        if content.is_empty() {
            return Err(InferenceError::EmptyCompletion);
        }

        Ok(content)
    }
}
