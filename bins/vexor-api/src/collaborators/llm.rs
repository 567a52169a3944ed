// LLM provider clients: Gemini generateContent and Cerebras chat completions

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vexor_common::config::{LlmConfig, LlmProvider};

use super::{read_success, CollaboratorError, LlmClient};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const CEREBRAS_BASE_URL: &str = "https://api.cerebras.ai";
const TEMPERATURE: f32 = 0.2;
const MAX_OUTPUT_TOKENS: u32 = 4096;

/// Pick the client for the configured provider
///
/// Without an API key the server still starts; LLM-backed routes then fail
/// with an upstream error naming the missing variable.
pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, CollaboratorError> {
    let Some(api_key) = config.api_key.clone() else {
        warn!(provider = %config.provider, "No LLM API key configured; /assert and /analyze are disabled");
        return Ok(Arc::new(UnconfiguredLlm {
            provider: config.provider,
        }));
    };

    let http = http_client(config.request_timeout_ms)?;
    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::Gemini => Arc::new(GeminiClient {
            api_key,
            model: config.model().to_string(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            client: http,
        }),
        LlmProvider::Cerebras => Arc::new(CerebrasClient {
            api_key,
            model: config.model().to_string(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| CEREBRAS_BASE_URL.to_string()),
            client: http,
        }),
    };
    Ok(client)
}

pub(crate) fn http_client(timeout_ms: u64) -> Result<Client, CollaboratorError> {
    Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| CollaboratorError::Request {
            service: "http",
            message: e.to_string(),
        })
}

/// Stand-in used when no API key is available
struct UnconfiguredLlm {
    provider: LlmProvider,
}

#[async_trait]
impl LlmClient for UnconfiguredLlm {
    async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
        let variable = match self.provider {
            LlmProvider::Gemini => "GEMINI_API_KEY",
            LlmProvider::Cerebras => "CEREBRAS_API_KEY",
        };
        Err(CollaboratorError::NotConfigured {
            service: self.name(),
            hint: format!("set {} or LLM_API_KEY", variable),
        })
    }

    fn name(&self) -> &'static str {
        match self.provider {
            LlmProvider::Gemini => "gemini",
            LlmProvider::Cerebras => "cerebras",
        }
    }
}

// ---- Gemini ----

pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPartOut<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPartOut<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPartIn>,
}

#[derive(Debug, Deserialize)]
struct GeminiPartIn {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPartOut { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        debug!(model = %self.model, prompt_chars = prompt.len(), "Calling Gemini");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| CollaboratorError::Request {
                service: "gemini",
                message: e.without_url().to_string(),
            })?;

        let parsed: GeminiResponse = read_success("gemini", response)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::Parse {
                service: "gemini",
                message: e.to_string(),
            })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CollaboratorError::EmptyReply { service: "gemini" });
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// ---- Cerebras (OpenAI-compatible) ----

pub struct CerebrasClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageOut<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessageOut<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageIn,
}

#[derive(Debug, Deserialize)]
struct ChatMessageIn {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmClient for CerebrasClient {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessageOut {
                role: "user",
                content: prompt,
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_OUTPUT_TOKENS,
        };

        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(model = %self.model, prompt_chars = prompt.len(), "Calling Cerebras");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CollaboratorError::Request {
                service: "cerebras",
                message: e.to_string(),
            })?;

        let parsed: ChatResponse = read_success("cerebras", response)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::Parse {
                service: "cerebras",
                message: e.to_string(),
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(CollaboratorError::EmptyReply { service: "cerebras" })
    }

    fn name(&self) -> &'static str {
        "cerebras"
    }
}
