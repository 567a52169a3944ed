// External services the API depends on: an LLM and PageSpeed Insights.
// Handlers only see the traits; concrete clients are chosen at startup.

pub mod llm;
pub mod pagespeed;
pub mod prompts;

use async_trait::async_trait;
use thiserror::Error;

pub use llm::build_llm_client;
pub use pagespeed::{PageSpeedClient, PageSpeedScores};
pub use prompts::{AnalysisMode, CodeAssistant, Personality};

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{service} request failed: {message}")]
    Request { service: &'static str, message: String },
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} response could not be parsed: {message}")]
    Parse { service: &'static str, message: String },
    #[error("{service} returned no usable content")]
    EmptyReply { service: &'static str },
    #[error("{service} is not configured: {hint}")]
    NotConfigured { service: &'static str, hint: String },
    #[error("prompt template error: {0}")]
    Template(String),
}

impl CollaboratorError {
    pub fn service(&self) -> &'static str {
        match self {
            CollaboratorError::Request { service, .. }
            | CollaboratorError::Status { service, .. }
            | CollaboratorError::Parse { service, .. }
            | CollaboratorError::EmptyReply { service }
            | CollaboratorError::NotConfigured { service, .. } => service,
            CollaboratorError::Template(_) => "prompts",
        }
    }
}

/// Text completion from a large language model
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError>;

    /// Provider name for logs and metrics
    fn name(&self) -> &'static str;
}

/// Lighthouse category scores for a public URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageSpeedAuditor: Send + Sync {
    async fn audit(&self, url: &str) -> Result<PageSpeedScores, CollaboratorError>;
}

/// Shared reqwest error mapping for the HTTP clients
pub(crate) async fn read_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(CollaboratorError::Status {
        service,
        status: status.as_u16(),
        body: truncate(&body, 500),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}
