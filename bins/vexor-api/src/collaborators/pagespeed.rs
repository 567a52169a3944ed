// PageSpeed Insights v5 client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vexor_common::config::PageSpeedConfig;

use super::llm::http_client;
use super::{read_success, CollaboratorError, PageSpeedAuditor};

/// Lighthouse category scores scaled to 0-100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSpeedScores {
    pub performance: u32,
    pub accessibility: u32,
    pub best_practices: u32,
    pub seo: u32,
}

pub struct PageSpeedClient {
    api_key: Option<String>,
    base_url: String,
    strategy: String,
    client: Client,
}

impl PageSpeedClient {
    pub fn new(config: &PageSpeedConfig) -> Result<Self, CollaboratorError> {
        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            strategy: config.strategy.clone(),
            client: http_client(config.request_timeout_ms)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PageSpeedResponse {
    #[serde(rename = "lighthouseResult")]
    lighthouse_result: LighthouseResult,
}

#[derive(Debug, Deserialize)]
struct LighthouseResult {
    categories: Categories,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Categories {
    performance: Option<Category>,
    accessibility: Option<Category>,
    #[serde(rename = "best-practices")]
    best_practices: Option<Category>,
    seo: Option<Category>,
}

#[derive(Debug, Deserialize)]
struct Category {
    score: Option<f64>,
}

/// Lighthouse reports 0..1 or null when a category could not be scored
fn scale(category: Option<Category>) -> u32 {
    let score = category.and_then(|c| c.score).unwrap_or(0.0);
    (score.clamp(0.0, 1.0) * 100.0).round() as u32
}

#[async_trait]
impl PageSpeedAuditor for PageSpeedClient {
    async fn audit(&self, url: &str) -> Result<PageSpeedScores, CollaboratorError> {
        let mut query: Vec<(&str, &str)> = vec![
            ("url", url),
            ("strategy", self.strategy.as_str()),
            ("category", "performance"),
            ("category", "accessibility"),
            ("category", "best-practices"),
            ("category", "seo"),
        ];
        if let Some(key) = &self.api_key {
            query.push(("key", key.as_str()));
        }

        debug!(url, strategy = %self.strategy, "Running PageSpeed audit");
        let response = self
            .client
            .get(format!("{}/runPagespeed", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|e| CollaboratorError::Request {
                service: "pagespeed",
                message: e.without_url().to_string(),
            })?;

        let parsed: PageSpeedResponse = read_success("pagespeed", response)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::Parse {
                service: "pagespeed",
                message: e.to_string(),
            })?;

        let categories = parsed.lighthouse_result.categories;
        Ok(PageSpeedScores {
            performance: scale(categories.performance),
            accessibility: scale(categories.accessibility),
            best_practices: scale(categories.best_practices),
            seo: scale(categories.seo),
        })
    }
}
