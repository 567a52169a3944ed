// HTTP route handlers for the Vexor API

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Instrument};
use uuid::Uuid;
use vexor_common::types::{ExecutionResult, ScoreSummary, TestCaseResult, TestRequest};
use vexor_sandbox::{summarize, SandboxError};

use crate::collaborators::{AnalysisMode, PageSpeedScores, Personality};
use crate::error::ApiError;
use crate::{metrics, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub function_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertResponse {
    pub request_id: String,
    #[serde(flatten)]
    pub summary: ScoreSummary,
    #[serde(rename = "generated_tests")]
    pub generated_tests: String,
    pub results: Vec<TestCaseResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub user_code: String,
    #[serde(default)]
    pub generated_test_code: String,
    #[serde(default)]
    pub target_function_name: String,
    pub timeout_ms: Option<u64>,
    pub memory_limit_mb: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub request_id: String,
    #[serde(flatten)]
    pub result: ExecutionResult,
    pub score: ScoreSummary,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct PageSpeedRequest {
    #[serde(default)]
    pub url: String,
}

/// GET /health - Liveness probe
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "message": "Server is running",
        })),
    )
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    metrics::set_live_isolates(state.sandbox.tracker().live());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

/// POST /assert - Generate tests with the LLM and run them against the code
pub async fn assert_code(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AssertRequest>, JsonRejection>,
) -> Result<Json<AssertResponse>, ApiError> {
    let Json(payload) = payload?;

    let code = payload.code.unwrap_or_default();
    let personality = payload.personality.unwrap_or_default();
    if code.trim().is_empty() || personality.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Code and personality are required.".to_string(),
        ));
    }
    ensure_javascript(payload.language.as_deref())?;
    let personality = Personality::from_str(&personality).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Unknown personality '{}' (expected engineer, adversary or minimalist)",
            personality
        ))
    })?;
    let function_name = payload.function_name.unwrap_or_default();

    let request_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("assert", request_id = %request_id, personality = personality.as_str());

    async move {
        let generated_tests = state
            .assistant
            .generate_tests(&code, personality, &function_name)
            .await?;
        info!(
            provider = state.assistant.provider(),
            test_chars = generated_tests.len(),
            "Generated tests"
        );

        let request = TestRequest::with_defaults(
            code,
            generated_tests.as_str(),
            function_name,
            state.sandbox.config(),
        );
        let (result, summary) = run_sandbox(&state, request).await?;

        Ok::<_, ApiError>(Json(AssertResponse {
            request_id,
            summary,
            generated_tests,
            results: result.case_results,
        }))
    }
    .instrument(span)
    .await
}

/// POST /execute - Run caller-supplied tests, no LLM involved
pub async fn execute_tests(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(payload) = payload?;
    let defaults = state.sandbox.config();

    let request = TestRequest {
        user_code: payload.user_code,
        generated_test_code: payload.generated_test_code,
        target_function_name: payload.target_function_name,
        timeout_ms: payload.timeout_ms.unwrap_or(defaults.timeout_ms),
        memory_limit_mb: payload.memory_limit_mb.unwrap_or(defaults.memory_limit_mb),
    };

    let request_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("execute", request_id = %request_id);

    async move {
        let (result, score) = run_sandbox(&state, request).await?;
        Ok::<_, ApiError>(Json(ExecuteResponse {
            request_id,
            result,
            score,
        }))
    }
    .instrument(span)
    .await
}

/// POST /analyze - Refactor or explain code with the LLM
pub async fn analyze_code(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    if payload.code.trim().is_empty() {
        return Err(ApiError::BadRequest("Code is required.".to_string()));
    }
    let mode = AnalysisMode::from_str(&payload.mode).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Unknown mode '{}' (expected refactor or explain)",
            payload.mode
        ))
    })?;

    let analysis = state.assistant.analyze(&payload.code, mode).await?;
    Ok(Json(analysis))
}

/// POST /pagespeed - Lighthouse scores for a public URL
pub async fn pagespeed(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PageSpeedRequest>, JsonRejection>,
) -> Result<Json<PageSpeedScores>, ApiError> {
    let Json(payload) = payload?;
    let url = payload.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) || url.contains(char::is_whitespace) {
        return Err(ApiError::BadRequest(
            "url must be an absolute http(s) URL".to_string(),
        ));
    }

    let scores = state.auditor.audit(url).await?;
    info!(url, performance = scores.performance, "PageSpeed audit completed");
    Ok(Json(scores))
}

fn ensure_javascript(language: Option<&str>) -> Result<(), ApiError> {
    match language.map(|l| l.trim().to_lowercase()) {
        None => Ok(()),
        Some(l) if l.is_empty() || l == "javascript" || l == "js" => Ok(()),
        Some(other) => Err(ApiError::BadRequest(format!(
            "Unsupported language '{}': only JavaScript can be executed",
            other
        ))),
    }
}

/// Execute a request and record its outcome
async fn run_sandbox(
    state: &AppState,
    request: TestRequest,
) -> Result<(ExecutionResult, ScoreSummary), SandboxError> {
    let started = Instant::now();
    let outcome = state.sandbox.execute(request).await;
    let elapsed = started.elapsed();
    let execution_ms = elapsed.as_secs_f64() * 1000.0;

    match outcome {
        Ok(result) => {
            let label = if result.all_passed() { "passed" } else { "failed" };
            metrics::record_run(label, execution_ms);
            let summary = summarize(&result, elapsed);
            info!(score = summary.score, passed = summary.passed, failed = summary.failed, "Tests evaluated");
            Ok((result, summary))
        }
        Err(e) => {
            metrics::record_run(e.kind().code(), execution_ms);
            Err(e)
        }
    }
}
