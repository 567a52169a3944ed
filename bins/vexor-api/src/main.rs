mod collaborators;
mod error;
mod handlers;
mod metrics;
mod routes;


use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::info;
use vexor_common::config::AppConfig;
use vexor_sandbox::Sandbox;

use crate::collaborators::{build_llm_client, CodeAssistant, PageSpeedAuditor, PageSpeedClient};

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sandbox: Sandbox,
    pub assistant: CodeAssistant,
    pub auditor: Arc<dyn PageSpeedAuditor>,
    pub start_time: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Vexor API booting...");

    metrics::init_metrics();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let state = build_state(config)?;

    info!(
        provider = %state.config.llm.provider,
        model = state.config.llm.model(),
        max_concurrent_runs = state.config.sandbox.max_concurrent_runs,
        timeout_ms = state.config.sandbox.timeout_ms,
        memory_limit_mb = state.config.sandbox.memory_limit_mb,
        "Configuration loaded"
    );

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = routes::app(Arc::clone(&state));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!(
        uptime_secs = state.start_time.elapsed().as_secs(),
        "Vexor API stopped"
    );
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn build_state(config: AppConfig) -> anyhow::Result<Arc<AppState>> {
    let llm = build_llm_client(&config.llm).context("Failed to create LLM client")?;
    let assistant = CodeAssistant::new(llm).context("Failed to load prompt templates")?;
    let auditor = PageSpeedClient::new(&config.pagespeed).context("Failed to create PageSpeed client")?;

    Ok(Arc::new(AppState {
        sandbox: Sandbox::new(config.sandbox.clone()),
        assistant,
        auditor: Arc::new(auditor),
        config: Arc::new(config),
        start_time: Instant::now(),
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}
