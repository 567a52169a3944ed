// Application configuration for Vexor
// Layered: serde defaults -> optional JSON file -> environment overrides
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/vexor.json";

/// Sandbox limits and admission settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub timeout_ms: u64,
    pub memory_limit_mb: u32,
    pub max_timeout_ms: u64,
    pub max_memory_limit_mb: u32,
    pub max_concurrent_runs: usize,
    pub queue_timeout_ms: u64,
    pub max_source_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            memory_limit_mb: 128,
            max_timeout_ms: 60_000,
            max_memory_limit_mb: 512,
            max_concurrent_runs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            queue_timeout_ms: 30_000,
            max_source_bytes: 1024 * 1024, // 1MB per source
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    Cerebras,
}

impl LlmProvider {
    /// Parse a provider from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<LlmProvider> {
        match s.to_lowercase().as_str() {
            "gemini" => Some(LlmProvider::Gemini),
            "cerebras" => Some(LlmProvider::Cerebras),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini-1.5-flash",
            LlmProvider::Cerebras => "llama3.1-8b",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::Gemini => write!(f, "gemini"),
            LlmProvider::Cerebras => write!(f, "cerebras"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            api_key: None,
            model: None,
            base_url: None,
            request_timeout_ms: 60_000,
        }
    }
}

impl LlmConfig {
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSpeedConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub strategy: String,
    pub request_timeout_ms: u64,
}

impl Default for PageSpeedConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://www.googleapis.com/pagespeedonline/v5".to_string(),
            strategy: "mobile".to_string(),
            request_timeout_ms: 90_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Application configuration
/// Constructed once at process start and passed by reference
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sandbox: SandboxConfig,
    pub llm: LlmConfig,
    pub pagespeed: PageSpeedConfig,
}

impl AppConfig {
    /// Load configuration from a JSON file (missing keys fall back to defaults)
    pub fn from_file(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    /// Load the full configuration stack
    ///
    /// 1. Defaults
    /// 2. JSON file from `VEXOR_CONFIG`, or config/vexor.json when present
    /// 3. Environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match env::var("VEXOR_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("PORT must be a port number, got '{}'", port))?;
        }

        if let Some(v) = parse_var(&lookup, "VEXOR_TIMEOUT_MS")? {
            self.sandbox.timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "VEXOR_MEMORY_LIMIT_MB")? {
            self.sandbox.memory_limit_mb = v;
        }
        if let Some(v) = parse_var(&lookup, "VEXOR_MAX_TIMEOUT_MS")? {
            self.sandbox.max_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "VEXOR_MAX_MEMORY_LIMIT_MB")? {
            self.sandbox.max_memory_limit_mb = v;
        }
        if let Some(v) = parse_var(&lookup, "VEXOR_MAX_CONCURRENT_RUNS")? {
            self.sandbox.max_concurrent_runs = v;
        }
        if let Some(v) = parse_var(&lookup, "VEXOR_QUEUE_TIMEOUT_MS")? {
            self.sandbox.queue_timeout_ms = v;
        }

        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.llm.provider = LlmProvider::from_str(&provider).ok_or_else(|| {
                anyhow::anyhow!("Unknown LLM_PROVIDER '{}' (expected gemini or cerebras)", provider)
            })?;
        }
        // Provider-specific key wins over the generic one
        let provider_key = match self.llm.provider {
            LlmProvider::Gemini => lookup("GEMINI_API_KEY"),
            LlmProvider::Cerebras => lookup("CEREBRAS_API_KEY"),
        };
        if let Some(key) = provider_key.or_else(|| lookup("LLM_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(base_url) = lookup("LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }

        if let Some(key) = lookup("PAGESPEED_API_KEY") {
            self.pagespeed.api_key = Some(key);
        }

        Ok(())
    }

    /// Reject configurations the sandbox cannot honour
    pub fn validate(&self) -> Result<()> {
        let sandbox = &self.sandbox;
        if sandbox.timeout_ms == 0 {
            bail!("sandbox.timeout_ms must be greater than zero");
        }
        if sandbox.timeout_ms > sandbox.max_timeout_ms {
            bail!(
                "sandbox.timeout_ms ({}) exceeds sandbox.max_timeout_ms ({})",
                sandbox.timeout_ms,
                sandbox.max_timeout_ms
            );
        }
        if sandbox.memory_limit_mb == 0 || sandbox.memory_limit_mb > sandbox.max_memory_limit_mb {
            bail!(
                "sandbox.memory_limit_mb must be between 1 and {}",
                sandbox.max_memory_limit_mb
            );
        }
        if sandbox.max_concurrent_runs == 0 {
            bail!("sandbox.max_concurrent_runs must be at least 1");
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", key, raw)),
        None => Ok(None),
    }
}
