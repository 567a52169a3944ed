// CLI commands for running bundles locally
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use std::time::Instant;
use vexor_common::config::AppConfig;
use vexor_common::types::TestRequest;
use vexor_sandbox::bindings::{detect_declarations, resolve_bindings};
use vexor_sandbox::{summarize, Bundle, Sandbox};

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            let mut config = AppConfig::from_file(path)?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            config.validate()?;
            Ok(config)
        }
        None => AppConfig::load(),
    }
}

/// Build the request the sandbox will run
fn build_request(
    config: &AppConfig,
    code: String,
    tests: String,
    function: &str,
    timeout_ms: Option<u64>,
    memory_mb: Option<u32>,
) -> TestRequest {
    let mut request = TestRequest::with_defaults(code, tests, function, &config.sandbox);
    if let Some(timeout_ms) = timeout_ms {
        request.timeout_ms = timeout_ms;
    }
    if let Some(memory_mb) = memory_mb {
        request.memory_limit_mb = memory_mb;
    }
    request
}

/// Run tests and print a report; returns whether every test passed
pub async fn run_tests(
    code: &Path,
    tests: &Path,
    function: &str,
    timeout_ms: Option<u64>,
    memory_mb: Option<u32>,
    json: bool,
) -> Result<bool> {
    let config = load_config(None)?;
    let request = build_request(
        &config,
        read_source(code)?,
        read_source(tests)?,
        function,
        timeout_ms,
        memory_mb,
    );

    if !json {
        println!(
            "🚀 Running {} against {} (timeout {}ms, memory {}MB)",
            tests.display(),
            code.display(),
            request.timeout_ms,
            request.memory_limit_mb
        );
    }

    let sandbox = Sandbox::new(config.sandbox);
    let started = Instant::now();
    let result = match sandbox.execute(request).await {
        Ok(result) => result,
        Err(e) => bail!("[{}] {}", e.kind().code(), e.user_message()),
    };

    if json {
        let rendered = serde_json::to_string_pretty(&result)
            .context("Failed to serialize execution result")?;
        println!("{}", rendered);
    } else {
        let summary = summarize(&result, started.elapsed());
        println!("{}", summary.output);
        println!("Score: {}%", summary.score);
    }

    Ok(result.all_passed())
}

/// Print the bundled script for inspection
pub fn print_bundle(code: &Path, tests: Option<&Path>, function: &str) -> Result<()> {
    let user_code = read_source(code)?;
    let test_code = match tests {
        Some(path) => read_source(path)?,
        None => String::new(),
    };

    let bundle = Bundle::build(&user_code, &test_code, function)?;
    println!("{}", bundle.source());
    Ok(())
}

/// Validate configuration and report detected bindings
pub fn check(config_path: Option<&Path>, code: Option<&Path>, function: &str) -> Result<()> {
    let config = load_config(config_path).context("Configuration is invalid")?;
    let sandbox = &config.sandbox;

    println!("✅ Configuration is valid");
    println!(
        "   sandbox: timeout {}ms (max {}ms), memory {}MB (max {}MB), {} concurrent runs",
        sandbox.timeout_ms,
        sandbox.max_timeout_ms,
        sandbox.memory_limit_mb,
        sandbox.max_memory_limit_mb,
        sandbox.max_concurrent_runs
    );
    println!(
        "   llm: {} ({}), api key {}",
        config.llm.provider,
        config.llm.model(),
        if config.llm.api_key.is_some() { "set" } else { "missing" }
    );
    println!(
        "   server: {}:{}",
        config.server.host, config.server.port
    );

    if let Some(code) = code {
        let user_code = read_source(code)?;
        let declared = detect_declarations(&user_code);
        println!("   declarations in {}: {}", code.display(), declared.join(", "));

        let bindings = resolve_bindings(&user_code, function)?;
        println!("   target: {}", bindings.target());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn source_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_build_request_overrides() {
        let config = AppConfig::default();
        let request = build_request(&config, "code".into(), "tests".into(), "f", Some(250), None);
        assert_eq!(request.timeout_ms, 250);
        assert_eq!(request.memory_limit_mb, config.sandbox.memory_limit_mb);
        assert_eq!(request.target_function_name, "f");
    }

    #[test]
    fn test_print_bundle_rejects_unknown_target() {
        let code = source_file("function add(a, b) { return a + b; }");
        assert!(print_bundle(code.path(), None, "add").is_ok());

        let err = print_bundle(code.path(), None, "missing").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_check_with_explicit_config() {
        let config = source_file(r#"{ "sandbox": { "timeout_ms": 5000 } }"#);
        let code = source_file("const double = (x) => x * 2;");
        assert!(check(Some(config.path()), Some(code.path()), "").is_ok());

        let bad = source_file(r#"{ "sandbox": { "timeout_ms": 0 } }"#);
        assert!(check(Some(bad.path()), None, "").is_err());
    }

    #[tokio::test]
    async fn test_run_tests_reports_failures() {
        let code = source_file("function add(a, b) { return a + b; }");
        let passing = source_file("test('adds', () => { expect(add(1, 2)).toBe(3); });");
        let failing = source_file("test('fails', () => { expect(add(1, 1)).toBe(3); });");

        assert!(run_tests(code.path(), passing.path(), "add", Some(2_000), Some(32), true)
            .await
            .unwrap());
        assert!(!run_tests(code.path(), failing.path(), "add", Some(2_000), Some(32), true)
            .await
            .unwrap());
    }
}
