/// Sandbox Executor - High-Level Orchestration
///
/// **Responsibility:**
/// Validate a request, bundle it, run it in a fresh isolate and return the
/// checked `ExecutionResult`.
///
/// **Architecture:**
/// 1. Validation and bundling happen before any isolate exists
/// 2. A semaphore permit bounds how many isolates run at once
/// 3. The isolate runs on a blocking thread; the permit travels with it
/// 4. A host-side timeout backs up the in-isolate watchdog
/// 5. The evaluator checks the raw report (evaluator.rs)
///
/// This module is the glue layer - it knows nothing about:
/// - How JavaScript executes (engine's job)
/// - What a valid report looks like (evaluator's job)

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, instrument, warn};
use vexor_common::config::SandboxConfig;
use vexor_common::types::{ExecutionResult, TestRequest};

use crate::bundler::Bundle;
use crate::engine::{EngineLimits, IsolateTracker, IsolatedEngine};
use crate::error::SandboxError;
use crate::evaluator::parse_report;

/// Smallest memory limit a request may ask for
pub const MIN_MEMORY_LIMIT_MB: u32 = 8;

/// Extra time the host waits past the request timeout before giving up
const HOST_TIMEOUT_GRACE: Duration = Duration::from_millis(500);

/// Entry point for running generated tests against user code
#[derive(Debug, Clone)]
pub struct Sandbox {
    config: SandboxConfig,
    permits: Arc<Semaphore>,
    tracker: Arc<IsolateTracker>,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_runs.max(1)));
        Self {
            config,
            permits,
            tracker: IsolateTracker::new(),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<IsolateTracker> {
        &self.tracker
    }

    /// Free run slots right now
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run tests with the configured default limits
    #[instrument(skip(self, user_code, generated_test_code))]
    pub async fn execute_tests(
        &self,
        user_code: &str,
        generated_test_code: &str,
        target_function_name: &str,
    ) -> Result<ExecutionResult, SandboxError> {
        let request = TestRequest::with_defaults(
            user_code,
            generated_test_code,
            target_function_name,
            &self.config,
        );
        self.execute(request).await
    }

    /// Run one request in its own isolate
    ///
    /// ## Errors
    /// * `Validation` - bad limits, oversized sources, unresolvable target
    /// * `Overloaded` - no run slot freed up within `queue_timeout_ms`
    /// * `Compilation` / `Timeout` / `Runtime` class - from the isolate
    #[instrument(
        skip_all,
        fields(
            target = %request.target_function_name,
            timeout_ms = request.timeout_ms,
            memory_limit_mb = request.memory_limit_mb
        )
    )]
    pub async fn execute(&self, request: TestRequest) -> Result<ExecutionResult, SandboxError> {
        self.validate(&request)?;
        let bundle = Bundle::build(
            &request.user_code,
            &request.generated_test_code,
            &request.target_function_name,
        )?;

        let permit = self.acquire_permit().await?;

        let timeout = Duration::from_millis(request.timeout_ms);
        let limits = EngineLimits::new(request.memory_limit_mb);
        let tracker = Arc::clone(&self.tracker);
        let started = Instant::now();

        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_isolated(&bundle, limits, timeout, &tracker)
        });

        let raw = match tokio::time::timeout(timeout + HOST_TIMEOUT_GRACE, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => Err(SandboxError::Infrastructure(format!(
                "sandbox thread failed: {}",
                join_error
            ))),
            Err(_) => {
                warn!("Isolate missed its deadline; abandoning the blocking run");
                Err(SandboxError::Timeout {
                    timeout_ms: request.timeout_ms,
                })
            }
        };

        let execution_ms = started.elapsed().as_millis() as u64;
        match raw.and_then(|raw| parse_report(&raw)) {
            Ok(result) => {
                info!(
                    execution_ms,
                    total = result.total_count,
                    passed = result.passed_count,
                    failed = result.failed_count,
                    "Sandbox run completed"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(execution_ms, kind = e.kind().code(), error = %e, "Sandbox run failed");
                Err(e)
            }
        }
    }

    fn validate(&self, request: &TestRequest) -> Result<(), SandboxError> {
        let config = &self.config;

        if request.user_code.trim().is_empty() {
            return Err(SandboxError::Validation("userCode must not be empty".to_string()));
        }
        for (field, source) in [
            ("userCode", &request.user_code),
            ("generatedTestCode", &request.generated_test_code),
        ] {
            if source.len() > config.max_source_bytes {
                return Err(SandboxError::Validation(format!(
                    "{} is {} bytes; the limit is {} bytes",
                    field,
                    source.len(),
                    config.max_source_bytes
                )));
            }
        }
        if request.timeout_ms == 0 || request.timeout_ms > config.max_timeout_ms {
            return Err(SandboxError::Validation(format!(
                "timeoutMs must be between 1 and {}",
                config.max_timeout_ms
            )));
        }
        if request.memory_limit_mb < MIN_MEMORY_LIMIT_MB
            || request.memory_limit_mb > config.max_memory_limit_mb
        {
            return Err(SandboxError::Validation(format!(
                "memoryLimitMb must be between {} and {}",
                MIN_MEMORY_LIMIT_MB, config.max_memory_limit_mb
            )));
        }
        Ok(())
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, SandboxError> {
        let queue_timeout = Duration::from_millis(self.config.queue_timeout_ms);
        match tokio::time::timeout(queue_timeout, Arc::clone(&self.permits).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(SandboxError::Infrastructure(
                "sandbox run slots were closed".to_string(),
            )),
            Err(_) => Err(SandboxError::Overloaded {
                waited_ms: self.config.queue_timeout_ms,
            }),
        }
    }
}

/// Compile and run a bundle in a fresh isolate, releasing it on every path
pub fn run_isolated(
    bundle: &Bundle,
    limits: EngineLimits,
    timeout: Duration,
    tracker: &Arc<IsolateTracker>,
) -> Result<String, SandboxError> {
    let engine = IsolatedEngine::new(limits, Arc::clone(tracker))?;
    let outcome = engine
        .compile(bundle)
        .and_then(|unit| engine.run(unit, timeout));
    engine.dispose();
    outcome
}
