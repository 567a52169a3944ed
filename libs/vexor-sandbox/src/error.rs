//! Error taxonomy for a sandboxed run.
//!
//! Every variant is fatal for the request and none is retried: sandbox
//! failures are deterministic for the same inputs. Assertion failures are
//! not errors at all; they travel as `TestStatus::Failed` data.

use std::fmt;
use thiserror::Error;

/// Which piece of the bundle failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    UserCode,
    GeneratedTests,
    Bundle,
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOrigin::UserCode => write!(f, "user code"),
            SourceOrigin::GeneratedTests => write!(f, "generated tests"),
            SourceOrigin::Bundle => write!(f, "test bundle"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{origin} failed to compile: {message}")]
    Compilation { origin: SourceOrigin, message: String },
    #[error("execution timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("uncaught error in sandbox: {0}")]
    Runtime(String),
    #[error("sandbox exceeded its {limit_mb}MB memory limit")]
    OutOfMemory { limit_mb: u32 },
    #[error("malformed result from sandbox: {0}")]
    MalformedResult(String),
    #[error("sandbox infrastructure failure: {0}")]
    Infrastructure(String),
    #[error("sandbox is at capacity; no slot freed up within {waited_ms}ms")]
    Overloaded { waited_ms: u64 },
}

/// Coarse classification the API layer maps to user-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Compilation,
    Timeout,
    Runtime,
    Overloaded,
}

impl ErrorKind {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Compilation => "compilation_error",
            ErrorKind::Timeout => "execution_timeout",
            ErrorKind::Runtime => "runtime_error",
            ErrorKind::Overloaded => "overloaded",
        }
    }
}

impl SandboxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SandboxError::Validation(_) => ErrorKind::Validation,
            SandboxError::Compilation { .. } => ErrorKind::Compilation,
            SandboxError::Timeout { .. } => ErrorKind::Timeout,
            SandboxError::Runtime(_)
            | SandboxError::OutOfMemory { .. }
            | SandboxError::MalformedResult(_)
            | SandboxError::Infrastructure(_) => ErrorKind::Runtime,
            SandboxError::Overloaded { .. } => ErrorKind::Overloaded,
        }
    }

    /// Message safe to show to the person who submitted the code
    pub fn user_message(&self) -> String {
        match self {
            SandboxError::Validation(msg) => msg.clone(),
            SandboxError::Compilation {
                origin: SourceOrigin::GeneratedTests,
                message,
            } => format!("The generated tests were malformed: {}", message),
            SandboxError::Compilation { origin, message } => {
                format!("Compilation failed in {}: {}", origin, message)
            }
            SandboxError::Timeout { timeout_ms } => {
                format!("Execution timed out after {}ms", timeout_ms)
            }
            SandboxError::OutOfMemory { limit_mb } => {
                format!("Execution ran out of memory (limit {}MB)", limit_mb)
            }
            SandboxError::Runtime(msg) => format!("The test run crashed: {}", msg),
            SandboxError::MalformedResult(_) | SandboxError::Infrastructure(_) => {
                "The sandbox failed to produce a result".to_string()
            }
            SandboxError::Overloaded { .. } => {
                "The sandbox is busy, please retry shortly".to_string()
            }
        }
    }
}
