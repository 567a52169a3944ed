pub mod types;
pub mod config;

// Re-export commonly used types for convenience
pub use types::{ExecutionResult, ScoreSummary, TestCaseResult, TestRequest, TestStatus};
pub use config::{AppConfig, SandboxConfig};
