use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SandboxConfig;

/// Test Request (Immutable Input)
/// Built once per API call and consumed exactly once by the sandbox.
///
/// ## Binding Semantics:
/// - `target_function_name` must name a binding declared by `user_code`
/// - An empty name means "use the first declaration found"
/// - Unresolvable names are rejected before any isolate is created
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequest {
    pub user_code: String,
    pub generated_test_code: String,
    pub target_function_name: String,
    pub timeout_ms: u64,
    pub memory_limit_mb: u32,
}

impl TestRequest {
    /// Build a request using the configured default limits
    pub fn with_defaults(
        user_code: impl Into<String>,
        generated_test_code: impl Into<String>,
        target_function_name: impl Into<String>,
        config: &SandboxConfig,
    ) -> Self {
        Self {
            user_code: user_code.into(),
            generated_test_code: generated_test_code.into(),
            target_function_name: target_function_name.into(),
            timeout_ms: config.timeout_ms,
            memory_limit_mb: config.memory_limit_mb,
        }
    }
}

/// Per-Test Status
/// Assertion failures are data, not errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    Passed,
    Failed,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "passed"),
            TestStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Per-Test Result
/// `error_message` is present iff the test failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    pub status: TestStatus,
    pub error_message: Option<String>,
}

impl TestCaseResult {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            suite: None,
            status: TestStatus::Passed,
            error_message: None,
        }
    }

    pub fn failed(name: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            suite: None,
            status: TestStatus::Failed,
            error_message: Some(error_message.into()),
        }
    }

    pub fn in_suite(mut self, suite: impl Into<String>) -> Self {
        let suite = suite.into();
        self.suite = if suite.is_empty() { None } else { Some(suite) };
        self
    }

    /// Display name including the describe path, e.g. `math > adds`
    pub fn full_name(&self) -> String {
        match &self.suite {
            Some(suite) => format!("{} > {}", suite, self.name),
            None => self.name.clone(),
        }
    }

    /// Whether status and error message agree
    pub fn is_consistent(&self) -> bool {
        match self.status {
            TestStatus::Passed => self.error_message.is_none(),
            TestStatus::Failed => self.error_message.is_some(),
        }
    }
}

/// Execution Output
/// Produced by the sandbox for a run that completed.
///
/// ## Count Semantics:
/// - total_count: tests registered when the runner started iterating
/// - passed_count + failed_count == total_count, always
/// - case_results are in registration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub total_count: u32,
    pub passed_count: u32,
    pub failed_count: u32,
    pub case_results: Vec<TestCaseResult>,
    #[serde(default)]
    pub console_output: Vec<String>,
}

impl ExecutionResult {
    /// Derive the counts from the case list so the aggregate invariant holds
    pub fn from_cases(case_results: Vec<TestCaseResult>) -> Self {
        let passed_count = case_results
            .iter()
            .filter(|c| c.status == TestStatus::Passed)
            .count() as u32;
        let total_count = case_results.len() as u32;

        Self {
            total_count,
            passed_count,
            failed_count: total_count - passed_count,
            case_results,
            console_output: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::from_cases(Vec::new())
    }

    pub fn all_passed(&self) -> bool {
        self.failed_count == 0
    }
}

/// Score Summary
/// The shape the frontend renders for an `/assert` call.
///
/// ## Scoring Semantics:
/// - score: passed / total as a percentage, one decimal place
/// - score is 0 when no tests were registered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub score: f64,
    pub total_tests: u32,
    pub passed: u32,
    pub failed: u32,
    pub output: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TestStatus::Passed).unwrap();
        assert_eq!(json, "\"Passed\"");

        let failed: TestStatus = serde_json::from_str("\"Failed\"").unwrap();
        assert_eq!(failed, TestStatus::Failed);
    }

    #[test]
    fn test_case_result_wire_format() {
        let case = TestCaseResult::failed("fails on purpose", "Expected 2 to be 3");
        let json = serde_json::to_value(&case).unwrap();

        assert_eq!(json["name"], "fails on purpose");
        assert_eq!(json["status"], "Failed");
        assert_eq!(json["errorMessage"], "Expected 2 to be 3");
        assert!(json.get("suite").is_none());

        let passed = serde_json::to_value(TestCaseResult::passed("adds")).unwrap();
        assert!(passed["errorMessage"].is_null());
    }

    #[test]
    fn test_from_cases_keeps_counts_consistent() {
        let result = ExecutionResult::from_cases(vec![
            TestCaseResult::passed("a"),
            TestCaseResult::failed("b", "boom"),
            TestCaseResult::passed("c"),
        ]);

        assert_eq!(result.total_count, 3);
        assert_eq!(result.passed_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.passed_count + result.failed_count, result.total_count);
        assert!(!result.all_passed());
    }

    #[test]
    fn test_empty_result() {
        let result = ExecutionResult::empty();
        assert_eq!(result.total_count, 0);
        assert_eq!(result.passed_count, 0);
        assert_eq!(result.failed_count, 0);
        assert!(result.all_passed());
    }

    #[test]
    fn test_suite_and_full_name() {
        let case = TestCaseResult::passed("adds").in_suite("math > add");
        assert_eq!(case.full_name(), "math > add > adds");

        let top = TestCaseResult::passed("adds").in_suite("");
        assert_eq!(top.suite, None);
        assert_eq!(top.full_name(), "adds");
    }

    #[test]
    fn test_consistency_check() {
        let mut case = TestCaseResult::passed("x");
        assert!(case.is_consistent());
        case.status = TestStatus::Failed;
        assert!(!case.is_consistent());
    }

    #[test]
    fn test_request_camel_case_round_trip() {
        let json = r#"{
            "userCode": "function add(a,b){return a+b;}",
            "generatedTestCode": "",
            "targetFunctionName": "add",
            "timeoutMs": 100,
            "memoryLimitMb": 64
        }"#;
        let request: TestRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.target_function_name, "add");
        assert_eq!(request.timeout_ms, 100);
        assert_eq!(request.memory_limit_mb, 64);
    }

    #[test]
    fn test_request_with_defaults() {
        let config = SandboxConfig::default();
        let request = TestRequest::with_defaults("code", "tests", "fn", &config);
        assert_eq!(request.timeout_ms, 10_000);
        assert_eq!(request.memory_limit_mb, 128);
    }
}
