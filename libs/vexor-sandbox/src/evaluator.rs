/// Report Evaluator - Trust Boundary for Sandbox Output
///
/// **Core Responsibility:**
/// Turn the raw string an isolate returned into a checked `ExecutionResult`,
/// and turn a checked result into the score summary the frontend renders.
///
/// **Critical Properties:**
/// - Knows nothing about QuickJS or the harness internals
/// - Pure functions: (raw report) → result, (result, elapsed) → summary
/// - A report that breaks any invariant is rejected whole; partial results
///   are never trusted
///
/// **Scoring Rules:**
/// - score = passed / total × 100, rounded to one decimal place
/// - score = 0 when no tests were registered

use std::time::Duration;
use vexor_common::types::{ExecutionResult, ScoreSummary, TestStatus};

use crate::error::SandboxError;

const TRAILER_RULE: &str = "====================";

/// Parse and validate the serialized report returned by the bundle
///
/// ## Checks
/// 1. Valid JSON matching `ExecutionResult`
/// 2. `total_count` equals the number of case results
/// 3. `passed_count` and `failed_count` match the case statuses
/// 4. Every case carries an error message iff it failed
pub fn parse_report(raw: &str) -> Result<ExecutionResult, SandboxError> {
    let result: ExecutionResult = serde_json::from_str(raw)
        .map_err(|e| SandboxError::MalformedResult(format!("report is not valid JSON: {}", e)))?;

    let listed = result.case_results.len() as u32;
    if result.total_count != listed {
        return Err(SandboxError::MalformedResult(format!(
            "totalCount is {} but {} case results were reported",
            result.total_count, listed
        )));
    }

    let passed = result
        .case_results
        .iter()
        .filter(|case| case.status == TestStatus::Passed)
        .count() as u32;
    if result.passed_count != passed || result.failed_count != listed - passed {
        return Err(SandboxError::MalformedResult(format!(
            "counts {}/{} do not match case statuses {}/{}",
            result.passed_count,
            result.failed_count,
            passed,
            listed - passed
        )));
    }

    if let Some(case) = result.case_results.iter().find(|case| !case.is_consistent()) {
        return Err(SandboxError::MalformedResult(format!(
            "test '{}' has status {} with an inconsistent error message",
            case.name, case.status
        )));
    }

    Ok(result)
}

/// Percentage of passing tests, one decimal place
pub fn score(result: &ExecutionResult) -> f64 {
    if result.total_count == 0 {
        return 0.0;
    }
    let ratio = result.passed_count as f64 / result.total_count as f64;
    (ratio * 1000.0).round() / 10.0
}

/// Build the score summary with a human-readable test log
pub fn summarize(result: &ExecutionResult, elapsed: Duration) -> ScoreSummary {
    ScoreSummary {
        score: score(result),
        total_tests: result.total_count,
        passed: result.passed_count,
        failed: result.failed_count,
        output: render_output(result, elapsed),
    }
}

fn render_output(result: &ExecutionResult, elapsed: Duration) -> String {
    let mut lines = Vec::new();

    if result.case_results.is_empty() {
        lines.push("No tests were registered".to_string());
    }

    for case in &result.case_results {
        match case.status {
            TestStatus::Passed => lines.push(format!("✓ {}", case.full_name())),
            TestStatus::Failed => {
                lines.push(format!("✗ {}", case.full_name()));
                if let Some(message) = &case.error_message {
                    lines.push(format!("    {}", message));
                }
            }
        }
    }

    if !result.console_output.is_empty() {
        lines.push(String::new());
        lines.push("Console output:".to_string());
        lines.extend(result.console_output.iter().map(|line| format!("  {}", line)));
    }

    lines.push(String::new());
    lines.push(format!(
        "{} {} passed, {} failed in {:.2}s {}",
        TRAILER_RULE,
        result.passed_count,
        result.failed_count,
        elapsed.as_secs_f64(),
        TRAILER_RULE
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vexor_common::types::TestCaseResult;

    fn add_report() -> &'static str {
        r#"{
            "totalCount": 2,
            "passedCount": 1,
            "failedCount": 1,
            "caseResults": [
                {"name": "adds", "status": "Passed", "errorMessage": null},
                {"name": "fails on purpose", "status": "Failed", "errorMessage": "Expected 2 to be 3"}
            ],
            "consoleOutput": []
        }"#
    }

    #[test]
    fn test_parse_valid_report() {
        let result = parse_report(add_report()).unwrap();
        assert_eq!(result.total_count, 2);
        assert_eq!(result.case_results[1].error_message.as_deref(), Some("Expected 2 to be 3"));
    }

    #[test]
    fn test_parse_rejects_bad_json() {
        let err = parse_report("not json").unwrap_err();
        assert!(matches!(err, SandboxError::MalformedResult(_)));
    }

    #[test]
    fn test_parse_rejects_inconsistent_counts() {
        let raw = add_report().replace("\"passedCount\": 1", "\"passedCount\": 2");
        assert!(matches!(parse_report(&raw), Err(SandboxError::MalformedResult(_))));

        let raw = add_report().replace("\"totalCount\": 2", "\"totalCount\": 3");
        assert!(matches!(parse_report(&raw), Err(SandboxError::MalformedResult(_))));
    }

    #[test]
    fn test_parse_rejects_failed_case_without_message() {
        let raw = add_report().replace("\"Expected 2 to be 3\"", "null");
        let err = parse_report(&raw).unwrap_err();
        assert!(err.to_string().contains("fails on purpose"));
    }

    #[test]
    fn test_parse_accepts_missing_console_output() {
        let raw = r#"{"totalCount":0,"passedCount":0,"failedCount":0,"caseResults":[]}"#;
        let result = parse_report(raw).unwrap();
        assert!(result.console_output.is_empty());
    }

    #[test]
    fn test_score_rounding() {
        let result = ExecutionResult::from_cases(vec![
            TestCaseResult::passed("a"),
            TestCaseResult::failed("b", "x"),
            TestCaseResult::failed("c", "x"),
        ]);
        assert_eq!(score(&result), 33.3);
        assert_eq!(score(&ExecutionResult::empty()), 0.0);
    }

    #[test]
    fn test_summary_output() {
        let mut result = parse_report(add_report()).unwrap();
        result.console_output.push("debug 42".to_string());

        let summary = summarize(&result, Duration::from_millis(1234));

        assert_eq!(summary.score, 50.0);
        assert_eq!(summary.total_tests, 2);
        assert!(summary.output.contains("✓ adds"));
        assert!(summary.output.contains("✗ fails on purpose\n    Expected 2 to be 3"));
        assert!(summary.output.contains("  debug 42"));
        assert!(summary
            .output
            .ends_with("==================== 1 passed, 1 failed in 1.23s ===================="));
    }

    #[test]
    fn test_summary_uses_suite_path() {
        let result = ExecutionResult::from_cases(vec![TestCaseResult::passed("adds").in_suite("math")]);
        let summary = summarize(&result, Duration::ZERO);
        assert!(summary.output.starts_with("✓ math > adds"));
        assert_eq!(summary.score, 100.0);
    }
}
