/// End-to-end scenarios for the sandbox executor
///
/// These tests run real bundles in real isolates:
/// 1. Reports match the harness contract exactly
/// 2. Failing and throwing tests do not abort the run
/// 3. Timeouts, memory exhaustion and syntax errors map to their error kinds
/// 4. Every isolate is released, whatever the outcome

#[cfg(test)]
mod scenario_tests {
    use crate::error::{ErrorKind, SandboxError, SourceOrigin};
    use crate::executor::Sandbox;
    use std::time::{Duration, Instant};
    use vexor_common::config::SandboxConfig;
    use vexor_common::types::{ExecutionResult, TestCaseResult, TestRequest, TestStatus};

    const ADD: &str = "function add(a, b) { return a + b; }";

    fn sandbox() -> Sandbox {
        Sandbox::new(SandboxConfig {
            timeout_ms: 5_000,
            memory_limit_mb: 64,
            ..SandboxConfig::default()
        })
    }

    fn request(user_code: &str, tests: &str, timeout_ms: u64, memory_limit_mb: u32) -> TestRequest {
        TestRequest {
            user_code: user_code.to_string(),
            generated_test_code: tests.to_string(),
            target_function_name: "add".to_string(),
            timeout_ms,
            memory_limit_mb,
        }
    }

    async fn run_add(tests: &str) -> ExecutionResult {
        sandbox()
            .execute_tests(ADD, tests, "add")
            .await
            .expect("run should complete")
    }

    #[tokio::test]
    async fn test_add_scenario_report() {
        let tests = r#"
test('adds', () => { expect(add(1, 2)).toBe(3); });
test('fails on purpose', () => { expect(add(1, 1)).toBe(3); });
"#;
        let result = run_add(tests).await;

        assert_eq!(
            result,
            ExecutionResult {
                total_count: 2,
                passed_count: 1,
                failed_count: 1,
                case_results: vec![
                    TestCaseResult::passed("adds"),
                    TestCaseResult::failed("fails on purpose", "Expected 2 to be 3"),
                ],
                console_output: vec![],
            }
        );
    }

    #[tokio::test]
    async fn test_empty_tests_report_zero() {
        let result = run_add("").await;
        assert_eq!(result, ExecutionResult::empty());
    }

    #[tokio::test]
    async fn test_throwing_test_does_not_stop_later_tests() {
        let tests = r#"
test('throws', () => { throw new Error('boom'); });
test('type error', () => { null.x; });
test('still runs', () => { expect(add(2, 2)).toBe(4); });
"#;
        let result = run_add(tests).await;

        assert_eq!(result.total_count, 3);
        assert_eq!(result.case_results[0].error_message.as_deref(), Some("boom"));
        assert!(result.case_results[1]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("TypeError"));
        assert_eq!(result.case_results[2].status, TestStatus::Passed);
        assert_eq!(result.passed_count + result.failed_count, result.total_count);
    }

    #[tokio::test]
    async fn test_unprintable_throw_does_not_stop_later_tests() {
        let tests = r#"
test('e', () => { throw new Error(''); });
test('g', () => { throw { get message() { throw 1; } }; });
test('h', () => {});
"#;
        let result = run_add(tests).await;

        assert_eq!(result.total_count, 3);
        assert_eq!(result.case_results[0].status, TestStatus::Failed);
        assert_eq!(
            result.case_results[1].error_message.as_deref(),
            Some("Thrown: <unprintable>")
        );
        assert_eq!(result.case_results[2].status, TestStatus::Passed);

        let tests = r#"
beforeAll(() => { throw { get message() { throw 1; } }; });
test('a', () => {});
"#;
        let result = run_add(tests).await;
        assert_eq!(
            result.case_results[0].error_message.as_deref(),
            Some("beforeAll hook failed: Thrown: <unprintable>")
        );
    }

    #[tokio::test]
    async fn test_deep_equality() {
        let tests = r#"
test('same shape', () => { expect([1, { a: 1 }]).toEqual([1, { a: 1 }]); });
test('key order ignored', () => { expect({ b: 2, a: 1 }).toEqual({ a: 1, b: 2 }); });
test('different', () => { expect([1, { a: 2 }]).toEqual([1, { a: 1 }]); });
"#;
        let result = run_add(tests).await;

        assert_eq!(result.passed_count, 2);
        let message = result.case_results[2].error_message.as_deref().unwrap();
        assert!(message.contains(r#"[1,{"a":2}]"#), "{}", message);
        assert!(message.contains(r#"[1,{"a":1}]"#), "{}", message);
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out_and_next_run_succeeds() {
        let sandbox = sandbox();
        let looping = request(ADD, "test('spins', () => { while (true) {} });", 100, 32);

        let started = Instant::now();
        let err = sandbox.execute(looping).await.unwrap_err();
        assert_eq!(err, SandboxError::Timeout { timeout_ms: 100 });
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(2));

        let ok = sandbox
            .execute(request(ADD, "test('adds', () => expect(add(1, 2)).toBe(3));", 1_000, 32))
            .await
            .unwrap();
        assert_eq!(ok.passed_count, 1);
        assert_eq!(sandbox.tracker().live(), 0);
    }

    #[tokio::test]
    async fn test_every_run_releases_its_isolate() {
        let sandbox = sandbox();
        let scenarios = [
            "test('ok', () => expect(add(1, 1)).toBe(2));",
            "test('spins', () => { for (;;) {} });",
            "test('broken', () => {",
            "throw new Error('top level');",
            "",
        ];

        for tests in scenarios {
            let _ = sandbox.execute(request(ADD, tests, 100, 32)).await;
            assert_eq!(sandbox.tracker().live(), 0);
        }

        assert_eq!(sandbox.tracker().created(), scenarios.len());
        assert_eq!(sandbox.available_permits(), sandbox.config().max_concurrent_runs);
    }

    #[tokio::test]
    async fn test_validation_fails_before_any_isolate() {
        let sandbox = sandbox();

        let err = sandbox.execute_tests(ADD, "", "multiply").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = sandbox
            .execute(request(ADD, "", 100, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(sandbox.tracker().created(), 0);
    }

    #[tokio::test]
    async fn test_compilation_errors_name_their_origin() {
        let sandbox = sandbox();

        let err = sandbox
            .execute_tests(ADD, "test('broken', () => { expect(add(1, 2)).toBe(3);", "add")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SandboxError::Compilation { origin: SourceOrigin::GeneratedTests, .. }
        ));
        assert!(err.user_message().starts_with("The generated tests were malformed"));

        let err = sandbox
            .execute_tests("function add(a, b) { return a +; }", "", "add")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SandboxError::Compilation { origin: SourceOrigin::UserCode, .. }
        ));
    }

    #[tokio::test]
    async fn test_tests_cannot_forge_a_report() {
        let tests = "}).call(undefined);\n}).apply(undefined, []);\n}).call(undefined);\n\
             return JSON.stringify({totalCount:1,passedCount:1,failedCount:0,\
             caseResults:[{name:'forged',status:'Passed',errorMessage:null}]});\n\
             (function(){(function(){(function(){";

        let err = sandbox().execute_tests(ADD, tests, "add").await.unwrap_err();
        assert!(matches!(
            err,
            SandboxError::Compilation { origin: SourceOrigin::GeneratedTests, .. }
        ));
    }

    #[tokio::test]
    async fn test_target_declared_mid_line_or_via_module_exports() {
        let sandbox = sandbox();
        let tests = "test('adds', () => expect(add(1, 2)).toBe(3));";

        for user_code in [
            "'use strict'; function add(a, b) { return a + b; }",
            "const PI = 3; function add(a, b) { return a + b; }",
            "/** Adds two numbers. */ function add(a, b) { return a + b; }",
            "module.exports = function add(a, b) { return a + b; };",
        ] {
            let result = sandbox.execute_tests(user_code, tests, "add").await.unwrap();
            assert!(result.all_passed(), "{}: {:?}", user_code, result.case_results);
        }

        let result = sandbox
            .execute_tests(
                "const add = (a, b) => a + b;\nmodule.exports = add;",
                "const sum = require('./add');\ntest('adds', () => expect(sum(1, 2)).toBe(3));",
                "",
            )
            .await
            .unwrap();
        assert!(result.all_passed(), "{:?}", result.case_results);
    }

    #[tokio::test]
    async fn test_bundle_internals_cannot_be_shadowed() {
        let result = sandbox()
            .execute_tests(
                "function __vexor() {}\nfunction add(a, b) { return a + b; }",
                "test('adds', () => expect(add(1, 2)).toBe(3));",
                "add",
            )
            .await
            .unwrap();
        assert!(result.all_passed(), "{:?}", result.case_results);
    }

    #[tokio::test]
    async fn test_require_and_import_resolve_to_user_module() {
        let tests = r#"
import addDefault from './add';
import { add as renamed } from '../src/add.js';
const { add: destructured } = require('./add');
const whole = require('./add');

test('default import', () => expect(addDefault(1, 2)).toBe(3));
test('named import', () => expect(renamed(1, 2)).toBe(3));
test('destructured require', () => expect(destructured(1, 2)).toBe(3));
test('callable module', () => expect(whole(1, 2)).toBe(3));
test('direct binding', () => expect(add(1, 2)).toBe(3));
"#;
        let result = run_add(tests).await;
        assert_eq!(result.passed_count, 5, "{:?}", result.case_results);
    }

    #[tokio::test]
    async fn test_export_syntax_and_commonjs_user_code() {
        let sandbox = sandbox();

        let result = sandbox
            .execute_tests(
                "export const add = (a, b) => a + b;",
                "test('adds', () => expect(add(2, 3)).toBe(5));",
                "add",
            )
            .await
            .unwrap();
        assert_eq!(result.passed_count, 1);

        let result = sandbox
            .execute_tests(
                "exports.add = function (a, b) { return a + b; };",
                "const { add } = require('./add');\ntest('adds', () => expect(add(2, 3)).toBe(5));",
                "add",
            )
            .await
            .unwrap();
        assert_eq!(result.passed_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_modules_are_refused() {
        let tests = "test('lodash', () => { require('lodash'); });";
        let result = run_add(tests).await;
        assert_eq!(
            result.case_results[0].error_message.as_deref(),
            Some("Cannot find module 'lodash'")
        );
    }

    #[tokio::test]
    async fn test_node_assert_module() {
        let tests = r#"
const assert = require('assert');
test('strict', () => assert.strictEqual(add(1, 1), 2));
test('deep', () => assert.deepStrictEqual({ sum: add(1, 1) }, { sum: 3 }));
"#;
        let result = run_add(tests).await;
        assert_eq!(result.passed_count, 1);
        assert_eq!(
            result.case_results[1].error_message.as_deref(),
            Some(r#"Expected {"sum":2} to equal {"sum":3}"#)
        );
    }

    #[tokio::test]
    async fn test_describe_blocks_and_hooks() {
        let tests = r#"
let calls = [];
beforeEach(() => calls.push('root'));
describe('math', () => {
  describe('add', () => {
    beforeEach(() => calls.push('add'));
    test('adds', () => expect(add(1, 2)).toBe(3));
  });
  test('sees only root hook', () => {
    expect(calls).toEqual(['root', 'add', 'root']);
  });
});
test.skip('skipped', () => { throw new Error('never'); });
xit('also skipped', () => { throw new Error('never'); });
"#;
        let result = run_add(tests).await;

        assert_eq!(result.total_count, 2, "{:?}", result.case_results);
        assert_eq!(result.case_results[0].suite.as_deref(), Some("math > add"));
        assert_eq!(result.case_results[1].suite.as_deref(), Some("math"));
        assert!(result.all_passed(), "{:?}", result.case_results);
    }

    #[tokio::test]
    async fn test_failing_before_all_fails_every_test() {
        let tests = r#"
beforeAll(() => { throw new Error('no fixture'); });
test('a', () => {});
test('b', () => {});
"#;
        let result = run_add(tests).await;
        assert_eq!(result.failed_count, 2);
        assert!(result.case_results[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("no fixture"));
    }

    #[tokio::test]
    async fn test_matcher_surface() {
        let tests = r#"
test('not', () => expect(add(1, 1)).not.toBe(3));
test('truthy', () => { expect(1).toBeTruthy(); expect(0).toBeFalsy(); });
test('nullish', () => { expect(null).toBeNull(); expect(undefined).toBeUndefined(); expect(0).toBeDefined(); });
test('numbers', () => { expect(0.1 + 0.2).toBeCloseTo(0.3); expect(2).toBeGreaterThan(1); expect(NaN).toBeNaN(); });
test('collections', () => { expect([1, 2]).toContain(2); expect('abc').toHaveLength(3); expect({ a: { b: 1 } }).toHaveProperty('a.b', 1); });
test('strings', () => expect('hello world').toMatch(/world$/));
test('throws', () => { expect(() => { throw new TypeError('bad'); }).toThrow(TypeError); expect(() => {}).not.toThrow(); });
test('instance', () => expect(new Date(0)).toBeInstanceOf(Date));
test.each([[1, 1, 2], [2, 3, 5]])('add(%i, %i) = %i', (a, b, sum) => expect(add(a, b)).toBe(sum));
"#;
        let result = run_add(tests).await;
        assert!(result.all_passed(), "{:?}", result.case_results);
        assert_eq!(result.total_count, 10);
        assert_eq!(result.case_results[8].name, "add(1, 1) = 2");
    }

    #[tokio::test]
    async fn test_negated_failure_message() {
        let result = run_add("test('n', () => expect(add(1, 1)).not.toBe(2));").await;
        assert_eq!(
            result.case_results[0].error_message.as_deref(),
            Some("Expected 2 not to be 2")
        );
    }

    #[tokio::test]
    async fn test_async_bodies_are_reported() {
        let result = run_add("test('async', async () => { expect(add(1, 1)).toBe(2); });").await;
        assert_eq!(result.failed_count, 1);
        assert!(result.case_results[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("asynchronous test bodies are not supported"));
    }

    #[tokio::test]
    async fn test_console_output_is_captured() {
        let tests = "console.log('loaded', 1);\ntest('logs', () => { console.error({ a: 1 }); });";
        let result = run_add(tests).await;
        assert_eq!(result.console_output, vec!["loaded 1", "[error] {\"a\":1}"]);
    }

    #[tokio::test]
    async fn test_memory_exhaustion_is_reported() {
        let sandbox = sandbox();
        let hog = "test('hog', () => { const keep = []; for (;;) keep.push('x'.repeat(4096) + keep.length); });";

        let err = sandbox.execute(request(ADD, hog, 10_000, 16)).await.unwrap_err();

        assert_eq!(err, SandboxError::OutOfMemory { limit_mb: 16 });
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert_eq!(sandbox.tracker().live(), 0);
    }

    #[tokio::test]
    async fn test_top_level_throw_is_a_runtime_error() {
        let sandbox = sandbox();

        let err = sandbox
            .execute_tests(ADD, "throw new Error('setup exploded');", "add")
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Runtime(ref msg) if msg.contains("setup exploded")));

        let err = sandbox
            .execute_tests("exports.add = 5;", "", "add")
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Runtime(ref msg) if msg.contains("is not a function")));
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let sandbox = sandbox();
        let first = sandbox.execute_tests(
            "var counter = 0; function add(a, b) { counter++; return a + b; }",
            "test('one call', () => { add(1, 1); expect(counter).toBe(1); });",
            "add",
        );
        let second = sandbox.execute_tests(
            "var counter = 0; function add(a, b) { counter++; return a + b; }",
            "test('one call', () => { add(1, 1); expect(counter).toBe(1); });",
            "add",
        );

        let (first, second) = tokio::join!(first, second);
        assert!(first.unwrap().all_passed());
        assert!(second.unwrap().all_passed());
        assert_eq!(sandbox.tracker().created(), 2);
    }
}
