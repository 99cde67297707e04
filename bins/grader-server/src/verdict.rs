//! Verdict Engine - compares sandboxed runs against expected outputs.
//!
//! Knows nothing about Docker or Redis: it drives a `Sandbox`, applies
//! the mode-aware comparison rules, and folds per-case outcomes into a
//! `Verdict`. One sandbox invocation per test case, so output from one
//! case can never leak into another's capture.

use std::time::Duration;

use serde_json::Value;

use grader_common::config::Limits;
use grader_common::error::GraderError;
use grader_common::types::{
    CaseResult, ComparisonMode, ExecutionStatus, TestCase, Verdict,
};

use crate::sandbox::Sandbox;

/// Grade one submission against all test cases of a challenge.
///
/// Per-case failures (wrong output, exceptions, timeouts) are recorded
/// and evaluation continues with the next case. Two conditions abort
/// the batch: a missing entry point (reported once, as the verdict's
/// batch error) and a sandbox launch failure (an `Err` - infrastructure
/// fault, never the participant's).
pub async fn grade(
    sandbox: &dyn Sandbox,
    code: &str,
    entry_point: &str,
    test_cases: &[TestCase],
    timeout: Duration,
    limits: &Limits,
) -> Result<Verdict, GraderError> {
    if test_cases.is_empty() {
        return Err(GraderError::validation("challenge has no test cases"));
    }

    let mut cases = Vec::with_capacity(test_cases.len());
    for tc in test_cases {
        let args = tc.args();
        let run = sandbox.execute(code, entry_point, &args, timeout, limits).await;

        if run.status == ExecutionStatus::LaunchFailure {
            let detail = run.error.unwrap_or_else(|| "sandbox launch failed".into());
            return Err(GraderError::Infrastructure(detail));
        }
        if run.entry_point_missing {
            return Ok(Verdict::entry_point_missing(entry_point));
        }

        let case = match run.status {
            ExecutionStatus::Timeout => CaseResult {
                input: tc.input.clone(),
                printed: run.stdout,
                returned: run.returned,
                expected: tc.expected.clone(),
                passed: false,
                error: Some("time limit exceeded".into()),
            },
            ExecutionStatus::RuntimeError => CaseResult {
                input: tc.input.clone(),
                printed: run.stdout,
                returned: run.returned,
                expected: tc.expected.clone(),
                passed: false,
                error: Some(run.error.unwrap_or_else(|| "runtime error".into())),
            },
            ExecutionStatus::Ok => {
                let passed = case_passes(tc.mode, &run.stdout, &run.returned, &tc.expected);
                CaseResult {
                    input: tc.input.clone(),
                    printed: run.stdout,
                    returned: run.returned,
                    expected: tc.expected.clone(),
                    passed,
                    error: None,
                }
            }
            ExecutionStatus::LaunchFailure => unreachable!("handled above"),
        };
        cases.push(case);
    }

    let passed = cases.iter().all(|c| c.passed);
    Ok(Verdict {
        cases,
        passed,
        batch_error: None,
    })
}

/// Resolve `Auto` for one comparison: printed-output comparison when
/// the call returned nothing and the expectation is textual, otherwise
/// return-value comparison. Resolution happens per case, never per
/// challenge.
fn resolve_mode(mode: ComparisonMode, returned: &Option<Value>, expected: &Value) -> ComparisonMode {
    match mode {
        ComparisonMode::Auto => {
            let returned_empty = matches!(returned, None | Some(Value::Null));
            if returned_empty && expected.is_string() {
                ComparisonMode::Print
            } else {
                ComparisonMode::Return
            }
        }
        other => other,
    }
}

fn case_passes(
    mode: ComparisonMode,
    printed: &str,
    returned: &Option<Value>,
    expected: &Value,
) -> bool {
    match resolve_mode(mode, returned, expected) {
        ComparisonMode::Print => print_matches(printed, expected),
        ComparisonMode::Return => returned.as_ref() == Some(expected),
        ComparisonMode::Auto => unreachable!("resolve_mode never returns Auto"),
    }
}

/// Printed output is compared after trailing-whitespace trim on both
/// sides (a bare `print` always appends a newline); leading whitespace
/// and interior newlines stay significant.
fn print_matches(printed: &str, expected: &Value) -> bool {
    let expected_text = match expected {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    printed.trim_end() == expected_text.trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use grader_common::types::ExecutionResult;
    use serde_json::json;
    use std::sync::Mutex;

    /// Scripted sandbox: hands back one canned result per invocation.
    struct MockSandbox {
        results: Mutex<Vec<ExecutionResult>>,
        calls: Mutex<Vec<Vec<Value>>>,
    }

    impl MockSandbox {
        fn new(results: Vec<ExecutionResult>) -> Self {
            MockSandbox {
                results: Mutex::new(results),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Sandbox for MockSandbox {
        async fn execute(
            &self,
            _code: &str,
            _entry_point: &str,
            args: &[Value],
            _timeout: Duration,
            _limits: &Limits,
        ) -> ExecutionResult {
            self.calls.lock().unwrap().push(args.to_vec());
            self.results.lock().unwrap().remove(0)
        }
    }

    fn completed(printed: &str, returned: Value) -> ExecutionResult {
        ExecutionResult {
            status: ExecutionStatus::Ok,
            stdout: printed.to_string(),
            stderr: String::new(),
            returned: Some(returned),
            error: None,
            entry_point_missing: false,
        }
    }

    fn raised(error: &str) -> ExecutionResult {
        ExecutionResult {
            status: ExecutionStatus::RuntimeError,
            stdout: String::new(),
            stderr: String::new(),
            returned: None,
            error: Some(error.to_string()),
            entry_point_missing: false,
        }
    }

    fn return_case(input: Value, expected: Value) -> TestCase {
        TestCase {
            input,
            expected,
            mode: ComparisonMode::Return,
        }
    }

    async fn grade_with(sandbox: &MockSandbox, cases: &[TestCase]) -> Verdict {
        grade(
            sandbox,
            "def solve(): pass",
            "solve",
            cases,
            Duration::from_secs(3),
            &Limits::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_return_mode_pass() {
        let sandbox = MockSandbox::new(vec![completed("", json!(5))]);
        let verdict = grade_with(&sandbox, &[return_case(json!([2, 3]), json!(5))]).await;
        assert!(verdict.passed);
        assert!(verdict.cases[0].passed);
        // Array input expands to positional args.
        assert_eq!(sandbox.calls.lock().unwrap()[0], vec![json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_return_mode_mismatch() {
        let sandbox = MockSandbox::new(vec![completed("", json!(6))]);
        let verdict = grade_with(&sandbox, &[return_case(json!([2, 3]), json!(5))]).await;
        assert!(!verdict.passed);
        assert!(verdict.cases[0].error.is_none());
    }

    #[tokio::test]
    async fn test_print_mode_trailing_newline_tolerated() {
        let sandbox = MockSandbox::new(vec![completed("5\n", json!(null))]);
        let cases = [TestCase {
            input: json!([2, 3]),
            expected: json!("5"),
            mode: ComparisonMode::Print,
        }];
        let verdict = grade_with(&sandbox, &cases).await;
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn test_print_mode_interior_content_significant() {
        let sandbox = MockSandbox::new(vec![completed("a\nb\n", json!(null))]);
        let cases = [TestCase {
            input: json!(1),
            expected: json!("a b"),
            mode: ComparisonMode::Print,
        }];
        let verdict = grade_with(&sandbox, &cases).await;
        assert!(!verdict.passed);
    }

    #[tokio::test]
    async fn test_auto_resolves_to_print_when_nothing_returned() {
        // Prints "5", returns None, expected is the string "5".
        let sandbox = MockSandbox::new(vec![completed("5\n", json!(null))]);
        let cases = [TestCase {
            input: json!([2, 3]),
            expected: json!("5"),
            mode: ComparisonMode::Auto,
        }];
        let verdict = grade_with(&sandbox, &cases).await;
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn test_auto_resolves_to_return_when_value_returned() {
        let sandbox = MockSandbox::new(vec![completed("debug noise\n", json!(5))]);
        let cases = [TestCase {
            input: json!([2, 3]),
            expected: json!(5),
            mode: ComparisonMode::Auto,
        }];
        let verdict = grade_with(&sandbox, &cases).await;
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn test_auto_resolves_per_case_not_per_batch() {
        let sandbox = MockSandbox::new(vec![
            completed("hi\n", json!(null)), // -> Print
            completed("", json!(7)),        // -> Return
        ]);
        let cases = [
            TestCase {
                input: json!(1),
                expected: json!("hi"),
                mode: ComparisonMode::Auto,
            },
            TestCase {
                input: json!(2),
                expected: json!(7),
                mode: ComparisonMode::Auto,
            },
        ];
        let verdict = grade_with(&sandbox, &cases).await;
        assert!(verdict.passed);
        assert_eq!(verdict.cases.len(), 2);
    }

    #[tokio::test]
    async fn test_case_error_never_aborts_batch() {
        let sandbox = MockSandbox::new(vec![
            raised("ZeroDivisionError: division by zero"),
            completed("", json!(5)),
        ]);
        let cases = [
            return_case(json!([1, 0]), json!(1)),
            return_case(json!([2, 3]), json!(5)),
        ];
        let verdict = grade_with(&sandbox, &cases).await;
        assert!(!verdict.passed);
        assert_eq!(verdict.cases.len(), 2);
        assert!(!verdict.cases[0].passed);
        assert_eq!(
            verdict.cases[0].error.as_deref(),
            Some("ZeroDivisionError: division by zero")
        );
        assert!(verdict.cases[1].passed);
        assert_eq!(sandbox.call_count(), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_distinguished_per_case() {
        let sandbox = MockSandbox::new(vec![ExecutionResult::timeout(), completed("", json!(5))]);
        let cases = [
            return_case(json!(1), json!(1)),
            return_case(json!([2, 3]), json!(5)),
        ];
        let verdict = grade_with(&sandbox, &cases).await;
        assert!(!verdict.passed);
        assert_eq!(verdict.cases[0].error.as_deref(), Some("time limit exceeded"));
        assert!(verdict.cases[1].passed);
    }

    #[tokio::test]
    async fn test_entry_point_missing_short_circuits() {
        let missing = ExecutionResult {
            status: ExecutionStatus::Ok,
            stdout: String::new(),
            stderr: String::new(),
            returned: None,
            error: None,
            entry_point_missing: true,
        };
        let sandbox = MockSandbox::new(vec![missing, completed("", json!(5))]);
        let cases = [
            return_case(json!(1), json!(1)),
            return_case(json!(2), json!(2)),
        ];
        let verdict = grade_with(&sandbox, &cases).await;
        assert!(!verdict.passed);
        assert!(verdict.cases.is_empty());
        assert_eq!(
            verdict.batch_error.as_deref(),
            Some("entry point 'solve' not found")
        );
        // No further cases executed after the batch-level failure.
        assert_eq!(sandbox.call_count(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_is_infrastructure_error() {
        let sandbox = MockSandbox::new(vec![ExecutionResult::launch_failure("daemon down")]);
        let result = grade(
            &sandbox,
            "def solve(): pass",
            "solve",
            &[return_case(json!(1), json!(1))],
            Duration::from_secs(3),
            &Limits::default(),
        )
        .await;
        assert!(matches!(result, Err(GraderError::Infrastructure(_))));
    }

    #[tokio::test]
    async fn test_empty_test_case_list_rejected() {
        let sandbox = MockSandbox::new(vec![]);
        let result = grade(
            &sandbox,
            "def solve(): pass",
            "solve",
            &[],
            Duration::from_secs(3),
            &Limits::default(),
        )
        .await;
        assert!(matches!(result, Err(GraderError::Validation(_))));
    }

    #[test]
    fn test_return_equality_is_strict_json() {
        // 5 (int) and 5.0 (float) are distinct JSON values.
        assert!(!case_passes(
            ComparisonMode::Return,
            "",
            &Some(json!(5.0)),
            &json!(5)
        ));
        assert!(case_passes(
            ComparisonMode::Return,
            "",
            &Some(json!([1, 2])),
            &json!([1, 2])
        ));
    }
}
