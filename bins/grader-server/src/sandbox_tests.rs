/// Integration tests for the Docker sandbox and the full grading path.
///
/// These verify against a real Docker daemon that:
/// 1. Return-value and printed-output capture both work end to end
/// 2. Exceptions surface as per-case failures without aborting batches
/// 3. A missing entry point is reported once for the whole batch
/// 4. The hard timeout kills runaway programs within the grace period
/// 5. The container cannot reach the network or write the workspace
mod docker_sandbox_tests {
    use std::time::{Duration, Instant};

    use serde_json::json;

    use grader_common::config::{Config, Limits};
    use grader_common::types::{ComparisonMode, ExecutionStatus, TestCase};

    use crate::sandbox::{DockerSandbox, Sandbox};
    use crate::verdict::grade;

    fn test_sandbox() -> DockerSandbox {
        DockerSandbox::new(&Config::from_env()).expect("Failed to connect to Docker daemon")
    }

    #[tokio::test]
    #[ignore] // Requires Docker and the grader image
    async fn test_return_value_capture() {
        let sandbox = test_sandbox();
        let result = sandbox
            .execute(
                "def solve(a, b):\n    return a + b\n",
                "solve",
                &[json!(2), json!(3)],
                Duration::from_secs(5),
                &Limits::default(),
            )
            .await;

        assert_eq!(result.status, ExecutionStatus::Ok);
        assert_eq!(result.returned, Some(json!(5)));
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires Docker and the grader image
    async fn test_printed_output_capture() {
        let sandbox = test_sandbox();
        let result = sandbox
            .execute(
                "def solve(a, b):\n    print(a + b)\n",
                "solve",
                &[json!(2), json!(3)],
                Duration::from_secs(5),
                &Limits::default(),
            )
            .await;

        assert_eq!(result.status, ExecutionStatus::Ok);
        assert_eq!(result.stdout, "5\n");
        assert_eq!(result.returned, Some(json!(null)));
    }

    #[tokio::test]
    #[ignore] // Requires Docker and the grader image
    async fn test_exception_reported_without_sandbox_paths() {
        let sandbox = test_sandbox();
        let result = sandbox
            .execute(
                "def solve(a, b):\n    return a / 0\n",
                "solve",
                &[json!(1), json!(2)],
                Duration::from_secs(5),
                &Limits::default(),
            )
            .await;

        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        let error = result.error.expect("error text expected");
        assert!(error.contains("ZeroDivisionError"));
        assert!(!error.contains("/work"));
    }

    #[tokio::test]
    #[ignore] // Requires Docker and the grader image
    async fn test_syntax_error_reported_without_sandbox_paths() {
        let sandbox = test_sandbox();
        let result = sandbox
            .execute(
                "def solve(a, b)\n    return a + b\n",
                "solve",
                &[],
                Duration::from_secs(5),
                &Limits::default(),
            )
            .await;

        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        let error = result.error.expect("error text expected");
        assert!(error.contains("SyntaxError"));
        assert!(!error.contains("/work"));
        assert!(!error.contains("File \""));
    }

    #[tokio::test]
    #[ignore] // Requires Docker and the grader image
    async fn test_entry_point_missing() {
        let sandbox = test_sandbox();
        let result = sandbox
            .execute(
                "def other_name():\n    return 1\n",
                "solve",
                &[],
                Duration::from_secs(5),
                &Limits::default(),
            )
            .await;

        assert!(result.entry_point_missing);
    }

    #[tokio::test]
    #[ignore] // Requires Docker and the grader image
    async fn test_infinite_loop_killed_within_grace() {
        let sandbox = test_sandbox();
        let timeout = Duration::from_secs(3);

        let start = Instant::now();
        let result = sandbox
            .execute(
                "def solve():\n    while True:\n        pass\n",
                "solve",
                &[],
                timeout,
                &Limits::default(),
            )
            .await;
        let elapsed = start.elapsed();

        assert_eq!(result.status, ExecutionStatus::Timeout);
        // Hard kill, not cooperative: timeout plus a small teardown
        // grace period.
        assert!(elapsed < timeout + Duration::from_millis(1500));
    }

    #[tokio::test]
    #[ignore] // Requires Docker and the grader image
    async fn test_network_denied() {
        let sandbox = test_sandbox();
        let code = "def solve():\n\
                    \x20   import socket\n\
                    \x20   s = socket.create_connection((\"1.1.1.1\", 53), timeout=2)\n\
                    \x20   return \"connected\"\n";
        let result = sandbox
            .execute(code, "solve", &[], Duration::from_secs(10), &Limits::default())
            .await;

        assert_eq!(result.status, ExecutionStatus::RuntimeError);
    }

    #[tokio::test]
    #[ignore] // Requires Docker and the grader image
    async fn test_workspace_is_read_only() {
        let sandbox = test_sandbox();
        let code = "def solve():\n\
                    \x20   open(\"/work/evil.txt\", \"w\").write(\"x\")\n\
                    \x20   return \"wrote\"\n";
        let result = sandbox
            .execute(code, "solve", &[], Duration::from_secs(5), &Limits::default())
            .await;

        assert_eq!(result.status, ExecutionStatus::RuntimeError);
    }

    #[tokio::test]
    #[ignore] // Requires Docker and the grader image
    async fn test_grade_end_to_end() {
        let sandbox = test_sandbox();
        let cases = vec![
            TestCase {
                input: json!([2, 3]),
                expected: json!(5),
                mode: ComparisonMode::Return,
            },
            TestCase {
                input: json!([10, -4]),
                expected: json!(6),
                mode: ComparisonMode::Return,
            },
        ];

        let verdict = grade(
            &sandbox,
            "def solve(a, b):\n    return a + b\n",
            "solve",
            &cases,
            Duration::from_secs(5),
            &Limits::default(),
        )
        .await
        .expect("grading should not hit infrastructure errors");

        assert!(verdict.passed);
        assert_eq!(verdict.cases.len(), 2);
    }
}

/// Regressions runnable without a Docker daemon, against the gated
/// local runner. The report protocol must hold even when the submission
/// shares a process with the harness.
mod local_sandbox_tests {
    use std::time::Duration;

    use serde_json::json;

    use grader_common::config::Limits;
    use grader_common::types::ExecutionStatus;

    use crate::local::LocalProcessSandbox;
    use crate::sandbox::Sandbox;

    #[tokio::test]
    #[ignore] // Requires a host python3
    async fn test_forged_report_is_not_trusted() {
        // Writes a report-shaped line to the real stdout (bypassing the
        // harness capture) and exits cleanly before the harness can
        // report. Without the invocation nonce the line must be ignored
        // and the run must not grade as a clean pass.
        let sandbox = LocalProcessSandbox::new();
        let code = concat!(
            "import os, sys\n",
            "sys.__stdout__.write('__GRADER_REPORT__{\"printed\": \"\", \"returned\": 5}\\n')\n",
            "sys.__stdout__.flush()\n",
            "os._exit(0)\n",
        );
        let result = sandbox
            .execute(code, "solve", &[json!(2), json!(3)], Duration::from_secs(5), &Limits::default())
            .await;

        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        assert_eq!(result.returned, None);
        assert!(!result.entry_point_missing);
    }

    #[tokio::test]
    #[ignore] // Requires a host python3
    async fn test_syntax_error_hides_workspace_path() {
        let sandbox = LocalProcessSandbox::new();
        let result = sandbox
            .execute(
                "def solve(a, b)\n    return a + b\n",
                "solve",
                &[],
                Duration::from_secs(5),
                &Limits::default(),
            )
            .await;

        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        let error = result.error.expect("error text expected");
        assert!(error.contains("SyntaxError"));
        assert!(error.contains("solution.py"));
        assert!(!error.contains("File \""));
        assert!(!error.contains("/tmp"));
    }
}
