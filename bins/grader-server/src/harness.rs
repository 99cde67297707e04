//! The in-sandbox harness and its wire protocol.
//!
//! Submitted code never runs bare: the sandbox materializes it as
//! `solution.py` next to a fixed `harness.py` driver and runs the
//! driver. The driver imports the solution, resolves the entry point by
//! name from the module namespace, invokes it with positional
//! arguments, and reports what happened as a single nonce-keyed JSON
//! line on stdout. Reflection on the untrusted module only ever happens
//! inside the isolation boundary.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use grader_common::types::{ExecutionResult, ExecutionStatus};

pub const SOLUTION_FILENAME: &str = "solution.py";
pub const HARNESS_FILENAME: &str = "harness.py";
pub const PAYLOAD_ENV: &str = "GRADER_PAYLOAD";

const SENTINEL: &str = "__GRADER_REPORT__";

/// Per-invocation report marker. Submitted code shares a process with
/// the harness, so a fixed sentinel could be forged by writing a
/// report-shaped line to the real stdout; only the line carrying this
/// invocation's nonce is trusted. The nonce travels inside the payload,
/// which the harness pops from the environment before the solution
/// module ever runs.
pub fn generate_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Driver executed inside the sandbox. Captures stdout written during
/// the entry-point call separately from import-time output, and rewrites
/// `File "..."` headers in exception text so no sandbox paths leak.
pub const HARNESS_SOURCE: &str = r#"import base64
import contextlib
import importlib.util
import io
import json
import os
import re
import sys
import traceback

SENTINEL = "__GRADER_REPORT__"


def emit(nonce, doc):
    sys.stdout.write("\n" + SENTINEL + nonce + "__" + json.dumps(doc) + "\n")
    sys.stdout.flush()


def exception_text(exc):
    text = "".join(traceback.format_exception_only(type(exc), exc))
    # Syntax errors carry a 'File "<workspace>/solution.py", line N'
    # header; keep the file name and line, drop the directory.
    text = re.sub(r'File "[^"]*[/\\]([^"/\\]+)", line', r"\1, line", text)
    return text.strip()


def main():
    payload = json.loads(base64.b64decode(os.environ.pop("GRADER_PAYLOAD")))
    entry_point = payload["entry_point"]
    args = payload.get("args", [])
    nonce = payload["nonce"]

    here = os.path.dirname(os.path.abspath(__file__))
    spec = importlib.util.spec_from_file_location(
        "solution", os.path.join(here, "solution.py")
    )
    module = importlib.util.module_from_spec(spec)
    try:
        with contextlib.redirect_stdout(io.StringIO()):
            spec.loader.exec_module(module)
    except BaseException as exc:
        emit(nonce, {"error": exception_text(exc)})
        return

    fn = getattr(module, entry_point, None)
    if not callable(fn):
        emit(nonce, {"entry_point_missing": True})
        return

    captured = io.StringIO()
    try:
        with contextlib.redirect_stdout(captured):
            value = fn(*args)
    except BaseException as exc:
        emit(nonce, {"printed": captured.getvalue(), "error": exception_text(exc)})
        return

    try:
        returned = json.loads(json.dumps(value))
    except (TypeError, ValueError):
        returned = repr(value)

    emit(nonce, {"printed": captured.getvalue(), "returned": returned})


if __name__ == "__main__":
    main()
"#;

#[derive(Debug, Serialize)]
struct Payload<'a> {
    entry_point: &'a str,
    args: &'a [Value],
    nonce: &'a str,
}

/// Encode the per-invocation payload handed to the harness via the
/// environment, base64 so it survives shell and Docker env plumbing.
pub fn encode_payload(entry_point: &str, args: &[Value], nonce: &str) -> serde_json::Result<String> {
    let payload = Payload {
        entry_point,
        args,
        nonce,
    };
    let json = serde_json::to_string(&payload)?;
    Ok(general_purpose::STANDARD.encode(json))
}

/// Report the harness emits on its sentinel line.
#[derive(Debug, Default, Deserialize)]
pub struct HarnessReport {
    #[serde(default)]
    pub printed: String,
    pub returned: Option<Value>,
    pub error: Option<String>,
    #[serde(default)]
    pub entry_point_missing: bool,
}

/// Find and parse the report line carrying this invocation's nonce in
/// raw container stdout. Scans from the end; lines without the nonce,
/// including sentinel-shaped output forged by the submission, are
/// ignored.
pub fn parse_report(stdout: &str, nonce: &str) -> Option<HarnessReport> {
    let marker = format!("{}{}__", SENTINEL, nonce);
    stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(marker.as_str()))
        .and_then(|json| serde_json::from_str(json).ok())
}

/// Fold raw sandbox output into an `ExecutionResult`.
///
/// `exit_ok` is whether the harness process itself exited cleanly; a
/// missing report with a clean exit still counts as a runtime failure
/// because the harness always reports when it runs.
pub fn interpret_output(stdout: &str, stderr: &str, exit_ok: bool, nonce: &str) -> ExecutionResult {
    match parse_report(stdout, nonce) {
        Some(report) => {
            if report.entry_point_missing {
                return ExecutionResult {
                    status: ExecutionStatus::Ok,
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                    returned: None,
                    error: None,
                    entry_point_missing: true,
                };
            }
            let status = if report.error.is_some() {
                ExecutionStatus::RuntimeError
            } else {
                ExecutionStatus::Ok
            };
            ExecutionResult {
                status,
                stdout: report.printed,
                stderr: stderr.to_string(),
                returned: report.returned,
                error: report.error,
                entry_point_missing: false,
            }
        }
        None => {
            // Interpreter died before the harness could report (OOM
            // kill, hard crash, syntax error in the harness env).
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or(if exit_ok {
                    "execution produced no report"
                } else {
                    "execution failed"
                })
                .to_string();
            ExecutionResult {
                status: ExecutionStatus::RuntimeError,
                stdout: String::new(),
                stderr: stderr.to_string(),
                returned: None,
                error: Some(detail),
                entry_point_missing: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_encodes_entry_point_args_and_nonce() {
        let encoded = encode_payload("solve", &[json!(2), json!(3)], "abc123").unwrap();
        let decoded = general_purpose::STANDARD.decode(encoded).unwrap();
        let value: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(value["entry_point"], "solve");
        assert_eq!(value["args"], json!([2, 3]));
        assert_eq!(value["nonce"], "abc123");
    }

    #[test]
    fn test_parse_report_completed() {
        let stdout = "noise\n__GRADER_REPORT__abc__{\"printed\":\"5\\n\",\"returned\":5}\n";
        let report = parse_report(stdout, "abc").unwrap();
        assert_eq!(report.printed, "5\n");
        assert_eq!(report.returned, Some(json!(5)));
        assert!(report.error.is_none());
    }

    #[test]
    fn test_parse_report_takes_last_nonce_line() {
        let stdout = "__GRADER_REPORT__abc__{\"printed\":\"stale\"}\n\
                      __GRADER_REPORT__abc__{\"printed\":\"real\"}\n";
        let report = parse_report(stdout, "abc").unwrap();
        assert_eq!(report.printed, "real");
    }

    #[test]
    fn test_report_without_nonce_is_ignored() {
        // A submission writing a report-shaped line to the real stdout
        // and exiting cleanly must not produce a graded result.
        let stdout = "__GRADER_REPORT__{\"printed\":\"\",\"returned\":5}\n";
        assert!(parse_report(stdout, "abc").is_none());

        let result = interpret_output(stdout, "", true, "abc");
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        assert_eq!(result.returned, None);
    }

    #[test]
    fn test_forged_line_cannot_shadow_real_report() {
        let stdout = "__GRADER_REPORT__abc__{\"printed\":\"\",\"returned\":1}\n\
                      __GRADER_REPORT__{\"printed\":\"\",\"returned\":5}\n";
        let report = parse_report(stdout, "abc").unwrap();
        assert_eq!(report.returned, Some(json!(1)));
    }

    #[test]
    fn test_interpret_output_runtime_error() {
        let stdout = "\n__GRADER_REPORT__abc__{\"printed\":\"\",\"error\":\"ZeroDivisionError: division by zero\"}\n";
        let result = interpret_output(stdout, "", true, "abc");
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        assert_eq!(
            result.error.as_deref(),
            Some("ZeroDivisionError: division by zero")
        );
    }

    #[test]
    fn test_interpret_output_entry_point_missing() {
        let stdout = "__GRADER_REPORT__abc__{\"entry_point_missing\":true}";
        let result = interpret_output(stdout, "", true, "abc");
        assert!(result.entry_point_missing);
    }

    #[test]
    fn test_interpret_output_without_report() {
        let result = interpret_output("", "Killed\n", false, "abc");
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        assert_eq!(result.error.as_deref(), Some("Killed"));
    }
}
