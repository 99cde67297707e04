//! Unsandboxed fallback runner for trusted contexts only.
//!
//! Spawns the host `python3` directly: no network denial, no resource
//! ceilings, shared filesystem with the grading process. It exists for
//! low-stakes local development and is only reachable when the server
//! is booted with `GRADER_SANDBOX=local` and
//! `GRADER_ALLOW_UNSANDBOXED=1` together; it is never the default for
//! code of unknown trust.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use grader_common::config::Limits;
use grader_common::types::ExecutionResult;

use crate::harness;
use crate::sandbox::{Sandbox, MAX_SOURCE_CODE_BYTES};

pub struct LocalProcessSandbox {
    python: String,
}

impl LocalProcessSandbox {
    pub fn new() -> Self {
        LocalProcessSandbox {
            python: std::env::var("GRADER_PYTHON").unwrap_or_else(|_| "python3".to_string()),
        }
    }
}

#[async_trait]
impl Sandbox for LocalProcessSandbox {
    async fn execute(
        &self,
        code: &str,
        entry_point: &str,
        args: &[Value],
        timeout: Duration,
        _limits: &Limits,
    ) -> ExecutionResult {
        if code.len() > MAX_SOURCE_CODE_BYTES {
            return ExecutionResult::launch_failure("source code exceeds maximum size");
        }
        let nonce = harness::generate_nonce();
        let payload = match harness::encode_payload(entry_point, args, &nonce) {
            Ok(p) => p,
            Err(e) => {
                return ExecutionResult::launch_failure(format!("payload encoding failed: {}", e))
            }
        };

        let workspace = match tempfile::Builder::new().prefix("grader-local-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return ExecutionResult::launch_failure(format!("workspace setup failed: {}", e))
            }
        };
        for (name, content) in [
            (harness::SOLUTION_FILENAME, code),
            (harness::HARNESS_FILENAME, harness::HARNESS_SOURCE),
        ] {
            if let Err(e) = std::fs::write(workspace.path().join(name), content) {
                return ExecutionResult::launch_failure(format!("workspace setup failed: {}", e));
            }
        }

        let child = tokio::process::Command::new(&self.python)
            .arg(workspace.path().join(harness::HARNESS_FILENAME))
            .env(harness::PAYLOAD_ENV, payload)
            .current_dir(workspace.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the future on timeout must take the interpreter
            // down with it.
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(c) => c,
            Err(e) => {
                return ExecutionResult::launch_failure(format!("failed to spawn python: {}", e))
            }
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                harness::interpret_output(&stdout, &stderr, output.status.success(), &nonce)
            }
            Ok(Err(e)) => ExecutionResult::launch_failure(format!("process wait failed: {}", e)),
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Local execution timed out");
                ExecutionResult::timeout()
            }
        }
    }
}
