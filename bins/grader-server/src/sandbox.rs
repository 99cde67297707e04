//! Isolation Runner - executes one untrusted program per call inside a
//! disposable, resource-capped, network-denied boundary.
//!
//! The runner knows nothing about test cases or grading semantics: it
//! takes code, an entry-point name and positional arguments, and hands
//! back a raw `ExecutionResult`. Correctness is the verdict engine's
//! business.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use grader_common::config::{Config as AppConfig, Limits};
use grader_common::types::ExecutionResult;

use crate::harness;

/// Safety limits to prevent pathological inputs from reaching Docker.
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_ARGS_BYTES: usize = 1024 * 1024; // 1MB

/// Pluggable execution boundary. `DockerSandbox` is the production
/// implementation; `LocalProcessSandbox` is a trusted-context-only
/// fallback that must be selected explicitly.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run `code`, call `entry_point(*args)`, and report what happened.
    ///
    /// Infrastructure faults are reported as `LaunchFailure` status, not
    /// as errors: the caller must be able to tell "the sandbox broke"
    /// from "the submission broke". Never blocks past `timeout` plus a
    /// small teardown grace period.
    async fn execute(
        &self,
        code: &str,
        entry_point: &str,
        args: &[Value],
        timeout: Duration,
        limits: &Limits,
    ) -> ExecutionResult;
}

/// Container cleanup guard - guarantees container removal on drop, even
/// if execution panics or the task is cancelled.
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        // Best-effort cleanup - cannot be async in Drop.
        let docker = self.docker.clone();
        let container_id = self.container_id.clone();
        tokio::spawn(async move {
            let options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(e) = docker.remove_container(&container_id, Some(options)).await {
                warn!(container_id = %container_id, error = %e, "Failed to remove container");
            }
        });
    }
}

/// Docker-backed sandbox.
///
/// Each call gets a fresh temp workspace holding `solution.py` and the
/// harness, bind-mounted read-only at `/work` into a container with no
/// network, a memory ceiling, a CPU share, a pids limit, a read-only
/// rootfs and a small noexec tmpfs scratch at `/tmp`. The wall-clock
/// timeout is enforced by killing the container, never cooperatively.
pub struct DockerSandbox {
    docker: Docker,
    image: String,
}

impl DockerSandbox {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(DockerSandbox {
            docker,
            image: config.grader_image.clone(),
        })
    }

    /// Verify the grader image exists locally, pulling it if missing.
    async fn ensure_image(&self) -> Result<(), bollard::errors::Error> {
        if self.docker.inspect_image(&self.image).await.is_ok() {
            debug!(image = %self.image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %self.image, "Image cache miss, pulling");
        let options = Some(CreateImageOptions {
            from_image: self.image.as_str(),
            ..Default::default()
        });
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(progress) = stream.next().await {
            progress?;
        }
        Ok(())
    }

    fn host_config(&self, workspace: &str, limits: &Limits) -> bollard::models::HostConfig {
        let mut tmpfs = HashMap::new();
        tmpfs.insert(
            "/tmp".to_string(),
            "rw,nosuid,nodev,noexec,size=64m".to_string(),
        );
        bollard::models::HostConfig {
            memory: Some(i64::from(limits.memory_mb) * 1024 * 1024),
            nano_cpus: Some((limits.cpus * 1_000_000_000.0) as i64),
            pids_limit: Some(i64::from(limits.pids)),
            readonly_rootfs: Some(true),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            binds: Some(vec![format!("{}:/work:ro", workspace)]),
            tmpfs: Some(tmpfs),
            ..Default::default()
        }
    }
}

/// Write the submission and harness into a fresh disposable workspace.
/// `TempDir` removes the directory on every exit path when dropped.
fn materialize_workspace(code: &str) -> std::io::Result<tempfile::TempDir> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::Builder::new().prefix("grader-").tempdir()?;
    // World-traversable so the container user can read the mount even
    // under userns remapping.
    std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755))?;

    for (name, content) in [
        (harness::SOLUTION_FILENAME, code),
        (harness::HARNESS_FILENAME, harness::HARNESS_SOURCE),
    ] {
        let path = dir.path().join(name);
        std::fs::write(&path, content)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))?;
    }
    Ok(dir)
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn execute(
        &self,
        code: &str,
        entry_point: &str,
        args: &[Value],
        timeout: Duration,
        limits: &Limits,
    ) -> ExecutionResult {
        if code.len() > MAX_SOURCE_CODE_BYTES {
            return ExecutionResult::launch_failure("source code exceeds maximum size");
        }

        let nonce = harness::generate_nonce();
        let payload = match harness::encode_payload(entry_point, args, &nonce) {
            Ok(p) if p.len() <= MAX_ARGS_BYTES => p,
            Ok(_) => return ExecutionResult::launch_failure("test input exceeds maximum size"),
            Err(e) => {
                return ExecutionResult::launch_failure(format!("payload encoding failed: {}", e))
            }
        };

        if let Err(e) = self.ensure_image().await {
            return ExecutionResult::launch_failure(format!("image unavailable: {}", e));
        }

        // Disposable workspace; removed on drop on every exit path.
        let workspace = match materialize_workspace(code) {
            Ok(dir) => dir,
            Err(e) => {
                return ExecutionResult::launch_failure(format!("workspace setup failed: {}", e))
            }
        };

        let container_name = format!("grader-{}", uuid::Uuid::new_v4());
        let config = Config {
            image: Some(self.image.clone()),
            cmd: Some(vec![
                "python3".to_string(),
                format!("/work/{}", harness::HARNESS_FILENAME),
            ]),
            env: Some(vec![format!("{}={}", harness::PAYLOAD_ENV, payload)]),
            working_dir: Some("/work".to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(self.host_config(&workspace.path().display().to_string(), limits)),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };
        let container = match self.docker.create_container(Some(create_options), config).await {
            Ok(c) => c,
            Err(e) => {
                return ExecutionResult::launch_failure(format!("container creation failed: {}", e))
            }
        };
        let container_id = container.id.clone();

        // Cleanup guard goes up before anything that can fail or be
        // cancelled.
        let _guard = ContainerGuard {
            docker: self.docker.clone(),
            container_id: container_id.clone(),
        };

        if let Err(e) = self
            .docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
        {
            return ExecutionResult::launch_failure(format!("container start failed: {}", e));
        }

        let execution = async {
            let mut stdout = String::new();
            let mut stderr = String::new();

            let logs_options = Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                follow: true,
                ..Default::default()
            });
            let mut logs = self.docker.logs(&container_id, logs_options);
            while let Some(output) = logs.next().await {
                match output {
                    Ok(LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Err(e) => {
                        warn!(error = %e, "Error reading container logs");
                        break;
                    }
                    _ => {}
                }
            }

            let wait_options = WaitContainerOptions {
                condition: "not-running",
            };
            let mut exit_ok = false;
            let mut wait = self.docker.wait_container(&container_id, Some(wait_options));
            if let Some(Ok(response)) = wait.next().await {
                exit_ok = response.status_code == 0;
            }

            (stdout, stderr, exit_ok)
        };

        match tokio::time::timeout(timeout, execution).await {
            Ok((stdout, stderr, exit_ok)) => {
                harness::interpret_output(&stdout, &stderr, exit_ok, &nonce)
            }
            Err(_) => {
                // Hard kill; the untrusted program cannot be trusted to
                // yield. Removal still happens via the guard.
                warn!(container_id = %container_id, timeout_ms = timeout.as_millis() as u64,
                      "Execution timed out, killing container");
                if let Err(e) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(error = %e, "Failed to kill timed-out container");
                }
                ExecutionResult::timeout()
            }
        }
    }
}
