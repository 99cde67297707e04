use std::time::Duration;

/// Resource ceilings enforced by the isolation boundary.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub memory_mb: u32,
    pub cpus: f64,
    pub pids: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            memory_mb: 256,
            cpus: 1.0,
            pids: 128,
        }
    }
}

/// Service configuration, environment-driven with working defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub bind_addr: String,
    pub admin_token: String,
    /// Docker image the sandbox runs submissions in.
    pub grader_image: String,
    /// Hard wall-clock limit per test-case execution.
    pub timeout: Duration,
    pub limits: Limits,
    /// "docker" (default) or "local". The local runner shares the
    /// host's filesystem and network with the grading process and is
    /// only honored when `allow_unsandboxed` is also set.
    pub sandbox: String,
    pub allow_unsandboxed: bool,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Self {
        let timeout_ms: u64 = env_or("GRADER_TIMEOUT_MS", "3000").parse().unwrap_or(3000);
        Config {
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000"),
            admin_token: env_or("ADMIN_TOKEN", ""),
            grader_image: env_or("GRADER_IMAGE", "grader-python:3.12"),
            timeout: Duration::from_millis(timeout_ms),
            limits: Limits {
                memory_mb: env_or("GRADER_MEMORY_MB", "256").parse().unwrap_or(256),
                cpus: env_or("GRADER_CPUS", "1.0").parse().unwrap_or(1.0),
                pids: env_or("GRADER_PIDS_LIMIT", "128").parse().unwrap_or(128),
            },
            sandbox: env_or("GRADER_SANDBOX", "docker"),
            allow_unsandboxed: env_or("GRADER_ALLOW_UNSANDBOXED", "0") == "1",
        }
    }
}
