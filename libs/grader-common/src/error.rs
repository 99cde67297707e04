use thiserror::Error;

/// Error taxonomy for the grading engine.
///
/// Per-test-case failures (wrong output, exceptions, timeouts inside a
/// case) are folded into the `Verdict` and never surface here; these
/// variants cover malformed requests, whole-batch aborts, and
/// infrastructure faults.
#[derive(Debug, Error)]
pub enum GraderError {
    /// Malformed request. Surfaced immediately, never persisted as a
    /// submission.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("challenge '{0}' not found")]
    ChallengeNotFound(String),

    /// A challenge with this id already exists.
    #[error("challenge '{0}' already exists")]
    ChallengeExists(String),

    /// Replays are gated until the challenge's solutions-release date.
    #[error("solutions for '{0}' are not yet available")]
    SolutionsNotAvailable(String),

    /// The sandbox could not be created or started. Never recorded as
    /// the participant's fault.
    #[error("execution backend unavailable: {0}")]
    Infrastructure(String),

    #[error("storage error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl GraderError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GraderError::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, GraderError>;
