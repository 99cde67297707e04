use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// How a test case's expected output is compared against the run.
///
/// `Auto` resolves per comparison, not per challenge: a case resolves to
/// `Print` when the entry point returned nothing and the expected output
/// is textual, otherwise to `Return`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    Print,
    Return,
    #[default]
    Auto,
}

/// A single gradable test case embedded in a challenge.
///
/// `input` is either a scalar (passed as one argument) or an array
/// (expanded to positional arguments).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Value,
    pub expected: Value,
    #[serde(default)]
    pub mode: ComparisonMode,
}

impl TestCase {
    /// Expand `input` into the positional argument list handed to the
    /// entry point.
    pub fn args(&self) -> Vec<Value> {
        match &self.input {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        }
    }
}

/// A gradable problem in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    /// Opaque slug, immutable once assigned.
    pub id: String,
    pub title: String,
    pub prompt: String,
    /// Name of the function the grader calls in submitted code.
    pub entry_point: String,
    pub test_cases: Vec<TestCase>,
    pub active: bool,
    pub published: bool,
    /// Date after which stored replays of passing solutions are released.
    /// `None` means replays are never released.
    pub solutions_available: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    /// A challenge with no test cases cannot be graded.
    pub fn is_gradable(&self) -> bool {
        !self.test_cases.is_empty()
    }
}

/// Partial update applied to a challenge. `test_cases` is replaced
/// wholesale when present; there are no per-case edits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChallengePatch {
    pub title: Option<String>,
    pub prompt: Option<String>,
    pub entry_point: Option<String>,
    pub test_cases: Option<Vec<TestCase>>,
    pub active: Option<bool>,
    pub published: Option<bool>,
    /// `Some(None)` clears the release date.
    #[serde(default, with = "double_option")]
    pub solutions_available: Option<Option<NaiveDate>>,
}

impl ChallengePatch {
    pub fn apply(self, ch: &mut Challenge) {
        if let Some(title) = self.title {
            ch.title = title;
        }
        if let Some(prompt) = self.prompt {
            ch.prompt = prompt;
        }
        if let Some(entry_point) = self.entry_point {
            ch.entry_point = entry_point;
        }
        if let Some(test_cases) = self.test_cases {
            ch.test_cases = test_cases;
        }
        if let Some(active) = self.active {
            ch.active = active;
        }
        if let Some(published) = self.published {
            ch.published = published;
        }
        if let Some(date) = self.solutions_available {
            ch.solutions_available = date;
        }
    }
}

/// Serde helper distinguishing "field absent" from "field set to null".
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, ser: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(ser),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(de).map(Some)
    }
}

/// Who is asking for the catalog. Participants never see expected
/// outputs or hidden challenges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Admin,
    Participant,
}

/// Student-safe projection of a test case: input only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseView {
    pub input: Value,
    pub mode: ComparisonMode,
}

/// Student-safe projection of a challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeView {
    pub id: String,
    pub title: String,
    pub prompt: String,
    pub entry_point: String,
    pub test_cases: Vec<TestCaseView>,
    pub solutions_available: Option<NaiveDate>,
}

impl From<&Challenge> for ChallengeView {
    fn from(ch: &Challenge) -> Self {
        ChallengeView {
            id: ch.id.clone(),
            title: ch.title.clone(),
            prompt: ch.prompt.clone(),
            entry_point: ch.entry_point.clone(),
            test_cases: ch
                .test_cases
                .iter()
                .map(|tc| TestCaseView {
                    input: tc.input.clone(),
                    mode: tc.mode,
                })
                .collect(),
            solutions_available: ch.solutions_available,
        }
    }
}

/// Terminal state of one execution attempt inside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Ok,
    /// The submitted program itself failed.
    RuntimeError,
    /// The sandbox was forcibly terminated at the wall-clock limit.
    Timeout,
    /// The sandbox could not be created or started. Never the
    /// participant's fault; never persisted as a graded attempt.
    LaunchFailure,
}

/// Raw outcome of one sandboxed invocation. Produced by a sandbox,
/// consumed by the verdict engine, never persisted directly.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// Text the entry point wrote to stdout during the call.
    pub stdout: String,
    pub stderr: String,
    /// Value returned by the entry point, when it completed.
    pub returned: Option<Value>,
    /// Exception text reported from inside the sandbox, if any.
    pub error: Option<String>,
    /// The required entry point was absent from the submitted module.
    pub entry_point_missing: bool,
}

impl ExecutionResult {
    pub fn launch_failure(detail: impl Into<String>) -> Self {
        ExecutionResult {
            status: ExecutionStatus::LaunchFailure,
            stdout: String::new(),
            stderr: String::new(),
            returned: None,
            error: Some(detail.into()),
            entry_point_missing: false,
        }
    }

    pub fn timeout() -> Self {
        ExecutionResult {
            status: ExecutionStatus::Timeout,
            stdout: String::new(),
            stderr: String::new(),
            returned: None,
            error: None,
            entry_point_missing: false,
        }
    }
}

/// Outcome of one test case within a verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub input: Value,
    pub printed: String,
    pub returned: Option<Value>,
    pub expected: Value,
    pub passed: bool,
    pub error: Option<String>,
}

/// Structured outcome of grading one submission against all test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub cases: Vec<CaseResult>,
    pub passed: bool,
    /// Set for whole-batch failures (missing entry point); when present,
    /// `cases` is empty and `passed` is false.
    pub batch_error: Option<String>,
}

impl Verdict {
    pub fn entry_point_missing(entry_point: &str) -> Self {
        Verdict {
            cases: Vec::new(),
            passed: false,
            batch_error: Some(format!("entry point '{}' not found", entry_point)),
        }
    }
}

/// One recorded grading attempt. Append-only: every attempt is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub challenge_id: String,
    pub participant: String,
    pub code: String,
    /// Opaque client-captured interaction trace (editing history etc.).
    pub replay: Value,
    pub submitted_at: DateTime<Utc>,
    pub verdict: Verdict,
}

/// One leaderboard row: a participant's first passing timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub participant: String,
    pub first_passed_at: DateTime<Utc>,
}
