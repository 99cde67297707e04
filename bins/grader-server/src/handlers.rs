// HTTP route handlers for the grading service.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use grader_common::config::Config;
use grader_common::error::GraderError;
use grader_common::registry;
use grader_common::store;
use grader_common::types::{
    Challenge, ChallengePatch, ChallengeView, Submission, TestCase, Verdict, Visibility,
};

use crate::sandbox::{Sandbox, MAX_SOURCE_CODE_BYTES};
use crate::verdict;

#[derive(Clone)]
pub struct AppState {
    pub redis: redis::aio::ConnectionManager,
    pub config: Config,
    pub sandbox: Arc<dyn Sandbox>,
}

/// Maps the error taxonomy onto HTTP statuses. Infrastructure faults
/// are 503s and never the participant's fault; storage details stay out
/// of responses.
pub enum ApiError {
    Grader(GraderError),
    Unauthorized,
    Forbidden,
}

impl From<GraderError> for ApiError {
    fn from(e: GraderError) -> Self {
        ApiError::Grader(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "not logged in".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "admin access required".to_string()),
            ApiError::Grader(e) => match &e {
                GraderError::Validation(_) => (StatusCode::BAD_REQUEST, e.to_string()),
                GraderError::ChallengeNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
                GraderError::ChallengeExists(_) => (StatusCode::CONFLICT, e.to_string()),
                GraderError::SolutionsNotAvailable(_) => (StatusCode::FORBIDDEN, e.to_string()),
                GraderError::Infrastructure(detail) => {
                    error!(error = %detail, "Grading backend unavailable");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "grading is temporarily unavailable".to_string(),
                    )
                }
                GraderError::Store(e) => {
                    error!(error = %e, "Storage error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
                }
                GraderError::Serde(e) => {
                    error!(error = %e, "Serialization error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
                }
            },
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Participant identity from the authenticating front proxy.
fn participant_id(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get("x-participant-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::Unauthorized)
}

/// Administrative calls must present the configured token. An empty
/// configured token disables the admin surface entirely (fail closed).
fn require_admin(headers: &HeaderMap, config: &Config) -> ApiResult<()> {
    let presented = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if config.admin_token.is_empty() || presented != config.admin_token {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

fn valid_slug(slug: &str) -> bool {
    let bytes = slug.as_bytes();
    (2..=64).contains(&bytes.len())
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
}

async fn fetch_challenge(
    conn: &mut redis::aio::ConnectionManager,
    id: &str,
) -> Result<Challenge, GraderError> {
    registry::get(conn, id)
        .await?
        .ok_or_else(|| GraderError::ChallengeNotFound(id.to_string()))
}

// === Participant surface ===

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub code: String,
    /// Opaque client-captured interaction trace, stored as-is.
    #[serde(default)]
    pub replay: Value,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub submission_id: Uuid,
    pub verdict: Verdict,
    /// Whether this submission established the leaderboard entry.
    pub leaderboard_admitted: bool,
}

/// POST /api/challenges/{id}/submit - grade a submission and record it.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SubmitRequest>,
) -> ApiResult<impl IntoResponse> {
    let participant = participant_id(&headers)?;

    if payload.code.trim().is_empty() {
        return Err(GraderError::validation("empty submission").into());
    }
    if payload.code.len() > MAX_SOURCE_CODE_BYTES {
        return Err(GraderError::validation("source code exceeds maximum size").into());
    }

    let mut conn = state.redis.clone();
    let challenge = fetch_challenge(&mut conn, &id).await?;
    if !challenge.active || !challenge.published {
        return Err(GraderError::ChallengeNotFound(id).into());
    }
    if !challenge.is_gradable() {
        return Err(GraderError::validation("challenge has no test cases").into());
    }

    info!(
        challenge_id = %challenge.id,
        participant = %participant,
        test_cases = challenge.test_cases.len(),
        source_size = payload.code.len(),
        "Grading submission"
    );

    // Infrastructure failures propagate here and are never persisted as
    // graded attempts.
    let verdict = verdict::grade(
        state.sandbox.as_ref(),
        &payload.code,
        &challenge.entry_point,
        &challenge.test_cases,
        state.config.timeout,
        &state.config.limits,
    )
    .await?;

    let submission = Submission {
        id: Uuid::new_v4(),
        challenge_id: challenge.id.clone(),
        participant,
        code: payload.code,
        replay: payload.replay,
        submitted_at: Utc::now(),
        verdict,
    };
    let admitted = store::record(&mut conn, &submission).await?;

    info!(
        submission_id = %submission.id,
        challenge_id = %submission.challenge_id,
        passed = submission.verdict.passed,
        leaderboard_admitted = admitted,
        "Submission recorded"
    );

    Ok(Json(SubmitResponse {
        submission_id: submission.id,
        verdict: submission.verdict,
        leaderboard_admitted: admitted,
    }))
}

/// GET /api/challenges - participant catalog, expected outputs stripped.
pub async fn list_challenges(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ChallengeView>>> {
    participant_id(&headers)?;
    let mut conn = state.redis.clone();
    Ok(Json(registry::list_participant(&mut conn).await?))
}

/// GET /api/challenges/{id}
pub async fn get_challenge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<ChallengeView>> {
    participant_id(&headers)?;
    let mut conn = state.redis.clone();
    let challenge = fetch_challenge(&mut conn, &id).await?;
    if !challenge.active || !challenge.published {
        return Err(GraderError::ChallengeNotFound(id).into());
    }
    Ok(Json(ChallengeView::from(&challenge)))
}

#[derive(Debug, Serialize)]
pub struct LeaderboardRow {
    pub display_name: String,
    pub first_passed_at: chrono::DateTime<Utc>,
}

/// GET /api/challenges/{id}/leaderboard - first-pass order, ascending.
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<LeaderboardRow>>> {
    participant_id(&headers)?;
    let mut conn = state.redis.clone();
    fetch_challenge(&mut conn, &id).await?;
    let entries = store::leaderboard(&mut conn, &id).await?;
    Ok(Json(
        entries
            .into_iter()
            .map(|e| LeaderboardRow {
                display_name: e.participant,
                first_passed_at: e.first_passed_at,
            })
            .collect(),
    ))
}

/// GET /api/challenges/{id}/replay/{participant} - replay data of the
/// most recent passing submission, gated on the solutions-release date.
pub async fn get_replay(
    State(state): State<Arc<AppState>>,
    Path((id, participant)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    participant_id(&headers)?;
    let mut conn = state.redis.clone();
    let challenge = fetch_challenge(&mut conn, &id).await?;

    let replay =
        store::released_replay(&mut conn, &challenge, &participant, Utc::now().date_naive())
            .await?;
    match replay {
        Some(data) => Ok(Json(serde_json::json!({ "replay": data })).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no passing submission" })),
        )
            .into_response()),
    }
}

// === Administrative surface ===

#[derive(Debug, Deserialize)]
pub struct CreateChallengeRequest {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    pub entry_point: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_true")]
    pub published: bool,
    pub solutions_available: Option<NaiveDate>,
}

fn default_true() -> bool {
    true
}

/// POST /api/admin/challenges
pub async fn admin_create_challenge(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateChallengeRequest>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&headers, &state.config)?;

    if !valid_slug(&payload.id) {
        return Err(GraderError::validation(
            "invalid id (lowercase letters, digits, dashes; 2-64 chars)",
        )
        .into());
    }
    if payload.title.trim().is_empty() {
        return Err(GraderError::validation("title required").into());
    }
    if payload.entry_point.trim().is_empty() {
        return Err(GraderError::validation("entry point required").into());
    }

    let challenge = Challenge {
        id: payload.id,
        title: payload.title,
        prompt: payload.prompt,
        entry_point: payload.entry_point,
        test_cases: payload.test_cases,
        active: payload.active,
        published: payload.published,
        solutions_available: payload.solutions_available,
        created_at: Utc::now(),
    };

    let mut conn = state.redis.clone();
    registry::create(&mut conn, &challenge).await?;
    info!(challenge_id = %challenge.id, "Challenge created");
    Ok((StatusCode::CREATED, Json(challenge)))
}

/// GET /api/admin/challenges - full records, catalog order.
pub async fn admin_list_challenges(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Challenge>>> {
    require_admin(&headers, &state.config)?;
    let mut conn = state.redis.clone();
    Ok(Json(registry::list(&mut conn, Visibility::Admin).await?))
}

/// PATCH /api/admin/challenges/{id} - partial edit; test cases replace
/// wholesale when present.
pub async fn admin_update_challenge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<ChallengePatch>,
) -> ApiResult<Json<Challenge>> {
    require_admin(&headers, &state.config)?;
    let mut conn = state.redis.clone();
    let updated = registry::update(&mut conn, &id, patch).await?;
    info!(challenge_id = %id, "Challenge updated");
    Ok(Json(updated))
}

/// DELETE /api/admin/challenges/{id}
pub async fn admin_delete_challenge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    require_admin(&headers, &state.config)?;
    let mut conn = state.redis.clone();
    registry::delete(&mut conn, &id).await?;
    warn!(challenge_id = %id, "Challenge deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/admin/challenges/order - replace the catalog order
/// atomically. Ids omitted from the sequence drop out of the listing.
pub async fn admin_reorder(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(ids): Json<Vec<String>>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&headers, &state.config)?;
    let mut conn = state.redis.clone();
    registry::reorder(&mut conn, &ids).await?;
    info!(count = ids.len(), "Catalog reordered");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/challenges/order/repair - rebuild the catalog order
/// from stored records.
pub async fn admin_repair_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<String>>> {
    require_admin(&headers, &state.config)?;
    let mut conn = state.redis.clone();
    let ids = registry::repair_order(&mut conn).await?;
    info!(count = ids.len(), "Catalog order repaired");
    Ok(Json(ids))
}

/// DELETE /api/admin/challenges/{id}/leaderboard/{participant} -
/// removes only the leaderboard entry; submission history stays.
pub async fn admin_remove_leaderboard_entry(
    State(state): State<Arc<AppState>>,
    Path((id, participant)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    require_admin(&headers, &state.config)?;
    let mut conn = state.redis.clone();
    fetch_challenge(&mut conn, &id).await?;
    let removed = store::remove_from_leaderboard(&mut conn, &id, &participant).await?;
    if !removed {
        return Err(GraderError::validation("participant not on leaderboard").into());
    }
    warn!(challenge_id = %id, participant = %participant, "Leaderboard entry removed");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
