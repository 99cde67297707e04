//! Submission & Leaderboard Store.
//!
//! Every grading attempt is appended to a per-(challenge, participant)
//! Redis list and kept forever. The leaderboard is a per-challenge
//! sorted set scored by first-pass epoch milliseconds; admission is a
//! ZADD NX compare-and-set, so concurrent first passes from the same
//! participant (duplicate tabs) still admit exactly one entry.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;

use crate::error::{GraderError, Result};
use crate::keys;
use crate::types::{Challenge, LeaderboardEntry, Submission};

/// Append a grading attempt and, on a passing verdict, admit the
/// participant to the leaderboard if they are not on it yet.
///
/// Returns `true` when this submission established the participant's
/// leaderboard entry. Resubmission after a pass never moves the entry.
pub async fn record(conn: &mut ConnectionManager, submission: &Submission) -> Result<bool> {
    let log_key = keys::submissions_key(&submission.challenge_id, &submission.participant);
    let doc = serde_json::to_string(submission)?;
    let _: () = conn.rpush(log_key, doc).await?;

    if !submission.verdict.passed {
        return Ok(false);
    }

    let admitted: i64 = redis::cmd("ZADD")
        .arg(keys::leaderboard_key(&submission.challenge_id))
        .arg("NX")
        .arg(submission.submitted_at.timestamp_millis())
        .arg(&submission.participant)
        .query_async(conn)
        .await?;
    Ok(admitted == 1)
}

/// Leaderboard for a challenge, ordered by first-pass time ascending.
pub async fn leaderboard(
    conn: &mut ConnectionManager,
    challenge_id: &str,
) -> Result<Vec<LeaderboardEntry>> {
    let rows: Vec<(String, f64)> = conn
        .zrange_withscores(keys::leaderboard_key(challenge_id), 0, -1)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(participant, score)| {
            let first_passed_at = millis_to_utc(score as i64)?;
            Some(LeaderboardEntry {
                participant,
                first_passed_at,
            })
        })
        .collect())
}

/// Administrative removal. Deletes only the leaderboard entry; the
/// submission history stays, and a later passing resubmission may
/// re-establish an entry.
pub async fn remove_from_leaderboard(
    conn: &mut ConnectionManager,
    challenge_id: &str,
    participant: &str,
) -> Result<bool> {
    let removed: i64 = conn
        .zrem(keys::leaderboard_key(challenge_id), participant)
        .await?;
    Ok(removed == 1)
}

/// Full submission history for one participant on one challenge, in
/// request order.
pub async fn submissions(
    conn: &mut ConnectionManager,
    challenge_id: &str,
    participant: &str,
) -> Result<Vec<Submission>> {
    let raw: Vec<String> = conn
        .lrange(keys::submissions_key(challenge_id, participant), 0, -1)
        .await?;
    raw.iter()
        .map(|doc| serde_json::from_str(doc).map_err(GraderError::from))
        .collect()
}

/// Replay data of the participant's most recent passing submission,
/// released only once the challenge's solutions date has elapsed.
/// A challenge without a release date never releases replays.
pub async fn released_replay(
    conn: &mut ConnectionManager,
    challenge: &Challenge,
    participant: &str,
    today: NaiveDate,
) -> Result<Option<Value>> {
    match challenge.solutions_available {
        Some(date) if date <= today => {}
        _ => return Err(GraderError::SolutionsNotAvailable(challenge.id.clone())),
    }

    let history = submissions(conn, &challenge.id, participant).await?;
    Ok(history
        .into_iter()
        .rev()
        .find(|s| s.verdict.passed)
        .map(|s| s.replay))
}

fn millis_to_utc(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
