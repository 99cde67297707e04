//! Challenge Registry - the catalog of gradable problems.
//!
//! Challenges live as JSON documents under `grader:challenge:{id}` with
//! an explicit catalog order in the `grader:challenges:order` list. The
//! order list is the only source of catalog position; it is replaced
//! atomically on reorder and can be rebuilt from the record keys when
//! empty or lost.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::{GraderError, Result};
use crate::keys;
use crate::types::{Challenge, ChallengePatch, ChallengeView, Visibility};

/// Create a new challenge. Fails if the id is already taken; ids are
/// immutable once assigned.
pub async fn create(conn: &mut ConnectionManager, challenge: &Challenge) -> Result<()> {
    let key = keys::challenge_key(&challenge.id);
    let doc = serde_json::to_string(challenge)?;

    // SET NX is the existence check and the write in one step.
    let created: Option<String> = redis::cmd("SET")
        .arg(&key)
        .arg(doc)
        .arg("NX")
        .query_async(conn)
        .await?;
    if created.is_none() {
        return Err(GraderError::ChallengeExists(challenge.id.clone()));
    }

    // Append to the catalog order; LREM first keeps the list duplicate-free
    // if a create races a repair.
    let _: () = redis::pipe()
        .atomic()
        .lrem(keys::ORDER_KEY, 0, &challenge.id)
        .rpush(keys::ORDER_KEY, &challenge.id)
        .query_async(conn)
        .await?;
    Ok(())
}

pub async fn get(conn: &mut ConnectionManager, id: &str) -> Result<Option<Challenge>> {
    let doc: Option<String> = conn.get(keys::challenge_key(id)).await?;
    match doc {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Apply a partial edit. Test cases, when present in the patch, replace
/// the stored list wholesale.
pub async fn update(conn: &mut ConnectionManager, id: &str, patch: ChallengePatch) -> Result<Challenge> {
    let mut challenge = get(conn, id)
        .await?
        .ok_or_else(|| GraderError::ChallengeNotFound(id.to_string()))?;
    patch.apply(&mut challenge);

    let doc = serde_json::to_string(&challenge)?;
    let _: () = conn.set(keys::challenge_key(id), doc).await?;
    Ok(challenge)
}

/// Delete a challenge record, its catalog position, and its leaderboard.
/// Submission logs are append-only history and stay untouched.
pub async fn delete(conn: &mut ConnectionManager, id: &str) -> Result<()> {
    let existed: bool = conn.exists(keys::challenge_key(id)).await?;
    if !existed {
        return Err(GraderError::ChallengeNotFound(id.to_string()));
    }
    let _: () = redis::pipe()
        .atomic()
        .del(keys::challenge_key(id))
        .lrem(keys::ORDER_KEY, 0, id)
        .del(keys::leaderboard_key(id))
        .query_async(conn)
        .await?;
    Ok(())
}

/// List challenges in catalog order.
///
/// Participant visibility drops challenges that are inactive or
/// unpublished. If the order list is empty while records exist, the
/// catalog is repaired first (lexicographic order, persisted back).
pub async fn list(conn: &mut ConnectionManager, visibility: Visibility) -> Result<Vec<Challenge>> {
    let mut order: Vec<String> = conn.lrange(keys::ORDER_KEY, 0, -1).await?;
    if order.is_empty() {
        order = repair_order(conn).await?;
    }

    let mut challenges = Vec::with_capacity(order.len());
    for id in &order {
        // Stale order entries (deleted records) are skipped, not errors.
        if let Some(ch) = get(conn, id).await? {
            let visible = match visibility {
                Visibility::Admin => true,
                Visibility::Participant => ch.active && ch.published,
            };
            if visible {
                challenges.push(ch);
            }
        }
    }
    Ok(challenges)
}

/// Participant-facing catalog: ordered, filtered, expected outputs
/// stripped.
pub async fn list_participant(conn: &mut ConnectionManager) -> Result<Vec<ChallengeView>> {
    let challenges = list(conn, Visibility::Participant).await?;
    Ok(challenges.iter().map(ChallengeView::from).collect())
}

/// Replace the entire catalog order atomically. Ids absent from `ids`
/// drop out of the ordering; the challenge records themselves survive.
pub async fn reorder(conn: &mut ConnectionManager, ids: &[String]) -> Result<()> {
    let mut pipe = redis::pipe();
    pipe.atomic().del(keys::ORDER_KEY);
    if !ids.is_empty() {
        pipe.rpush(keys::ORDER_KEY, ids);
    }
    let _: () = pipe.query_async(conn).await?;
    Ok(())
}

/// Rebuild the catalog order by scanning stored records. Idempotent;
/// produces a stable lexicographic order and persists it as canonical.
pub async fn repair_order(conn: &mut ConnectionManager) -> Result<Vec<String>> {
    let mut ids: Vec<String> = Vec::new();
    {
        let mut iter = conn.scan_match::<_, String>(keys::challenge_pattern()).await?;
        while let Some(key) = iter.next_item().await {
            if let Some(id) = keys::id_from_challenge_key(&key) {
                ids.push(id.to_string());
            }
        }
    }
    ids.sort();

    if !ids.is_empty() {
        let _: () = redis::pipe()
            .atomic()
            .del(keys::ORDER_KEY)
            .rpush(keys::ORDER_KEY, &ids)
            .query_async(conn)
            .await?;
    }
    Ok(ids)
}
