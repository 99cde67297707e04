// Command implementations for the grader CLI. Talks straight to the
// same Redis structures the server uses, via grader-common.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use redis::aio::ConnectionManager;

use grader_common::registry;
use grader_common::store;
use grader_common::types::{Challenge, ChallengePatch, TestCase, Visibility};

pub struct CreateArgs {
    pub id: String,
    pub title: String,
    pub prompt_file: Option<String>,
    pub entry_point: String,
    pub tests_file: Option<String>,
    pub active: bool,
    pub published: bool,
    pub solutions_date: Option<NaiveDate>,
}

pub struct UpdateArgs {
    pub title: Option<String>,
    pub prompt_file: Option<String>,
    pub entry_point: Option<String>,
    pub tests_file: Option<String>,
    pub active: Option<bool>,
    pub published: Option<bool>,
    pub solutions_date: Option<NaiveDate>,
    pub clear_solutions_date: bool,
}

/// The patch distinguishes "leave the date alone" (`None`) from "clear
/// it" (`Some(None)`).
fn solutions_field(clear: bool, date: Option<NaiveDate>) -> Result<Option<Option<NaiveDate>>> {
    match (clear, date) {
        (true, Some(_)) => bail!("--clear-solutions-date conflicts with --solutions-date"),
        (true, None) => Ok(Some(None)),
        (false, date) => Ok(date.map(Some)),
    }
}

fn read_test_cases(path: &str) -> Result<Vec<TestCase>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read test case file '{}'", path))?;
    let cases: Vec<TestCase> =
        serde_json::from_str(&raw).with_context(|| format!("Invalid test case JSON in '{}'", path))?;
    if cases.is_empty() {
        bail!("Test case file '{}' is empty; a gradable challenge needs at least one case", path);
    }
    Ok(cases)
}

fn read_prompt(path: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read prompt file '{}'", path))
}

pub async fn create(conn: &mut ConnectionManager, args: CreateArgs) -> Result<()> {
    let prompt = match &args.prompt_file {
        Some(path) => read_prompt(path)?,
        None => String::new(),
    };
    let test_cases = match &args.tests_file {
        Some(path) => read_test_cases(path)?,
        None => Vec::new(),
    };

    let challenge = Challenge {
        id: args.id,
        title: args.title,
        prompt,
        entry_point: args.entry_point,
        test_cases,
        active: args.active,
        published: args.published,
        solutions_available: args.solutions_date,
        created_at: Utc::now(),
    };

    registry::create(conn, &challenge).await?;
    println!("✓ Created challenge '{}'", challenge.id);
    if !challenge.is_gradable() {
        println!("  ⚠ No test cases yet - not gradable until some are added");
    }
    Ok(())
}

pub async fn update(conn: &mut ConnectionManager, id: &str, args: UpdateArgs) -> Result<()> {
    let patch = ChallengePatch {
        title: args.title,
        prompt: args.prompt_file.as_deref().map(read_prompt).transpose()?,
        entry_point: args.entry_point,
        test_cases: args.tests_file.as_deref().map(read_test_cases).transpose()?,
        active: args.active,
        published: args.published,
        solutions_available: solutions_field(args.clear_solutions_date, args.solutions_date)?,
    };

    let updated = registry::update(conn, id, patch).await?;
    println!("✓ Updated challenge '{}'", updated.id);
    println!("  title: {}", updated.title);
    println!("  active: {}  published: {}", updated.active, updated.published);
    println!("  test cases: {}", updated.test_cases.len());
    Ok(())
}

pub async fn delete(conn: &mut ConnectionManager, id: &str) -> Result<()> {
    registry::delete(conn, id).await?;
    println!("✓ Deleted challenge '{}' (submission history kept)", id);
    Ok(())
}

pub async fn list(conn: &mut ConnectionManager, all: bool) -> Result<()> {
    let visibility = if all {
        Visibility::Admin
    } else {
        Visibility::Participant
    };
    let challenges = registry::list(conn, visibility).await?;

    if challenges.is_empty() {
        println!("No challenges in the catalog.");
        return Ok(());
    }

    for (idx, ch) in challenges.iter().enumerate() {
        let mut flags = Vec::new();
        if !ch.active {
            flags.push("inactive");
        }
        if !ch.published {
            flags.push("unpublished");
        }
        if !ch.is_gradable() {
            flags.push("no tests");
        }
        let suffix = if flags.is_empty() {
            String::new()
        } else {
            format!("  [{}]", flags.join(", "))
        };
        println!("{:>3}. {}  — {}{}", idx + 1, ch.id, ch.title, suffix);
    }
    Ok(())
}

pub async fn reorder(conn: &mut ConnectionManager, ids: Vec<String>) -> Result<()> {
    if ids.is_empty() {
        bail!("Refusing to replace the catalog order with an empty list; use repair-order instead");
    }
    registry::reorder(conn, &ids).await?;
    println!("✓ Catalog order replaced ({} challenges)", ids.len());
    Ok(())
}

pub async fn repair_order(conn: &mut ConnectionManager) -> Result<()> {
    let ids = registry::repair_order(conn).await?;
    println!("✓ Catalog order rebuilt from {} stored records", ids.len());
    for id in ids {
        println!("  - {}", id);
    }
    Ok(())
}

pub async fn leaderboard(conn: &mut ConnectionManager, id: &str) -> Result<()> {
    let challenge = registry::get(conn, id).await?;
    if challenge.is_none() {
        bail!("Challenge '{}' not found", id);
    }

    let entries = store::leaderboard(conn, id).await?;
    if entries.is_empty() {
        println!("Leaderboard for '{}' is empty.", id);
        return Ok(());
    }

    println!("Leaderboard for '{}':", id);
    for (idx, entry) in entries.iter().enumerate() {
        println!(
            "{:>3}. {}  first passed {}",
            idx + 1,
            entry.participant,
            entry.first_passed_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

pub async fn remove_entry(conn: &mut ConnectionManager, id: &str, participant: &str) -> Result<()> {
    let removed = store::remove_from_leaderboard(conn, id, participant).await?;
    if removed {
        println!("✓ Removed '{}' from the '{}' leaderboard", participant, id);
        println!("  Submission history is untouched; a later pass re-admits them.");
    } else {
        println!("'{}' was not on the '{}' leaderboard", participant, id);
    }
    Ok(())
}
