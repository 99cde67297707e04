mod commands;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "grader-cli")]
#[command(about = "Grader CLI - Manage the challenge catalog and leaderboards", long_about = None)]
struct Cli {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new challenge
    Create {
        /// Challenge id (lowercase letters, digits, dashes)
        #[arg(short, long)]
        id: String,

        /// Challenge title
        #[arg(short, long)]
        title: String,

        /// Path to a Markdown file with the problem statement
        #[arg(short, long)]
        prompt_file: Option<String>,

        /// Name of the function the grader calls
        #[arg(short, long, default_value = "solve")]
        entry_point: String,

        /// Path to a JSON file with the test case list
        #[arg(long)]
        tests_file: Option<String>,

        /// Create the challenge as inactive
        #[arg(long, default_value = "false")]
        inactive: bool,

        /// Create the challenge as unpublished
        #[arg(long, default_value = "false")]
        unpublished: bool,

        /// Date (YYYY-MM-DD) after which solution replays are released
        #[arg(long)]
        solutions_date: Option<NaiveDate>,
    },

    /// Edit fields of an existing challenge
    Update {
        #[arg(short, long)]
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        prompt_file: Option<String>,

        #[arg(short, long)]
        entry_point: Option<String>,

        /// Replaces the whole test case list
        #[arg(long)]
        tests_file: Option<String>,

        #[arg(long)]
        active: Option<bool>,

        #[arg(long)]
        published: Option<bool>,

        #[arg(long)]
        solutions_date: Option<NaiveDate>,

        /// Clear the release date so replays are never released
        #[arg(long, default_value = "false")]
        clear_solutions_date: bool,
    },

    /// Delete a challenge (submission history is kept)
    Delete {
        #[arg(short, long)]
        id: String,
    },

    /// List the challenge catalog in order
    List {
        /// Show hidden challenges and test case counts
        #[arg(long, default_value = "false")]
        all: bool,
    },

    /// Replace the catalog order with the given id sequence
    Reorder {
        /// Complete ordered id list; omitted ids drop from the catalog
        ids: Vec<String>,
    },

    /// Rebuild the catalog order from stored challenge records
    RepairOrder,

    /// Show the leaderboard for a challenge
    Leaderboard {
        #[arg(short, long)]
        id: String,
    },

    /// Remove a participant from a leaderboard
    RemoveEntry {
        #[arg(short, long)]
        id: String,

        #[arg(short, long)]
        participant: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = redis::Client::open(cli.redis_url.as_str())?;
    let mut conn = redis::aio::ConnectionManager::new(client).await?;

    match cli.command {
        Commands::Create {
            id,
            title,
            prompt_file,
            entry_point,
            tests_file,
            inactive,
            unpublished,
            solutions_date,
        } => {
            commands::create(
                &mut conn,
                commands::CreateArgs {
                    id,
                    title,
                    prompt_file,
                    entry_point,
                    tests_file,
                    active: !inactive,
                    published: !unpublished,
                    solutions_date,
                },
            )
            .await
        }
        Commands::Update {
            id,
            title,
            prompt_file,
            entry_point,
            tests_file,
            active,
            published,
            solutions_date,
            clear_solutions_date,
        } => {
            commands::update(
                &mut conn,
                &id,
                commands::UpdateArgs {
                    title,
                    prompt_file,
                    entry_point,
                    tests_file,
                    active,
                    published,
                    solutions_date,
                    clear_solutions_date,
                },
            )
            .await
        }
        Commands::Delete { id } => commands::delete(&mut conn, &id).await,
        Commands::List { all } => commands::list(&mut conn, all).await,
        Commands::Reorder { ids } => commands::reorder(&mut conn, ids).await,
        Commands::RepairOrder => commands::repair_order(&mut conn).await,
        Commands::Leaderboard { id } => commands::leaderboard(&mut conn, &id).await,
        Commands::RemoveEntry { id, participant } => {
            commands::remove_entry(&mut conn, &id, &participant).await
        }
    }
}
