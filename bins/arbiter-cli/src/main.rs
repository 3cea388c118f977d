mod commands;

use anyhow::Result;
use arbiter_common::config::Settings;
use arbiter_common::fixtures::FixtureStore;
use arbiter_common::redis::RedisStore;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arbiter-cli")]
#[command(about = "Arbiter CLI - Manage problems, contests, test fixtures and standings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or replace a problem from a JSON file
    PutProblem {
        /// Path to the problem JSON
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Create or replace a contest from a JSON file
    PutContest {
        /// Path to the contest JSON
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Pair input/output files in a directory and add them as test cases
    ImportFixtures {
        /// Problem id receiving the test cases
        #[arg(short, long)]
        problem: String,

        /// Directory scanned recursively for fixture files
        #[arg(short, long)]
        dir: PathBuf,

        /// Only print the pairs that would be imported
        #[arg(long, default_value = "false")]
        dry_run: bool,
    },

    /// Print the current standings of a contest
    Scoreboard {
        /// Contest id
        #[arg(short, long)]
        contest: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr so command output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::PutProblem { file } => {
            let store = RedisStore::connect(&settings.redis_url).await?;
            commands::put_problem(&store, &file).await?;
        }
        Commands::PutContest { file } => {
            let store = RedisStore::connect(&settings.redis_url).await?;
            commands::put_contest(&store, &file).await?;
        }
        Commands::ImportFixtures {
            problem,
            dir,
            dry_run,
        } => {
            let pairs = commands::preview_fixtures(&dir)?;
            if dry_run {
                println!("\n💡 Dry run - nothing imported");
                return Ok(());
            }
            let store = RedisStore::connect(&settings.redis_url).await?;
            let fixture_store = FixtureStore::new(&settings.fixture_root);
            commands::import_fixtures(&store, &fixture_store, &problem, &pairs).await?;
        }
        Commands::Scoreboard { contest } => {
            let store = RedisStore::connect(&settings.redis_url).await?;
            print!("{}", commands::show_scoreboard(&store, &contest).await?);
        }
    }

    Ok(())
}
