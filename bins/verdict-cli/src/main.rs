mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "verdict-cli")]
#[command(about = "Verdict CLI - Seed test cases, submit code and inspect the host toolchain", long_about = None)]
struct Cli {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379", global = true)]
    redis_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load problem fixtures (<path>/<problem>/tests/{inputs,outputs}) into the test-case cache
    LoadTestcases {
        /// Directory containing one subdirectory per problem
        #[arg(short, long)]
        path: PathBuf,
    },

    /// Queue a source file for judging
    Submit {
        /// Language tag (java, javascript, js)
        #[arg(short, long)]
        language: String,

        /// Source file to submit
        #[arg(short, long)]
        file: PathBuf,

        /// Problem whose test cases the submission is judged against
        #[arg(short = 'n', long)]
        problem_name: String,

        /// Numeric problem identifier echoed back in the result
        #[arg(long, default_value = "0")]
        problem_id: i64,

        /// User identifier echoed back in the result
        #[arg(short, long, default_value = "")]
        user_id: String,
    },

    /// Print the resolved paths of java, javac and node
    Discover {
        /// Emit JSON instead of a table
        #[arg(long, default_value = "false")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::LoadTestcases { path } => {
            commands::load_testcases(&cli.redis_url, &path).await?;
        }
        Commands::Submit {
            language,
            file,
            problem_name,
            problem_id,
            user_id,
        } => {
            commands::submit(
                &cli.redis_url,
                &language,
                &file,
                &problem_name,
                problem_id,
                &user_id,
            )
            .await?;
        }
        Commands::Discover { json } => {
            commands::discover(json)?;
        }
    }

    Ok(())
}
