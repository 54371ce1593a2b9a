use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobmart-cli")]
#[command(about = "Job postings warehouse command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Rebuild every warehouse table from the configured raw sources.
    Run {
        /// Processing date stamped on staged postings (YYYY-MM-DD); defaults to today (UTC).
        #[arg(long)]
        run_date: Option<NaiveDate>,
    },
    /// Apply the warehouse schema migrations to DATABASE_URL.
    Migrate,
    /// Summarize the most recent runs under reports/.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
        #[arg(long)]
        workspace_root: Option<PathBuf>,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run { run_date: None }) {
        Commands::Run { run_date } => {
            let summary = jobmart_sync::run_once_from_env(run_date).await?;
            println!(
                "run complete: run_id={} run_date={} staged={} postings={} loaded={} reports={}",
                summary.run_id,
                summary.run_date,
                summary.staged_rows,
                summary
                    .tables
                    .get(jobmart_sync::FACT_JOB_POSTINGS)
                    .copied()
                    .unwrap_or_default(),
                summary.warehouse_loaded,
                summary.reports_dir
            );
        }
        Commands::Migrate => {
            jobmart_sync::migrate_from_env().await?;
            tracing::info!("warehouse migrations applied");
        }
        Commands::Report {
            runs,
            workspace_root,
        } => {
            println!("{}", jobmart_sync::report_recent_runs(runs, workspace_root)?);
        }
    }

    Ok(())
}
