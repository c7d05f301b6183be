use anyhow::Result;
use clap::{Parser, Subcommand};
use scorecard_core::Scalar;

#[derive(Debug, Parser)]
#[command(name = "scorecard-cli")]
#[command(about = "College Scorecard extract-rank-load pipeline")]
struct Cli {
    /// Overrides SCORECARD_TOTAL_PAGES.
    #[arg(long, global = true)]
    pages: Option<u32>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch, rank, normalize and load every table.
    Sync,
    /// Fetch and rank, printing the leading institutions.
    Rank {
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Create the destination tables.
    Migrate,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = scorecard_sync::run_sync_once_from_env(cli.pages).await?;
            println!(
                "sync complete: run_id={} fetched={} failed_pages={:?} flattened={}",
                summary.run_id, summary.fetched_records, summary.failed_pages, summary.flattened_rows
            );
            for (table, rows) in &summary.loaded_rows {
                println!("  {table}: {rows}");
            }
        }
        Commands::Rank { top } => {
            let ranked = scorecard_sync::rank_from_env(cli.pages).await?;
            for item in ranked.iter().take(top) {
                let name = item
                    .row
                    .first_of(&["School_Name", "school_name"])
                    .and_then(Scalar::canonical_text)
                    .unwrap_or_else(|| "(unnamed)".to_string());
                let id = item.row.id().and_then(Scalar::canonical_text).unwrap_or_default();
                println!("{:>4}  {:.4}  {id:>8}  {name}", item.rank, item.score);
            }
        }
        Commands::Migrate => {
            scorecard_sync::migrate_from_env().await?;
            println!("destination tables ready");
        }
    }

    Ok(())
}
