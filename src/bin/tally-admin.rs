use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use tally::analytics::SnapshotService;
use tally::config::{Config, DatabaseBackend};
use tally::storage::{PostgresStorage, SqliteStorage, Storage};

#[derive(Parser)]
#[command(name = "tally-admin")]
#[command(about = "Tally analytics admin CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot management
    Snapshots {
        #[command(subcommand)]
        command: SnapshotCommands,
    },
}

#[derive(Subcommand)]
enum SnapshotCommands {
    /// Create daily snapshots for all active businesses
    Run {
        /// Target date (YYYY-MM-DD), defaults to yesterday
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Backfill one snapshot for a single business
    Backfill {
        /// Business ID
        business_id: i64,
        /// Target date (YYYY-MM-DD)
        date: NaiveDate,
    },
    /// Delete snapshots older than the retention window
    Cleanup {
        /// Override the configured retention window
        #[arg(long)]
        retention_days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => Arc::new(
            SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
        DatabaseBackend::Postgres => Arc::new(
            PostgresStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
    };

    // Ensure database is initialized
    storage.init().await?;

    let snapshots = Arc::new(SnapshotService::new(
        storage,
        config.analytics.snapshot_retention_days,
    ));

    match cli.command {
        Commands::Snapshots { command } => match command {
            SnapshotCommands::Run { date } => {
                // Ctrl-C stops the job cleanly between businesses.
                let job = Arc::clone(&snapshots);
                let canceller = Arc::clone(&snapshots);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        canceller.request_shutdown().await;
                    }
                });

                let created =
                    tokio::spawn(async move { job.create_daily_snapshots(date).await }).await??;
                println!("✓ Created {} snapshots", created);
            }
            SnapshotCommands::Backfill { business_id, date } => {
                match snapshots.create_business_snapshot(business_id, date).await? {
                    Some(snapshot) => println!(
                        "✓ Created snapshot for business {} on {} ({} views, {} reviews)",
                        business_id, date, snapshot.total_views, snapshot.total_reviews
                    ),
                    None => println!(
                        "⚠ Snapshot for business {} on {} already exists",
                        business_id, date
                    ),
                }
            }
            SnapshotCommands::Cleanup { retention_days } => {
                let deleted = snapshots.cleanup(retention_days).await?;
                println!("✓ Removed {} snapshots past retention", deleted);
            }
        },
    }

    Ok(())
}
