//! jobq - command-line front end for a SQLite-backed job queue
//!
//! # Usage
//!
//! ```bash
//! # Enqueue a job (any JSON payload)
//! jobq add '{"name": "report", "fail_times": 2}'
//!
//! # Process jobs until Ctrl-C (or until idle with --drain)
//! jobq -v run
//!
//! # Inspect
//! jobq length
//! jobq counts
//! jobq show job-01HZX3K5D6Y8R9S2T4V6W8X0YZ
//! jobq dead
//!
//! # Clean up terminal jobs
//! jobq purge job-01HZX3K5D6Y8R9S2T4V6W8X0YZ
//! jobq purge-dead
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use jobq_core::{JobContext, JobId, Queue, QueueConfig, SqliteConfig, SqliteStore};

mod demo;

use demo::DemoHandler;

/// jobq - persistent retryable job queue
///
/// Jobs live in a SQLite file; several `jobq run` processes may share it.
#[derive(Parser)]
#[command(name = "jobq", version, about = "Persistent retryable job queue")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// SQLite database file
    #[arg(long, env = "JOBQ_DB", default_value = "jobq.db", global = true)]
    db: PathBuf,

    /// Wait this long for another process's write lock
    #[arg(long, default_value_t = 30_000, global = true)]
    busy_timeout_ms: u64,

    /// Queue config as JSON (missing fields take defaults)
    #[arg(long, env = "JOBQ_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a job with a JSON payload
    Add {
        /// Payload, e.g. '{"name": "report", "fail_times": 1}'
        payload: String,
    },

    /// Process jobs with the demo handler
    Run {
        /// Stop once a poll cycle finds nothing to do
        #[arg(long)]
        drain: bool,
    },

    /// Number of stored jobs (all states)
    Length,

    /// Stored jobs per state
    Counts,

    /// Print one job record
    Show { id: JobId },

    /// List dead jobs
    Dead,

    /// Delete a dead or completed job
    Purge { id: JobId },

    /// Delete every dead job
    PurgeDead,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let queue = open_queue(&cli)?;

    match cli.command {
        Commands::Add { payload } => {
            let payload: Value =
                serde_json::from_str(&payload).context("payload must be valid JSON")?;
            let id = queue.add(payload).await?;
            println!("{id}");
        }
        Commands::Run { drain } => run(&queue, drain).await?,
        Commands::Length => println!("{}", queue.length().await?),
        Commands::Counts => print_json(&queue.counts().await?)?,
        Commands::Show { id } => {
            let job = queue
                .get(id)
                .await?
                .with_context(|| format!("job {id} not found"))?;
            print_json(&job)?;
        }
        Commands::Dead => print_json(&queue.dead_jobs().await?)?,
        Commands::Purge { id } => {
            queue.purge(id).await?;
            println!("purged {id}");
        }
        Commands::PurgeDead => println!("purged {}", queue.purge_dead().await?),
    }

    Ok(())
}

fn open_queue(cli: &Cli) -> Result<Queue<Value, SqliteStore>> {
    let config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            QueueConfig::from_json(&json)?
        }
        None => QueueConfig::default(),
    };

    let store = SqliteStore::open_with_config(SqliteConfig {
        busy_timeout: Duration::from_millis(cli.busy_timeout_ms),
        ..SqliteConfig::new(&cli.db)
    })
    .with_context(|| format!("opening {}", cli.db.display()))?;

    Ok(Queue::new(Arc::new(store), config)?)
}

async fn run(queue: &Queue<Value, SqliteStore>, drain: bool) -> Result<()> {
    let handler = DemoHandler;
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, finishing current batch");
                cancel.cancel();
            }
        });
    }

    if drain {
        let ctx = JobContext::new(cancel.clone());
        let mut processed = 0;
        while !cancel.is_cancelled() {
            let claimed = queue.run_once(&handler, &ctx).await?;
            if claimed == 0 {
                break;
            }
            processed += claimed;
        }
        info!(processed, "queue drained");
        return Ok(());
    }

    queue.run(&handler, cancel).await?;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}
