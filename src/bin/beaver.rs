//! beaver CLI — send the family out for sticks and read back the ledger.

use anyhow::Context;
use beaver_rs::allocator::{AllocationMode, ExcursionStore};
use beaver_rs::config::{Config, QueueSettings};
use beaver_rs::db::Db;
use beaver_rs::model::{Excursion, Job};
use beaver_rs::queue::{JobQueue, QueueStats};
use beaver_rs::storage::MemoryStore;
use beaver_rs::telemetry::{LogFormat, TelemetryConfig, init_telemetry, process_span};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, info};

#[derive(Parser)]
#[command(name = "beaver", about = "Beaver family stick-collecting excursions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the worker pool, seed example jobs, then stop
    Run(RunArgs),
    /// List recorded excursions
    List {
        /// TOML config file (defaults to environment variables)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// TOML config file (defaults to environment variables)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of workers (overrides config)
    #[arg(long)]
    workers: Option<usize>,
    /// Number of example jobs to enqueue
    #[arg(long, default_value_t = 5)]
    jobs: usize,
    /// How long to let the pool run before stopping
    #[arg(long, default_value_t = 1000)]
    duration_ms: u64,
    /// Identifier allocation mode: atomic or racy (overrides config)
    #[arg(long)]
    allocation: Option<AllocationMode>,
    /// Use the in-memory store instead of Postgres
    #[arg(long)]
    memory: bool,
    /// Empty the excursions table before running
    #[arg(long)]
    truncate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::List { config, json } => cmd_list(config, json).await,
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env()?,
    };
    Ok(config)
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    // The in-memory store needs no database URL, so env config is optional there.
    let config = if args.memory && args.config.is_none() {
        None
    } else {
        Some(load_config(args.config.as_ref())?)
    };

    let (telemetry, mut settings) = match &config {
        Some(c) => (
            TelemetryConfig {
                endpoint: c.otel_endpoint.clone(),
                service_name: "beaver".to_string(),
                level: c.log_level.clone(),
                format: c.log_format,
                path: c.log_path.clone(),
            },
            c.queue.clone(),
        ),
        None => (
            TelemetryConfig {
                endpoint: None,
                service_name: "beaver".to_string(),
                level: "info".to_string(),
                format: LogFormat::default(),
                path: None,
            },
            QueueSettings::default(),
        ),
    };
    if let Some(workers) = args.workers {
        settings.workers = workers;
    }
    if let Some(allocation) = args.allocation {
        settings.allocation = allocation;
    }

    let _guard = init_telemetry(telemetry)?;
    let duration = Duration::from_millis(args.duration_ms);

    run_store(config, args, &settings, duration)
        .instrument(process_span())
        .await
}

async fn run_store(
    config: Option<Config>,
    args: RunArgs,
    settings: &QueueSettings,
    duration: Duration,
) -> anyhow::Result<()> {
    match config {
        Some(config) if !args.memory => {
            let db = Db::connect_with(config.database.connect_options()?).await?;
            db.migrate().await?;
            if args.truncate {
                db.truncate_excursions().await?;
            }
            let db = Arc::new(db);
            let stats = run_pool(Arc::clone(&db), settings, args.jobs, duration).await?;
            print_summary(&stats);
            print_table(&db.list_excursions().await?);
        }
        _ => {
            let store = Arc::new(MemoryStore::new());
            let stats = run_pool(Arc::clone(&store), settings, args.jobs, duration).await?;
            print_summary(&stats);
            print_table(&store.list().await);
        }
    }

    Ok(())
}

async fn run_pool<S: ExcursionStore>(
    store: Arc<S>,
    settings: &QueueSettings,
    jobs: usize,
    duration: Duration,
) -> anyhow::Result<QueueStats> {
    let queue = JobQueue::new(store, settings.pool_config());
    queue.start(settings.workers)?;

    for i in 0..jobs {
        queue.enqueue(Job::new(i as i64, format!("Job {i}")));
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted, stopping workers"),
    }

    queue.stop().await;
    Ok(queue.stats())
}

async fn cmd_list(config: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let config = load_config(config.as_ref())?;
    let db = Db::connect_with(config.database.connect_options()?).await?;
    db.migrate().await?;

    let excursions = db.list_excursions().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&excursions)?);
    } else {
        print_table(&excursions);
    }
    Ok(())
}

fn print_summary(stats: &QueueStats) {
    println!(
        "enqueued {}  claimed {}  recorded {}  lost {}",
        stats.enqueued, stats.claimed, stats.recorded, stats.failed
    );
}

fn print_table(excursions: &[Excursion]) {
    if excursions.is_empty() {
        println!("No excursions recorded.");
        return;
    }

    println!("{:<12}  STICKS", "ID");
    println!("{}", "-".repeat(20));
    for excursion in excursions {
        println!(
            "{:<12}  {}",
            excursion.id.to_string(),
            excursion.sticks_collected
        );
    }
    println!("\n{} excursion(s)", excursions.len());
}
