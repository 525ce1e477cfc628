mod config;
mod database;
mod engine;
mod error;
mod exchange;
mod ml;
mod store;
mod types;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::{load_config, render_config, LearnerConfig};
use database::Database;
use engine::{CandleSync, FanoutSink, LoopController, ObservationSink, OnlineLearner, TracingSink};
use exchange::BinanceClient;
use ml::{KMeansBackend, LogisticBackend, ModelRegistry, ModelSlot, ModelStore};
use store::{CandleStore, ResumeStateStore};

#[derive(Parser)]
#[command(name = "candle-learner")]
#[command(version = "0.1.0")]
#[command(about = "Online next-candle direction learner with drift-driven retraining", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Override the configured symbol
    #[arg(short, long, global = true)]
    symbol: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap missing models, then run the online learning loop
    Run,
    /// Sync candles from Binance into the candle store
    Fetch {
        /// Stop after the history backfill instead of switching to live mode
        #[arg(long)]
        backfill_only: bool,
    },
    /// Train any missing model and exit
    Bootstrap,
    /// Show store, cursor and model status
    Status,
    /// Print cluster ids of the most recent candles
    Cluster {
        /// Number of candles
        #[arg(short, long, default_value = "24")]
        last: u32,
    },
    /// Print the effective configuration
    Config,
}

fn init_tracing(verbose: bool, json: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = if json { builder.json().try_init() } else { builder.try_init() };
    result.map_err(|e| anyhow!("failed to initialize logging: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs)?;

    info!("Candle Learner v0.1.0");

    let mut config = load_config(&cli.config)?;
    if let Some(symbol) = cli.symbol {
        config.symbol = symbol.to_uppercase();
    }

    match cli.command {
        Commands::Run => run_learner(&config).await?,
        Commands::Fetch { backfill_only } => run_fetcher(&config, backfill_only).await?,
        Commands::Bootstrap => run_bootstrap(&config).await?,
        Commands::Status => show_status(&config).await?,
        Commands::Cluster { last } => show_clusters(&config, last).await?,
        Commands::Config => print!("{}", render_config(&config)?),
    }

    Ok(())
}

async fn open_registry(config: &LearnerConfig) -> Result<Arc<ModelRegistry>> {
    let store = ModelStore::new(&config.models_dir);
    store.ensure_models_dir()?;
    let registry = ModelRegistry::new(
        store,
        Arc::new(LogisticBackend::default()),
        Arc::new(KMeansBackend::default()),
    );
    registry.load_if_present().await;
    Ok(Arc::new(registry))
}

fn build_learner(config: &LearnerConfig, db: Arc<Database>, registry: Arc<ModelRegistry>) -> OnlineLearner {
    let mut sinks: Vec<Arc<dyn ObservationSink>> = vec![Arc::new(TracingSink)];
    if config.learning.record_observations {
        sinks.push(db.clone());
    }

    OnlineLearner::new(
        config.symbol.clone(),
        config.learning.clone(),
        db.clone(),
        db,
        registry,
        Arc::new(FanoutSink::new(sinks)),
    )
}

async fn run_learner(config: &LearnerConfig) -> Result<()> {
    info!("Starting online learner for {}", config.symbol);

    let db = Arc::new(Database::new(&config.database_url).await?);
    let registry = open_registry(config).await?;
    let controller = Arc::new(LoopController::new());
    let mut learner = build_learner(config, db, registry).with_controller(controller.clone());

    let mut phases = controller.subscribe();
    tokio::spawn(async move {
        while let Ok(phase) = phases.recv().await {
            info!("Learning loop entered {}", phase);
        }
    });

    tokio::select! {
        result = learner.run() => {
            if let Err(e) = result {
                error!("Learning loop aborted: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            controller.stop();
        }
    }

    let state = controller.get_state().await;
    info!(
        "Processed {} candles ({} observations), {} classifier and {} clusterer retrains in {}s",
        state.candles_processed,
        state.observations,
        state.classifier_retrains,
        state.clusterer_retrains,
        state.uptime_seconds
    );
    Ok(())
}

async fn run_fetcher(config: &LearnerConfig, backfill_only: bool) -> Result<()> {
    let db = Arc::new(Database::new(&config.database_url).await?);
    let client = Arc::new(BinanceClient::new(
        &config.fetcher.base_url,
        config.fetcher.requests_per_second,
    ));
    let sync = CandleSync::new(config.symbol.clone(), &config.fetcher, client, db)?;

    tokio::select! {
        result = sync.backfill() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received during backfill");
            return Ok(());
        }
    }

    if backfill_only {
        return Ok(());
    }

    tokio::select! {
        _ = sync.run_live() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }
    Ok(())
}

async fn run_bootstrap(config: &LearnerConfig) -> Result<()> {
    let db = Arc::new(Database::new(&config.database_url).await?);
    let registry = open_registry(config).await?;
    let mut learner = build_learner(config, db, registry);

    let report = learner.bootstrap().await?;
    println!("\n=== Bootstrap: {} ===", config.symbol);
    println!("Classifier trained: {}", report.classifier_trained);
    println!("Clusterer trained:  {}", report.clusterer_trained);
    Ok(())
}

async fn show_status(config: &LearnerConfig) -> Result<()> {
    let db = Database::new(&config.database_url).await?;
    let registry = open_registry(config).await?;
    let symbol = &config.symbol;

    println!("\n=== Status: {} ===", symbol);
    println!("Candles:        {}", db.count(symbol).await?);
    match db.max_close_time(symbol).await? {
        Some(t) => println!("Latest close:   {}", t),
        None => println!("Latest close:   -"),
    }
    match db.get_cursor(symbol).await? {
        Some(t) => println!("Cursor:         {}", t),
        None => println!("Cursor:         not set"),
    }

    for slot in ModelSlot::all() {
        match (registry.version(slot).await, registry.metrics(slot).await) {
            (Some(version), Some(metrics)) => {
                let accuracy = metrics
                    .accuracy
                    .map(|a| format!(", training accuracy {:.1}%", a * 100.0))
                    .unwrap_or_default();
                println!(
                    "{:<15} v{} ({} samples{})",
                    format!("{}:", slot),
                    version,
                    metrics.train_samples,
                    accuracy
                );
            }
            _ => println!("{:<15} absent", format!("{}:", slot)),
        }
    }

    let recent = db.recent_observations(symbol, 500).await?;
    if !recent.is_empty() {
        let hits = recent.iter().filter(|o| o.is_hit()).count();
        println!(
            "Accuracy:       {:.1}% over last {} observations",
            hits as f64 / recent.len() as f64 * 100.0,
            recent.len()
        );
    }
    Ok(())
}

async fn show_clusters(config: &LearnerConfig, last: u32) -> Result<()> {
    let db = Database::new(&config.database_url).await?;
    let registry = open_registry(config).await?;
    let candles = db.latest_candles(&config.symbol, last).await?;

    println!("\n=== Clusters: {} (last {}) ===", config.symbol, candles.len());
    for candle in &candles {
        let cluster = registry
            .predict_cluster(&ml::CandleFeatures::from_candle(candle))
            .await?;
        println!(
            "{}  O {:>12}  C {:>12}  V {:>14}  cluster {}",
            candle.close_time.format("%Y-%m-%d %H:%M"),
            candle.open,
            candle.close,
            candle.volume,
            cluster
        );
    }
    Ok(())
}
