//! FactorLab CLI: queue worker, local backtest and price ingestion.
//!
//! Commands:
//! - `worker`: poll the hosted job queue and run claimed backtests
//! - `backtest`: run one strategy locally and write artifacts
//! - `ingest`: download adjusted closes and upsert them into the price table

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use factorlab_core::domain::RunId;
use factorlab_runner::config::parse_tickers;
use factorlab_runner::export::{save_artifacts, summary_text, Manifest};
use factorlab_runner::ingest::{default_window, ingest_prices, SP100_TICKERS};
use factorlab_runner::market_data::{CircuitBreaker, YahooClient};
use factorlab_runner::store::{JobStore, MemoryStore, PostgrestStore};
use factorlab_runner::{Dispatcher, EngineConfig, Worker};

#[derive(Parser)]
#[command(
    name = "factorlab",
    about = "FactorLab: factor backtests, walk-forward models and the job worker"
)]
struct Cli {
    /// Path to a TOML config file. Environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the job queue and process claimed jobs.
    Worker {
        /// Process a single batch and exit.
        #[arg(long, default_value_t = false)]
        once: bool,
    },
    /// Run one strategy locally against downloaded prices.
    Backtest {
        /// Strategy id: equal_weight, momentum_12_1, ml_ridge, ml_lightgbm.
        #[arg(long)]
        strategy: String,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: String,

        /// Run id; also seeds the synthetic fallback.
        #[arg(long)]
        run_id: Option<String>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Download adjusted closes and upsert them into the price table.
    Ingest {
        /// Comma-separated tickers. Defaults to the S&P 100 list.
        #[arg(long)]
        tickers: Option<String>,

        /// Start date (YYYY-MM-DD). Defaults to 3650 days ago.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "factorlab=info,factorlab_runner=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Commands::Worker { once } => run_worker(&config, once),
        Commands::Backtest {
            strategy,
            start,
            end,
            run_id,
            output_dir,
        } => run_backtest(&config, &strategy, &start, &end, run_id, &output_dir),
        Commands::Ingest {
            tickers,
            start,
            end,
        } => run_ingest(&config, tickers, start, end),
    }
}

fn parse_date(value: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid {flag} date '{value}', expected YYYY-MM-DD"))
}

fn market_client() -> Result<YahooClient> {
    let breaker = Arc::new(CircuitBreaker::for_provider());
    YahooClient::new(breaker).context("failed to build market-data client")
}

fn hosted_store(config: &EngineConfig) -> Result<PostgrestStore> {
    let Some(settings) = config.postgrest() else {
        bail!("store is not configured: set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY");
    };
    PostgrestStore::new(&settings).context("failed to build store client")
}

fn run_worker(config: &EngineConfig, once: bool) -> Result<()> {
    let store = hosted_store(config)?;
    let market = market_client()?;
    Worker::new(&store, &market, config).run(once);
    Ok(())
}

fn run_backtest(
    config: &EngineConfig,
    strategy: &str,
    start: &str,
    end: &str,
    run_id: Option<String>,
    output_dir: &Path,
) -> Result<()> {
    let start = parse_date(start, "--start")?;
    let end = parse_date(end, "--end")?;
    if end < start {
        bail!("--end {end} is before --start {start}");
    }
    let run_id = run_id.unwrap_or_else(|| format!("local-{strategy}-{start}-{end}"));

    let store = MemoryStore::new();
    let market = market_client()?;
    let job = store.enqueue_run(&format!("job-{run_id}"), &run_id, strategy, start, end);
    let run = store
        .fetch_run(&job.run_id)?
        .context("queued run missing from the in-memory store")?;

    let result = Dispatcher::new(&store, &market, config)
        .dispatch(&run)
        .with_context(|| format!("backtest {run_id} failed"))?;

    let manifest = Manifest::new(&RunId::new(run_id), strategy, start, end, &result);
    print!("{}", summary_text(&manifest));

    let run_dir = save_artifacts(&manifest, &result, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn run_ingest(
    config: &EngineConfig,
    tickers: Option<String>,
    start: Option<String>,
    end: Option<String>,
) -> Result<()> {
    let tickers = match tickers {
        Some(raw) => parse_tickers(&raw),
        None => SP100_TICKERS.iter().map(|t| t.to_string()).collect(),
    };
    let (default_start, default_end) = default_window(chrono::Utc::now().date_naive());
    let start = start
        .as_deref()
        .map(|s| parse_date(s, "--start"))
        .transpose()?
        .unwrap_or(default_start);
    let end = end
        .as_deref()
        .map(|s| parse_date(s, "--end"))
        .transpose()?
        .unwrap_or(default_end);

    let store = hosted_store(config)?;
    let market = market_client()?;
    let summary = ingest_prices(&store, &market, &tickers, start, end)?;
    println!(
        "Ingested {} rows for {} tickers ({} to {})",
        summary.rows_upserted, summary.tickers_ingested, summary.first_date, summary.last_date
    );
    Ok(())
}
