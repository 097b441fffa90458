//! FactorLab Runner: metrics, walk-forward runner, job store, worker.
//!
//! This crate builds on `factorlab-core` to provide:
//! - Performance metrics over daily or monthly return series
//! - The walk-forward model strategy
//! - The `JobStore` trait with in-memory and PostgREST adapters
//! - Market-data download (Yahoo chart API) and store-first price loading
//! - Strategy dispatch with the deterministic synthetic fallback
//! - The polling worker, price ingestion and local artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod ingest;
pub mod market_data;
pub mod metrics;
pub mod result;
pub mod runner;
pub mod store;
pub mod synthetic;
pub mod walk_forward;
pub mod worker;

pub use config::{ConfigError, EngineConfig};
pub use data_loader::{load_prices, LoadError, LoadedPrices, PriceSource};
pub use ingest::{ingest_prices, IngestError, IngestSummary};
pub use market_data::{MarketDataClient, MarketDataError, YahooClient};
pub use metrics::PerformanceMetrics;
pub use result::{BacktestResult, EquityRow, ModelMetadata, PredictionRow, ResultOrigin};
pub use runner::Dispatcher;
pub use store::{Job, JobStore, MemoryStore, PostgrestStore, Run, Status, StoreError};
pub use walk_forward::{run_walk_forward, WalkForwardConfig};
pub use worker::{JobOutcome, Worker};
