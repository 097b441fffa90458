//! Market-data download: tickers + date range → dense `PriceTable`.
//!
//! The `MarketDataClient` trait is the seam the data loader and price
//! ingestion depend on; `YahooClient` is the live implementation and tests
//! substitute their own.

pub mod circuit_breaker;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use yahoo::YahooClient;

use chrono::NaiveDate;
use factorlab_core::domain::PriceTable;
use thiserror::Error;

/// Errors from a market-data provider.
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider answered HTTP {status}; circuit breaker open for {remaining_secs}s")]
    CircuitBreakerTripped { status: u16, remaining_secs: u64 },

    #[error("no price data returned for {tickers} between {start} and {end}")]
    NoData {
        tickers: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("market data error: {0}")]
    Other(String),
}

/// Download capability for adjusted daily closes.
pub trait MarketDataClient: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Download adjusted closes for `tickers` over `[start, end]`.
    ///
    /// Tickers the provider does not know are left out of the table. An
    /// empty result is `MarketDataError::NoData`.
    fn download_prices(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceTable, MarketDataError>;
}
