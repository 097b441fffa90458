//! Price acquisition for a run.
//!
//! Policy:
//! 1. Read the store's price table for the window.
//! 2. If the read fails, is empty, or has fewer rows than the caller needs,
//!    download the same window from the market-data client.
//! 3. A download with fewer than `MIN_DOWNLOAD_ROWS` rows is an error.

use chrono::NaiveDate;
use factorlab_core::domain::PriceTable;
use factorlab_core::strategies::MIN_BASELINE_ROWS;
use factorlab_core::EngineError;
use thiserror::Error;
use tracing::{debug, warn};

use crate::market_data::{MarketDataClient, MarketDataError};
use crate::store::JobStore;

/// Stored rows a baseline run accepts without downloading.
pub const MIN_BASELINE_STORE_ROWS: usize = MIN_BASELINE_ROWS;

/// Stored rows a model run accepts without downloading (about one year).
pub const MIN_MODEL_STORE_ROWS: usize = 260;

/// Smallest acceptable download.
pub const MIN_DOWNLOAD_ROWS: usize = 40;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("price download failed: {0}")]
    Download(#[from] MarketDataError),

    #[error("downloaded {rows} price rows, need at least {min}")]
    Insufficient { rows: usize, min: usize },
}

impl From<LoadError> for EngineError {
    fn from(err: LoadError) -> Self {
        let message = err.to_string();
        match err {
            LoadError::Download(MarketDataError::NoData { .. }) => EngineError::NoData(message),
            _ => EngineError::InsufficientData(message),
        }
    }
}

/// Where a price table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Store,
    Download,
}

#[derive(Debug, Clone)]
pub struct LoadedPrices {
    pub table: PriceTable,
    pub source: PriceSource,
}

/// Load a price table for `tickers` over `[start, end]`.
///
/// `min_store_rows` is the smallest stored table accepted before falling
/// back to a download.
pub fn load_prices(
    store: &dyn JobStore,
    market: &dyn MarketDataClient,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
    min_store_rows: usize,
) -> Result<LoadedPrices, LoadError> {
    match store.fetch_price_table(tickers, start, end) {
        Ok(table) if !table.is_empty() && table.len() >= min_store_rows => {
            debug!(rows = table.len(), "using stored prices");
            return Ok(LoadedPrices {
                table,
                source: PriceSource::Store,
            });
        }
        Ok(table) => {
            debug!(
                rows = table.len(),
                min = min_store_rows,
                "stored prices too short, downloading"
            );
        }
        Err(e) => {
            warn!(error = %e, "stored prices unreadable, downloading");
        }
    }

    let table = market.download_prices(tickers, start, end)?;
    if table.len() < MIN_DOWNLOAD_ROWS {
        return Err(LoadError::Insufficient {
            rows: table.len(),
            min: MIN_DOWNLOAD_ROWS,
        });
    }
    debug!(rows = table.len(), provider = market.name(), "using downloaded prices");
    Ok(LoadedPrices {
        table,
        source: PriceSource::Download,
    })
}
