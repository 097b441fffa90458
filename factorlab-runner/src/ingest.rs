//! Price ingestion: download adjusted closes and upsert them into the store.

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::info;

use crate::market_data::{MarketDataClient, MarketDataError};
use crate::store::{IngestLog, JobStore, PriceRow, StoreError};

/// Source key of the ingestion log row.
pub const INGEST_SOURCE: &str = "yfinance_sp100";

/// Days of history ingested when no start date is given.
pub const DEFAULT_LOOKBACK_DAYS: u64 = 3650;

/// S&P 100 constituents ingested by default.
pub const SP100_TICKERS: [&str; 97] = [
    "AAPL", "ABBV", "ABT", "ACN", "ADBE", "AIG", "AMD", "AMGN", "AMT", "AMZN", "AVGO", "AXP",
    "BA", "BAC", "BK", "BKNG", "BLK", "BMY", "C", "CAT", "CHTR", "CL", "CMCSA", "COF", "COP",
    "COST", "CRM", "CSCO", "CVS", "CVX", "DE", "DHR", "DIS", "DUK", "EMR", "F", "GD", "GE",
    "GILD", "GM", "GOOG", "GOOGL", "GS", "HD", "HON", "IBM", "INTC", "INTU", "JNJ", "JPM", "KHC",
    "KO", "LIN", "LLY", "LMT", "LOW", "MA", "MCD", "MDLZ", "MDT", "MET", "META", "MMM", "MO",
    "MRK", "MS", "MSFT", "NEE", "NFLX", "NKE", "NVDA", "ORCL", "PEP", "PFE", "PG", "PM", "QCOM",
    "RTX", "SBUX", "SCHW", "SO", "SPG", "T", "TGT", "TMO", "TMUS", "TSLA", "TXN", "UNH", "UNP",
    "UPS", "USB", "V", "VZ", "WFC", "WMT", "XOM",
];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no tickers provided for ingestion")]
    NoTickers,

    #[error(transparent)]
    MarketData(#[from] MarketDataError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Summary of one ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub tickers_ingested: usize,
    pub rows_upserted: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

/// Default `[start, end]`: the last `DEFAULT_LOOKBACK_DAYS` days up to `today`.
pub fn default_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today
        .checked_sub_days(chrono::Days::new(DEFAULT_LOOKBACK_DAYS))
        .unwrap_or(today);
    (start, today)
}

/// Download `tickers` over `[start, end]`, upsert every present close and
/// record an ingestion log row dated by the table's first and last dates.
pub fn ingest_prices(
    store: &dyn JobStore,
    market: &dyn MarketDataClient,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<IngestSummary, IngestError> {
    let tickers: Vec<String> = tickers
        .iter()
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect();
    if tickers.is_empty() {
        return Err(IngestError::NoTickers);
    }

    info!(tickers = tickers.len(), %start, %end, "downloading prices");
    let table = market.download_prices(&tickers, start, end)?;
    let (Some(&first_date), Some(&last_date)) = (table.dates().first(), table.dates().last())
    else {
        return Err(MarketDataError::NoData {
            tickers: tickers.join(","),
            start,
            end,
        }
        .into());
    };

    let rows: Vec<PriceRow> = table
        .observations()
        .map(|(ticker, date, adj_close)| PriceRow {
            ticker: ticker.to_uppercase(),
            date,
            adj_close,
        })
        .collect();
    let rows_upserted = store.upsert_prices(&rows)?;

    let summary = IngestSummary {
        tickers_ingested: table.width(),
        rows_upserted,
        first_date,
        last_date,
    };
    store.record_ingest(&IngestLog {
        source: INGEST_SOURCE.to_string(),
        tickers_ingested: summary.tickers_ingested,
        rows_upserted,
        start_date: first_date,
        end_date: last_date,
        last_updated_at: Utc::now(),
    })?;

    info!(
        rows = rows_upserted,
        tickers = summary.tickers_ingested,
        %first_date,
        %last_date,
        "prices ingested"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use factorlab_core::domain::PriceTable;

    struct FixedMarket;

    impl MarketDataClient for FixedMarket {
        fn name(&self) -> &str {
            "fixed"
        }

        fn download_prices(
            &self,
            tickers: &[String],
            start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<PriceTable, MarketDataError> {
            let next = start + chrono::Days::new(1);
            let mut obs = vec![(tickers[0].clone(), start, 10.0), (tickers[0].clone(), next, 11.0)];
            if let Some(second) = tickers.get(1) {
                // Second ticker only on the later date.
                obs.push((second.clone(), next, 20.0));
            }
            Ok(PriceTable::from_observations(obs))
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn upserts_present_cells_and_logs() {
        let store = MemoryStore::new();
        let summary = ingest_prices(
            &store,
            &FixedMarket,
            &[" aapl".into(), "msft".into()],
            d("2024-01-02"),
            d("2024-01-10"),
        )
        .unwrap();
        assert_eq!(summary.tickers_ingested, 2);
        assert_eq!(summary.rows_upserted, 3);
        assert_eq!(store.price_count(), 3);

        let log = store.ingest_log("yfinance_sp100").unwrap();
        assert_eq!(log.source, INGEST_SOURCE);
        assert_eq!(log.start_date, d("2024-01-02"));
        assert_eq!(log.end_date, d("2024-01-03"));
        assert_eq!(log.rows_upserted, 3);
    }

    #[test]
    fn empty_ticker_list_is_rejected() {
        let store = MemoryStore::new();
        let err = ingest_prices(&store, &FixedMarket, &[" ".into()], d("2024-01-02"), d("2024-01-10"))
            .unwrap_err();
        assert!(matches!(err, IngestError::NoTickers));
    }

    #[test]
    fn default_window_is_ten_years() {
        let (start, end) = default_window(d("2026-10-19"));
        assert_eq!(end, d("2026-10-19"));
        assert_eq!((end - start).num_days(), 3650);
    }

    #[test]
    fn sp100_list_is_unique() {
        let mut sorted = SP100_TICKERS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), SP100_TICKERS.len());
    }
}
