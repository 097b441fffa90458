//! Yahoo Finance chart-API client.
//!
//! One request per ticker against the v8 chart endpoint. Adjusted closes are
//! preferred; a missing adjclose block falls back to raw closes. Transient
//! failures retry with exponential backoff and feed the circuit breaker.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use factorlab_core::domain::PriceTable;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use super::circuit_breaker::{CircuitBreaker, Verdict};
use super::{MarketDataClient, MarketDataError};

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    adjclose: Option<Vec<AdjClose>>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    adjclose: Vec<Option<f64>>,
}

pub struct YahooClient {
    client: Client,
    breaker: Arc<CircuitBreaker>,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooClient {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Result<Self, MarketDataError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .map_err(|e| MarketDataError::Other(format!("http client: {e}")))?;
        Ok(Self {
            client,
            breaker,
            base_url: "https://query2.finance.yahoo.com/v8/finance/chart".into(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    fn chart_url(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> String {
        let period1 = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        // period2 is exclusive; extend to the end of the last day.
        let period2 = end.and_time(chrono::NaiveTime::MIN).and_utc().timestamp() + 86_399;
        format!(
            "{}/{ticker}?period1={period1}&period2={period2}&interval=1d&includeAdjustedClose=true",
            self.base_url
        )
    }

    fn fetch_closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, MarketDataError> {
        let url = self.chart_url(ticker, start, end);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                std::thread::sleep(self.base_delay * 2u32.pow(attempt - 1));
            }
            self.breaker.check()?;

            let resp = match self.client.get(&url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(MarketDataError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(MarketDataError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();
            match self.breaker.observe(status) {
                Verdict::Healthy => {}
                Verdict::Banned => {
                    warn!(ticker, %status, "provider banned requests, circuit breaker opened");
                    self.breaker.check()?;
                    return Err(MarketDataError::Other(format!("HTTP {status} for {ticker}")));
                }
                Verdict::Throttled if status == StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after_secs = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(60);
                    last_error = Some(MarketDataError::RateLimited { retry_after_secs });
                    continue;
                }
                Verdict::Throttled => {
                    last_error = Some(MarketDataError::Other(format!("HTTP {status} for {ticker}")));
                    continue;
                }
                Verdict::SymbolMiss if status == StatusCode::NOT_FOUND => {
                    return Err(MarketDataError::SymbolNotFound {
                        symbol: ticker.to_string(),
                    });
                }
                Verdict::SymbolMiss => {
                    return Err(MarketDataError::Other(format!("HTTP {status} for {ticker}")));
                }
            }

            let chart: ChartResponse = resp.json().map_err(|e| {
                MarketDataError::ResponseFormatChanged(format!("{ticker}: {e}"))
            })?;
            return parse_chart(ticker, chart);
        }

        Err(last_error.unwrap_or_else(|| MarketDataError::Other("retries exhausted".into())))
    }
}

impl MarketDataClient for YahooClient {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn download_prices(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceTable, MarketDataError> {
        let mut series = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            match self.fetch_closes(ticker, start, end) {
                Ok(closes) => {
                    debug!(ticker = %ticker, rows = closes.len(), "downloaded closes");
                    series.push((ticker.clone(), closes));
                }
                Err(MarketDataError::SymbolNotFound { symbol }) => {
                    warn!(ticker = %symbol, "no chart data, skipping ticker");
                }
                Err(e) => return Err(e),
            }
        }

        let table = PriceTable::from_series(series);
        if table.is_empty() {
            return Err(MarketDataError::NoData {
                tickers: tickers.join(","),
                start,
                end,
            });
        }
        Ok(table)
    }
}

/// Extract `(date, close)` pairs from a chart response.
fn parse_chart(ticker: &str, resp: ChartResponse) -> Result<Vec<(NaiveDate, f64)>, MarketDataError> {
    let results = match (resp.chart.result, resp.chart.error) {
        (Some(results), _) => results,
        (None, Some(err)) if err.code == "Not Found" => {
            return Err(MarketDataError::SymbolNotFound {
                symbol: ticker.to_string(),
            })
        }
        (None, Some(err)) => {
            return Err(MarketDataError::ResponseFormatChanged(format!(
                "{}: {}",
                err.code, err.description
            )))
        }
        (None, None) => {
            return Err(MarketDataError::ResponseFormatChanged(
                "chart has neither result nor error".into(),
            ))
        }
    };

    let Some(data) = results.into_iter().next() else {
        return Err(MarketDataError::SymbolNotFound {
            symbol: ticker.to_string(),
        });
    };
    let timestamps = data.timestamp.unwrap_or_default();

    let adjusted = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);
    let closes = match adjusted {
        Some(values) => values,
        None => data
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .unwrap_or_default(),
    };

    let mut out = Vec::with_capacity(timestamps.len());
    for (ts, close) in timestamps.into_iter().zip(closes) {
        let Some(close) = close else { continue };
        let date = DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| MarketDataError::ResponseFormatChanged(format!("bad timestamp {ts}")))?;
        out.push((date, close));
    }

    if out.is_empty() {
        return Err(MarketDataError::SymbolNotFound {
            symbol: ticker.to_string(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Vec<(NaiveDate, f64)>, MarketDataError> {
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        parse_chart("SPY", resp)
    }

    #[test]
    fn prefers_adjusted_close() {
        let json = r#"{"chart":{"result":[{
            "timestamp":[1704205800,1704292200,1704378600],
            "indicators":{
                "quote":[{"close":[472.6,468.8,null]}],
                "adjclose":[{"adjclose":[465.1,461.3,null]}]
            }}],"error":null}}"#;
        let closes = parse(json).unwrap();
        assert_eq!(closes.len(), 2);
        assert_eq!(closes[0], (NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 465.1));
    }

    #[test]
    fn falls_back_to_close() {
        let json = r#"{"chart":{"result":[{
            "timestamp":[1704205800],
            "indicators":{"quote":[{"close":[472.6]}]}}],"error":null}}"#;
        assert_eq!(parse(json).unwrap()[0].1, 472.6);
    }

    #[test]
    fn not_found_error() {
        let json = r#"{"chart":{"result":null,
            "error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert!(matches!(
            parse(json).unwrap_err(),
            MarketDataError::SymbolNotFound { .. }
        ));
    }

    #[test]
    fn url_covers_whole_end_day() {
        let client = YahooClient::new(Arc::new(CircuitBreaker::for_provider())).unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let url = client.chart_url("SPY", d, d);
        assert!(url.contains("period1=1704153600"));
        assert!(url.contains("period2=1704239999"));
    }
}
