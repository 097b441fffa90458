//! Dense date × ticker table of adjusted closes.
//!
//! Construction enforces the table invariants once:
//! - dates strictly increasing,
//! - interior gaps forward-filled from the last known price,
//! - rows with no price for any ticker dropped.
//!
//! Leading gaps (before a ticker's first observation) stay NaN. Non-finite or
//! non-positive inputs count as missing. The table is immutable afterwards.

use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap};

/// Dense price table. `closes[row][col]` is the close of `tickers[col]` on `dates[row]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    closes: Vec<Vec<f64>>,
}

impl PriceTable {
    /// Build a table from long-format `(ticker, date, close)` observations.
    ///
    /// Tickers keep first-seen order. Duplicate `(ticker, date)` pairs keep the
    /// last value.
    pub fn from_observations<I, S>(observations: I) -> Self
    where
        I: IntoIterator<Item = (S, NaiveDate, f64)>,
        S: Into<String>,
    {
        let mut tickers: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut by_date: BTreeMap<NaiveDate, Vec<(usize, f64)>> = BTreeMap::new();

        for (ticker, date, close) in observations {
            let ticker = ticker.into();
            let col = match index.get(&ticker) {
                Some(&c) => c,
                None => {
                    let c = tickers.len();
                    index.insert(ticker.clone(), c);
                    tickers.push(ticker);
                    c
                }
            };
            by_date.entry(date).or_default().push((col, close));
        }

        let width = tickers.len();
        let dates: Vec<NaiveDate> = by_date.keys().copied().collect();
        let rows: Vec<Vec<f64>> = by_date
            .into_values()
            .map(|cells| {
                let mut row = vec![f64::NAN; width];
                for (col, close) in cells {
                    row[col] = close;
                }
                row
            })
            .collect();

        Self::from_rows(dates, tickers, rows)
    }

    /// Build a table from per-ticker date series (e.g. one download per symbol).
    pub fn from_series(series: Vec<(String, Vec<(NaiveDate, f64)>)>) -> Self {
        Self::from_observations(series.into_iter().flat_map(|(ticker, points)| {
            points
                .into_iter()
                .map(move |(date, close)| (ticker.clone(), date, close))
        }))
    }

    /// Build a table from already-dense rows. Rows are sorted by date,
    /// duplicates collapse to the last row, then the fill/drop invariants apply.
    pub fn from_rows(dates: Vec<NaiveDate>, tickers: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        let width = tickers.len();
        let mut sorted: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for (date, mut row) in dates.into_iter().zip(rows) {
            row.resize(width, f64::NAN);
            for v in row.iter_mut() {
                if !is_valid_price(*v) {
                    *v = f64::NAN;
                }
            }
            sorted.insert(date, row);
        }

        let mut last = vec![f64::NAN; width];
        let mut out_dates = Vec::with_capacity(sorted.len());
        let mut out_rows = Vec::with_capacity(sorted.len());

        for (date, row) in sorted {
            // A row with no observation at all is dropped before filling, so a
            // holiday row never materialises as a copy of the previous day.
            if row.iter().all(|v| v.is_nan()) {
                continue;
            }
            let filled: Vec<f64> = row
                .iter()
                .zip(last.iter())
                .map(|(&v, &prev)| if v.is_nan() { prev } else { v })
                .collect();
            last.clone_from(&filled);
            out_dates.push(date);
            out_rows.push(filled);
        }

        Self {
            dates: out_dates,
            tickers,
            closes: out_rows,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Number of trading dates (rows).
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.tickers.is_empty()
    }

    pub fn width(&self) -> usize {
        self.tickers.len()
    }

    pub fn column_index(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.column_index(ticker).is_some()
    }

    /// Close of column `col` on row `row` (NaN if not yet listed).
    pub fn close(&self, row: usize, col: usize) -> f64 {
        self.closes[row][col]
    }

    /// Full close history of one ticker.
    pub fn column(&self, ticker: &str) -> Option<Vec<f64>> {
        let col = self.column_index(ticker)?;
        Some(self.closes.iter().map(|r| r[col]).collect())
    }

    /// "SPY" if listed, else the first column encountered.
    pub fn default_benchmark(&self) -> Option<&str> {
        if self.contains("SPY") {
            Some("SPY")
        } else {
            self.tickers.first().map(String::as_str)
        }
    }

    /// Simple period-over-period returns per cell; the first row and any
    /// cell without two valid prices are NaN.
    pub fn pct_change(&self) -> Vec<Vec<f64>> {
        let mut out = Vec::with_capacity(self.len());
        for (i, row) in self.closes.iter().enumerate() {
            if i == 0 {
                out.push(vec![f64::NAN; self.width()]);
                continue;
            }
            let prev = &self.closes[i - 1];
            out.push(
                row.iter()
                    .zip(prev.iter())
                    .map(|(&p, &q)| p / q - 1.0)
                    .collect(),
            );
        }
        out
    }

    /// Month-end resample: the last observed close of each calendar month,
    /// dated on the calendar month-end, forward-filled across months with no
    /// observation. All-empty months are dropped.
    pub fn month_end(&self) -> PriceTable {
        let mut months: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for (date, row) in self.dates.iter().zip(self.closes.iter()) {
            let key = month_end_of(*date);
            let slot = months
                .entry(key)
                .or_insert_with(|| vec![f64::NAN; self.width()]);
            for (cell, &v) in slot.iter_mut().zip(row.iter()) {
                if !v.is_nan() {
                    *cell = v;
                }
            }
        }

        // Calendar months with no trading rows at all still get a forward-filled entry.
        if let (Some(&first), Some(&last)) = (months.keys().next(), months.keys().next_back()) {
            let mut cursor = next_month_end(first);
            while cursor < last {
                months
                    .entry(cursor)
                    .or_insert_with(|| vec![f64::NAN; self.width()]);
                cursor = next_month_end(cursor);
            }
        }

        let (dates, rows): (Vec<_>, Vec<_>) = months.into_iter().unzip();
        let mut table = PriceTable {
            dates: Vec::new(),
            tickers: self.tickers.clone(),
            closes: Vec::new(),
        };
        // Forward-fill without dropping interior empty months (they inherit
        // the previous close); only leading all-empty rows disappear.
        let mut last = vec![f64::NAN; self.width()];
        for (date, row) in dates.into_iter().zip(rows) {
            let filled: Vec<f64> = row
                .iter()
                .zip(last.iter())
                .map(|(&v, &prev)| if v.is_nan() { prev } else { v })
                .collect();
            last.clone_from(&filled);
            if filled.iter().all(|v| v.is_nan()) {
                continue;
            }
            table.dates.push(date);
            table.closes.push(filled);
        }
        table
    }

    /// Restrict to rows whose date lies in `[start, end]`.
    pub fn slice_dates(&self, start: NaiveDate, end: NaiveDate) -> PriceTable {
        let mut dates = Vec::new();
        let mut closes = Vec::new();
        for (date, row) in self.dates.iter().zip(self.closes.iter()) {
            if *date >= start && *date <= end {
                dates.push(*date);
                closes.push(row.clone());
            }
        }
        PriceTable {
            dates,
            tickers: self.tickers.clone(),
            closes,
        }
    }

    /// Iterate all present cells as `(ticker, date, close)`.
    pub fn observations(&self) -> impl Iterator<Item = (&str, NaiveDate, f64)> + '_ {
        self.dates
            .iter()
            .zip(self.closes.iter())
            .flat_map(move |(date, row)| {
                row.iter()
                    .enumerate()
                    .filter(|(_, v)| !v.is_nan())
                    .map(move |(col, &v)| (self.tickers[col].as_str(), *date, v))
            })
    }
}

fn is_valid_price(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// Last calendar day of the month containing `date`.
pub fn month_end_of(date: NaiveDate) -> NaiveDate {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}

/// Calendar month-end of the month after the one containing `date`.
pub fn next_month_end(date: NaiveDate) -> NaiveDate {
    let end = month_end_of(date);
    end.succ_opt().map(month_end_of).unwrap_or(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn forward_fills_interior_gaps() {
        let table = PriceTable::from_observations(vec![
            ("SPY", d("2024-01-02"), 100.0),
            ("QQQ", d("2024-01-02"), 200.0),
            ("SPY", d("2024-01-03"), 101.0),
            ("SPY", d("2024-01-04"), 102.0),
            ("QQQ", d("2024-01-04"), 204.0),
        ]);
        assert_eq!(table.len(), 3);
        let qqq = table.column("QQQ").unwrap();
        assert_eq!(qqq, vec![200.0, 200.0, 204.0]);
    }

    #[test]
    fn leading_gap_stays_missing() {
        let table = PriceTable::from_observations(vec![
            ("SPY", d("2024-01-02"), 100.0),
            ("SPY", d("2024-01-03"), 101.0),
            ("QQQ", d("2024-01-03"), 200.0),
        ]);
        let qqq = table.column("QQQ").unwrap();
        assert!(qqq[0].is_nan());
        assert_eq!(qqq[1], 200.0);
    }

    #[test]
    fn drops_all_missing_rows_and_sorts() {
        let table = PriceTable::from_rows(
            vec![d("2024-01-04"), d("2024-01-02"), d("2024-01-03")],
            vec!["SPY".into()],
            vec![vec![102.0], vec![100.0], vec![f64::NAN]],
        );
        assert_eq!(table.dates(), &[d("2024-01-02"), d("2024-01-04")]);
        assert_eq!(table.column("SPY").unwrap(), vec![100.0, 102.0]);
    }

    #[test]
    fn invalid_prices_are_missing() {
        let table = PriceTable::from_observations(vec![
            ("SPY", d("2024-01-02"), 100.0),
            ("SPY", d("2024-01-03"), -1.0),
            ("SPY", d("2024-01-04"), f64::INFINITY),
        ]);
        // Both bad rows are entirely missing and therefore dropped.
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn keeps_first_seen_ticker_order() {
        let table = PriceTable::from_observations(vec![
            ("TLT", d("2024-01-02"), 90.0),
            ("GLD", d("2024-01-02"), 180.0),
        ]);
        assert_eq!(table.tickers(), &["TLT".to_string(), "GLD".to_string()]);
        assert_eq!(table.default_benchmark(), Some("TLT"));
    }

    #[test]
    fn benchmark_prefers_spy() {
        let table = PriceTable::from_observations(vec![
            ("TLT", d("2024-01-02"), 90.0),
            ("SPY", d("2024-01-02"), 470.0),
        ]);
        assert_eq!(table.default_benchmark(), Some("SPY"));
    }

    #[test]
    fn month_end_takes_last_close_of_month() {
        let table = PriceTable::from_observations(vec![
            ("SPY", d("2024-01-30"), 100.0),
            ("SPY", d("2024-01-31"), 101.0),
            ("SPY", d("2024-02-28"), 105.0),
            ("SPY", d("2024-02-29"), 106.0),
        ]);
        let monthly = table.month_end();
        assert_eq!(monthly.dates(), &[d("2024-01-31"), d("2024-02-29")]);
        assert_eq!(monthly.column("SPY").unwrap(), vec![101.0, 106.0]);
    }

    #[test]
    fn month_end_fills_skipped_month() {
        let table = PriceTable::from_observations(vec![
            ("SPY", d("2024-01-15"), 100.0),
            ("SPY", d("2024-03-15"), 110.0),
        ]);
        let monthly = table.month_end();
        assert_eq!(
            monthly.dates(),
            &[d("2024-01-31"), d("2024-02-29"), d("2024-03-31")]
        );
        assert_eq!(monthly.column("SPY").unwrap(), vec![100.0, 100.0, 110.0]);
    }

    #[test]
    fn month_end_helpers() {
        assert_eq!(month_end_of(d("2023-12-05")), d("2023-12-31"));
        assert_eq!(month_end_of(d("2024-02-01")), d("2024-02-29"));
        assert_eq!(next_month_end(d("2024-01-31")), d("2024-02-29"));
        assert_eq!(next_month_end(d("2023-12-31")), d("2024-01-31"));
    }

    #[test]
    fn pct_change_first_row_nan() {
        let table = PriceTable::from_observations(vec![
            ("SPY", d("2024-01-02"), 100.0),
            ("SPY", d("2024-01-03"), 110.0),
        ]);
        let r = table.pct_change();
        assert!(r[0][0].is_nan());
        assert!((r[1][0] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn observations_skip_missing_cells() {
        let table = PriceTable::from_observations(vec![
            ("SPY", d("2024-01-02"), 100.0),
            ("QQQ", d("2024-01-03"), 200.0),
        ]);
        // SPY forward-fills into 01-03; QQQ has no value on 01-02.
        assert_eq!(table.observations().count(), 3);
    }
}
