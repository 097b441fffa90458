//! Artifact export for locally run backtests.
//!
//! A run directory holds:
//! - `manifest.json`: run identity, origin, metrics and model metadata
//! - `equity.csv`: dated portfolio and benchmark NAV
//! - `predictions.csv`: the prediction log (model strategies only)
//!
//! Manifests carry a `schema_version`; newer versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use factorlab_core::domain::RunId;
use serde::{Deserialize, Serialize};

use crate::metrics::PerformanceMetrics;
use crate::result::{BacktestResult, EquityRow, ModelMetadata, PredictionRow, ResultOrigin};

pub const SCHEMA_VERSION: u32 = 1;

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub run_id: RunId,
    pub strategy_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub synthetic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub equity_rows: usize,
    pub metrics: PerformanceMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_metadata: Option<ModelMetadata>,
}

impl Manifest {
    pub fn new(
        run_id: &RunId,
        strategy_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        result: &BacktestResult,
    ) -> Self {
        let fallback_reason = match &result.origin {
            ResultOrigin::Strategy => None,
            ResultOrigin::SyntheticFallback { reason } => Some(reason.clone()),
        };
        Self {
            schema_version: SCHEMA_VERSION,
            run_id: run_id.clone(),
            strategy_id: strategy_id.to_string(),
            start_date,
            end_date,
            synthetic: result.is_synthetic(),
            fallback_reason,
            equity_rows: result.equity_rows.len(),
            metrics: result.metrics,
            model_metadata: result.model_metadata.clone(),
        }
    }
}

pub fn import_manifest(json: &str) -> Result<Manifest> {
    let manifest: Manifest =
        serde_json::from_str(json).context("failed to deserialize manifest JSON")?;
    if manifest.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

pub fn export_equity_csv(rows: &[EquityRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "portfolio", "benchmark"])?;
    for row in rows {
        wtr.write_record([
            row.date.to_string(),
            format!("{:.2}", row.portfolio),
            format!("{:.2}", row.benchmark),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_predictions_csv(rows: &[PredictionRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for row in rows {
        wtr.serialize(row)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write the artifact set into `output_dir/<run_id>/` and return that path.
pub fn save_artifacts(manifest: &Manifest, result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(manifest.run_id.as_str());
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let json = serde_json::to_string_pretty(manifest).context("failed to serialize manifest")?;
    std::fs::write(run_dir.join("manifest.json"), json)?;
    std::fs::write(run_dir.join("equity.csv"), export_equity_csv(&result.equity_rows)?)?;
    if let Some(predictions) = &result.prediction_rows {
        std::fs::write(
            run_dir.join("predictions.csv"),
            export_predictions_csv(predictions)?,
        )?;
    }
    Ok(run_dir)
}

pub fn load_manifest(dir: &Path) -> Result<Manifest> {
    let path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_manifest(&json)
}

/// Plain-text summary printed after a local run.
pub fn summary_text(manifest: &Manifest) -> String {
    let m = &manifest.metrics;
    let mut out = format!(
        "run {} ({}) {} to {}\n",
        manifest.run_id, manifest.strategy_id, manifest.start_date, manifest.end_date
    );
    if let Some(reason) = &manifest.fallback_reason {
        out.push_str(&format!("SYNTHETIC fallback: {reason}\n"));
    }
    out.push_str(&format!("  points        {}\n", manifest.equity_rows));
    out.push_str(&format!("  CAGR          {:.2}%\n", m.cagr * 100.0));
    out.push_str(&format!("  Sharpe        {:.2}\n", m.sharpe));
    out.push_str(&format!("  Max drawdown  {:.2}%\n", m.max_drawdown * 100.0));
    out.push_str(&format!("  Volatility    {:.2}%\n", m.volatility * 100.0));
    out.push_str(&format!("  Win rate      {:.1}%\n", m.win_rate * 100.0));
    out.push_str(&format!("  Profit factor {:.2}\n", m.profit_factor));
    out.push_str(&format!("  Calmar        {:.2}\n", m.calmar));
    out.push_str(&format!("  Turnover      {:.4}\n", m.turnover));
    if let Some(meta) = &manifest.model_metadata {
        out.push_str(&format!(
            "  Model         {} ({} rebalances, top {})\n",
            meta.model_name, meta.rebalance_count, meta.top_n
        ));
        for (feature, weight) in &meta.feature_importance {
            out.push_str(&format!("    {feature:<12} {weight:.3}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sample_result() -> BacktestResult {
        BacktestResult {
            equity_rows: vec![
                EquityRow { date: d("2024-01-02"), portfolio: 100_100.0, benchmark: 100_050.0 },
                EquityRow { date: d("2024-01-03"), portfolio: 100_200.0, benchmark: 99_900.0 },
            ],
            metrics: PerformanceMetrics {
                cagr: 0.12,
                sharpe: 1.1,
                max_drawdown: -0.05,
                turnover: 0.12,
                volatility: 0.13,
                win_rate: 0.5,
                profit_factor: 1.4,
                calmar: 2.4,
            },
            feature_rows: None,
            prediction_rows: None,
            model_metadata: None,
            origin: ResultOrigin::SyntheticFallback {
                reason: "no data returned".into(),
            },
        }
    }

    #[test]
    fn equity_csv_layout() {
        let csv = export_equity_csv(&sample_result().equity_rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "date,portfolio,benchmark");
        assert_eq!(lines[1], "2024-01-02,100100.00,100050.00");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn predictions_csv_has_header() {
        let row = PredictionRow {
            run_id: RunId::new("r1"),
            model_name: "ridge".into(),
            as_of_date: d("2024-01-31"),
            target_date: d("2024-02-29"),
            ticker: "QQQ".into(),
            predicted_return: 0.01,
            realized_return: 0.02,
            rank: 1,
            selected: true,
            weight: 1.0,
        };
        let csv = export_predictions_csv(&[row]).unwrap();
        assert!(csv.starts_with("run_id,model_name,as_of_date,target_date,ticker,"));
        assert!(csv.contains("r1,ridge,2024-01-31,2024-02-29,QQQ,"));
    }

    #[test]
    fn newer_schema_rejected() {
        let result = sample_result();
        let mut manifest = Manifest::new(&RunId::new("r1"), "x", d("2024-01-01"), d("2024-01-31"), &result);
        manifest.schema_version = SCHEMA_VERSION + 1;
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(import_manifest(&json).is_err());
    }

    #[test]
    fn summary_flags_synthetic() {
        let result = sample_result();
        let manifest = Manifest::new(&RunId::new("r1"), "x", d("2024-01-01"), d("2024-01-31"), &result);
        let text = summary_text(&manifest);
        assert!(text.contains("SYNTHETIC fallback: no data returned"));
        assert!(text.contains("Sharpe        1.10"));
    }
}
