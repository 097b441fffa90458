//! Engine configuration.
//!
//! Layering: built-in defaults, then an optional TOML file, then environment
//! overrides. Environment lookups go through a closure so tests never touch
//! the process environment.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::PostgrestConfig;
use crate::walk_forward::WalkForwardConfig;

/// Universe used when no tickers are configured.
pub const DEFAULT_UNIVERSE: [&str; 8] = ["SPY", "QQQ", "IWM", "EFA", "EEM", "TLT", "GLD", "VNQ"];

/// Baseline universe used when the configured list is empty.
pub const BASELINE_FALLBACK_UNIVERSE: [&str; 5] = ["SPY", "QQQ", "IWM", "EFA", "EEM"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Runtime configuration for the worker, the dispatcher and ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub min_train_months: usize,
    pub top_n: usize,
    pub cost_bps: f64,
    /// Years of history loaded before the run start for model strategies.
    pub warmup_years: u32,
    pub poll_interval_secs: u64,
    pub job_batch_size: usize,
    pub universe: Vec<String>,
    pub store_url: Option<String>,
    pub service_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let wf = WalkForwardConfig::default();
        Self {
            min_train_months: wf.min_train_months,
            top_n: wf.top_n,
            cost_bps: wf.cost_bps,
            warmup_years: 5,
            poll_interval_secs: 5,
            job_batch_size: 3,
            universe: DEFAULT_UNIVERSE.iter().map(|s| s.to_string()).collect(),
            store_url: None,
            service_key: None,
        }
    }
}

impl EngineConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        base.with_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ML_MIN_TRAIN_MONTHS") {
            self.min_train_months = parse_number("ML_MIN_TRAIN_MONTHS", &v)?;
        }
        if let Some(v) = get("ML_TOP_N") {
            self.top_n = parse_number("ML_TOP_N", &v)?;
        }
        if let Some(v) = get("ML_COST_BPS") {
            self.cost_bps = parse_number("ML_COST_BPS", &v)?;
            if !self.cost_bps.is_finite() || self.cost_bps < 0.0 {
                return Err(invalid("ML_COST_BPS", &v));
            }
        }
        if let Some(v) = get("ML_WARMUP_YEARS") {
            self.warmup_years = parse_number("ML_WARMUP_YEARS", &v)?;
        }
        if let Some(v) = get("POLL_INTERVAL_SECONDS") {
            self.poll_interval_secs = parse_number("POLL_INTERVAL_SECONDS", &v)?;
        }
        if let Some(v) = get("JOB_BATCH_SIZE") {
            self.job_batch_size = parse_number("JOB_BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("FACTORLAB_UNIVERSE") {
            self.universe = parse_tickers(&v);
        }
        if let Some(v) = get("SUPABASE_URL").or_else(|| get("NEXT_PUBLIC_SUPABASE_URL")) {
            self.store_url = Some(v);
        }
        if let Some(v) = get("SUPABASE_SERVICE_ROLE_KEY") {
            self.service_key = Some(v);
        }
        Ok(self)
    }

    pub fn walk_forward(&self) -> WalkForwardConfig {
        WalkForwardConfig {
            min_train_months: self.min_train_months,
            top_n: self.top_n,
            cost_bps: self.cost_bps,
        }
    }

    /// Tickers for a baseline run.
    pub fn baseline_universe(&self) -> Vec<String> {
        if self.universe.is_empty() {
            BASELINE_FALLBACK_UNIVERSE.iter().map(|s| s.to_string()).collect()
        } else {
            self.universe.clone()
        }
    }

    /// Tickers for a model run: the configured universe with SPY first.
    pub fn model_universe(&self) -> Vec<String> {
        let mut tickers = self.universe.clone();
        if !tickers.iter().any(|t| t == "SPY") {
            tickers.insert(0, "SPY".to_string());
        }
        tickers
    }

    /// Store connection settings, if both URL and key are present.
    pub fn postgrest(&self) -> Option<PostgrestConfig> {
        match (&self.store_url, &self.service_key) {
            (Some(url), Some(key)) => Some(PostgrestConfig {
                url: url.clone(),
                service_key: key.clone(),
            }),
            _ => None,
        }
    }
}

/// Split a comma-separated ticker list, trimming and upper-casing entries.
pub fn parse_tickers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}
