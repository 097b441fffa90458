//! FactorLab Core: price tables, monthly factor features, baseline strategies and return models.
//!
//! This crate holds the pure computations of the backtest engine:
//! - Domain types (price table, return series, run/job ids, strategy ids)
//! - Monthly feature engine with forward-looking labels
//! - Equal-weight and 12-1 momentum baselines
//! - Ridge and boosted-stump return models behind the `ReturnModel` trait
//!
//! Nothing here performs I/O or logs; the runner crate owns both.

pub mod domain;
pub mod error;
pub mod features;
pub mod model;
pub mod strategies;

pub use error::EngineError;
