//! Domain types for FactorLab

pub mod ids;
pub mod price_table;
pub mod returns;
pub mod strategy;

pub use ids::{JobId, RunId};
pub use price_table::{month_end_of, next_month_end, PriceTable};
pub use returns::{Periodicity, ReturnSeries};
pub use strategy::{StrategyFamily, StrategyId};
