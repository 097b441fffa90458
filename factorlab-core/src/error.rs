//! Engine error taxonomy.
//!
//! Every fallible computation in the engine returns `EngineError`. The job
//! orchestrator matches on these at the dispatch boundary and degrades to the
//! synthetic fallback; nothing in the core swallows them.

use thiserror::Error;

/// Errors raised by metrics, features, strategies, models and the walk-forward runner.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("no usable returns: {0}")]
    EmptyInput(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("unsupported strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("no data returned: {0}")]
    NoData(String),

    #[error("walk-forward produced no rebalances")]
    NoRebalance,

    #[error("model error: {0}")]
    Model(String),
}

impl EngineError {
    /// Short machine-readable kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyInput(_) => "empty_input",
            Self::InsufficientData(_) => "insufficient_data",
            Self::UnsupportedStrategy(_) => "unsupported_strategy",
            Self::NoData(_) => "no_data",
            Self::NoRebalance => "no_rebalance",
            Self::Model(_) => "model",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = EngineError::UnsupportedStrategy("mean_reversion_x".into());
        assert_eq!(err.to_string(), "unsupported strategy: mean_reversion_x");
        assert_eq!(err.kind(), "unsupported_strategy");
    }

    #[test]
    fn no_rebalance_has_fixed_message() {
        assert_eq!(
            EngineError::NoRebalance.to_string(),
            "walk-forward produced no rebalances"
        );
    }
}
