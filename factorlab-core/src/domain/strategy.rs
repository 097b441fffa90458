use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of strategies a Run may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyId {
    #[serde(rename = "equal_weight")]
    EqualWeight,
    #[serde(rename = "momentum_12_1")]
    Momentum12_1,
    #[serde(rename = "ml_ridge")]
    MlRidge,
    #[serde(rename = "ml_lightgbm")]
    MlLightgbm,
}

/// Which computation path serves a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyFamily {
    Baseline,
    Model,
}

impl StrategyId {
    pub const ALL: [StrategyId; 4] = [
        Self::EqualWeight,
        Self::Momentum12_1,
        Self::MlRidge,
        Self::MlLightgbm,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EqualWeight => "equal_weight",
            Self::Momentum12_1 => "momentum_12_1",
            Self::MlRidge => "ml_ridge",
            Self::MlLightgbm => "ml_lightgbm",
        }
    }

    pub fn family(self) -> StrategyFamily {
        match self {
            Self::EqualWeight | Self::Momentum12_1 => StrategyFamily::Baseline,
            Self::MlRidge | Self::MlLightgbm => StrategyFamily::Model,
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s.trim())
            .ok_or_else(|| EngineError::UnsupportedStrategy(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_identifiers() {
        for id in StrategyId::ALL {
            assert_eq!(id.as_str().parse::<StrategyId>().unwrap(), id);
        }
    }

    #[test]
    fn unknown_identifier_is_unsupported() {
        let err = "mean_reversion_x".parse::<StrategyId>().unwrap_err();
        assert_eq!(
            err,
            EngineError::UnsupportedStrategy("mean_reversion_x".into())
        );
    }

    #[test]
    fn families() {
        assert_eq!(StrategyId::EqualWeight.family(), StrategyFamily::Baseline);
        assert_eq!(StrategyId::Momentum12_1.family(), StrategyFamily::Baseline);
        assert_eq!(StrategyId::MlRidge.family(), StrategyFamily::Model);
        assert_eq!(StrategyId::MlLightgbm.family(), StrategyFamily::Model);
    }
}
