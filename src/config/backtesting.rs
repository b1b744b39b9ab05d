use super::traits::{invalid, ConfigSection};
use crate::error::AlphagenError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestingConfig {
    /// Cost charged per unit of absolute position change
    pub cost_rate: f64,
    /// Squashed signal must exceed this (in absolute value) to open a position
    pub signal_threshold: f64,
    /// Periods a position is held before it may change
    pub min_holding_period: usize,
    /// Minimum fraction of periods with an open position
    pub min_activity: f64,
    pub annualization: f64,
}

impl Default for BacktestingConfig {
    fn default() -> Self {
        Self {
            cost_rate: 0.001,
            signal_threshold: 0.3,
            min_holding_period: 1,
            min_activity: 0.05,
            annualization: 252.0,
        }
    }
}

impl ConfigSection for BacktestingConfig {
    fn section_name() -> &'static str {
        "backtesting"
    }

    fn validate(&self) -> Result<(), AlphagenError> {
        if self.cost_rate < 0.0 {
            return Err(invalid(Self::section_name(), "cost_rate cannot be negative"));
        }
        if !(0.0..1.0).contains(&self.signal_threshold) {
            return Err(invalid(
                Self::section_name(),
                "signal_threshold must be in [0, 1)",
            ));
        }
        if self.min_holding_period == 0 {
            return Err(invalid(Self::section_name(), "min_holding_period must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.min_activity) {
            return Err(invalid(Self::section_name(), "min_activity must be in [0, 1]"));
        }
        if !(self.annualization > 0.0) {
            return Err(invalid(Self::section_name(), "annualization must be positive"));
        }
        Ok(())
    }
}
