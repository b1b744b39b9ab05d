// src/engines/metrics/profitability.rs
use super::risk::mean;

pub struct ProfitabilityMetrics;

impl ProfitabilityMetrics {
    pub fn total_return(returns: &[f64]) -> f64 {
        returns.iter().sum()
    }

    pub fn average_return(returns: &[f64]) -> f64 {
        mean(returns)
    }

    /// Share of strictly positive returns among `active` bars; 0 when nothing was traded.
    pub fn win_rate(active: &[f64]) -> f64 {
        if active.is_empty() {
            return 0.0;
        }
        active.iter().filter(|&&r| r > 0.0).count() as f64 / active.len() as f64
    }
}
