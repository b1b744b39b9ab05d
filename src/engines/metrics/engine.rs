// src/engines/metrics/engine.rs
use crate::engines::evaluation::Portfolio;
use crate::engines::metrics::{correlation, risk::mean, ProfitabilityMetrics, RiskMetrics};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SORTINO: &str = "sortino";
pub const SHARPE: &str = "sharpe";
pub const IC: &str = "ic";
pub const RANK_IC: &str = "rank_ic";
pub const TURNOVER: &str = "turnover";
pub const MAX_DRAWDOWN: &str = "max_drawdown";
pub const TOTAL_RETURN: &str = "total_return";
pub const WIN_RATE: &str = "win_rate";
pub const AVG_RETURN: &str = "avg_return";
pub const ACTIVITY: &str = "activity";
pub const EXCESS_RETURN: &str = "excess_return";
pub const INFORMATION_RATIO: &str = "information_ratio";

/// Batch-averaged metric bundle for one factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorMetrics {
    pub sortino: f64,
    pub sharpe: f64,
    pub ic: f64,
    pub rank_ic: f64,
    pub turnover: f64,
    pub max_drawdown: f64,
    pub total_return: f64,
    pub win_rate: f64,
    pub avg_return: f64,
    pub activity: f64,
    pub excess_return: Option<f64>,
    pub information_ratio: Option<f64>,
    /// Cross-sample standard deviation of every metric above
    pub std: BTreeMap<String, f64>,
    pub num_samples: usize,
}

impl FactorMetrics {
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            SORTINO => Some(self.sortino),
            SHARPE => Some(self.sharpe),
            IC => Some(self.ic),
            RANK_IC => Some(self.rank_ic),
            TURNOVER => Some(self.turnover),
            MAX_DRAWDOWN => Some(self.max_drawdown),
            TOTAL_RETURN => Some(self.total_return),
            WIN_RATE => Some(self.win_rate),
            AVG_RETURN => Some(self.avg_return),
            ACTIVITY => Some(self.activity),
            EXCESS_RETURN => self.excess_return,
            INFORMATION_RATIO => self.information_ratio,
            _ => None,
        }
    }

    pub fn as_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        for name in [
            SORTINO, SHARPE, IC, RANK_IC, TURNOVER, MAX_DRAWDOWN, TOTAL_RETURN, WIN_RATE,
            AVG_RETURN, ACTIVITY, EXCESS_RETURN, INFORMATION_RATIO,
        ] {
            if let Some(value) = self.get(name) {
                map.insert(name.to_string(), value);
            }
        }
        map
    }
}

pub struct MetricsEngine {
    annualization: f64,
}

impl MetricsEngine {
    pub fn new(annualization: f64) -> Self {
        Self { annualization }
    }

    /// Metrics of one instrument's backtest.
    pub fn calculate_sample(
        &self,
        portfolio: &Portfolio,
        factor: &[f64],
        returns: &[f64],
        benchmark: Option<&[f64]>,
    ) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        let net = &portfolio.net_returns;

        metrics.insert(SORTINO.to_string(), RiskMetrics::sortino(net, self.annualization));
        metrics.insert(SHARPE.to_string(), RiskMetrics::sharpe(net, self.annualization));
        metrics.insert(MAX_DRAWDOWN.to_string(), RiskMetrics::max_drawdown(net));

        let (ic, rank_ic) = correlation::lagged_ic(factor, returns);
        metrics.insert(IC.to_string(), ic);
        metrics.insert(RANK_IC.to_string(), rank_ic);

        metrics.insert(TURNOVER.to_string(), portfolio.mean_turnover());
        metrics.insert(ACTIVITY.to_string(), portfolio.activity());
        metrics.insert(TOTAL_RETURN.to_string(), ProfitabilityMetrics::total_return(net));
        metrics.insert(AVG_RETURN.to_string(), ProfitabilityMetrics::average_return(net));
        metrics.insert(
            WIN_RATE.to_string(),
            ProfitabilityMetrics::win_rate(&portfolio.active_returns()),
        );

        if let Some(bench) = benchmark {
            metrics.insert(
                EXCESS_RETURN.to_string(),
                ProfitabilityMetrics::total_return(net) - ProfitabilityMetrics::total_return(bench),
            );
            metrics.insert(
                INFORMATION_RATIO.to_string(),
                RiskMetrics::information_ratio(net, bench, self.annualization),
            );
        }

        metrics
    }

    /// Average per-sample metrics across the batch.
    pub fn aggregate(&self, samples: &[BTreeMap<String, f64>]) -> FactorMetrics {
        let mut means = BTreeMap::new();
        let mut std = BTreeMap::new();

        if let Some(first) = samples.first() {
            for name in first.keys() {
                let values: Vec<f64> = samples.iter().filter_map(|s| s.get(name).copied()).collect();
                let avg = mean(&values);
                // An infinite mean (e.g. Sortino without downside) has no meaningful spread
                let spread = if avg.is_finite() {
                    RiskMetrics::std_dev(&values)
                } else {
                    0.0
                };
                means.insert(name.clone(), avg);
                std.insert(name.clone(), spread);
            }
        }

        let value = |name: &str| means.get(name).copied().unwrap_or(0.0);
        FactorMetrics {
            sortino: value(SORTINO),
            sharpe: value(SHARPE),
            ic: value(IC),
            rank_ic: value(RANK_IC),
            turnover: value(TURNOVER),
            max_drawdown: value(MAX_DRAWDOWN),
            total_return: value(TOTAL_RETURN),
            win_rate: value(WIN_RATE),
            avg_return: value(AVG_RETURN),
            activity: value(ACTIVITY),
            excess_return: means.get(EXCESS_RETURN).copied(),
            information_ratio: means.get(INFORMATION_RATIO).copied(),
            std,
            num_samples: samples.len(),
        }
    }
}
