use crate::{
    config::{BacktestingConfig, RewardConfig},
    engines::evaluation::Portfolio,
    engines::metrics::{risk::is_flat, FactorMetrics, MetricsEngine},
    error::{AlphagenError, Result},
    types::FactorSeries,
};
use ndarray::{Array2, ArrayView1, Axis};

/// Backtests factor series against realized returns and shapes the training reward.
pub struct FactorEvaluator {
    backtesting: BacktestingConfig,
    reward: RewardConfig,
    metrics_engine: MetricsEngine,
}

impl FactorEvaluator {
    pub fn new(backtesting: BacktestingConfig, reward: RewardConfig) -> Self {
        let metrics_engine = MetricsEngine::new(backtesting.annualization);
        Self {
            backtesting,
            reward,
            metrics_engine,
        }
    }

    pub fn backtesting_config(&self) -> &BacktestingConfig {
        &self.backtesting
    }

    /// z-score along time, then `tanh` into (-1, 1). A flat row maps to all zeros.
    pub fn to_signal(factor: ArrayView1<'_, f64>) -> Vec<f64> {
        let n = factor.len().max(1) as f64;
        let mean = factor.sum() / n;
        let std = (factor.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        if is_flat(std, mean) {
            return vec![0.0; factor.len()];
        }
        factor.iter().map(|v| ((v - mean) / std).tanh()).collect()
    }

    /// Per-instrument backtest, averaged across the batch.
    pub fn evaluate(
        &self,
        factor: &FactorSeries,
        returns: &Array2<f64>,
        benchmark: Option<&Array2<f64>>,
    ) -> Result<FactorMetrics> {
        if factor.dim() != returns.dim() {
            return Err(AlphagenError::Evaluation(format!(
                "Factor shape {:?} does not match returns shape {:?}",
                factor.dim(),
                returns.dim()
            )));
        }
        if let Some(bench) = benchmark {
            if bench.dim() != returns.dim() {
                return Err(AlphagenError::Evaluation(format!(
                    "Benchmark shape {:?} does not match returns shape {:?}",
                    bench.dim(),
                    returns.dim()
                )));
            }
        }
        let (batch, time) = factor.dim();
        if batch == 0 || time < 2 {
            return Err(AlphagenError::Evaluation(format!(
                "Need at least one sample with two periods, got [{}, {}]",
                batch, time
            )));
        }

        let mut samples = Vec::with_capacity(batch);
        for b in 0..batch {
            let factor_row = factor.index_axis(Axis(0), b);
            let return_row = returns.index_axis(Axis(0), b).to_vec();
            let signal = Self::to_signal(factor_row);

            let mut portfolio = Portfolio::new(
                self.backtesting.signal_threshold,
                self.backtesting.min_holding_period,
                self.backtesting.cost_rate,
            )
            .with_capacity(time);
            for (s, r) in signal.iter().zip(&return_row) {
                portfolio.process_bar(*s, *r);
            }

            let bench_row = benchmark.map(|bench| bench.index_axis(Axis(0), b).to_vec());
            samples.push(self.metrics_engine.calculate_sample(
                &portfolio,
                &factor_row.to_vec(),
                &return_row,
                bench_row.as_deref(),
            ));
        }

        let metrics = self.metrics_engine.aggregate(&samples);
        if metrics.sortino.is_nan() || metrics.max_drawdown.is_nan() || metrics.turnover.is_nan() {
            return Err(AlphagenError::Evaluation(
                "Metric computation produced NaN".to_string(),
            ));
        }
        Ok(metrics)
    }

    /// Sortino minus linear penalties for turnover and drawdown beyond their thresholds.
    ///
    /// Sortino is capped at `reward_clip` first, so a factor without downside still pays its
    /// penalties and the reward stays finite.
    pub fn reward_from_metrics(&self, metrics: &FactorMetrics) -> f64 {
        let sortino = metrics
            .sortino
            .clamp(-self.reward.reward_clip, self.reward.reward_clip);
        let turnover_excess = (metrics.turnover - self.reward.turnover_threshold).max(0.0);
        let drawdown_excess = (metrics.max_drawdown - self.reward.drawdown_threshold).max(0.0);
        sortino
            - self.reward.turnover_penalty_scale * turnover_excess
            - self.reward.drawdown_penalty_scale * drawdown_excess
    }

    pub fn get_reward(&self, factor: &FactorSeries, returns: &Array2<f64>) -> Result<f64> {
        let metrics = self.evaluate(factor, returns, None)?;
        Ok(self.reward_from_metrics(&metrics))
    }

    /// Evaluate several named factors against the same returns, in input order.
    pub fn compare_factors(
        &self,
        factors: &[(String, FactorSeries)],
        returns: &Array2<f64>,
    ) -> Result<Vec<(String, FactorMetrics)>> {
        factors
            .iter()
            .map(|(name, factor)| Ok((name.clone(), self.evaluate(factor, returns, None)?)))
            .collect()
    }

    /// `compare_factors` sorted by `metric`, best first.
    pub fn rank_factors(
        &self,
        factors: &[(String, FactorSeries)],
        returns: &Array2<f64>,
        metric: &str,
    ) -> Result<Vec<(String, FactorMetrics)>> {
        let mut results = self.compare_factors(factors, returns)?;
        let key = |m: &FactorMetrics| -> Result<f64> {
            m.get(metric)
                .ok_or_else(|| AlphagenError::Evaluation(format!("Unknown metric: {}", metric)))
        };
        for (_, m) in &results {
            key(m)?;
        }
        results.sort_by(|(_, a), (_, b)| {
            let a = a.get(metric).unwrap_or(f64::NEG_INFINITY);
            let b = b.get(metric).unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        });
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    fn evaluator() -> FactorEvaluator {
        FactorEvaluator::new(BacktestingConfig::default(), RewardConfig::default())
    }

    #[test]
    fn test_signal_is_bounded() {
        let signal = FactorEvaluator::to_signal(Array1::from_vec(vec![-100.0, 0.0, 3.0, 1e6]).view());
        assert!(signal.iter().all(|s| s.abs() < 1.0));
        let flat = FactorEvaluator::to_signal(Array1::from_vec(vec![2.0; 4]).view());
        assert!(flat.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_rounding_noise_row_is_flat() {
        // mean of repeated 0.7 is not exactly 0.7, leaving a tiny nonzero std
        let signal = FactorEvaluator::to_signal(Array1::from_vec(vec![0.7; 100]).view());
        assert!(signal.iter().all(|&s| s == 0.0));
        assert_eq!(signal.len(), 100);
    }

    #[test]
    fn test_row_constant_factor_does_not_trade() {
        let mut factor = Array2::zeros((2, 50));
        factor.row_mut(0).fill(0.7);
        factor.row_mut(1).fill(-3.1);
        let returns = Array2::from_shape_fn((2, 50), |(b, t)| if (t + b) % 2 == 0 { 0.01 } else { -0.01 });
        let metrics = evaluator().evaluate(&factor, &returns, None).unwrap();
        assert_eq!(metrics.turnover, 0.0);
        assert_eq!(metrics.sortino, 0.0);
        assert_eq!(metrics.sharpe, 0.0);
    }

    #[test]
    fn test_shape_mismatch_is_error() {
        let factor = array![[1.0, 2.0, 3.0]];
        let returns = array![[0.1, 0.2]];
        assert!(evaluator().evaluate(&factor, &returns, None).is_err());
    }

    #[test]
    fn test_perfect_predictor_scores_well() {
        let returns: Vec<f64> = (0..120).map(|i| if (i * 7) % 3 == 0 { 0.01 } else { -0.01 }).collect();
        let mut lead = returns[1..].to_vec();
        lead.push(0.0);
        let factor = Array2::from_shape_vec((1, 120), lead).unwrap();
        let returns = Array2::from_shape_vec((1, 120), returns).unwrap();

        let metrics = evaluator().evaluate(&factor, &returns, None).unwrap();
        assert!(metrics.ic > 0.9);
        assert!(metrics.total_return > 0.0);
        assert!(metrics.sortino > 0.0);
    }

    #[test]
    fn test_benchmark_metrics_present() {
        let factor = array![[1.0, -1.0, 1.0, -1.0, 1.0]];
        let returns = array![[0.0, 0.01, -0.01, 0.01, -0.01]];
        let bench = array![[0.0, 0.001, 0.001, 0.001, 0.001]];
        let metrics = evaluator().evaluate(&factor, &returns, Some(&bench)).unwrap();
        assert!(metrics.excess_return.is_some());
        assert!(metrics.information_ratio.is_some());
    }

    #[test]
    fn test_rank_factors_descending() {
        let returns = array![[0.0, 0.02, -0.01, 0.03, -0.02, 0.01]];
        let good = array![[0.02, -0.01, 0.03, -0.02, 0.01, 0.0]];
        let bad = good.mapv(|v: f64| -v);
        let ranked = evaluator()
            .rank_factors(
                &[("bad".to_string(), bad), ("good".to_string(), good)],
                &returns,
                "total_return",
            )
            .unwrap();
        assert_eq!(ranked[0].0, "good");
        assert!(evaluator()
            .rank_factors(&[], &returns, "bogus")
            .map(|r| r.is_empty())
            .unwrap_or(false));
    }
}
