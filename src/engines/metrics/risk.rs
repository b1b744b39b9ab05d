// src/engines/metrics/risk.rs
pub struct RiskMetrics;

impl RiskMetrics {
    /// Annualized mean over downside deviation (root mean square of the negative returns).
    ///
    /// With no negative returns the ratio is `+inf` for a positive mean and `0` otherwise.
    pub fn sortino(returns: &[f64], annualization: f64) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let avg = mean(returns);
        let downside: Vec<f64> = returns.iter().copied().filter(|&r| r < 0.0).collect();

        if downside.is_empty() {
            return if avg > 0.0 { f64::INFINITY } else { 0.0 };
        }

        let downside_dev = (downside.iter().map(|r| r * r).sum::<f64>() / downside.len() as f64).sqrt();
        avg / downside_dev * annualization.sqrt()
    }

    pub fn sharpe(returns: &[f64], annualization: f64) -> f64 {
        let avg = mean(returns);
        let volatility = Self::std_dev(returns);
        if is_flat(volatility, avg) {
            0.0
        } else {
            avg / volatility * annualization.sqrt()
        }
    }

    /// Largest peak-to-trough fall of the cumulative (summed) return curve, starting flat.
    pub fn max_drawdown(returns: &[f64]) -> f64 {
        let mut cumulative = 0.0;
        let mut peak = 0.0;
        let mut max_dd = 0.0;

        for &r in returns {
            cumulative += r;
            if cumulative > peak {
                peak = cumulative;
            }
            let dd = peak - cumulative;
            if dd > max_dd {
                max_dd = dd;
            }
        }

        max_dd
    }

    /// Annualized mean over tracking error of `returns - benchmark`.
    pub fn information_ratio(returns: &[f64], benchmark: &[f64], annualization: f64) -> f64 {
        let active: Vec<f64> = returns.iter().zip(benchmark).map(|(r, b)| r - b).collect();
        Self::sharpe(&active, annualization)
    }

    pub fn std_dev(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }

        let mean = mean(values);
        let variance = values.iter()
            .map(|&v| (v - mean).powi(2))
            .sum::<f64>() / values.len() as f64;

        variance.sqrt()
    }
}

/// A dispersion this small relative to the level is rounding noise, not variation.
pub(crate) fn is_flat(std: f64, mean: f64) -> bool {
    !(std > 1e-12 * mean.abs().max(1.0))
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sortino_edge_cases() {
        assert_eq!(RiskMetrics::sortino(&[0.01, 0.0, 0.02], 252.0), f64::INFINITY);
        assert_eq!(RiskMetrics::sortino(&[0.0; 5], 252.0), 0.0);
        assert_eq!(RiskMetrics::sortino(&[], 252.0), 0.0);
    }

    #[test]
    fn test_sortino_uses_downside_only() {
        let sortino = RiskMetrics::sortino(&[0.02, -0.01, 0.02, -0.01], 1.0);
        // mean 0.005, downside deviation 0.01
        assert!((sortino - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_max_drawdown_on_cumulative_sum() {
        let dd = RiskMetrics::max_drawdown(&[0.1, -0.05, -0.1, 0.2, -0.02]);
        assert!((dd - 0.15).abs() < 1e-12);
        assert_eq!(RiskMetrics::max_drawdown(&[0.01, 0.02]), 0.0);
    }

    #[test]
    fn test_sharpe_of_flat_series() {
        assert_eq!(RiskMetrics::sharpe(&[0.01; 10], 252.0), 0.0);
        assert_eq!(RiskMetrics::sharpe(&[0.1; 7], 252.0), 0.0);
    }

    #[test]
    fn test_information_ratio_of_constant_spread() {
        let returns = [0.011, 0.021, -0.009, 0.031];
        let benchmark = [0.001, 0.011, -0.019, 0.021];
        assert_eq!(RiskMetrics::information_ratio(&returns, &benchmark, 252.0), 0.0);
    }

    #[test]
    fn test_is_flat_scales_with_level() {
        assert!(is_flat(0.0, 0.0));
        assert!(is_flat(1e-13, 0.7));
        assert!(is_flat(f64::NAN, 1.0));
        assert!(!is_flat(1e-6, 0.7));
        assert!(!is_flat(1e-9, 5.0));
    }
}
