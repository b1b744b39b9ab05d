//! Predictive-power statistics between a factor and the next period's return.

use super::risk::{is_flat, mean};

/// Pearson correlation, `None` when either side has zero variance or lengths differ.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let (mx, my) = (mean(x), mean(y));
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    let n = x.len() as f64;
    if is_flat((vx / n).sqrt(), mx) || is_flat((vy / n).sqrt(), my) {
        return None;
    }
    let denom = (vx * vy).sqrt();
    if denom > 0.0 && denom.is_finite() {
        Some(cov / denom)
    } else {
        None
    }
}

/// 1-based ranks with ties sharing their average rank.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() {
        return None;
    }
    pearson(&average_ranks(x), &average_ranks(y))
}

/// `(IC, rank IC)` of `factor[t - 1]` against `returns[t]`. Degenerate inputs give 0.
pub fn lagged_ic(factor: &[f64], returns: &[f64]) -> (f64, f64) {
    if factor.len() < 3 || factor.len() != returns.len() {
        return (0.0, 0.0);
    }
    let lead = &factor[..factor.len() - 1];
    let next = &returns[1..];
    (
        pearson(lead, next).unwrap_or(0.0),
        spearman(lead, next).unwrap_or(0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_ranks_with_ties() {
        assert_eq!(average_ranks(&[3.0, 1.0, 3.0, 2.0]), vec![3.5, 1.0, 3.5, 2.0]);
    }

    #[test]
    fn test_spearman_monotone() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [1.0, 8.0, 27.0, 64.0];
        assert!((spearman(&x, &y).unwrap() - 1.0).abs() < 1e-12);
        assert!(pearson(&x, &y).unwrap() < 1.0);
    }

    #[test]
    fn test_constant_input_degenerates() {
        assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_none());
        assert_eq!(lagged_ic(&[1.0; 5], &[0.1, 0.2, 0.3, 0.4, 0.5]), (0.0, 0.0));
        let ramp: Vec<f64> = (0..50).map(|i| i as f64).collect();
        assert!(pearson(&[0.7; 50], &ramp).is_none());
    }

    #[test]
    fn test_lagged_ic_uses_previous_factor() {
        let returns = [0.0, 0.1, -0.2, 0.3, -0.1];
        let mut factor = returns[1..].to_vec();
        factor.push(0.0);
        let (ic, rank_ic) = lagged_ic(&factor, &returns);
        assert!((ic - 1.0).abs() < 1e-12);
        assert!((rank_ic - 1.0).abs() < 1e-12);
    }
}
