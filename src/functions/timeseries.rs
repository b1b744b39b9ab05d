//! Time-axis operator kernels. Every row is an independent instrument; look-backs
//! before the first period are padded with zeros.

use ndarray::{s, Array2, Zip};

/// Standard deviations above the row mean before `JUMP` fires
pub const JUMP_SIGMA: f64 = 3.0;

pub(crate) fn shift(x: &Array2<f64>, lag: usize) -> Array2<f64> {
    let (rows, len) = x.dim();
    let mut out = Array2::zeros((rows, len));
    if lag < len {
        out.slice_mut(s![.., lag..])
            .assign(&x.slice(s![.., ..len - lag]));
    }
    out
}

/// Apply `f` to each trailing window (partial windows at the start of the series).
fn rolling<F>(x: &Array2<f64>, window: usize, f: F) -> Array2<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut out = Array2::zeros(x.dim());
    for (row_in, mut row_out) in x.rows().into_iter().zip(out.rows_mut()) {
        let values = row_in.to_vec();
        for t in 0..values.len() {
            let start = (t + 1).saturating_sub(window);
            row_out[t] = f(&values[start..=t]);
        }
    }
    out
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

pub fn delay1(args: &[&Array2<f64>]) -> Array2<f64> {
    shift(args[0], 1)
}

pub fn delta1(args: &[&Array2<f64>]) -> Array2<f64> {
    args[0] - &shift(args[0], 1)
}

/// `x + 0.8 * x[t-1] + 0.6 * x[t-2]`
pub fn decay(args: &[&Array2<f64>]) -> Array2<f64> {
    let x = args[0];
    let d1 = shift(x, 1);
    let d2 = shift(x, 2);
    Zip::from(x)
        .and(&d1)
        .and(&d2)
        .map_collect(|&a, &b, &c| a + 0.8 * b + 0.6 * c)
}

/// `max(x, x[t-1], x[t-2])`
pub fn max3(args: &[&Array2<f64>]) -> Array2<f64> {
    let x = args[0];
    let d1 = shift(x, 1);
    let d2 = shift(x, 2);
    Zip::from(x)
        .and(&d1)
        .and(&d2)
        .map_collect(|&a, &b, &c| a.max(b).max(c))
}

pub fn ts_mean5(args: &[&Array2<f64>]) -> Array2<f64> {
    rolling(args[0], 5, mean)
}

pub fn ts_std5(args: &[&Array2<f64>]) -> Array2<f64> {
    rolling(args[0], 5, std)
}

/// Excess z-score over `JUMP_SIGMA`, zero elsewhere. Flags outlier moves.
pub fn jump(args: &[&Array2<f64>]) -> Array2<f64> {
    let x = args[0];
    let mut out = Array2::zeros(x.dim());
    for (row_in, mut row_out) in x.rows().into_iter().zip(out.rows_mut()) {
        let values = row_in.to_vec();
        if values.is_empty() {
            continue;
        }
        let m = mean(&values);
        let sd = std(&values);
        for (o, v) in row_out.iter_mut().zip(values.iter()) {
            let z = (v - m) / (sd + 1e-6);
            *o = (z - JUMP_SIGMA).max(0.0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_delay_pads_with_zero() {
        let x = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert_eq!(delay1(&[&x]), array![[0.0, 1.0, 2.0], [0.0, 4.0, 5.0]]);
    }

    #[test]
    fn test_shift_longer_than_series() {
        let x = array![[1.0, 2.0]];
        assert_eq!(shift(&x, 5), array![[0.0, 0.0]]);
    }

    #[test]
    fn test_decay_weights() {
        let x = array![[1.0, 1.0, 1.0]];
        let out = decay(&[&x]);
        for (got, want) in out.iter().zip([1.0, 1.8, 2.4]) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ts_mean_partial_windows() {
        let x = array![[2.0, 4.0, 6.0, 8.0, 10.0, 12.0]];
        let out = ts_mean5(&[&x]);
        assert_eq!(out[[0, 0]], 2.0);
        assert_eq!(out[[0, 1]], 3.0);
        assert_eq!(out[[0, 5]], 8.0);
    }

    #[test]
    fn test_ts_std_of_constant_is_zero() {
        let x = array![[3.0, 3.0, 3.0, 3.0]];
        assert!(ts_std5(&[&x]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_jump_only_fires_on_outliers() {
        let mut row = vec![0.0; 50];
        row[25] = 100.0;
        let x = Array2::from_shape_vec((1, 50), row).unwrap();
        let out = jump(&[&x]);
        assert!(out[[0, 25]] > 0.0);
        assert_eq!(out.iter().filter(|&&v| v > 0.0).count(), 1);
    }
}
