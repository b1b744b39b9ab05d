//! Elementwise and conditional operator kernels.

use ndarray::{Array2, Zip};

/// Added to the divisor so that exact zeros do not blow up
pub const DIV_EPS: f64 = 1e-6;

pub fn add(args: &[&Array2<f64>]) -> Array2<f64> {
    args[0] + args[1]
}

pub fn sub(args: &[&Array2<f64>]) -> Array2<f64> {
    args[0] - args[1]
}

pub fn mul(args: &[&Array2<f64>]) -> Array2<f64> {
    args[0] * args[1]
}

pub fn div(args: &[&Array2<f64>]) -> Array2<f64> {
    Zip::from(args[0])
        .and(args[1])
        .map_collect(|&x, &y| x / (y + DIV_EPS))
}

pub fn max(args: &[&Array2<f64>]) -> Array2<f64> {
    Zip::from(args[0]).and(args[1]).map_collect(|&x, &y| x.max(y))
}

pub fn min(args: &[&Array2<f64>]) -> Array2<f64> {
    Zip::from(args[0]).and(args[1]).map_collect(|&x, &y| x.min(y))
}

pub fn neg(args: &[&Array2<f64>]) -> Array2<f64> {
    args[0].mapv(|x| -x)
}

pub fn abs(args: &[&Array2<f64>]) -> Array2<f64> {
    args[0].mapv(f64::abs)
}

/// -1, 0 or +1. Unlike `f64::signum`, zero maps to zero.
pub fn sign(args: &[&Array2<f64>]) -> Array2<f64> {
    args[0].mapv(|x| {
        if x > 0.0 {
            1.0
        } else if x < 0.0 {
            -1.0
        } else {
            0.0
        }
    })
}

/// Sign-preserving `ln(1 + |x|)`
pub fn log(args: &[&Array2<f64>]) -> Array2<f64> {
    args[0].mapv(|x| x.signum() * x.abs().ln_1p())
}

/// `where(cond > 0, a, b)`
pub fn gate(args: &[&Array2<f64>]) -> Array2<f64> {
    Zip::from(args[0])
        .and(args[1])
        .and(args[2])
        .map_collect(|&cond, &a, &b| if cond > 0.0 { a } else { b })
}
