use alphagen::config::{BacktestingConfig, RewardConfig};
use alphagen::engines::evaluation::FactorEvaluator;
use alphagen::engines::metrics::{FactorMetrics, RiskMetrics};
use ndarray::Array2;
use std::collections::BTreeMap;

fn evaluator() -> FactorEvaluator {
    FactorEvaluator::new(BacktestingConfig::default(), RewardConfig::default())
}

fn wave(n: usize, phase: f64) -> Vec<f64> {
    (0..n).map(|i| ((i as f64) * 0.9 + phase).sin() * 0.01).collect()
}

fn metrics_with(sortino: f64, turnover: f64, max_drawdown: f64) -> FactorMetrics {
    FactorMetrics {
        sortino,
        sharpe: 0.0,
        ic: 0.0,
        rank_ic: 0.0,
        turnover,
        max_drawdown,
        total_return: 0.0,
        win_rate: 0.0,
        avg_return: 0.0,
        activity: 1.0,
        excess_return: None,
        information_ratio: None,
        std: BTreeMap::new(),
        num_samples: 1,
    }
}

#[test]
fn test_evaluate_is_idempotent() {
    let factor = Array2::from_shape_vec((3, 50), [wave(50, 0.0), wave(50, 1.0), wave(50, 2.0)].concat()).unwrap();
    let returns = Array2::from_shape_vec((3, 50), [wave(50, 0.5), wave(50, 1.7), wave(50, 0.2)].concat()).unwrap();

    let first = evaluator().evaluate(&factor, &returns, None).unwrap();
    let second = evaluator().evaluate(&factor, &returns, None).unwrap();

    for (name, value) in first.as_map() {
        assert_eq!(value.to_bits(), second.get(&name).unwrap().to_bits(), "{}", name);
    }
    assert_eq!(first.num_samples, 3);
    assert_eq!(first.std.len(), second.std.len());
}

#[test]
fn test_sortino_infinite_without_downside() {
    assert_eq!(RiskMetrics::sortino(&[0.01, 0.0, 0.03, 0.02], 252.0), f64::INFINITY);
}

#[test]
fn test_sortino_zero_for_flat_returns() {
    assert_eq!(RiskMetrics::sortino(&[0.0; 20], 252.0), 0.0);
}

#[test]
fn test_flat_factor_never_trades() {
    let factor = Array2::from_elem((1, 30), 0.7);
    let returns = Array2::from_shape_vec((1, 30), wave(30, 0.0)).unwrap();
    let metrics = evaluator().evaluate(&factor, &returns, None).unwrap();

    assert_eq!(metrics.sortino, 0.0);
    assert_eq!(metrics.turnover, 0.0);
    assert_eq!(metrics.activity, 0.0);
    assert_eq!(metrics.ic, 0.0);
}

#[test]
fn test_turnover_penalty_lowers_reward() {
    let evaluator = evaluator();
    let calm = evaluator.reward_from_metrics(&metrics_with(1.2, 0.5, 0.1));
    let busy = evaluator.reward_from_metrics(&metrics_with(1.2, 0.9, 0.1));
    let busier = evaluator.reward_from_metrics(&metrics_with(1.2, 1.4, 0.1));

    assert_eq!(calm, 1.2);
    assert!(busy < calm);
    assert!(busier < busy);
}

#[test]
fn test_drawdown_penalty_lowers_reward() {
    let evaluator = evaluator();
    let shallow = evaluator.reward_from_metrics(&metrics_with(0.8, 0.2, 0.2));
    let deep = evaluator.reward_from_metrics(&metrics_with(0.8, 0.2, 0.35));
    let deeper = evaluator.reward_from_metrics(&metrics_with(0.8, 0.2, 0.6));

    assert_eq!(shallow, 0.8);
    assert!(deep < shallow);
    assert!(deeper < deep);
}

#[test]
fn test_unbounded_sortino_still_pays_penalties() {
    let evaluator = evaluator();
    let clip = RewardConfig::default().reward_clip;
    let calm = evaluator.reward_from_metrics(&metrics_with(f64::INFINITY, 0.5, 0.1));
    let busy = evaluator.reward_from_metrics(&metrics_with(f64::INFINITY, 1.5, 0.1));
    let deep = evaluator.reward_from_metrics(&metrics_with(f64::INFINITY, 1.5, 0.7));

    assert_eq!(calm, clip);
    assert!(busy.is_finite() && busy < calm);
    assert!(deep < busy);
}

#[test]
fn test_get_reward_matches_metrics() {
    let evaluator = evaluator();
    let factor = Array2::from_shape_vec((1, 60), wave(60, 0.3)).unwrap();
    let returns = Array2::from_shape_vec((1, 60), wave(60, 1.2)).unwrap();

    let metrics = evaluator.evaluate(&factor, &returns, None).unwrap();
    let reward = evaluator.get_reward(&factor, &returns).unwrap();
    assert_eq!(reward, evaluator.reward_from_metrics(&metrics));
}

#[test]
fn test_compare_factors_keeps_input_order() {
    let evaluator = evaluator();
    let returns = Array2::from_shape_vec((1, 40), wave(40, 0.0)).unwrap();
    let factors = vec![
        ("a".to_string(), Array2::from_shape_vec((1, 40), wave(40, 0.4)).unwrap()),
        ("b".to_string(), Array2::from_shape_vec((1, 40), wave(40, 2.4)).unwrap()),
    ];

    let compared = evaluator.compare_factors(&factors, &returns).unwrap();
    assert_eq!(compared[0].0, "a");
    assert_eq!(compared[1].0, "b");

    let ranked = evaluator.rank_factors(&factors, &returns, "sharpe").unwrap();
    assert!(ranked[0].1.sharpe >= ranked[1].1.sharpe);
    assert!(evaluator.rank_factors(&factors, &returns, "no_such_metric").is_err());
}
