use alphagen::engines::evaluation::Portfolio;

#[test]
fn test_flat_signal_has_no_cost() {
    let mut portfolio = Portfolio::new(0.3, 1, 0.001);
    for r in [0.01, -0.02, 0.03] {
        portfolio.process_bar(0.1, r);
    }
    assert!(portfolio.net_returns.iter().all(|&r| r == 0.0));
    assert_eq!(portfolio.mean_turnover(), 0.0);
    assert_eq!(portfolio.activity(), 0.0);
}

#[test]
fn test_reversal_costs_twice() {
    let mut portfolio = Portfolio::new(0.3, 1, 0.01);
    portfolio.process_bar(0.9, 0.0);
    portfolio.process_bar(-0.9, 0.0);

    assert_eq!(portfolio.positions, vec![1.0, -1.0]);
    assert_eq!(portfolio.turnover, vec![1.0, 2.0]);
    assert!((portfolio.net_returns[1] + 0.02).abs() < 1e-12);
}

#[test]
fn test_short_position_profits_from_fall() {
    let mut portfolio = Portfolio::new(0.3, 1, 0.0);
    portfolio.process_bar(-0.8, 0.0);
    portfolio.process_bar(-0.8, -0.05);
    assert!((portfolio.net_returns[1] - 0.05).abs() < 1e-12);
    assert_eq!(portfolio.active_returns().len(), 1);
}
