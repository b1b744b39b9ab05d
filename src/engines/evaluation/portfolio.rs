/// Bar-by-bar position book for one instrument.
///
/// The signal is mapped to a target position of +1 / -1 / 0 by a symmetric threshold. A
/// position must be held for `min_holding_period` bars before it can change. The return of
/// bar `t` is earned by the position held after bar `t - 1`, net of a cost proportional to
/// the position change made at bar `t`.
pub struct Portfolio {
    threshold: f64,
    min_holding_period: usize,
    cost_rate: f64,

    pub position: f64,
    pub bars_held: usize,
    pub positions: Vec<f64>,
    pub net_returns: Vec<f64>,
    pub turnover: Vec<f64>,
}

impl Portfolio {
    pub fn new(threshold: f64, min_holding_period: usize, cost_rate: f64) -> Self {
        Self {
            threshold,
            min_holding_period,
            cost_rate,
            position: 0.0,
            bars_held: 0,
            positions: Vec::new(),
            net_returns: Vec::new(),
            turnover: Vec::new(),
        }
    }

    pub fn with_capacity(mut self, bars: usize) -> Self {
        self.positions.reserve(bars);
        self.net_returns.reserve(bars);
        self.turnover.reserve(bars);
        self
    }

    fn target(&self, signal: f64) -> f64 {
        if signal > self.threshold {
            1.0
        } else if signal < -self.threshold {
            -1.0
        } else {
            0.0
        }
    }

    pub fn process_bar(&mut self, signal: f64, realized_return: f64) {
        let previous = self.position;
        let gross = previous * realized_return;

        let target = self.target(signal);
        let locked = previous != 0.0 && self.bars_held < self.min_holding_period;
        if target != previous && !locked {
            self.position = target;
            self.bars_held = 0;
        }
        if self.position != 0.0 {
            self.bars_held += 1;
        }

        let change = (self.position - previous).abs();
        self.turnover.push(change);
        self.net_returns.push(gross - self.cost_rate * change);
        self.positions.push(self.position);
    }

    pub fn mean_turnover(&self) -> f64 {
        mean(&self.turnover)
    }

    /// Fraction of bars with an open position.
    pub fn activity(&self) -> f64 {
        if self.positions.is_empty() {
            return 0.0;
        }
        self.positions.iter().filter(|&&p| p != 0.0).count() as f64 / self.positions.len() as f64
    }

    /// Net returns of bars where a position was carried in from the previous bar.
    pub fn active_returns(&self) -> Vec<f64> {
        self.net_returns
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(t, _)| self.positions[t - 1] != 0.0)
            .map(|(_, &r)| r)
            .collect()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
