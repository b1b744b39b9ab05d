use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Vocabulary index. Features occupy `[0, F)`, operators `[F, F + O)`.
pub type Token = u32;

/// Postfix token program.
pub type Formula = Vec<Token>;

/// `[batch, time]` output of an executed formula.
pub type FactorSeries = Array2<f64>;

/// Highest-scoring formula seen by a trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestFormula {
    pub tokens: Vec<Token>,
    pub formula: String,
    pub score: f64,
    pub step: usize,
    pub recorded_at: DateTime<Utc>,
}

/// What happened to a single sampled candidate inside a training step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CandidateOutcome {
    /// VM returned no result (underflow, leftover stack, missing channel)
    Invalid,
    /// Output variance below the configured threshold
    Constant,
    /// Position series almost never active
    LowActivity,
    /// Metric computation failed
    EvaluationFailed,
    Scored,
}

impl CandidateOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Scored | Self::LowActivity)
    }
}

/// Per-step training metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub step: usize,
    pub loss: f64,
    pub reward_mean: f64,
    pub reward_max: f64,
    pub reward_min: f64,
    pub valid_fraction: f64,
    pub best_score: Option<f64>,
    pub best_formula: Option<String>,
    pub best_tokens: Option<Vec<Token>>,
    /// Set when the parameter update was skipped (non-finite loss or optimizer failure)
    pub update_skipped: bool,
}
