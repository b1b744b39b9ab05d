use super::traits::{invalid, ConfigSection};
use crate::error::AlphagenError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub num_steps: usize,
    pub learning_rate: f64,
    pub temperature: f64,
    /// Global gradient norm ceiling
    pub grad_clip: f64,
    /// Weight of the critic loss on the value head; 0 trains the policy alone
    pub value_coef: f64,
    pub advantage_eps: f64,
    pub seed: Option<u64>,
    /// Execute and score candidates on the rayon pool
    pub parallel_scoring: bool,
    pub hall_of_fame_size: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            num_steps: 100,
            learning_rate: 1e-3,
            temperature: 1.0,
            grad_clip: 1.0,
            value_coef: 0.0,
            advantage_eps: 1e-8,
            seed: None,
            parallel_scoring: true,
            hall_of_fame_size: 20,
        }
    }
}

impl ConfigSection for TrainingConfig {
    fn section_name() -> &'static str {
        "training"
    }

    fn validate(&self) -> Result<(), AlphagenError> {
        if self.batch_size < 2 {
            return Err(invalid(Self::section_name(), "batch_size must be at least 2"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(invalid(Self::section_name(), "learning_rate must be positive"));
        }
        if !(self.temperature > 0.0) {
            return Err(invalid(Self::section_name(), "temperature must be positive"));
        }
        if !(self.grad_clip > 0.0) {
            return Err(invalid(Self::section_name(), "grad_clip must be positive"));
        }
        if self.value_coef < 0.0 {
            return Err(invalid(Self::section_name(), "value_coef cannot be negative"));
        }
        Ok(())
    }
}

/// Reward shaping applied by the trainer and the evaluator's risk prior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub invalid_penalty: f64,
    pub constant_penalty: f64,
    pub low_activity_penalty: f64,
    /// Factors whose standard deviation falls below this are treated as constant
    pub constant_threshold: f64,
    /// Caps Sortino inside the reward, and clips rewards to `[-reward_clip, reward_clip]`
    /// before normalisation
    pub reward_clip: f64,
    pub turnover_threshold: f64,
    pub turnover_penalty_scale: f64,
    pub drawdown_threshold: f64,
    pub drawdown_penalty_scale: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            invalid_penalty: -5.0,
            constant_penalty: -2.0,
            low_activity_penalty: -1.0,
            constant_threshold: 1e-4,
            reward_clip: 10.0,
            turnover_threshold: 0.5,
            turnover_penalty_scale: 1.0,
            drawdown_threshold: 0.2,
            drawdown_penalty_scale: 1.0,
        }
    }
}

impl ConfigSection for RewardConfig {
    fn section_name() -> &'static str {
        "reward"
    }

    fn validate(&self) -> Result<(), AlphagenError> {
        if self.constant_threshold < 0.0 {
            return Err(invalid(Self::section_name(), "constant_threshold cannot be negative"));
        }
        if !(self.reward_clip > 0.0) {
            return Err(invalid(Self::section_name(), "reward_clip must be positive"));
        }
        if self.turnover_penalty_scale <= 0.0 || self.drawdown_penalty_scale <= 0.0 {
            return Err(invalid(Self::section_name(), "penalty scales must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// 0 disables periodic checkpoints
    pub every_n_steps: usize,
    pub directory: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            every_n_steps: 50,
            directory: PathBuf::from("checkpoints"),
        }
    }
}

impl ConfigSection for CheckpointConfig {
    fn section_name() -> &'static str {
        "checkpoint"
    }

    fn validate(&self) -> Result<(), AlphagenError> {
        if self.every_n_steps > 0 && self.directory.as_os_str().is_empty() {
            return Err(invalid(Self::section_name(), "directory is required when checkpointing"));
        }
        Ok(())
    }
}
