use crate::config::{AppConfig, BacktestingConfig, CheckpointConfig, RewardConfig, TrainingConfig};
use crate::data::FeatureTensor;
use crate::engines::evaluation::{FactorEvaluator, StackVm};
use crate::engines::generation::{
    checkpoint,
    generator::AlphaGenerator,
    hall_of_fame::{EliteFormula, HallOfFame},
    progress::ProgressCallback,
};
use crate::engines::metrics::FactorMetrics;
use crate::error::{AlphagenError, Result};
use crate::functions::Vocabulary;
use crate::types::{BestFormula, CandidateOutcome, Formula, Token, TrainingRecord};
use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use chrono::Utc;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Result of executing and scoring one sampled formula.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub outcome: CandidateOutcome,
    /// Training reward after clipping
    pub reward: f64,
    /// Reward before the final clip, present only for scored candidates
    pub score: Option<f64>,
    pub metrics: Option<FactorMetrics>,
}

/// Execute and score stage of a training step. Holds no mutable state so candidates can be
/// scored on the rayon pool.
pub struct CandidateScorer {
    vm: StackVm,
    evaluator: FactorEvaluator,
    reward: RewardConfig,
    min_activity: f64,
}

impl CandidateScorer {
    pub fn new(vm: StackVm, backtesting: BacktestingConfig, reward: RewardConfig) -> Self {
        let min_activity = backtesting.min_activity;
        Self {
            vm,
            evaluator: FactorEvaluator::new(backtesting, reward.clone()),
            reward,
            min_activity,
        }
    }

    pub fn vm(&self) -> &StackVm {
        &self.vm
    }

    pub fn evaluator(&self) -> &FactorEvaluator {
        &self.evaluator
    }

    fn penalty(&self, outcome: CandidateOutcome, value: f64) -> ScoredCandidate {
        ScoredCandidate {
            outcome,
            reward: value,
            score: None,
            metrics: None,
        }
    }

    pub fn score(&self, formula: &[Token], features: &FeatureTensor, returns: &Array2<f64>) -> ScoredCandidate {
        let factor = match self.vm.execute(formula, features) {
            Some(factor) => factor,
            None => return self.penalty(CandidateOutcome::Invalid, self.reward.invalid_penalty),
        };

        if factor.std(0.0) < self.reward.constant_threshold {
            return self.penalty(CandidateOutcome::Constant, self.reward.constant_penalty);
        }

        let metrics = match self.evaluator.evaluate(&factor, returns, None) {
            Ok(metrics) => metrics,
            Err(e) => {
                log::debug!("Scoring {} failed: {}", self.vm.decode(formula), e);
                return self.penalty(CandidateOutcome::EvaluationFailed, self.reward.invalid_penalty);
            }
        };

        if metrics.activity < self.min_activity {
            return ScoredCandidate {
                outcome: CandidateOutcome::LowActivity,
                reward: self.reward.low_activity_penalty,
                score: None,
                metrics: Some(metrics),
            };
        }

        let score = self.evaluator.reward_from_metrics(&metrics);
        ScoredCandidate {
            outcome: CandidateOutcome::Scored,
            reward: score.clamp(-self.reward.reward_clip, self.reward.reward_clip),
            score: Some(score),
            metrics: Some(metrics),
        }
    }
}

/// What `train` hands back to the caller.
#[derive(Debug, Clone)]
pub struct TrainingResult {
    pub best: Option<BestFormula>,
    pub best_metrics: Option<FactorMetrics>,
    pub history: Vec<TrainingRecord>,
    pub steps_completed: usize,
    pub cancelled: bool,
}

/// Policy-gradient loop over the formula generator.
///
/// Owns the generator parameters, the optimizer state and the best formula. One instance
/// serves one training run at a time.
pub struct AlphaTrainer {
    vocab: Arc<Vocabulary>,
    generator: AlphaGenerator,
    optimizer: AdamW,
    scorer: CandidateScorer,
    training: TrainingConfig,
    checkpoint: CheckpointConfig,
    max_formula_len: usize,
    rng: StdRng,
    best: Option<BestFormula>,
    best_metrics: Option<FactorMetrics>,
    hall_of_fame: HallOfFame,
    history: Vec<TrainingRecord>,
    step: usize,
    cancel: Arc<AtomicBool>,
}

impl AlphaTrainer {
    pub fn new(config: &AppConfig, vocab: Arc<Vocabulary>) -> Result<Self> {
        config.validate()?;
        let device = config.device.to_device()?;
        let generator = AlphaGenerator::new(&config.model, &vocab, &device)?;
        Self::with_generator(config, vocab, generator)
    }

    pub fn with_generator(config: &AppConfig, vocab: Arc<Vocabulary>, generator: AlphaGenerator) -> Result<Self> {
        if generator.config().vocab_size != vocab.size() {
            return Err(AlphagenError::VocabularyMismatch {
                expected: generator.config().vocab_size,
                actual: vocab.size(),
            });
        }

        let optimizer = Self::build_optimizer(&generator, config.training.learning_rate)?;
        let rng = match config.training.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let max_formula_len = config.model.max_formula_len.min(generator.config().max_formula_len);

        Ok(Self {
            scorer: CandidateScorer::new(
                StackVm::new(vocab.clone()),
                config.backtesting.clone(),
                config.reward.clone(),
            ),
            vocab,
            generator,
            optimizer,
            training: config.training.clone(),
            checkpoint: config.checkpoint.clone(),
            max_formula_len,
            rng,
            best: None,
            best_metrics: None,
            hall_of_fame: HallOfFame::new(config.training.hall_of_fame_size),
            history: Vec::new(),
            step: 0,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    fn build_optimizer(generator: &AlphaGenerator, learning_rate: f64) -> Result<AdamW> {
        let params = ParamsAdamW {
            lr: learning_rate,
            ..Default::default()
        };
        Ok(AdamW::new(generator.varmap().all_vars(), params)?)
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocab
    }

    pub fn generator(&self) -> &AlphaGenerator {
        &self.generator
    }

    pub fn scorer(&self) -> &CandidateScorer {
        &self.scorer
    }

    pub fn best(&self) -> Option<&BestFormula> {
        self.best.as_ref()
    }

    pub fn best_metrics(&self) -> Option<&FactorMetrics> {
        self.best_metrics.as_ref()
    }

    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall_of_fame
    }

    pub fn history(&self) -> &[TrainingRecord] {
        &self.history
    }

    pub fn steps_completed(&self) -> usize {
        self.step
    }

    pub fn max_formula_len(&self) -> usize {
        self.max_formula_len
    }

    /// Shared flag; setting it stops `train` at the next step boundary.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Non-training sampling pass with the trainer's RNG.
    pub fn sample(&mut self, batch_size: usize, temperature: f64) -> Result<Vec<Formula>> {
        let (formulas, _) =
            self.generator
                .generate(batch_size, self.max_formula_len, temperature, &mut self.rng)?;
        Ok(formulas)
    }

    fn check_inputs(&self, features: &FeatureTensor, returns: &Array2<f64>) -> Result<()> {
        features.ensure_matches(&self.vocab)?;
        let expected = (features.batch_size(), features.time_steps());
        if returns.dim() != expected {
            return Err(AlphagenError::Training(format!(
                "Returns shape {:?} does not match features [batch, time] {:?}",
                returns.dim(),
                expected
            )));
        }
        Ok(())
    }

    /// Score a batch of formulas, preserving order.
    pub fn score_batch(&self, formulas: &[Formula], features: &FeatureTensor, returns: &Array2<f64>) -> Vec<ScoredCandidate> {
        let scorer = &self.scorer;
        if self.training.parallel_scoring {
            formulas
                .par_iter()
                .map(|f| scorer.score(f, features, returns))
                .collect()
        } else {
            formulas
                .iter()
                .map(|f| scorer.score(f, features, returns))
                .collect()
        }
    }

    /// Sample, execute, score, update best, then take one policy-gradient step.
    pub fn train_step(&mut self, features: &FeatureTensor, returns: &Array2<f64>) -> Result<TrainingRecord> {
        self.check_inputs(features, returns)?;
        self.step += 1;
        let step = self.step;

        let batch = match self.generator.generate_with_training(
            self.training.batch_size,
            self.max_formula_len,
            self.training.temperature,
            &mut self.rng,
        ) {
            Ok(batch) => batch,
            Err(e) => {
                log::warn!("Step {}: sampling failed, step skipped: {}", step, e);
                let record = self.skipped_record(step);
                self.history.push(record.clone());
                return Ok(record);
            }
        };

        let scored = self.score_batch(&batch.formulas, features, returns);
        self.update_best(step, &batch.formulas, &scored);

        let rewards: Vec<f64> = scored.iter().map(|c| c.reward).collect();
        let advantages = normalise_advantages(&rewards, self.training.advantage_eps);

        let (loss, update_skipped) = match self.update(&batch.log_probs, &batch.values, &rewards, &advantages) {
            Ok(loss) => (loss, false),
            Err(e) => {
                log::warn!("Step {}: skipping parameter update: {}", step, e);
                (f64::NAN, true)
            }
        };

        let n = rewards.len().max(1) as f64;
        let valid = scored.iter().filter(|c| c.outcome.is_valid()).count();
        let record = TrainingRecord {
            step,
            loss,
            reward_mean: rewards.iter().sum::<f64>() / n,
            reward_max: rewards.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            reward_min: rewards.iter().copied().fold(f64::INFINITY, f64::min),
            valid_fraction: valid as f64 / n,
            best_score: self.best.as_ref().map(|b| b.score),
            best_formula: self.best.as_ref().map(|b| b.formula.clone()),
            best_tokens: self.best.as_ref().map(|b| b.tokens.clone()),
            update_skipped,
        };

        log::debug!(
            "Step {}: loss {:.4}, reward mean {:.3}, valid {:.1}%",
            step,
            record.loss,
            record.reward_mean,
            record.valid_fraction * 100.0
        );
        self.history.push(record.clone());
        Ok(record)
    }

    /// Record for a step that produced no batch. Reward statistics are undefined.
    fn skipped_record(&self, step: usize) -> TrainingRecord {
        TrainingRecord {
            step,
            loss: f64::NAN,
            reward_mean: f64::NAN,
            reward_max: f64::NAN,
            reward_min: f64::NAN,
            valid_fraction: 0.0,
            best_score: self.best.as_ref().map(|b| b.score),
            best_formula: self.best.as_ref().map(|b| b.formula.clone()),
            best_tokens: self.best.as_ref().map(|b| b.tokens.clone()),
            update_skipped: true,
        }
    }

    fn update_best(&mut self, step: usize, formulas: &[Formula], scored: &[ScoredCandidate]) {
        let mut step_best: Option<(usize, f64)> = None;

        for (i, candidate) in scored.iter().enumerate() {
            let score = match (candidate.outcome, candidate.score) {
                (CandidateOutcome::Scored, Some(score)) if score.is_finite() => score,
                _ => continue,
            };

            self.hall_of_fame.try_add(EliteFormula {
                tokens: formulas[i].clone(),
                formula: self.scorer.vm().decode(&formulas[i]),
                score,
                metrics: candidate.metrics.clone(),
                step,
            });

            if step_best.map_or(true, |(_, s)| score > s) {
                step_best = Some((i, score));
            }
        }

        let (index, score) = match step_best {
            Some(best) => best,
            None => return,
        };
        if self.best.as_ref().map_or(false, |b| score <= b.score) {
            return;
        }

        let best = BestFormula {
            tokens: formulas[index].clone(),
            formula: self.scorer.vm().decode(&formulas[index]),
            score,
            step,
            recorded_at: Utc::now(),
        };
        log::info!("Step {}: new best {:.4} {}", step, best.score, best.formula);
        self.best = Some(best);
        self.best_metrics = scored[index].metrics.clone();
    }

    fn update(&mut self, log_probs: &Tensor, values: &Tensor, rewards: &[f64], advantages: &[f64]) -> Result<f64> {
        let device = self.generator.device().clone();
        let batch_size = advantages.len();

        let advantage = Tensor::from_vec(
            advantages.iter().map(|&a| a as f32).collect::<Vec<f32>>(),
            batch_size,
            &device,
        )?;
        // Sum over generation steps, average over the batch
        let policy_loss = (log_probs.sum(1)? * advantage)?.mean_all()?.neg()?;

        let loss = if self.training.value_coef > 0.0 {
            let target = Tensor::from_vec(
                rewards.iter().map(|&r| r as f32).collect::<Vec<f32>>(),
                (batch_size, 1),
                &device,
            )?;
            let value_loss = values.broadcast_sub(&target)?.sqr()?.mean_all()?;
            (policy_loss + (value_loss * self.training.value_coef)?)?
        } else {
            policy_loss
        };

        let loss_value = loss.to_scalar::<f32>()? as f64;
        if !loss_value.is_finite() {
            return Err(AlphagenError::Training(format!("non-finite loss {}", loss_value)));
        }

        let mut grads = loss.backward()?;
        let vars: Vec<Var> = self.generator.varmap().all_vars();

        let mut squared = 0.0f64;
        for var in &vars {
            if let Some(grad) = grads.get(var.as_tensor()) {
                squared += grad.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
            }
        }
        let norm = squared.sqrt();
        if !norm.is_finite() {
            return Err(AlphagenError::Training(format!("non-finite gradient norm {}", norm)));
        }
        if norm > self.training.grad_clip {
            let scale = self.training.grad_clip / (norm + 1e-6);
            for var in &vars {
                if let Some(grad) = grads.remove(var.as_tensor()) {
                    grads.insert(var.as_tensor(), (grad * scale)?);
                }
            }
        }

        self.optimizer.step(&grads)?;
        Ok(loss_value)
    }

    /// Run up to `num_steps` steps. Stops early, between steps, when the cancel flag is set.
    pub fn train<C>(
        &mut self,
        features: &FeatureTensor,
        returns: &Array2<f64>,
        num_steps: usize,
        callback: &mut C,
    ) -> Result<TrainingResult>
    where
        C: ProgressCallback + ?Sized,
    {
        self.check_inputs(features, returns)?;
        let start_history = self.history.len();
        let mut cancelled = false;

        log::info!(
            "Training for {} steps, batch {}, formula length {}",
            num_steps,
            self.training.batch_size,
            self.max_formula_len
        );

        for i in 0..num_steps {
            if self.cancel.load(Ordering::SeqCst) {
                log::info!("Training cancelled after {} steps", i);
                cancelled = true;
                break;
            }

            callback.on_step_start(self.step + 1, num_steps);
            let previous_best = self.best.as_ref().map(|b| b.score);
            let record = self.train_step(features, returns)?;

            if let Some(best) = &self.best {
                if previous_best.map_or(true, |s| best.score > s) {
                    callback.on_new_best(best);
                }
            }
            if let Err(e) = callback.on_step_complete(&record) {
                log::warn!("Progress callback failed at step {}: {:#}", record.step, e);
            }

            let every = self.checkpoint.every_n_steps;
            if every > 0 && self.step % every == 0 {
                if let Err(e) = self.save_checkpoint() {
                    log::warn!("Checkpoint at step {} failed: {}", self.step, e);
                }
            }
        }

        Ok(TrainingResult {
            best: self.best.clone(),
            best_metrics: self.best_metrics.clone(),
            history: self.history[start_history..].to_vec(),
            steps_completed: self.history.len() - start_history,
            cancelled,
        })
    }

    /// Write a checkpoint for the current step under the configured directory.
    pub fn save_checkpoint(&self) -> Result<std::path::PathBuf> {
        let dir = checkpoint::step_dir(&self.checkpoint.directory, self.step);
        self.save_to(&dir)?;
        Ok(dir)
    }

    pub fn save_to(&self, dir: &Path) -> Result<()> {
        checkpoint::save_checkpoint(dir, &self.generator, self.best.as_ref())
    }

    /// Replace generator weights and best formula with those stored in `dir`. Optimizer state
    /// starts fresh.
    pub fn restore(&mut self, dir: &Path) -> Result<()> {
        let generator = AlphaGenerator::load(dir, &self.vocab, self.generator.device())?;
        self.optimizer = Self::build_optimizer(&generator, self.training.learning_rate)?;
        self.max_formula_len = self.max_formula_len.min(generator.config().max_formula_len);
        self.generator = generator;

        if let Some(best) = checkpoint::load_best_formula(dir)? {
            self.step = self.step.max(best.step);
            self.best = Some(best);
            self.best_metrics = None;
        }
        Ok(())
    }
}

/// `(r - mean) / (std + eps)` over the batch.
pub fn normalise_advantages(rewards: &[f64], eps: f64) -> Vec<f64> {
    if rewards.is_empty() {
        return Vec::new();
    }
    let n = rewards.len() as f64;
    let mean = rewards.iter().sum::<f64>() / n;
    let std = (rewards.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    rewards.iter().map(|r| (r - mean) / (std + eps)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_advantages_are_standardised() {
        let adv = normalise_advantages(&[1.0, 2.0, 3.0, 4.0], 1e-8);
        let mean: f64 = adv.iter().sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);
        assert!(adv[3] > adv[0]);
        assert!(normalise_advantages(&[2.0, 2.0], 1e-8).iter().all(|&a| a == 0.0));
    }

    #[test]
    fn test_scorer_penalties() {
        let vocab = Arc::new(Vocabulary::standard());
        let reward = RewardConfig::default();
        let scorer = CandidateScorer::new(StackVm::new(vocab.clone()), BacktestingConfig::default(), reward.clone());

        let features = FeatureTensor::new(Array3::zeros((2, 6, 30)));
        let returns = Array2::zeros((2, 30));
        let add = vocab.name_to_token("ADD").unwrap();

        let invalid = scorer.score(&[add], &features, &returns);
        assert_eq!(invalid.outcome, CandidateOutcome::Invalid);
        assert_eq!(invalid.reward, reward.invalid_penalty);

        let constant = scorer.score(&[0, 1, add], &features, &returns);
        assert_eq!(constant.outcome, CandidateOutcome::Constant);
        assert_eq!(constant.reward, reward.constant_penalty);
    }

    #[test]
    fn test_downside_free_score_is_capped_then_penalised() {
        let vocab = Arc::new(Vocabulary::standard());
        let reward = RewardConfig {
            reward_clip: 0.5,
            ..RewardConfig::default()
        };
        let backtesting = BacktestingConfig {
            cost_rate: 0.0,
            ..BacktestingConfig::default()
        };
        let scorer = CandidateScorer::new(StackVm::new(vocab), backtesting, reward);

        let time = 40;
        let rets: Vec<f64> = (0..time).map(|t| if t % 2 == 0 { 0.01 } else { -0.01 }).collect();
        let mut data = Array3::zeros((1, 6, time));
        for t in 0..time - 1 {
            data[[0, 0, t]] = rets[t + 1];
        }
        let features = FeatureTensor::new(data);
        let returns = Array2::from_shape_vec((1, time), rets).unwrap();

        let candidate = scorer.score(&[0], &features, &returns);
        assert_eq!(candidate.outcome, CandidateOutcome::Scored);
        let metrics = candidate.metrics.clone().unwrap();
        assert_eq!(metrics.sortino, f64::INFINITY);

        // Flipping every bar keeps turnover above its threshold
        let expected = 0.5 - (metrics.turnover - 0.5).max(0.0) - (metrics.max_drawdown - 0.2).max(0.0);
        let score = candidate.score.unwrap();
        assert!(score.is_finite());
        assert!(score < 0.5);
        assert!((score - expected).abs() < 1e-12);
        assert_eq!(candidate.reward, score.clamp(-0.5, 0.5));
    }
}
