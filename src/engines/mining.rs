//! Entry point for callers that want discovered formulas rather than a trainer: one mining
//! run, a ranked non-training pass, and evaluation of user-supplied formula text.

use crate::config::AppConfig;
use crate::data::FeatureTensor;
use crate::engines::evaluation::FormulaParser;
use crate::engines::generation::{
    AlphaTrainer, ChannelProgressCallback, EliteFormula, HallOfFame, ProgressCallback,
    ProgressMessage,
};
use crate::engines::metrics::FactorMetrics;
use crate::error::{AlphagenError, Result};
use crate::functions::Vocabulary;
use crate::types::{CandidateOutcome, Token, TrainingRecord};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Result of one mining run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningReport {
    pub best_tokens: Option<Vec<Token>>,
    pub best_formula: Option<String>,
    pub best_score: Option<f64>,
    pub metrics: Option<FactorMetrics>,
    /// Distinct formulas seen during training, best first
    pub top: Vec<EliteFormula>,
    pub history: Vec<TrainingRecord>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Text did not resolve to tokens
    Parse,
    /// Tokens did not execute to a single series
    Execution,
    /// Backtest metrics could not be computed
    Metrics,
}

/// Structured answer to a single-formula evaluation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaEvaluation {
    pub input: String,
    pub success: bool,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
    pub tokens: Option<Vec<Token>>,
    pub decoded: Option<String>,
    pub metrics: Option<FactorMetrics>,
    pub reward: Option<f64>,
}

impl FormulaEvaluation {
    fn failed(input: &str, kind: FailureKind, error: String, tokens: Option<Vec<Token>>) -> Self {
        Self {
            input: input.to_string(),
            success: false,
            failure: Some(kind),
            error: Some(error),
            tokens,
            decoded: None,
            metrics: None,
            reward: None,
        }
    }
}

pub struct AlphaMiner {
    config: AppConfig,
    trainer: AlphaTrainer,
    parser: FormulaParser,
}

impl AlphaMiner {
    /// Vocabulary is derived from the enabled feature channels.
    pub fn new(config: AppConfig) -> Result<Self> {
        let vocab = Arc::new(Vocabulary::from_config(&config.features)?);
        Self::with_vocabulary(config, vocab)
    }

    pub fn with_vocabulary(config: AppConfig, vocab: Arc<Vocabulary>) -> Result<Self> {
        let trainer = AlphaTrainer::new(&config, vocab.clone())?;
        Ok(Self {
            config,
            trainer,
            parser: FormulaParser::new(vocab),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        self.trainer.vocabulary()
    }

    pub fn trainer(&self) -> &AlphaTrainer {
        &self.trainer
    }

    pub fn trainer_mut(&mut self) -> &mut AlphaTrainer {
        &mut self.trainer
    }

    /// Train for the configured number of steps and report the best discovery.
    pub fn mine<C>(&mut self, features: &FeatureTensor, returns: &Array2<f64>, callback: &mut C) -> Result<MiningReport>
    where
        C: ProgressCallback + ?Sized,
    {
        let result = self
            .trainer
            .train(features, returns, self.config.training.num_steps, callback)?;

        Ok(MiningReport {
            best_tokens: result.best.as_ref().map(|b| b.tokens.clone()),
            best_formula: result.best.as_ref().map(|b| b.formula.clone()),
            best_score: result.best.as_ref().map(|b| b.score),
            metrics: result.best_metrics,
            top: self.trainer.hall_of_fame().get_all().to_vec(),
            history: result.history,
            cancelled: result.cancelled,
        })
    }

    /// Sample one batch without updating the generator and rank the distinct scored formulas.
    pub fn top_k(&mut self, features: &FeatureTensor, returns: &Array2<f64>, k: usize) -> Result<Vec<EliteFormula>> {
        let formulas = self.trainer.sample(
            self.config.training.batch_size,
            self.config.training.temperature,
        )?;
        let scored = self.trainer.score_batch(&formulas, features, returns);

        let mut ranked = HallOfFame::new(k);
        for (formula, candidate) in formulas.iter().zip(scored) {
            if let (CandidateOutcome::Scored, Some(score)) = (candidate.outcome, candidate.score) {
                ranked.try_add(EliteFormula {
                    tokens: formula.clone(),
                    formula: self.trainer.scorer().vm().decode(formula),
                    score,
                    metrics: candidate.metrics,
                    step: self.trainer.steps_completed(),
                });
            }
        }
        Ok(ranked.get_all().to_vec())
    }

    /// Parse, execute and backtest `text`, reporting which stage failed.
    pub fn evaluate_formula(
        &self,
        text: &str,
        features: &FeatureTensor,
        returns: &Array2<f64>,
        benchmark: Option<&Array2<f64>>,
    ) -> FormulaEvaluation {
        let tokens = match self.parser.parse(text) {
            Ok(tokens) => tokens,
            Err(e) => return FormulaEvaluation::failed(text, FailureKind::Parse, e.to_string(), None),
        };

        let scorer = self.trainer.scorer();
        let factor = match scorer.vm().execute(&tokens, features) {
            Some(factor) => factor,
            None => {
                return FormulaEvaluation::failed(
                    text,
                    FailureKind::Execution,
                    format!("{} did not execute", scorer.vm().decode(&tokens)),
                    Some(tokens),
                )
            }
        };

        match scorer.evaluator().evaluate(&factor, returns, benchmark) {
            Ok(metrics) => FormulaEvaluation {
                input: text.to_string(),
                success: true,
                failure: None,
                error: None,
                decoded: Some(scorer.vm().decode(&tokens)),
                tokens: Some(tokens),
                reward: Some(scorer.evaluator().reward_from_metrics(&metrics)),
                metrics: Some(metrics),
            },
            Err(e) => FormulaEvaluation::failed(text, FailureKind::Metrics, e.to_string(), Some(tokens)),
        }
    }
}

/// Mining run on a background thread, reporting through a channel.
pub struct MiningRunner {
    handle: Option<JoinHandle<Result<(AlphaMiner, MiningReport)>>>,
    progress_rx: Receiver<ProgressMessage>,
    cancel_flag: Arc<AtomicBool>,
}

impl MiningRunner {
    pub fn start(mut miner: AlphaMiner, features: FeatureTensor, returns: Array2<f64>) -> Result<Self> {
        let (progress_tx, progress_rx) = channel();
        let cancel_flag = miner.trainer().cancel_handle();

        let handle = thread::Builder::new()
            .name("alphagen-miner".to_string())
            .spawn(move || {
                let mut callback = ChannelProgressCallback::new(progress_tx);
                let report = miner.mine(&features, &returns, &mut callback)?;
                Ok((miner, report))
            })?;

        Ok(Self {
            handle: Some(handle),
            progress_rx,
            cancel_flag,
        })
    }

    /// Ask the run to stop at the next step boundary.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    /// Drain pending progress messages without blocking.
    pub fn poll_progress(&self) -> Vec<ProgressMessage> {
        self.progress_rx.try_iter().collect()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Block until the run ends, handing back the miner for further use.
    pub fn join(mut self) -> Result<(AlphaMiner, MiningReport)> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| AlphagenError::Training("Runner already joined".to_string()))?;
        handle
            .join()
            .map_err(|_| AlphagenError::Training("Mining thread panicked".to_string()))?
    }
}
