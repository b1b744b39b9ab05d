//! Autoregressive formula policy.
//!
//! Token embedding plus learned position embedding, a stack of causal blocks, then a policy
//! head (logits over the vocabulary) and a value head, both read from the last position.
//! Sequences start from a BOS token whose id is one past the last vocabulary token; BOS is
//! never sampled.

use super::attention::CausalBlock;
use crate::config::ModelConfig;
use crate::error::{AlphagenError, Result};
use crate::functions::Vocabulary;
use crate::types::{Formula, Token};
use candle_core::{DType, Device, IndexOp, Tensor, D};
use candle_nn::{
    embedding, layer_norm, linear, Embedding, LayerNorm, Linear, Module, VarBuilder, VarMap,
};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const WEIGHTS_FILE: &str = "generator.safetensors";
pub const CONFIG_FILE: &str = "generator.json";

/// Everything needed to rebuild the network before loading weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub d_model: usize,
    pub n_heads: usize,
    pub n_layers: usize,
    pub max_formula_len: usize,
    pub ff_mult: usize,
    pub vocab_size: usize,
    pub feature_names: Vec<String>,
}

impl GeneratorConfig {
    pub fn new(model: &ModelConfig, vocab: &Vocabulary) -> Self {
        Self {
            d_model: model.d_model,
            n_heads: model.n_heads,
            n_layers: model.n_layers,
            max_formula_len: model.max_formula_len,
            ff_mult: model.ff_mult,
            vocab_size: vocab.size(),
            feature_names: vocab.feature_names().to_vec(),
        }
    }

    pub fn bos_token(&self) -> Token {
        self.vocab_size as Token
    }
}

/// Output of a sampling pass that keeps the autograd graph.
pub struct TrainingBatch {
    pub formulas: Vec<Formula>,
    /// `[batch, max_len]` log-probabilities of the sampled tokens
    pub log_probs: Tensor,
    /// `[batch, max_len]` value estimates at each step
    pub values: Tensor,
}

pub struct AlphaGenerator {
    config: GeneratorConfig,
    varmap: VarMap,
    device: Device,
    token_embedding: Embedding,
    position_embedding: Embedding,
    blocks: Vec<CausalBlock>,
    final_norm: LayerNorm,
    policy_head: Linear,
    value_head: Linear,
}

impl AlphaGenerator {
    pub fn new(model: &ModelConfig, vocab: &Vocabulary, device: &Device) -> Result<Self> {
        Self::from_config(GeneratorConfig::new(model, vocab), device)
    }

    fn from_config(config: GeneratorConfig, device: &Device) -> Result<Self> {
        if config.vocab_size == 0 || config.max_formula_len == 0 {
            return Err(AlphagenError::Generator(
                "Vocabulary and formula length must be non-zero".to_string(),
            ));
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

        let token_embedding = embedding(config.vocab_size + 1, config.d_model, vb.pp("token_embedding"))?;
        let position_embedding = embedding(
            config.max_formula_len + 1,
            config.d_model,
            vb.pp("position_embedding"),
        )?;
        let blocks = (0..config.n_layers)
            .map(|i| {
                CausalBlock::new(
                    config.d_model,
                    config.n_heads,
                    config.ff_mult,
                    vb.pp(format!("block_{}", i)),
                )
            })
            .collect::<candle_core::Result<Vec<_>>>()?;
        let final_norm = layer_norm(config.d_model, 1e-5, vb.pp("final_norm"))?;
        let policy_head = linear(config.d_model, config.vocab_size, vb.pp("policy_head"))?;
        let value_head = linear(config.d_model, 1, vb.pp("value_head"))?;

        Ok(Self {
            config,
            varmap,
            device: device.clone(),
            token_embedding,
            position_embedding,
            blocks,
            final_norm,
            policy_head,
            value_head,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// `tokens`: `[batch, seq]` u32 starting with BOS. Returns `(logits [batch, vocab],
    /// value [batch])` for the last position.
    pub fn forward(&self, tokens: &Tensor) -> Result<(Tensor, Tensor)> {
        let (_, seq_len) = tokens.dims2()?;
        if seq_len > self.config.max_formula_len + 1 {
            return Err(AlphagenError::Generator(format!(
                "Sequence of {} exceeds the model context {}",
                seq_len,
                self.config.max_formula_len + 1
            )));
        }

        let positions = Tensor::arange(0u32, seq_len as u32, &self.device)?;
        let mut x = self
            .token_embedding
            .forward(tokens)?
            .broadcast_add(&self.position_embedding.forward(&positions)?)?;
        for block in &self.blocks {
            x = block.forward(&x)?;
        }

        let last = self.final_norm.forward(&x)?.i((.., seq_len - 1, ..))?.contiguous()?;
        let logits = self.policy_head.forward(&last)?;
        let value = self.value_head.forward(&last)?.squeeze(1)?;
        Ok((logits, value))
    }

    fn check_len(&self, max_len: usize) -> Result<()> {
        if max_len == 0 || max_len > self.config.max_formula_len {
            return Err(AlphagenError::Generator(format!(
                "max_len {} outside 1..={}",
                max_len, self.config.max_formula_len
            )));
        }
        Ok(())
    }

    /// One categorical draw per row of `log_probs` (`[batch, vocab]`).
    fn sample_rows<R: Rng + ?Sized>(log_probs: &Tensor, rng: &mut R) -> Result<Vec<Token>> {
        log_probs
            .exp()?
            .to_vec2::<f32>()?
            .into_iter()
            .map(|row| {
                let weights: Vec<f32> = row
                    .into_iter()
                    .map(|p| if p.is_finite() && p > 0.0 { p } else { 0.0 })
                    .collect();
                let dist = WeightedIndex::new(&weights)
                    .map_err(|e| AlphagenError::Generator(format!("Invalid distribution: {}", e)))?;
                Ok(dist.sample(rng) as Token)
            })
            .collect()
    }

    /// Scaled log-softmax and value for the current prefix.
    fn step(&self, prefix: &Tensor, temperature: f64) -> Result<(Tensor, Tensor)> {
        let (logits, value) = self.forward(prefix)?;
        let logits = (logits / temperature.max(1e-6))?;
        let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?;
        Ok((log_probs, value))
    }

    fn extend(prefix: &Tensor, sampled: &[Token], device: &Device) -> Result<Tensor> {
        let column = Tensor::from_slice(sampled, (sampled.len(), 1), device)?;
        Ok(Tensor::cat(&[prefix, &column], 1)?)
    }

    /// Sample `batch_size` formulas of exactly `max_len` tokens with their per-token
    /// log-probabilities. No gradient information is kept.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        max_len: usize,
        temperature: f64,
        rng: &mut R,
    ) -> Result<(Vec<Formula>, Vec<Vec<f64>>)> {
        self.check_len(max_len)?;

        let mut formulas = vec![Vec::with_capacity(max_len); batch_size];
        let mut log_probs = vec![Vec::with_capacity(max_len); batch_size];
        let bos = vec![self.config.bos_token(); batch_size];
        let mut prefix = Tensor::from_vec(bos, (batch_size, 1), &self.device)?;

        for _ in 0..max_len {
            let (step_log_probs, _) = self.step(&prefix, temperature)?;
            let step_log_probs = step_log_probs.detach();
            let sampled = Self::sample_rows(&step_log_probs, rng)?;
            let table = step_log_probs.to_vec2::<f32>()?;

            for (b, &token) in sampled.iter().enumerate() {
                formulas[b].push(token);
                log_probs[b].push(table[b][token as usize] as f64);
            }
            prefix = Self::extend(&prefix, &sampled, &self.device)?;
        }

        Ok((formulas, log_probs))
    }

    /// Same sampling procedure, keeping the graph so the returned log-probabilities and values
    /// can be differentiated.
    pub fn generate_with_training<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        max_len: usize,
        temperature: f64,
        rng: &mut R,
    ) -> Result<TrainingBatch> {
        self.check_len(max_len)?;

        let mut formulas = vec![Vec::with_capacity(max_len); batch_size];
        let mut step_log_probs = Vec::with_capacity(max_len);
        let mut step_values = Vec::with_capacity(max_len);
        let bos = vec![self.config.bos_token(); batch_size];
        let mut prefix = Tensor::from_vec(bos, (batch_size, 1), &self.device)?;

        for _ in 0..max_len {
            let (log_probs, value) = self.step(&prefix, temperature)?;
            let sampled = Self::sample_rows(&log_probs.detach(), rng)?;

            let index = Tensor::from_slice(&sampled, (batch_size, 1), &self.device)?;
            step_log_probs.push(log_probs.gather(&index, 1)?);
            step_values.push(value.unsqueeze(1)?);

            for (b, &token) in sampled.iter().enumerate() {
                formulas[b].push(token);
            }
            prefix = Self::extend(&prefix, &sampled, &self.device)?;
        }

        Ok(TrainingBatch {
            formulas,
            log_probs: Tensor::cat(&step_log_probs, 1)?,
            values: Tensor::cat(&step_values, 1)?,
        })
    }

    /// Write weights and architecture into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        self.varmap.save(dir.join(WEIGHTS_FILE))?;
        fs::write(dir.join(CONFIG_FILE), serde_json::to_string_pretty(&self.config)?)?;
        log::debug!("Saved generator to {}", dir.display());
        Ok(())
    }

    /// Rebuild a generator saved by `save`. The vocabulary must match the one it was trained
    /// with in size and feature order.
    pub fn load(dir: &Path, vocab: &Vocabulary, device: &Device) -> Result<Self> {
        let config: GeneratorConfig = serde_json::from_str(&fs::read_to_string(dir.join(CONFIG_FILE))?)?;

        if config.vocab_size != vocab.size() {
            return Err(AlphagenError::VocabularyMismatch {
                expected: config.vocab_size,
                actual: vocab.size(),
            });
        }
        if config.feature_names != vocab.feature_names() {
            return Err(AlphagenError::Generator(format!(
                "Checkpoint features {:?} differ from vocabulary features {:?}",
                config.feature_names,
                vocab.feature_names()
            )));
        }

        let mut generator = Self::from_config(config, device)?;
        generator.varmap.load(dir.join(WEIGHTS_FILE))?;
        log::info!("Loaded generator from {}", dir.display());
        Ok(generator)
    }
}
