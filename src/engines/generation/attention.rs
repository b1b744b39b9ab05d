//! Causal transformer blocks used by the sequence generator.
//!
//! Pre-norm layout: `x + attn(ln1(x))` then `x + mlp(ln2(x))`. Every position attends only to
//! itself and earlier positions.

use candle_core::{DType, Result, Tensor, D};
use candle_nn::{layer_norm, linear, LayerNorm, Linear, Module, VarBuilder};

const MASK_FILL: f32 = -1e9;

/// `[seq, seq]` lower-triangular mask, 1 where attention is allowed.
pub fn causal_mask(seq_len: usize, device: &candle_core::Device) -> Result<Tensor> {
    Tensor::tril2(seq_len, DType::U8, device)
}

pub struct CausalSelfAttention {
    query_proj: Linear,
    key_proj: Linear,
    value_proj: Linear,
    output_proj: Linear,
    n_heads: usize,
    head_dim: usize,
}

impl CausalSelfAttention {
    pub fn new(d_model: usize, n_heads: usize, vb: VarBuilder) -> Result<Self> {
        if n_heads == 0 || d_model % n_heads != 0 {
            return Err(candle_core::Error::Msg(format!(
                "d_model {} is not divisible by n_heads {}",
                d_model, n_heads
            )));
        }

        Ok(Self {
            query_proj: linear(d_model, d_model, vb.pp("query"))?,
            key_proj: linear(d_model, d_model, vb.pp("key"))?,
            value_proj: linear(d_model, d_model, vb.pp("value"))?,
            output_proj: linear(d_model, d_model, vb.pp("output"))?,
            n_heads,
            head_dim: d_model / n_heads,
        })
    }

    /// `x`: `[batch, seq, d_model]`
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (batch_size, seq_len, _) = x.dims3()?;

        let split_heads = |t: Tensor| -> Result<Tensor> {
            t.reshape((batch_size, seq_len, self.n_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()
        };
        let q = split_heads(self.query_proj.forward(x)?)?;
        let k = split_heads(self.key_proj.forward(x)?)?;
        let v = split_heads(self.value_proj.forward(x)?)?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let scores = (q.matmul(&k.t()?)? * scale)?;

        let mask = causal_mask(seq_len, x.device())?.broadcast_as(scores.shape())?;
        let blocked = Tensor::full(MASK_FILL, scores.shape(), x.device())?.to_dtype(scores.dtype())?;
        let scores = mask.where_cond(&scores, &blocked)?;

        let weights = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let output = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((batch_size, seq_len, self.n_heads * self.head_dim))?;

        self.output_proj.forward(&output)
    }
}

pub struct CausalBlock {
    ln_attn: LayerNorm,
    attention: CausalSelfAttention,
    ln_mlp: LayerNorm,
    fc_in: Linear,
    fc_out: Linear,
}

impl CausalBlock {
    pub fn new(d_model: usize, n_heads: usize, ff_mult: usize, vb: VarBuilder) -> Result<Self> {
        let hidden = d_model * ff_mult.max(1);
        Ok(Self {
            ln_attn: layer_norm(d_model, 1e-5, vb.pp("ln_attn"))?,
            attention: CausalSelfAttention::new(d_model, n_heads, vb.pp("attention"))?,
            ln_mlp: layer_norm(d_model, 1e-5, vb.pp("ln_mlp"))?,
            fc_in: linear(d_model, hidden, vb.pp("fc_in"))?,
            fc_out: linear(hidden, d_model, vb.pp("fc_out"))?,
        })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let attended = self.attention.forward(&self.ln_attn.forward(x)?)?;
        let x = (x + attended)?;
        let hidden = self.fc_in.forward(&self.ln_mlp.forward(&x)?)?.gelu()?;
        x + self.fc_out.forward(&hidden)?
    }
}
