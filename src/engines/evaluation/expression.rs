use crate::{
    data::FeatureTensor,
    functions::Vocabulary,
    types::{FactorSeries, Token},
};
use ndarray::Array2;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Replacement values for non-finite results: NaN, +Inf, -Inf.
pub const NAN_FILL: f64 = 0.0;
pub const POS_INF_FILL: f64 = 1.0;
pub const NEG_INF_FILL: f64 = -1.0;

/// Replace non-finite entries in place, returning how many were touched.
pub fn sanitize(values: &mut Array2<f64>) -> usize {
    let mut replaced = 0;
    values.mapv_inplace(|v| {
        if v.is_finite() {
            v
        } else {
            replaced += 1;
            if v.is_nan() {
                NAN_FILL
            } else if v > 0.0 {
                POS_INF_FILL
            } else {
                NEG_INF_FILL
            }
        }
    });
    replaced
}

/// Stack interpreter for postfix token programs.
///
/// Malformed programs are an expected outcome of random sampling, so every entry point
/// reports them as a value (`None`, `false`, a placeholder string) instead of an error.
#[derive(Debug, Clone)]
pub struct StackVm {
    vocab: Arc<Vocabulary>,
}

impl StackVm {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self { vocab }
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocab
    }

    /// Run `formula` against `tensor`. Returns `None` on stack underflow, leftover operands,
    /// unknown tokens, or a feature token beyond the tensor's channel count.
    pub fn execute(&self, formula: &[Token], tensor: &FeatureTensor) -> Option<FactorSeries> {
        let mut stack: Vec<Array2<f64>> = Vec::with_capacity(formula.len());
        let mut replaced = 0;

        for &token in formula {
            if self.vocab.is_feature(token) {
                let mut slice = tensor.channel(token as usize)?.to_owned();
                replaced += sanitize(&mut slice);
                stack.push(slice);
                continue;
            }

            let op = self.vocab.operator(token).ok()?;
            if stack.len() < op.arity {
                return None;
            }
            // split_off keeps push order, which is argument order
            let args = stack.split_off(stack.len() - op.arity);
            let refs: Vec<&Array2<f64>> = args.iter().collect();
            let mut result = op.apply(&refs);
            replaced += sanitize(&mut result);
            stack.push(result);
        }

        if replaced > 0 {
            log::trace!("Sanitized {} non-finite values", replaced);
        }

        if stack.len() == 1 {
            stack.pop()
        } else {
            None
        }
    }

    /// Function-call rendering of `formula`, e.g. `ADD(RET, VOL)`.
    ///
    /// Malformed input yields a bracketed placeholder instead of failing:
    /// `<UNKNOWN_TOKEN:t>`, `<STACK_UNDERFLOW:OP>`, `<INCOMPLETE: a | b>` or `<EMPTY>`.
    pub fn decode(&self, formula: &[Token]) -> String {
        let mut stack: Vec<String> = Vec::with_capacity(formula.len());

        for &token in formula {
            let name = match self.vocab.token_to_name(token) {
                Ok(name) => name,
                Err(_) => return format!("<UNKNOWN_TOKEN:{}>", token),
            };

            if self.vocab.is_feature(token) {
                stack.push(name.to_string());
                continue;
            }

            let arity = match self.vocab.get_operator_arity(token) {
                Ok(arity) => arity,
                Err(_) => return format!("<UNKNOWN_TOKEN:{}>", token),
            };
            if stack.len() < arity {
                return format!("<STACK_UNDERFLOW:{}>", name);
            }
            let args = stack.split_off(stack.len() - arity);
            stack.push(format!("{}({})", name, args.join(", ")));
        }

        match stack.len() {
            0 => "<EMPTY>".to_string(),
            1 => stack.pop().unwrap_or_default(),
            _ => format!("<INCOMPLETE: {}>", stack.join(" | ")),
        }
    }

    /// Tensor-free stack-depth simulation. Agrees with `execute` for any tensor that has a
    /// channel for every referenced feature.
    pub fn validate(&self, formula: &[Token]) -> bool {
        let mut depth = 0usize;
        for &token in formula {
            if self.vocab.is_feature(token) {
                depth += 1;
            } else {
                match self.vocab.get_operator_arity(token) {
                    Ok(arity) if depth >= arity => depth = depth - arity + 1,
                    _ => return false,
                }
            }
        }
        depth == 1
    }

    pub fn required_features(&self, formula: &[Token]) -> BTreeSet<Token> {
        formula
            .iter()
            .copied()
            .filter(|&t| self.vocab.is_feature(t))
            .collect()
    }
}
