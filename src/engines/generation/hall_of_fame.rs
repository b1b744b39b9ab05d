use crate::engines::metrics::FactorMetrics;
use crate::types::Token;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EliteFormula {
    pub tokens: Vec<Token>,
    pub formula: String, // Decoded string, also the deduplication key
    pub score: f64,
    pub metrics: Option<FactorMetrics>,
    pub step: usize,
}

/// Best `max_size` distinct formulas seen so far, highest score first.
pub struct HallOfFame {
    formulas: Vec<EliteFormula>,
    max_size: usize,
    seen_signatures: HashSet<String>,
}

impl HallOfFame {
    pub fn new(max_size: usize) -> Self {
        Self {
            formulas: Vec::new(),
            max_size,
            seen_signatures: HashSet::new(),
        }
    }

    /// Attempt to add a formula. Rejects duplicates, non-finite scores (other than
    /// `+inf`) and anything that would fall straight off the end of a full table.
    pub fn try_add(&mut self, formula: EliteFormula) -> bool {
        if self.max_size == 0 || formula.score.is_nan() || formula.score == f64::NEG_INFINITY {
            return false;
        }
        if self.seen_signatures.contains(&formula.formula) {
            return false;
        }
        if self.formulas.len() >= self.max_size {
            if let Some(worst) = self.formulas.last() {
                if formula.score <= worst.score {
                    return false;
                }
            }
        }

        self.seen_signatures.insert(formula.formula.clone());
        self.formulas.push(formula);

        self.formulas.sort_by(|a, b| b.score.total_cmp(&a.score));

        while self.formulas.len() > self.max_size {
            if let Some(removed) = self.formulas.pop() {
                self.seen_signatures.remove(&removed.formula);
            }
        }

        true
    }

    pub fn get_all(&self) -> &[EliteFormula] {
        &self.formulas
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }
}
