use crate::{
    error::{AlphagenError, Result},
    functions::Vocabulary,
    types::{Formula, Token},
};
use std::sync::Arc;

/// Turns formula text into postfix tokens.
///
/// Function-call text (`NEG(DELAY1(RET))`) is read as a prefix name sequence once parentheses
/// and commas are stripped, and reordered with operator arities. Text without parentheses is
/// taken as a whitespace separated postfix program and passed through unchanged.
pub struct FormulaParser {
    vocab: Arc<Vocabulary>,
}

impl FormulaParser {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self { vocab }
    }

    pub fn parse(&self, text: &str) -> Result<Formula> {
        let tokens = self.resolve(text)?;
        if tokens.is_empty() {
            return Err(AlphagenError::Parse("empty formula".to_string()));
        }

        if text.contains('(') {
            self.prefix_to_postfix(&tokens)
        } else {
            Ok(tokens)
        }
    }

    fn resolve(&self, text: &str) -> Result<Vec<Token>> {
        text.replace(['(', ')', ','], " ")
            .split_whitespace()
            .map(|word| {
                if word.parse::<f64>().is_ok() {
                    return Err(AlphagenError::Parse(format!(
                        "numeric literal '{}' is not supported",
                        word
                    )));
                }
                self.vocab
                    .name_to_token(word)
                    .map_err(|_| AlphagenError::Parse(format!("unknown name '{}'", word)))
            })
            .collect()
    }

    fn prefix_to_postfix(&self, prefix: &[Token]) -> Result<Formula> {
        // Walk right to left; each stack entry is a complete postfix operand
        let mut operands: Vec<Formula> = Vec::new();

        for &token in prefix.iter().rev() {
            if self.vocab.is_feature(token) {
                operands.push(vec![token]);
                continue;
            }

            let arity = self.vocab.get_operator_arity(token)?;
            if operands.len() < arity {
                return Err(AlphagenError::Parse(format!(
                    "{} expects {} arguments",
                    self.vocab.token_to_name(token)?,
                    arity
                )));
            }

            let mut expr = Vec::new();
            for _ in 0..arity {
                if let Some(arg) = operands.pop() {
                    expr.extend(arg);
                }
            }
            expr.push(token);
            operands.push(expr);
        }

        match operands.len() {
            1 => Ok(operands.pop().unwrap_or_default()),
            n => Err(AlphagenError::Parse(format!(
                "expected a single expression, found {}",
                n
            ))),
        }
    }
}
