use super::{
    primitives,
    timeseries,
    traits::{OperatorFn, OperatorSpec},
};
use crate::config::FeatureConfig;
use crate::error::{AlphagenError, Result};
use crate::types::Token;
use std::collections::HashMap;

/// Default channel order delivered by the feature builders.
pub const DEFAULT_FEATURES: [&str; 6] = [
    "RET",
    "VOL",
    "VOLUME_CHG",
    "TURNOVER",
    "SENTIMENT",
    "NEWS_COUNT",
];

/// Built-in operator table. Order is part of the checkpoint contract.
pub fn standard_operators() -> Vec<OperatorSpec> {
    vec![
        OperatorSpec::new("ADD", 2, primitives::add),
        OperatorSpec::new("SUB", 2, primitives::sub),
        OperatorSpec::new("MUL", 2, primitives::mul),
        OperatorSpec::new("DIV", 2, primitives::div),
        OperatorSpec::new("MAX", 2, primitives::max),
        OperatorSpec::new("MIN", 2, primitives::min),
        OperatorSpec::new("NEG", 1, primitives::neg),
        OperatorSpec::new("ABS", 1, primitives::abs),
        OperatorSpec::new("SIGN", 1, primitives::sign),
        OperatorSpec::new("LOG", 1, primitives::log),
        OperatorSpec::new("DELAY1", 1, timeseries::delay1),
        OperatorSpec::new("DELTA1", 1, timeseries::delta1),
        OperatorSpec::new("DECAY", 1, timeseries::decay),
        OperatorSpec::new("MAX3", 1, timeseries::max3),
        OperatorSpec::new("TS_MEAN5", 1, timeseries::ts_mean5),
        OperatorSpec::new("TS_STD5", 1, timeseries::ts_std5),
        OperatorSpec::new("JUMP", 1, timeseries::jump),
        OperatorSpec::new("GATE", 3, primitives::gate),
    ]
}

/// Immutable token table: feature tokens `[0, F)` then operator tokens `[F, F + O)`.
///
/// Built once and shared read-only (`Arc<Vocabulary>`) by the VM, the generator and the
/// trainer. Operator lookups index the table by `token - feature_offset`.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    features: Vec<String>,
    operators: Vec<OperatorSpec>,
    index: HashMap<String, Token>,
}

impl Vocabulary {
    pub fn new(features: Vec<String>, operators: Vec<OperatorSpec>) -> Result<Self> {
        if features.is_empty() {
            return Err(AlphagenError::Configuration(
                "Vocabulary needs at least one feature".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(features.len() + operators.len());
        let names = features
            .iter()
            .map(String::as_str)
            .chain(operators.iter().map(|op| op.name));

        for (token, name) in names.enumerate() {
            if index.insert(name.to_string(), token as Token).is_some() {
                return Err(AlphagenError::Configuration(format!(
                    "Duplicate vocabulary name: {}",
                    name
                )));
            }
        }

        for op in &operators {
            if !(1..=3).contains(&op.arity) {
                return Err(AlphagenError::Configuration(format!(
                    "Operator {} has unsupported arity {}",
                    op.name, op.arity
                )));
            }
        }

        Ok(Self {
            features,
            operators,
            index,
        })
    }

    /// Default feature channels with the built-in operator table.
    pub fn standard() -> Self {
        let features = DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect();
        Self {
            index: Self::build_index(&DEFAULT_FEATURES.map(String::from), &standard_operators()),
            features,
            operators: standard_operators(),
        }
    }

    pub fn from_config(config: &FeatureConfig) -> Result<Self> {
        Self::new(config.channel_names(), standard_operators())
    }

    fn build_index(features: &[String], operators: &[OperatorSpec]) -> HashMap<String, Token> {
        features
            .iter()
            .map(String::as_str)
            .chain(operators.iter().map(|op| op.name))
            .enumerate()
            .map(|(token, name)| (name.to_string(), token as Token))
            .collect()
    }

    pub fn size(&self) -> usize {
        self.features.len() + self.operators.len()
    }

    /// First operator token, equal to the feature count `F`.
    pub fn feature_offset(&self) -> Token {
        self.features.len() as Token
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.features
    }

    pub fn operators(&self) -> &[OperatorSpec] {
        &self.operators
    }

    pub fn is_feature(&self, token: Token) -> bool {
        token < self.feature_offset()
    }

    pub fn is_operator(&self, token: Token) -> bool {
        token >= self.feature_offset() && (token as usize) < self.size()
    }

    pub fn token_to_name(&self, token: Token) -> Result<&str> {
        let idx = token as usize;
        if idx < self.features.len() {
            Ok(&self.features[idx])
        } else if let Some(op) = self.operators.get(idx - self.features.len()) {
            Ok(op.name)
        } else {
            Err(AlphagenError::UnknownToken(token))
        }
    }

    pub fn name_to_token(&self, name: &str) -> Result<Token> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| AlphagenError::UnknownName(name.to_string()))
    }

    pub fn operator(&self, token: Token) -> Result<&OperatorSpec> {
        if self.is_feature(token) {
            return Err(AlphagenError::NotAnOperator(token));
        }
        self.operators
            .get((token - self.feature_offset()) as usize)
            .ok_or(AlphagenError::UnknownToken(token))
    }

    pub fn get_operator_arity(&self, token: Token) -> Result<usize> {
        self.operator(token).map(|op| op.arity)
    }

    pub fn get_operator_func(&self, token: Token) -> Result<OperatorFn> {
        self.operator(token).map(|op| op.func)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::standard()
    }
}
