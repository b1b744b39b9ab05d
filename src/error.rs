use thiserror::Error;

use crate::types::Token;

#[derive(Error, Debug)]
pub enum AlphagenError {
    #[error("Unknown token: {0}")]
    UnknownToken(Token),

    #[error("Unknown name: {0}")]
    UnknownName(String),

    #[error("Token {0} is not an operator")]
    NotAnOperator(Token),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Generator error: {0}")]
    Generator(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Vocabulary mismatch: expected {expected} tokens, got {actual}")]
    VocabularyMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data loading error: {0}")]
    DataLoading(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, AlphagenError>;
